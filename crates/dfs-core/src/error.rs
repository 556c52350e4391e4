//! The single error enum that crosses the RMI wire.
//!
//! Every remote method in this workspace returns `Result<T, RemoteError>`.
//! `RemoteError::Transport` is the one variant every remote interface
//! must be able to produce (see `rmi::descriptor`); the rest are the
//! filesystem/argument/internal error kinds from the spec's §7.

use std::fmt;

/// Errors that can be observed at either end of an RMI call.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RemoteError {
    /// Connect, read, write, serialization or protocol-shape failure.
    /// Every stub call can raise this; it is never swallowed.
    Transport(String),
    /// The server method raised a declared error that is not itself a
    /// transport failure; the payload is the error's own rendering.
    Remote(String),
    /// No path component named by the request exists.
    FileNotFound,
    /// A create operation targeted a name that is already taken.
    AlreadyExists,
    /// An operation valid only on files was applied to a directory.
    IsDirectory,
    /// An operation valid only on directories was applied to a file.
    IsFile,
    /// A path string failed to parse (bad component, no leading `/`).
    InvalidPath(String),
    /// The call violates an invariant of the callee's current state,
    /// e.g. double registration of the same storage server.
    IllegalState(String),
    /// An argument was out of range independent of server state
    /// (negative offset, negative length).
    IllegalArgument(String),
    /// A required argument was null/absent.
    NullPointer,
    /// A remote interface was rejected at stub/skeleton construction
    /// time because some method does not declare `Transport` in its
    /// failure set.
    BadInterface(String),
    /// The request's method name/parameter signature does not match
    /// any method of the target interface.
    NoSuchMethod(String),
    /// A server-side invariant was violated (e.g. a file node vanished
    /// while its lock was held). Logged via `service_error` and
    /// reported to the caller as a transport error.
    Internal(String),
}

impl RemoteError {
    /// `true` for the one variant every remote method implicitly
    /// declares and that a stub call always re-raises verbatim.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(msg) => write!(f, "transport error: {msg}"),
            RemoteError::Remote(msg) => write!(f, "{msg}"),
            RemoteError::FileNotFound => write!(f, "file not found"),
            RemoteError::AlreadyExists => write!(f, "already exists"),
            RemoteError::IsDirectory => write!(f, "is a directory"),
            RemoteError::IsFile => write!(f, "is a file"),
            RemoteError::InvalidPath(s) => write!(f, "invalid path: {s}"),
            RemoteError::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            RemoteError::IllegalArgument(msg) => write!(f, "illegal argument: {msg}"),
            RemoteError::NullPointer => write!(f, "null pointer"),
            RemoteError::BadInterface(msg) => write!(f, "bad interface: {msg}"),
            RemoteError::NoSuchMethod(name) => write!(f, "no such method: {name}"),
            RemoteError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

impl From<bincode::Error> for RemoteError {
    fn from(e: bincode::Error) -> Self {
        RemoteError::Transport(format!("serialization failure: {e}"))
    }
}
