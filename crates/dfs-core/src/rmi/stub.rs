//! Client-side proxy ([`Stub`]).
//!
//! Per the design notes, stubs are realised as hand-written structs per
//! interface rather than a dynamic proxy: `Stub<I>` is the shared
//! marshalling core (open a connection, write a `Request`, read a
//! `Reply`), and each interface exposes its own thin wrapper type with
//! one method per remote operation (see `dfs-core::iface`).

use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::net::TcpStream;

use crate::error::RemoteError;
use crate::rmi::descriptor::RemoteInterface;
use crate::rmi::skeleton::{Dispatch, Skeleton};
use crate::serialize::{self, Request};

/// A value-like, serializable client-side proxy for interface `I`.
/// Two stubs compare equal, and hash equally, iff they name the same
/// interface and the same address.
pub struct Stub<I> {
    interface_name: String,
    addr: SocketAddr,
    _marker: PhantomData<fn() -> I>,
}

impl<I: RemoteInterface> Stub<I> {
    /// Creates a stub for a known address. The skeleton need not exist
    /// yet. Fails with `IllegalArgument` if `I` is not a remote
    /// interface (see `InterfaceDescriptor::validate`).
    pub fn new(addr: SocketAddr) -> Result<Stub<I>, RemoteError> {
        let descriptor = I::descriptor();
        descriptor
            .validate()
            .map_err(|e| RemoteError::IllegalArgument(e.to_string()))?;
        Ok(Stub {
            interface_name: descriptor.name.to_owned(),
            addr,
            _marker: PhantomData,
        })
    }

    /// Creates a stub bound to an already-started skeleton's address.
    /// Fails with `IllegalState` if the skeleton hasn't been started.
    pub async fn from_skeleton<D: Dispatch + 'static>(skeleton: &Skeleton<D>) -> Result<Stub<I>, RemoteError> {
        let addr = skeleton
            .local_addr()
            .await
            .ok_or_else(|| RemoteError::IllegalState("skeleton has not been started".into()))?;
        Stub::new(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    /// Opens a fresh connection, sends one request, and waits for the
    /// reply. Every I/O, connect, or (de)serialization failure becomes
    /// `RemoteError::Transport`; a server-raised error is re-thrown
    /// unchanged.
    pub async fn invoke<A, R>(&self, method: &str, params: &[&str], args: &A) -> Result<R, RemoteError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut stream = TcpStream::connect(self.addr).await.map_err(RemoteError::from)?;

        let request = Request {
            method: method.to_owned(),
            params: params.iter().map(|s| s.to_string()).collect(),
            args: bincode::serialize(args).map_err(RemoteError::from)?,
        };
        let encoded = serialize::encode_request(&request)?;

        {
            let mut writer = serialize::framed_write(&mut stream);
            writer
                .send(bytes::Bytes::from(encoded))
                .await
                .map_err(RemoteError::from)?;
        }

        let mut reader = serialize::framed_read(&mut stream);
        let frame = reader
            .next()
            .await
            .ok_or_else(|| RemoteError::Transport("connection closed without a reply".into()))?
            .map_err(RemoteError::from)?;

        let reply = serialize::decode_reply(&frame)?;
        reply.into_result()
    }
}

impl<I> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Stub {
            interface_name: self.interface_name.clone(),
            addr: self.addr,
            _marker: PhantomData,
        }
    }
}

impl<I> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("interface", &self.interface_name)
            .field("addr", &self.addr)
            .finish()
    }
}

impl<I> fmt::Display for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.interface_name, self.addr)
    }
}

impl<I> PartialEq for Stub<I> {
    fn eq(&self, other: &Self) -> bool {
        self.interface_name == other.interface_name && self.addr == other.addr
    }
}
impl<I> Eq for Stub<I> {}

impl<I> std::hash::Hash for Stub<I> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.interface_name.hash(state);
        self.addr.hash(state);
    }
}

impl<I> Serialize for Stub<I> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        (&self.interface_name, &self.addr).serialize(s)
    }
}

impl<'de, I> Deserialize<'de> for Stub<I> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let (interface_name, addr) = <(String, SocketAddr)>::deserialize(d)?;
        Ok(Stub { interface_name, addr, _marker: PhantomData })
    }
}
