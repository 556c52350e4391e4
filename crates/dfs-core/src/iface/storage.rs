//! Storage server remote interfaces (§4.6), as consumed by both the
//! naming server and DFS clients. Exposed on two ports by a storage
//! server: client I/O (`StorageClientInterface`) and naming-only
//! commands (`StorageCommandInterface`).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::path::Path;
use crate::rmi::descriptor::{InterfaceDescriptor, MethodDescriptor, RemoteInterface};
use crate::rmi::stub::Stub;

pub struct StorageClientInterface;

pub const STORAGE_CLIENT_DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
    name: "StorageClient",
    methods: &[
        MethodDescriptor { name: "size", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "read", params: &["Path", "Offset", "Length"], declares_transport_error: true },
        MethodDescriptor { name: "write", params: &["Path", "Offset", "Bytes"], declares_transport_error: true },
    ],
};

impl RemoteInterface for StorageClientInterface {
    fn descriptor() -> InterfaceDescriptor {
        STORAGE_CLIENT_DESCRIPTOR
    }
}

pub struct StorageCommandInterface;

pub const STORAGE_COMMAND_DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
    name: "StorageCommand",
    methods: &[
        MethodDescriptor { name: "create", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "delete", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "copy", params: &["Path", "Stub"], declares_transport_error: true },
    ],
};

impl RemoteInterface for StorageCommandInterface {
    fn descriptor() -> InterfaceDescriptor {
        STORAGE_COMMAND_DESCRIPTOR
    }
}

/// Client-facing storage stub: `size`/`read`/`write`. Value-like and
/// serializable (it is stored in the naming tree's host lists and
/// handed to clients by `getStorage`).
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageClientStub(pub Stub<StorageClientInterface>);

impl StorageClientStub {
    pub fn new(addr: SocketAddr) -> Result<StorageClientStub, RemoteError> {
        Ok(StorageClientStub(Stub::new(addr)?))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0.addr()
    }

    /// Returns the size of `path` in bytes.
    pub async fn size(&self, path: &Path) -> Result<u64, RemoteError> {
        self.0.invoke("size", &["Path"], &(path.clone(),)).await
    }

    /// Reads up to `length` bytes starting at `offset`. Fails with
    /// `IllegalArgument` if `offset < 0` or `length < 0` (checked
    /// before any network activity by the caller), and with a remote
    /// error if `offset` is past end-of-file. `offset == size` is not
    /// an error: it returns zero bytes, which is what lets a sequential
    /// reader detect EOF by getting an empty read back.
    pub async fn read(&self, path: &Path, offset: i64, length: i64) -> Result<Vec<u8>, RemoteError> {
        if offset < 0 || length < 0 {
            return Err(RemoteError::IllegalArgument("offset and length must be non-negative".into()));
        }
        self.0.invoke("read", &["Path", "Offset", "Length"], &(path.clone(), offset, length)).await
    }

    /// Writes `data` at `offset`, extending the file if necessary.
    pub async fn write(&self, path: &Path, offset: i64, data: &[u8]) -> Result<(), RemoteError> {
        if offset < 0 {
            return Err(RemoteError::IllegalArgument("offset must be non-negative".into()));
        }
        self.0.invoke("write", &["Path", "Offset", "Bytes"], &(path.clone(), offset, data.to_vec())).await
    }
}

impl PartialEq for StorageClientStub {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for StorageClientStub {}
impl std::hash::Hash for StorageClientStub {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Naming-only storage stub: `create`/`delete`/`copy`.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageCommandStub(pub Stub<StorageCommandInterface>);

impl StorageCommandStub {
    pub fn new(addr: SocketAddr) -> Result<StorageCommandStub, RemoteError> {
        Ok(StorageCommandStub(Stub::new(addr)?))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0.addr()
    }

    pub async fn create(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("create", &["Path"], &(path.clone(),)).await
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("delete", &["Path"], &(path.clone(),)).await
    }

    /// Fetches the full contents of `path` from `source` via its
    /// `read` method and replaces the local copy atomically.
    pub async fn copy(&self, path: &Path, source: &StorageClientStub) -> Result<bool, RemoteError> {
        self.0.invoke("copy", &["Path", "Stub"], &(path.clone(), source.clone())).await
    }
}

impl PartialEq for StorageCommandStub {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for StorageCommandStub {}
impl std::hash::Hash for StorageCommandStub {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
