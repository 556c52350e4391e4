//! The naming service's remote interface (§4.5), split across the two
//! ports it's exposed on: client metadata operations
//! (`NamingClientInterface`) and the storage-server registration entry
//! point (`NamingRegistrationInterface`).

use std::net::SocketAddr;

use crate::error::RemoteError;
use crate::iface::storage::{StorageClientStub, StorageCommandStub};
use crate::path::Path;
use crate::rmi::descriptor::{InterfaceDescriptor, MethodDescriptor, RemoteInterface};
use crate::rmi::stub::Stub;

pub struct NamingClientInterface;

pub const NAMING_CLIENT_DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
    name: "NamingClient",
    methods: &[
        MethodDescriptor { name: "isDirectory", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "list", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "createFile", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "createDirectory", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "delete", params: &["Path"], declares_transport_error: true },
        MethodDescriptor { name: "getStorage", params: &["Path"], declares_transport_error: true },
    ],
};

impl RemoteInterface for NamingClientInterface {
    fn descriptor() -> InterfaceDescriptor {
        NAMING_CLIENT_DESCRIPTOR
    }
}

pub struct NamingRegistrationInterface;

pub const NAMING_REGISTRATION_DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
    name: "NamingRegistration",
    methods: &[MethodDescriptor {
        name: "register",
        params: &["Stub", "Stub", "PathList"],
        declares_transport_error: true,
    }],
};

impl RemoteInterface for NamingRegistrationInterface {
    fn descriptor() -> InterfaceDescriptor {
        NAMING_REGISTRATION_DESCRIPTOR
    }
}

/// Client-side proxy for the naming server's metadata operations.
#[derive(Clone)]
pub struct NamingClientStub(pub Stub<NamingClientInterface>);

impl NamingClientStub {
    pub fn new(addr: SocketAddr) -> Result<NamingClientStub, RemoteError> {
        Ok(NamingClientStub(Stub::new(addr)?))
    }

    pub async fn is_directory(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("isDirectory", &["Path"], &(path.clone(),)).await
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>, RemoteError> {
        self.0.invoke("list", &["Path"], &(path.clone(),)).await
    }

    pub async fn create_file(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("createFile", &["Path"], &(path.clone(),)).await
    }

    pub async fn create_directory(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("createDirectory", &["Path"], &(path.clone(),)).await
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, RemoteError> {
        self.0.invoke("delete", &["Path"], &(path.clone(),)).await
    }

    pub async fn get_storage(&self, path: &Path) -> Result<StorageClientStub, RemoteError> {
        self.0.invoke("getStorage", &["Path"], &(path.clone(),)).await
    }
}

/// Entry point used once by each storage server at startup.
#[derive(Clone)]
pub struct NamingRegistrationStub(pub Stub<NamingRegistrationInterface>);

impl NamingRegistrationStub {
    pub fn new(addr: SocketAddr) -> Result<NamingRegistrationStub, RemoteError> {
        Ok(NamingRegistrationStub(Stub::new(addr)?))
    }

    /// Registers a storage server, offering its local file list.
    /// Returns the paths the naming server already knows about (the
    /// caller is expected to delete those local copies); root is never
    /// reported as a duplicate even if offered.
    pub async fn register(
        &self,
        client_stub: StorageClientStub,
        command_stub: StorageCommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, RemoteError> {
        self.0
            .invoke("register", &["Stub", "Stub", "PathList"], &(client_stub, command_stub, files))
            .await
    }
}
