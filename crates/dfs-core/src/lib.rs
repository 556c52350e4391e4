//! RMI transport substrate and shared data model for the distributed
//! filesystem workspace.
//!
//! # Overview
//!
//! This crate provides the two lowest layers of the DFS (see the
//! workspace's `SPEC_FULL.md` §2):
//!
//! 1. [`path`] — the immutable, hierarchical [`path::Path`] value type
//!    shared by every other crate in the workspace.
//! 2. [`rmi`] — a connection-per-call request/response transport: a
//!    [`rmi::Skeleton`] dispatches incoming calls to a server object,
//!    and a [`rmi::Stub`] turns method calls into network requests.
//!
//! [`iface`] then builds the concrete remote interfaces (naming,
//! storage, a diagnostic test interface) on top of `rmi`, and
//! [`error`] defines the single error enum that crosses the wire.
//!
//! # Example
//!
//! ```no_run
//! use dfs_core::iface::test::{TestServer, TestStub};
//! use dfs_core::rmi::Skeleton;
//!
//! # async fn run() -> Result<(), dfs_core::error::RemoteError> {
//! let skeleton = Skeleton::with_default_hooks(TestServer::new(1), "127.0.0.1:0".parse().unwrap())?;
//! skeleton.start().await?;
//! let addr = skeleton.local_addr().await.unwrap();
//!
//! let stub = TestStub::new(addr)?;
//! stub.method(false).await?;
//! skeleton.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod iface;
pub mod path;
pub mod rmi;
pub mod serialize;

pub use error::RemoteError;
pub use path::Path;
