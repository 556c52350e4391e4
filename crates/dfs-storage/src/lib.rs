//! Storage server library: local file I/O backing the DFS, exposed as
//! the two storage remote interfaces from `dfs-core::iface::storage`.

pub mod service;

pub use service::{StorageClientDispatch, StorageCommandDispatch, StorageService};
