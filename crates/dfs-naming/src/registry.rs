//! Storage-server registry: the other half of the naming tree/registry
//! cyclic relationship (§9's design note). File nodes in [`crate::tree`]
//! reference storage servers by a stable [`StorageServerId`] rather than
//! holding the stub pair directly, so the registry is the only owner of
//! the actual stubs and can be mutated (a server added, its file set
//! grown) without walking every file node that references it.

use std::collections::{HashMap, HashSet};

use dfs_core::iface::storage::{StorageClientStub, StorageCommandStub};
use dfs_core::path::Path;
use tokio::sync::Mutex;

/// A stable index into the registry. Cloned freely; cheaper than
/// carrying the stub pair around in every file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageServerId(usize);

struct StorageServerRecord {
    client_stub: StorageClientStub,
    command_stub: StorageCommandStub,
    files: HashSet<Path>,
}

/// Entered on registration (§4.5); removed only if the server is
/// explicitly dropped, which this workspace does not implement (no
/// deregistration call exists in the external interface).
pub struct StorageRegistry {
    records: Mutex<HashMap<StorageServerId, StorageServerRecord>>,
    by_client_stub: Mutex<HashMap<StorageClientStub, StorageServerId>>,
    next_id: Mutex<usize>,
}

impl StorageRegistry {
    pub fn new() -> StorageRegistry {
        StorageRegistry {
            records: Mutex::new(HashMap::new()),
            by_client_stub: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    /// `true` iff a storage server identified by this client stub has
    /// already registered (§4.5 step 1).
    pub async fn is_registered(&self, client_stub: &StorageClientStub) -> bool {
        self.by_client_stub.lock().await.contains_key(client_stub)
    }

    /// Admits a new storage server with its initial file set, returning
    /// its id. Caller must have already checked [`is_registered`].
    pub async fn insert(
        &self,
        client_stub: StorageClientStub,
        command_stub: StorageCommandStub,
        files: HashSet<Path>,
    ) -> StorageServerId {
        let id = {
            let mut next_id = self.next_id.lock().await;
            let id = StorageServerId(*next_id);
            *next_id += 1;
            id
        };
        self.by_client_stub.lock().await.insert(client_stub.clone(), id);
        self.records.lock().await.insert(id, StorageServerRecord { client_stub, command_stub, files });
        id
    }

    pub async fn client_stub(&self, id: StorageServerId) -> Option<StorageClientStub> {
        self.records.lock().await.get(&id).map(|r| r.client_stub.clone())
    }

    pub async fn command_stub(&self, id: StorageServerId) -> Option<StorageCommandStub> {
        self.records.lock().await.get(&id).map(|r| r.command_stub.clone())
    }

    pub async fn add_hosted_file(&self, id: StorageServerId, path: Path) {
        if let Some(record) = self.records.lock().await.get_mut(&id) {
            record.files.insert(path);
        }
    }

    pub async fn remove_hosted_file(&self, id: StorageServerId, path: &Path) {
        if let Some(record) = self.records.lock().await.get_mut(&id) {
            record.files.remove(path);
        }
    }

    /// All registered servers not in `exclude`, for replication target
    /// selection and round-robin host choice.
    pub async fn candidates_excluding(&self, exclude: &HashSet<StorageServerId>) -> Vec<StorageServerId> {
        self.records.lock().await.keys().filter(|id| !exclude.contains(id)).copied().collect()
    }

    pub async fn all_ids(&self) -> Vec<StorageServerId> {
        self.records.lock().await.keys().copied().collect()
    }
}

impl Default for StorageRegistry {
    fn default() -> StorageRegistry {
        StorageRegistry::new()
    }
}
