//! Naming service logic (C6, §4.5): registration, lookup, create/delete,
//! stub assignment, and the replication/invalidation policy triggered by
//! [`crate::locks::PathLockTree`].
//!
//! [`NamingService`] holds all server-side state; [`NamingClientDispatch`]
//! and [`NamingRegistrationDispatch`] are the two thin `Dispatch`
//! adapters that expose it on its two ports (a single type can't
//! implement the same trait twice for two interfaces, so the naming
//! binary runs two skeletons, one per adapter, both wrapping the same
//! `Arc<NamingService>`).

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dfs_core::iface::naming::{NAMING_CLIENT_DESCRIPTOR, NAMING_REGISTRATION_DESCRIPTOR};
use dfs_core::iface::storage::{StorageClientStub, StorageCommandStub};
use dfs_core::path::Path;
use dfs_core::rmi::descriptor::InterfaceDescriptor;
use dfs_core::rmi::skeleton::Dispatch;
use dfs_core::serialize::Reply;
use dfs_core::RemoteError;
use log::{debug, info, warn};
use serde::Serialize;

use crate::locks::{PathLockTree, ReplicationEvent};
use crate::registry::StorageRegistry;
use crate::tree::NamingTree;

/// All server-side state of the naming server, independent of which
/// port a call arrived on.
pub struct NamingService {
    locks: PathLockTree,
    tree: NamingTree,
    registry: StorageRegistry,
    round_robin: AtomicUsize,
}

impl NamingService {
    pub fn new() -> NamingService {
        NamingService {
            locks: PathLockTree::new(),
            tree: NamingTree::new(),
            registry: StorageRegistry::new(),
            round_robin: AtomicUsize::new(0),
        }
    }

    async fn with_lock<F, Fut, T>(&self, path: &Path, exclusive: bool, f: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let event = self.locks.lock_path(path, exclusive).await;
        let result = f().await;
        self.locks.unlock_path(path, exclusive).await;
        self.apply_replication_event(path, event).await;
        result
    }

    pub async fn is_directory(&self, path: &Path) -> Result<bool, RemoteError> {
        self.with_lock(path, false, || async { self.tree.is_directory(path).await.ok_or(RemoteError::FileNotFound) })
            .await
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>, RemoteError> {
        self.with_lock(path, false, || async {
            match self.tree.is_directory(path).await {
                None => Err(RemoteError::FileNotFound),
                Some(false) => Err(RemoteError::IsFile),
                Some(true) => Ok(self.tree.list(path).await.unwrap_or_default()),
            }
        })
        .await
    }

    pub async fn create_file(&self, path: &Path) -> Result<bool, RemoteError> {
        let parent = path.parent().ok_or_else(|| RemoteError::IllegalArgument("root has no parent".into()))?;
        self.with_lock(&parent, true, || async {
            self.check_parent_for_create(&parent, path).await?;
            let host = self.choose_host().await?;
            let command_stub = self.registry.command_stub(host).await.ok_or_else(host_vanished)?;
            match command_stub.create(path).await {
                Ok(true) => {
                    self.tree.insert_file(&parent, path.clone(), host).await;
                    self.registry.add_hosted_file(host, path.clone()).await;
                    Ok(true)
                }
                Ok(false) => Err(RemoteError::Internal("storage server refused create".into())),
                Err(e) => Err(e),
            }
        })
        .await
    }

    pub async fn create_directory(&self, path: &Path) -> Result<bool, RemoteError> {
        let parent = path.parent().ok_or_else(|| RemoteError::IllegalArgument("root has no parent".into()))?;
        self.with_lock(&parent, true, || async {
            self.check_parent_for_create(&parent, path).await?;
            self.tree.insert_directory(&parent, path.clone()).await;
            Ok(true)
        })
        .await
    }

    async fn check_parent_for_create(&self, parent: &Path, path: &Path) -> Result<(), RemoteError> {
        match self.tree.is_directory(parent).await {
            None => return Err(RemoteError::FileNotFound),
            Some(false) => return Err(RemoteError::IsFile),
            Some(true) => {}
        }
        let name = path.last().expect("non-root path always has a last component").to_owned();
        if self.tree.list(parent).await.unwrap_or_default().contains(&name) {
            return Err(RemoteError::AlreadyExists);
        }
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, RemoteError> {
        if path.is_root() {
            return Err(RemoteError::IllegalArgument("cannot delete root".into()));
        }
        self.with_lock(path, true, || async {
            if !self.tree.contains(path).await {
                return Err(RemoteError::FileNotFound);
            }
            for leaf in self.tree.file_leaves_under(path).await {
                let hosts = self.tree.hosts(&leaf).await.unwrap_or_default();
                for host in hosts {
                    if let Some(command_stub) = self.registry.command_stub(host).await {
                        if let Err(e) = command_stub.delete(&leaf).await {
                            warn!("best-effort delete of {leaf} on a storage server failed: {e}");
                        }
                    }
                    self.registry.remove_hosted_file(host, &leaf).await;
                }
            }
            self.tree.remove_subtree(path).await;
            Ok(true)
        })
        .await
    }

    pub async fn get_storage(&self, path: &Path) -> Result<StorageClientStub, RemoteError> {
        self.with_lock(path, false, || async {
            match self.tree.is_directory(path).await {
                None => Err(RemoteError::FileNotFound),
                Some(true) => Err(RemoteError::IsDirectory),
                Some(false) => {
                    let host = self
                        .tree
                        .hosts(path)
                        .await
                        .and_then(|hosts| hosts.into_iter().next())
                        .ok_or_else(|| RemoteError::Internal("file has no hosts".into()))?;
                    self.registry.client_stub(host).await.ok_or_else(host_vanished)
                }
            }
        })
        .await
    }

    /// Registration protocol (§4.5): rejects a storage server that has
    /// already registered, partitions the offered file list into
    /// duplicates (already present in the tree) and new files, creates
    /// missing intermediate directories for the new ones, and returns
    /// the duplicates for the caller to delete locally. Root is ignored
    /// even if offered.
    pub async fn register(
        &self,
        client_stub: StorageClientStub,
        command_stub: StorageCommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, RemoteError> {
        if self.registry.is_registered(&client_stub).await {
            return Err(RemoteError::IllegalState("storage server already registered".into()));
        }

        let mut offered: Vec<Path> = files.into_iter().filter(|p| !p.is_root()).collect();
        offered.sort();

        let id = self.registry.insert(client_stub, command_stub, HashSet::new()).await;
        info!("storage server registered with {} offered file(s)", offered.len());

        let mut duplicates = Vec::new();
        for path in &offered {
            // Create any missing intermediate directories *before*
            // taking the leaf's own lock chain below: ensure_parents
            // locks each ancestor exclusively in its own right, which
            // would deadlock against a shared hold this task already
            // took on that same ancestor as part of `lock_path(path,
            // ..)`.
            self.ensure_parents(path).await;
            self.locks.lock_path(path, true).await;
            if self.tree.contains(path).await {
                duplicates.push(path.clone());
            } else {
                let parent = path.parent().expect("root paths were filtered out above");
                self.tree.insert_file(&parent, path.clone(), id).await;
                self.registry.add_hosted_file(id, path.clone()).await;
            }
            self.locks.unlock_path(path, true).await;
        }
        Ok(duplicates)
    }

    /// Creates any directory on `path`'s ancestor chain that doesn't
    /// exist yet, ancestor-first. Each ancestor's existence check and
    /// creation happen under that ancestor's own exclusive path lock,
    /// so two storage servers registering sibling files under a
    /// not-yet-existing directory concurrently (S1 offers `/a/b`, S2
    /// offers `/a/c`) serialize on `/a`: whichever acquires the lock
    /// first creates it, the other observes it already present and
    /// skips the insert, instead of both racing to overwrite `/a`'s
    /// freshly-created (and therefore empty) `children` set.
    async fn ensure_parents(&self, path: &Path) {
        let ancestors = path.ancestors();
        for i in 1..ancestors.len() {
            let ancestor = &ancestors[i];
            self.locks.lock_path(ancestor, true).await;
            if !self.tree.contains(ancestor).await {
                self.tree.insert_directory(&ancestors[i - 1], ancestor.clone()).await;
            }
            self.locks.unlock_path(ancestor, true).await;
        }
    }

    async fn choose_host(&self) -> Result<crate::registry::StorageServerId, RemoteError> {
        let ids = self.registry.all_ids().await;
        if ids.is_empty() {
            return Err(RemoteError::IllegalState("no storage servers registered".into()));
        }
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % ids.len();
        Ok(ids[idx])
    }

    async fn apply_replication_event(&self, path: &Path, event: ReplicationEvent) {
        if event.should_invalidate {
            self.invalidate(path).await;
        } else if event.should_replicate {
            self.replicate(path).await;
        }
    }

    /// Picks one host of `path` to retain and deletes it from every
    /// other host, realising write-invalidates-replicas consistency.
    async fn invalidate(&self, path: &Path) {
        let Some(hosts) = self.tree.hosts(path).await else { return };
        if hosts.len() <= 1 {
            return;
        }
        let mut hosts: Vec<_> = hosts.into_iter().collect();
        hosts.sort();
        let retain = hosts[0];
        for &host in &hosts[1..] {
            if let Some(command_stub) = self.registry.command_stub(host).await {
                if let Err(e) = command_stub.delete(path).await {
                    warn!("invalidation delete of {path} on a replica failed: {e}");
                }
            }
            self.registry.remove_hosted_file(host, path).await;
        }
        self.tree.retain_only_host(path, retain).await;
        debug!("invalidated replicas of {path}, retained one host");
    }

    /// Copies `path` onto one additional storage server not already
    /// hosting it. A no-op (logged) if no spare server exists or the
    /// copy fails.
    async fn replicate(&self, path: &Path) {
        let Some(hosts) = self.tree.hosts(path).await else { return };
        let Some(&source_host) = hosts.iter().next() else { return };
        let candidates = self.registry.candidates_excluding(&hosts).await;
        let Some(&target) = candidates.first() else {
            debug!("replication threshold hit for {path} but no spare storage server exists");
            return;
        };
        let (Some(source_client), Some(target_command)) =
            (self.registry.client_stub(source_host).await, self.registry.command_stub(target).await)
        else {
            return;
        };
        match target_command.copy(path, &source_client).await {
            Ok(true) => {
                self.tree.add_host(path, target).await;
                self.registry.add_hosted_file(target, path.clone()).await;
                info!("replicated {path} to an additional storage server");
            }
            Ok(false) => warn!("replica copy of {path} was refused by the target storage server"),
            Err(e) => warn!("replica copy of {path} failed: {e}"),
        }
    }
}

impl Default for NamingService {
    fn default() -> NamingService {
        NamingService::new()
    }
}

fn host_vanished() -> RemoteError {
    RemoteError::Internal("file's storage server is no longer registered".into())
}

async fn reply_of<T: Serialize>(result: Result<T, RemoteError>) -> Reply {
    match result {
        Ok(v) => Reply::ok(&v).unwrap_or_else(|e| Reply::err(&e)),
        Err(e) => Reply::err(&e),
    }
}

/// Exposes [`NamingService`]'s client-facing metadata operations.
pub struct NamingClientDispatch(pub std::sync::Arc<NamingService>);

#[async_trait]
impl Dispatch for NamingClientDispatch {
    fn descriptor(&self) -> InterfaceDescriptor {
        NAMING_CLIENT_DESCRIPTOR
    }

    async fn dispatch(&self, method: &str, args: &[u8]) -> Reply {
        match method {
            "isDirectory" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.is_directory(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "list" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.list(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "createFile" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.create_file(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "createDirectory" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.create_directory(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "delete" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.delete(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "getStorage" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.get_storage(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            _ => unreachable!("validated by the skeleton before dispatch"),
        }
    }
}

/// Exposes [`NamingService::register`] on the storage-server-only port.
pub struct NamingRegistrationDispatch(pub std::sync::Arc<NamingService>);

#[async_trait]
impl Dispatch for NamingRegistrationDispatch {
    fn descriptor(&self) -> InterfaceDescriptor {
        NAMING_REGISTRATION_DESCRIPTOR
    }

    async fn dispatch(&self, method: &str, args: &[u8]) -> Reply {
        match method {
            "register" => match bincode::deserialize::<(StorageClientStub, StorageCommandStub, Vec<Path>)>(args) {
                Ok((client_stub, command_stub, files)) => {
                    reply_of(self.0.register(client_stub, command_stub, files).await).await
                }
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            _ => unreachable!("validated by the skeleton before dispatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[tokio::test]
    async fn create_directory_then_file_then_list_matches_scenario_s3() {
        let service = std::sync::Arc::new(NamingService::new());
        let a = Path::parse("/a").unwrap();
        let ab = Path::parse("/a/b").unwrap();

        assert_eq!(service.create_directory(&a).await, Ok(true));
        // No storage server registered yet: createFile must fail with
        // illegal-state rather than panicking.
        let err = service.create_file(&ab).await.unwrap_err();
        assert!(matches!(err, RemoteError::IllegalState(_)));
    }

    #[tokio::test]
    async fn is_directory_and_list_on_missing_path_is_file_not_found() {
        let service = NamingService::new();
        let missing = Path::parse("/missing").unwrap();
        assert_eq!(service.is_directory(&missing).await, Err(RemoteError::FileNotFound));
        assert_eq!(service.list(&missing).await, Err(RemoteError::FileNotFound));
    }

    #[tokio::test]
    async fn get_storage_on_root_is_is_directory_error() {
        let service = NamingService::new();
        assert_eq!(service.get_storage(&Path::root()).await, Err(RemoteError::IsDirectory));
    }

    #[tokio::test]
    async fn delete_root_is_rejected() {
        let service = NamingService::new();
        assert!(matches!(service.delete(&Path::root()).await, Err(RemoteError::IllegalArgument(_))));
    }

    #[tokio::test]
    async fn create_directory_twice_is_already_exists() {
        let service = NamingService::new();
        let a = Path::parse("/a").unwrap();
        assert_eq!(service.create_directory(&a).await, Ok(true));
        assert_eq!(service.create_directory(&a).await, Err(RemoteError::AlreadyExists));
    }

    #[tokio::test]
    async fn registration_reports_duplicates_and_ignores_offered_root() {
        let service = NamingService::new();
        let client1 = StorageClientStub::new(addr(19001)).unwrap();
        let command1 = StorageCommandStub::new(addr(19101)).unwrap();
        let x = Path::parse("/x").unwrap();
        let y = Path::parse("/y").unwrap();
        let z = Path::parse("/z").unwrap();

        let dup1 = service.register(client1, command1, vec![x.clone(), y.clone(), Path::root()]).await.unwrap();
        assert_eq!(dup1, Vec::<Path>::new());

        let client2 = StorageClientStub::new(addr(19002)).unwrap();
        let command2 = StorageCommandStub::new(addr(19102)).unwrap();
        let dup2 = service.register(client2, command2, vec![y.clone(), z.clone()]).await.unwrap();
        assert_eq!(dup2, vec![y.clone()]);

        assert_eq!(service.is_directory(&x).await, Ok(false));
        assert_eq!(service.is_directory(&z).await, Ok(false));
    }

    #[tokio::test]
    async fn concurrent_registrations_under_a_new_shared_parent_keep_both_siblings() {
        let service = std::sync::Arc::new(NamingService::new());
        let ab = Path::parse("/a/b").unwrap();
        let ac = Path::parse("/a/c").unwrap();

        let s1 = {
            let service = std::sync::Arc::clone(&service);
            let ab = ab.clone();
            tokio::spawn(async move {
                service
                    .register(
                        StorageClientStub::new(addr(19010)).unwrap(),
                        StorageCommandStub::new(addr(19110)).unwrap(),
                        vec![ab],
                    )
                    .await
                    .unwrap()
            })
        };
        let s2 = {
            let service = std::sync::Arc::clone(&service);
            let ac = ac.clone();
            tokio::spawn(async move {
                service
                    .register(
                        StorageClientStub::new(addr(19011)).unwrap(),
                        StorageCommandStub::new(addr(19111)).unwrap(),
                        vec![ac],
                    )
                    .await
                    .unwrap()
            })
        };
        s1.await.unwrap();
        s2.await.unwrap();

        // Neither sibling's registration-time directory creation may
        // have clobbered the other's entry in `/a`.
        let mut children = service.list(&Path::parse("/a").unwrap()).await.unwrap();
        children.sort();
        assert_eq!(children, vec!["b".to_owned(), "c".to_owned()]);
    }

    #[tokio::test]
    async fn double_registration_is_illegal_state() {
        let service = NamingService::new();
        let client = StorageClientStub::new(addr(19003)).unwrap();
        let command = StorageCommandStub::new(addr(19103)).unwrap();
        service.register(client.clone(), command.clone(), vec![]).await.unwrap();
        let err = service.register(client, command, vec![]).await.unwrap_err();
        assert!(matches!(err, RemoteError::IllegalState(_)));
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }
}
