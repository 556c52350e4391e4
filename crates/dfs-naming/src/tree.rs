//! In-memory naming directory tree (C5, §3 "Directory node"). A flat
//! map keyed by [`Path`] rather than a linked node structure: every
//! operation the naming service performs already knows the exact path
//! it needs, so there's no reason to walk parent pointers to find a
//! node (the teacher's own `Fid`/path-qid tables in `srv.rs` use the
//! same flat-map-over-path style rather than a linked tree).
//!
//! Guarded by its own short internal mutex (§5: "protected exclusively
//! by the path lock tree plus a short internal mutex on the tree-node
//! map") in addition to the coarser per-path lock the naming service
//! holds before calling in here; callers are expected to already hold
//! the right [`crate::locks::PathLockTree`] lock for `path` before
//! calling any mutating method.

use std::collections::{HashMap, HashSet};

use dfs_core::path::Path;
use tokio::sync::Mutex;

use crate::registry::StorageServerId;

enum Node {
    Directory { children: HashSet<String> },
    File { hosts: HashSet<StorageServerId> },
}

struct Tree {
    nodes: HashMap<Path, Node>,
}

/// The naming server's global namespace. Root always exists as a
/// `Directory` (§3 invariant c).
pub struct NamingTree {
    inner: Mutex<Tree>,
}

impl NamingTree {
    pub fn new() -> NamingTree {
        let mut nodes = HashMap::new();
        nodes.insert(Path::root(), Node::Directory { children: HashSet::new() });
        NamingTree { inner: Mutex::new(Tree { nodes }) }
    }

    pub async fn contains(&self, path: &Path) -> bool {
        self.inner.lock().await.nodes.contains_key(path)
    }

    /// `Some(true)` for a directory, `Some(false)` for a file, `None` if
    /// absent.
    pub async fn is_directory(&self, path: &Path) -> Option<bool> {
        match self.inner.lock().await.nodes.get(path) {
            Some(Node::Directory { .. }) => Some(true),
            Some(Node::File { .. }) => Some(false),
            None => None,
        }
    }

    /// Child names of a directory, or `None` if `path` is absent or a
    /// file.
    pub async fn list(&self, path: &Path) -> Option<Vec<String>> {
        match self.inner.lock().await.nodes.get(path) {
            Some(Node::Directory { children }) => {
                let mut names: Vec<String> = children.iter().cloned().collect();
                names.sort();
                Some(names)
            }
            _ => None,
        }
    }

    /// Inserts a new file at `path` with the given single host,
    /// registering it as a child of `parent`. Caller has already
    /// validated that `parent` is a directory and `path`'s name is not
    /// already a child.
    pub async fn insert_file(&self, parent: &Path, path: Path, host: StorageServerId) {
        let mut tree = self.inner.lock().await;
        if let Some(Node::Directory { children }) = tree.nodes.get_mut(parent) {
            if let Some(name) = path.last() {
                children.insert(name.to_owned());
            }
        }
        let mut hosts = HashSet::new();
        hosts.insert(host);
        tree.nodes.insert(path, Node::File { hosts });
    }

    pub async fn insert_directory(&self, parent: &Path, path: Path) {
        let mut tree = self.inner.lock().await;
        if let Some(Node::Directory { children }) = tree.nodes.get_mut(parent) {
            if let Some(name) = path.last() {
                children.insert(name.to_owned());
            }
        }
        tree.nodes.insert(path, Node::Directory { children: HashSet::new() });
    }

    /// Removes the entire subtree rooted at `path` (the naming service
    /// has already resolved every file leaf and told the hosting
    /// storage servers to delete it). Detaches `path` from its parent's
    /// child set.
    pub async fn remove_subtree(&self, path: &Path) {
        let mut tree = self.inner.lock().await;
        if let Some(parent) = path.parent() {
            if let Some(Node::Directory { children }) = tree.nodes.get_mut(&parent) {
                if let Some(name) = path.last() {
                    children.remove(name);
                }
            }
        }
        let doomed: Vec<Path> = tree.nodes.keys().filter(|p| path.is_subpath(p)).cloned().collect();
        for p in doomed {
            tree.nodes.remove(&p);
        }
    }

    /// Every file path under (and including) `path`, in no particular
    /// order. Used by `delete` to find the leaves that need storage-side
    /// deletion.
    pub async fn file_leaves_under(&self, path: &Path) -> Vec<Path> {
        let tree = self.inner.lock().await;
        tree.nodes
            .iter()
            .filter(|(p, node)| path.is_subpath(p) && matches!(node, Node::File { .. }))
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub async fn hosts(&self, path: &Path) -> Option<HashSet<StorageServerId>> {
        match self.inner.lock().await.nodes.get(path) {
            Some(Node::File { hosts }) => Some(hosts.clone()),
            _ => None,
        }
    }

    pub async fn add_host(&self, path: &Path, host: StorageServerId) {
        if let Some(Node::File { hosts }) = self.inner.lock().await.nodes.get_mut(path) {
            hosts.insert(host);
        }
    }

    /// Replaces `path`'s host set, keeping only `retain` (used by
    /// invalidation, §4.5).
    pub async fn retain_only_host(&self, path: &Path, retain: StorageServerId) {
        if let Some(Node::File { hosts }) = self.inner.lock().await.nodes.get_mut(path) {
            hosts.clear();
            hosts.insert(retain);
        }
    }
}

impl Default for NamingTree {
    fn default() -> NamingTree {
        NamingTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_starts_as_empty_directory() {
        let tree = NamingTree::new();
        assert_eq!(tree.is_directory(&Path::root()).await, Some(true));
        assert_eq!(tree.list(&Path::root()).await, Some(vec![]));
    }

    #[tokio::test]
    async fn create_directory_then_file_then_list() {
        let tree = NamingTree::new();
        let a = Path::parse("/a").unwrap();
        let ab = Path::parse("/a/b").unwrap();

        tree.insert_directory(&Path::root(), a.clone()).await;
        assert_eq!(tree.is_directory(&a).await, Some(true));
        assert_eq!(tree.list(&Path::root()).await, Some(vec!["a".to_owned()]));

        // id value doesn't matter for tree-shape assertions; use a
        // registry-issued one in a full round trip via registry tests.
        let registry = crate::registry::StorageRegistry::new();
        let host = registry
            .insert(
                dfs_core::iface::storage::StorageClientStub::new("127.0.0.1:9001".parse().unwrap()).unwrap(),
                dfs_core::iface::storage::StorageCommandStub::new("127.0.0.1:9101".parse().unwrap()).unwrap(),
                HashSet::new(),
            )
            .await;

        tree.insert_file(&a, ab.clone(), host).await;
        assert_eq!(tree.is_directory(&ab).await, Some(false));
        assert_eq!(tree.list(&a).await, Some(vec!["b".to_owned()]));
        assert_eq!(tree.hosts(&ab).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_whole_subtree() {
        let tree = NamingTree::new();
        let a = Path::parse("/a").unwrap();
        let ab = Path::parse("/a/b").unwrap();

        let registry = crate::registry::StorageRegistry::new();
        let host = registry
            .insert(
                dfs_core::iface::storage::StorageClientStub::new("127.0.0.1:9002".parse().unwrap()).unwrap(),
                dfs_core::iface::storage::StorageCommandStub::new("127.0.0.1:9102".parse().unwrap()).unwrap(),
                HashSet::new(),
            )
            .await;

        tree.insert_directory(&Path::root(), a.clone()).await;
        tree.insert_file(&a, ab.clone(), host).await;

        tree.remove_subtree(&a).await;
        assert!(!tree.contains(&a).await);
        assert!(!tree.contains(&ab).await);
        assert_eq!(tree.list(&Path::root()).await, Some(vec![]));
    }
}
