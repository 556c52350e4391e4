//! Immutable hierarchical filesystem path.
//!
//! # Ordering
//!
//! `Path`'s `Ord` impl is plain lexicographic comparison of the
//! `/`-joined string form, *not* a component-wise order. This means
//! `/a` < `/a.txt` < `/a/b` < `/b`: a file whose name textually extends
//! a directory's name can sort between that directory and its children.
//! This reproduces the source project's behavior exactly (see
//! `SPEC_FULL.md` §3's resolved Open Question) because every caller
//! that takes multiple path locks at once relies on "ancestors sort
//! before descendants" to avoid deadlock, and the string order gives
//! that property even though it is not a clean component-wise order.

use std::fmt;
use std::path::Path as StdPath;

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};

/// An immutable, hierarchical path in the DFS namespace.
///
/// Equality and ordering are structural: two paths are equal iff they
/// have the same component sequence, and compare via the `/`-joined
/// string form (see module docs).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The root path `/`.
    pub fn root() -> Path {
        Path { components: Vec::new() }
    }

    /// Parses a path from its string form (`/c1/c2/...` or `/`).
    ///
    /// Returns `RemoteError::InvalidPath` if the string does not start
    /// with `/`, or if any component is empty or contains `/` or `:`.
    pub fn parse(s: &str) -> Result<Path, RemoteError> {
        if !s.starts_with('/') {
            return Err(RemoteError::InvalidPath(s.to_owned()));
        }
        let mut components = Vec::new();
        for part in s.split('/') {
            if part.is_empty() {
                continue;
            }
            validate_component(part)?;
            components.push(part.to_owned());
        }
        Ok(Path { components })
    }

    /// Builds `parent/component`.
    pub fn join(parent: &Path, component: &str) -> Result<Path, RemoteError> {
        validate_component(component)?;
        let mut components = parent.components.clone();
        components.push(component.to_owned());
        Ok(Path { components })
    }

    /// `true` iff this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The parent path, or `None` if this is root.
    pub fn parent(&self) -> Option<Path> {
        if self.components.is_empty() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Path { components })
    }

    /// The final component's name, or `None` for root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Ordered path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// `true` iff `other` is this path or a descendant of it.
    pub fn is_subpath(&self, other: &Path) -> bool {
        other.components.len() >= self.components.len()
            && self.components == other.components[..self.components.len()]
    }

    /// Root-to-leaf ancestor chain, not including `self`: `[/, /a, /a/b]`
    /// for a path `/a/b/c`.
    pub fn ancestors(&self) -> Vec<Path> {
        let mut out = Vec::with_capacity(self.components.len());
        let mut acc = Vec::new();
        out.push(Path { components: acc.clone() });
        for c in &self.components[..self.components.len().saturating_sub(1)] {
            acc.push(c.clone());
            out.push(Path { components: acc.clone() });
        }
        out
    }

    /// Recursively walks a local directory, returning paths (relative to
    /// `dir`, rooted at `/`) of every regular file found. Directories
    /// themselves are not emitted.
    pub fn list(dir: &StdPath) -> std::io::Result<Vec<Path>> {
        let mut out = Vec::new();
        walk(dir, &Path::root(), &mut out)?;
        Ok(out)
    }

    /// Concatenates this (relative) path onto a local filesystem root.
    pub fn to_file(&self, root: &StdPath) -> std::path::PathBuf {
        let mut buf = root.to_path_buf();
        for c in &self.components {
            buf.push(c);
        }
        buf
    }

    /// The canonical string form: `/c1/c2/...`, or `/` for root.
    pub fn as_string(&self) -> String {
        if self.components.is_empty() {
            "/".to_owned()
        } else {
            let mut s = String::new();
            for c in &self.components {
                s.push('/');
                s.push_str(c);
            }
            s
        }
    }
}

fn walk(dir: &StdPath, rel: &Path, out: &mut Vec<Path>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        let child_rel = Path::join(rel, &name)
            .expect("directory entry names never contain '/' or ':' on a sane filesystem");
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &child_rel, out)?;
        } else if file_type.is_file() {
            out.push(child_rel);
        }
    }
    Ok(())
}

fn validate_component(component: &str) -> Result<(), RemoteError> {
    if component.is_empty() || component.contains('/') || component.contains(':') {
        return Err(RemoteError::InvalidPath(component.to_owned()));
    }
    Ok(())
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}
impl Eq for Path {}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_string().cmp(&other.as_string())
    }
}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_string().hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl std::str::FromStr for Path {
    type Err = RemoteError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}
