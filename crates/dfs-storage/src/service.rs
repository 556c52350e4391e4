//! Storage server logic (C7, §4.6): local file I/O rooted at a
//! configured directory, exposed on two ports — client I/O
//! (`StorageClientInterface`) and naming-only commands
//! (`StorageCommandInterface`).

use std::path::PathBuf;

use async_trait::async_trait;
use dfs_core::iface::storage::{
    StorageClientStub, StorageCommandStub, STORAGE_CLIENT_DESCRIPTOR, STORAGE_COMMAND_DESCRIPTOR,
};
use dfs_core::path::Path;
use dfs_core::rmi::descriptor::InterfaceDescriptor;
use dfs_core::rmi::skeleton::Dispatch;
use dfs_core::serialize::Reply;
use dfs_core::RemoteError;
use log::warn;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Chunk size `copy` reads `source` in, matching `dfs-client`'s own
/// `DfsInputStream` chunking.
const COPY_CHUNK_SIZE: i64 = 64 * 1024;

/// All server-side state of a storage server: just the local root.
pub struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub fn new(root: PathBuf) -> StorageService {
        StorageService { root }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub async fn size(&self, path: &Path) -> Result<u64, RemoteError> {
        let metadata = tokio::fs::metadata(path.to_file(&self.root)).await.map_err(RemoteError::from)?;
        Ok(metadata.len())
    }

    pub async fn read(&self, path: &Path, offset: i64, length: i64) -> Result<Vec<u8>, RemoteError> {
        let size = self.size(path).await?;
        if offset as u64 > size {
            return Err(RemoteError::IllegalArgument("offset is past end of file".into()));
        }
        let mut file = tokio::fs::File::open(path.to_file(&self.root)).await.map_err(RemoteError::from)?;
        file.seek(std::io::SeekFrom::Start(offset as u64)).await.map_err(RemoteError::from)?;
        let mut buf = vec![0u8; length as usize];
        let read = file.read(&mut buf).await.map_err(RemoteError::from)?;
        buf.truncate(read);
        Ok(buf)
    }

    pub async fn write(&self, path: &Path, offset: i64, data: &[u8]) -> Result<(), RemoteError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(path.to_file(&self.root))
            .await
            .map_err(RemoteError::from)?;
        file.seek(std::io::SeekFrom::Start(offset as u64)).await.map_err(RemoteError::from)?;
        file.write_all(data).await.map_err(RemoteError::from)?;
        Ok(())
    }

    pub async fn create(&self, path: &Path) -> Result<bool, RemoteError> {
        let file = path.to_file(&self.root);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(RemoteError::from)?;
        }
        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&file).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(RemoteError::from(e)),
        }
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, RemoteError> {
        match tokio::fs::remove_file(path.to_file(&self.root)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RemoteError::from(e)),
        }
    }

    /// Fetches the full contents of `path` from `source` and replaces
    /// the local copy atomically (write to a sibling temp file, then
    /// rename over the target). `source.read` is permitted to return
    /// fewer bytes than requested (§4.6), so the fetch loops until
    /// `size` bytes are collected or a read comes back empty.
    pub async fn copy(&self, path: &Path, source: &StorageClientStub) -> Result<bool, RemoteError> {
        let size = source.size(path).await?;
        let mut data = Vec::with_capacity(size as usize);
        while (data.len() as u64) < size {
            let chunk = source.read(path, data.len() as i64, COPY_CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }

        let file = path.to_file(&self.root);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(RemoteError::from)?;
        }
        let tmp = file.with_extension("dfs-replica-tmp");
        tokio::fs::write(&tmp, &data).await.map_err(RemoteError::from)?;
        tokio::fs::rename(&tmp, &file).await.map_err(RemoteError::from)?;
        Ok(true)
    }
}

async fn reply_of<T: Serialize>(result: Result<T, RemoteError>) -> Reply {
    match result {
        Ok(v) => Reply::ok(&v).unwrap_or_else(|e| Reply::err(&e)),
        Err(e) => Reply::err(&e),
    }
}

/// Exposes `size`/`read`/`write` to DFS clients.
pub struct StorageClientDispatch(pub std::sync::Arc<StorageService>);

#[async_trait]
impl Dispatch for StorageClientDispatch {
    fn descriptor(&self) -> InterfaceDescriptor {
        STORAGE_CLIENT_DESCRIPTOR
    }

    async fn dispatch(&self, method: &str, args: &[u8]) -> Reply {
        match method {
            "size" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.size(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "read" => match bincode::deserialize::<(Path, i64, i64)>(args) {
                Ok((p, offset, length)) => reply_of(self.0.read(&p, offset, length).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "write" => match bincode::deserialize::<(Path, i64, Vec<u8>)>(args) {
                Ok((p, offset, data)) => reply_of(self.0.write(&p, offset, &data).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            _ => unreachable!("validated by the skeleton before dispatch"),
        }
    }
}

/// Exposes `create`/`delete`/`copy` to the naming server only.
pub struct StorageCommandDispatch(pub std::sync::Arc<StorageService>);

#[async_trait]
impl Dispatch for StorageCommandDispatch {
    fn descriptor(&self) -> InterfaceDescriptor {
        STORAGE_COMMAND_DESCRIPTOR
    }

    async fn dispatch(&self, method: &str, args: &[u8]) -> Reply {
        match method {
            "create" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.create(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "delete" => match bincode::deserialize::<(Path,)>(args) {
                Ok((p,)) => reply_of(self.0.delete(&p).await).await,
                Err(e) => Reply::err(&RemoteError::from(e)),
            },
            "copy" => match bincode::deserialize::<(Path, StorageClientStub)>(args) {
                Ok((p, source)) => reply_of(self.0.copy(&p, &source).await).await,
                Err(e) => {
                    warn!("copy request failed to decode: {e}");
                    Reply::err(&RemoteError::from(e))
                }
            },
            _ => unreachable!("validated by the skeleton before dispatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dfs-storage-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn create_write_read_round_trip() {
        let service = StorageService::new(tempdir());
        let p = Path::parse("/a/b.txt").unwrap();

        assert_eq!(service.create(&p).await, Ok(true));
        assert_eq!(service.create(&p).await, Ok(false));

        service.write(&p, 0, b"hello").await.unwrap();
        let data = service.read(&p, 0, 5).await.unwrap();
        assert_eq!(data, b"hello");

        let size = service.size(&p).await.unwrap();
        assert_eq!(size, 5);
    }

    #[tokio::test]
    async fn write_can_extend_past_current_length() {
        let service = StorageService::new(tempdir());
        let p = Path::parse("/a.txt").unwrap();
        service.create(&p).await.unwrap();
        service.write(&p, 0, b"abc").await.unwrap();
        service.write(&p, 3, b"def").await.unwrap();
        let data = service.read(&p, 0, 6).await.unwrap();
        assert_eq!(data, b"abcdef");
    }

    #[tokio::test]
    async fn read_past_eof_is_an_error() {
        let service = StorageService::new(tempdir());
        let p = Path::parse("/a.txt").unwrap();
        service.create(&p).await.unwrap();
        service.write(&p, 0, b"ab").await.unwrap();
        assert!(service.read(&p, 5, 1).await.is_err());
    }

    #[tokio::test]
    async fn read_exactly_at_eof_returns_empty_not_an_error() {
        let service = StorageService::new(tempdir());
        let p = Path::parse("/a.txt").unwrap();
        service.create(&p).await.unwrap();
        service.write(&p, 0, b"ab").await.unwrap();
        let data = service.read(&p, 2, 10).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn copy_assembles_full_file_across_multiple_short_reads() {
        use dfs_core::rmi::skeleton::Skeleton;

        let source_service = Arc::new(StorageService::new(tempdir()));
        let p = Path::parse("/big.bin").unwrap();
        source_service.create(&p).await.unwrap();
        // Larger than one COPY_CHUNK_SIZE so `copy` must loop.
        let payload: Vec<u8> = (0..(COPY_CHUNK_SIZE as usize * 2 + 17)).map(|i| (i % 251) as u8).collect();
        source_service.write(&p, 0, &payload).await.unwrap();

        let skeleton = Skeleton::with_default_hooks(
            StorageClientDispatch(Arc::clone(&source_service)),
            "127.0.0.1:0".parse().unwrap(),
        )
        .unwrap();
        skeleton.start().await.unwrap();
        let source_stub = StorageClientStub::new(skeleton.local_addr().await.unwrap()).unwrap();

        let target_service = StorageService::new(tempdir());
        let copied = target_service.copy(&p, &source_stub).await.unwrap();
        assert!(copied);

        let replica = target_service.read(&p, 0, payload.len() as i64 + 1).await.unwrap();
        assert_eq!(replica, payload);

        skeleton.stop().await;
    }

    #[tokio::test]
    async fn delete_reports_whether_a_file_existed() {
        let service = StorageService::new(tempdir());
        let p = Path::parse("/a.txt").unwrap();
        assert_eq!(service.delete(&p).await, Ok(false));
        service.create(&p).await.unwrap();
        assert_eq!(service.delete(&p).await, Ok(true));
    }
}
