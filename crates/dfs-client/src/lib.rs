//! Thin client-side conveniences layered over the raw storage RMI
//! calls. The spec treats these as external collaborators with only
//! their interface specified (no internal buffering/retry strategy
//! mandated); this is the documented stand-in.

use dfs_core::iface::storage::StorageClientStub;
use dfs_core::path::Path;
use dfs_core::RemoteError;

/// Default chunk size for `read_to_end`, chosen to keep a single RMI
/// call's payload well under typical TCP send-buffer sizes.
const CHUNK_SIZE: i64 = 64 * 1024;

/// Sequential reader over a remote file, tracking its own read cursor.
pub struct DfsInputStream {
    stub: StorageClientStub,
    path: Path,
    position: i64,
}

impl DfsInputStream {
    pub fn new(stub: StorageClientStub, path: Path) -> DfsInputStream {
        DfsInputStream { stub, path, position: 0 }
    }

    /// Reads up to `max_len` bytes starting at the current position,
    /// advancing the cursor by however many bytes actually came back.
    pub async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, RemoteError> {
        let data = self.stub.read(&self.path, self.position, max_len as i64).await?;
        self.position += data.len() as i64;
        Ok(data)
    }

    /// Reads the remainder of the file in `CHUNK_SIZE` pieces.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, RemoteError> {
        let mut buf = Vec::new();
        loop {
            let chunk = self.read(CHUNK_SIZE as usize).await?;
            if chunk.is_empty() {
                break;
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

/// Sequential, append-oriented writer over a remote file.
pub struct DfsOutputStream {
    stub: StorageClientStub,
    path: Path,
    position: i64,
}

impl DfsOutputStream {
    pub fn new(stub: StorageClientStub, path: Path) -> DfsOutputStream {
        DfsOutputStream { stub, path, position: 0 }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        self.stub.write(&self.path, self.position, data).await?;
        self.position += data.len() as i64;
        Ok(())
    }
}
