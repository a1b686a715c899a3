//! VFS operations trait.
//!
//! This is the contract exposed to a hosting storage layer: whole-object
//! reads and writes addressed by path, with directories as a derived view.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::types::{DirEntry, HashType, Object};
use super::VfsResult;
use crate::channel::ObjectReader;

/// Core VFS operations trait.
///
/// All paths are relative to the filesystem root. Every mutating operation
/// persists the index before returning; a persist failure is reported even
/// though the content change may already be remote.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Name of this filesystem instance.
    fn name(&self) -> &str;

    /// Root path inside the channel ("." for the whole channel).
    fn root(&self) -> &str;

    /// Modification time precision.
    fn precision(&self) -> Duration;

    /// Supported content hashes.
    fn hashes(&self) -> HashType;

    // ========================================================================
    // Reading
    // ========================================================================

    /// List the immediate children of a directory.
    async fn list(&self, dir: &str) -> VfsResult<Vec<DirEntry>>;

    /// Look up a file.
    async fn stat(&self, path: &str) -> VfsResult<Object>;

    /// Open a file's content as a stream.
    async fn open(&self, path: &str) -> VfsResult<ObjectReader>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Store a new file.
    async fn put(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        mod_time: SystemTime,
    ) -> VfsResult<Object>;

    /// Replace the content of an existing file.
    async fn update(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> VfsResult<Object>;

    /// Set a file's modification time.
    async fn set_mod_time(&self, path: &str, mod_time: SystemTime) -> VfsResult<Object>;

    /// Remove a file.
    async fn remove(&self, path: &str) -> VfsResult<()>;

    /// Create a directory.
    async fn mkdir(&self, dir: &str) -> VfsResult<()>;

    /// Remove a directory.
    async fn rmdir(&self, dir: &str) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a file exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut reader = self.open(path).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Write entire file contents, updating in place if the file exists.
    async fn write_all(&self, path: &str, data: &[u8], mod_time: SystemTime) -> VfsResult<Object> {
        let mut content = data;
        let size = data.len() as u64;
        if self.exists(path).await {
            self.update(path, &mut content, size).await?;
            self.set_mod_time(path, mod_time).await
        } else {
            self.put(path, &mut content, size, mod_time).await
        }
    }
}
