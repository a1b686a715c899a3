//! Filesystem over a message channel.
//!
//! Files are channel messages; the path index is the attachment of the
//! channel's pinned message. Every mutation changes the in-memory index and
//! then flushes the whole index back by replacing that attachment.
//!
//! ## Consistency
//!
//! There is no transaction spanning a content write and the index flush. If
//! the content write succeeds and the flush fails, the caller gets
//! [`VfsError::IndexPersist`], the in-memory index keeps the change, and the
//! next successful flush (for any path) brings the remote index up to date.
//! Another process reading the pinned index in the meantime sees stale
//! metadata.
//!
//! Flushes are serialized and tagged with the index generation. The snapshot
//! is taken after the flush lock is acquired, so a later flush always carries
//! every mutation an earlier one did, and a flush whose generation is already
//! persisted is skipped. A slow flush can therefore never overwrite a newer
//! index.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::Mutex as AsyncMutex;

use crate::channel::{Channel, ObjectReader};
use crate::ids::{FileId, MessageId};
use crate::index::{INDEX_FILE_NAME, IndexRecord, IndexStore};
use crate::resolve::{self, ROOT};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, HashType, Object};

/// Suffix appended to a file's path to name its attachment.
const ATTACHMENT_SUFFIX: &str = ".file";

/// Filesystem session over one channel.
pub struct ChannelFs {
    name: String,
    root: String,
    channel: Arc<dyn Channel>,
    index: IndexStore,
    /// Pinned message carrying the index.
    index_message: MessageId,
    /// Generation of the last successfully persisted index.
    flushed: AsyncMutex<u64>,
}

impl std::fmt::Debug for ChannelFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFs")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("index_message", &self.index_message)
            .field("files", &self.index.len())
            .finish()
    }
}

impl ChannelFs {
    /// Open a filesystem session on `channel`.
    ///
    /// Loads the index from the pinned message. A channel with nothing pinned
    /// is initialized by uploading and pinning an empty index. That is a
    /// check-then-act sequence: two sessions initializing the same fresh
    /// channel at once may both upload, and whichever pin lands last wins.
    #[tracing::instrument(skip(name, channel), name = "fs.connect")]
    pub async fn connect(
        name: impl Into<String>,
        root: &str,
        channel: Arc<dyn Channel>,
    ) -> VfsResult<Self> {
        let pinned = channel
            .pinned()
            .await
            .map_err(|e| VfsError::init("reading the pinned message", e))?;

        let (index_message, index) = match pinned {
            Some(pinned) => {
                let bytes = channel
                    .download(&pinned.file_id)
                    .await
                    .map_err(|e| VfsError::init("downloading the index", e))?;
                let index = IndexStore::deserialize(&bytes)
                    .map_err(|e| VfsError::init("decoding the index", e))?;
                tracing::info!(
                    message = %pinned.message_id,
                    files = index.len(),
                    version = index.generation(),
                    "loaded index"
                );
                (pinned.message_id, index)
            }
            None => {
                let index = IndexStore::new();
                let bytes = index
                    .serialize()
                    .map_err(|e| VfsError::init("encoding the empty index", e))?;
                let uploaded = channel
                    .upload(INDEX_FILE_NAME, &mut bytes.as_slice(), bytes.len() as u64)
                    .await
                    .map_err(|e| VfsError::init("uploading the empty index", e))?;
                channel
                    .pin(uploaded.message_id)
                    .await
                    .map_err(|e| VfsError::init("pinning the index", e))?;
                tracing::info!(message = %uploaded.message_id, "initialized empty index");
                (uploaded.message_id, index)
            }
        };

        let flushed = index.generation();
        Ok(Self {
            name: name.into(),
            root: resolve::clean(root),
            channel,
            index,
            index_message,
            flushed: AsyncMutex::new(flushed),
        })
    }

    /// Message carrying the persisted index.
    pub fn index_message(&self) -> MessageId {
        self.index_message
    }

    /// Number of files in the index (across the whole channel, not just
    /// beneath the root).
    pub fn file_count(&self) -> usize {
        self.index.len()
    }

    /// Index key for a root-relative file path.
    fn key(&self, path: &str) -> VfsResult<String> {
        let rel = resolve::clean(path);
        if rel == ROOT {
            return Err(VfsError::invalid_path(path));
        }
        Ok(resolve::join(&self.root, &rel))
    }

    /// Root-relative path for an index key.
    fn remote(&self, key: &str) -> String {
        resolve::strip_dir(key, &self.root)
            .unwrap_or(key)
            .to_string()
    }

    fn lookup(&self, path: &str) -> VfsResult<(String, IndexRecord)> {
        let key = self.key(path)?;
        match self.index.get(&key) {
            Some(record) => Ok((key, record)),
            None => Err(VfsError::not_found(path)),
        }
    }

    fn object(&self, key: String, record: &IndexRecord) -> Object {
        let remote = self.remote(&key);
        Object::from_record(key, remote, record)
    }

    /// Write the whole index back to the pinned message.
    #[tracing::instrument(skip(self), name = "index.flush")]
    async fn flush(&self) -> VfsResult<()> {
        let mut flushed = self.flushed.lock().await;
        let (bytes, generation) = self.index.snapshot()?;
        if generation <= *flushed {
            tracing::debug!(generation, "index already persisted");
            return Ok(());
        }

        self.channel
            .replace(
                self.index_message,
                INDEX_FILE_NAME,
                &mut bytes.as_slice(),
                bytes.len() as u64,
            )
            .await
            .map_err(|e| {
                tracing::warn!(generation, error = %e, "index flush failed");
                VfsError::IndexPersist(e)
            })?;

        tracing::debug!(generation, previous = *flushed, "index persisted");
        *flushed = generation;
        Ok(())
    }

    /// Retry persisting the index after an earlier flush failure.
    pub async fn sync(&self) -> VfsResult<()> {
        self.flush().await
    }
}

#[async_trait]
impl VfsOps for ChannelFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn precision(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn hashes(&self) -> HashType {
        HashType::None
    }

    #[tracing::instrument(skip(self), name = "fs.list")]
    async fn list(&self, dir: &str) -> VfsResult<Vec<DirEntry>> {
        let rel = resolve::clean(dir);
        let query = resolve::join(&self.root, &rel);

        let (listing, files) = self.index.with_entries(|entries| {
            let listing =
                resolve::files_in_directory(entries.keys().map(String::as_str), &query);
            let files: Vec<(String, IndexRecord)> = listing
                .files
                .iter()
                .filter_map(|key| entries.get(key).map(|r| (key.clone(), r.clone())))
                .collect();
            (listing, files)
        });

        let now = SystemTime::now();
        let mut result: Vec<DirEntry> = listing
            .directories
            .iter()
            .map(|name| DirEntry::directory(resolve::join(&rel, name), now))
            .collect();
        result.extend(
            files
                .iter()
                .map(|(key, record)| DirEntry::file(self.remote(key), record.size, record.modified())),
        );

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(entries = result.len(), "listed");
        Ok(result)
    }

    async fn stat(&self, path: &str) -> VfsResult<Object> {
        let (key, record) = self.lookup(path)?;
        Ok(self.object(key, &record))
    }

    #[tracing::instrument(skip(self), name = "fs.open")]
    async fn open(&self, path: &str) -> VfsResult<ObjectReader> {
        let (_, record) = self.lookup(path)?;
        let url = self
            .channel
            .download_url(&record.file_id)
            .await
            .map_err(|e| VfsError::remote("download", path, e))?;
        self.channel
            .fetch(&url)
            .await
            .map_err(|e| VfsError::remote("download", path, e))
    }

    #[tracing::instrument(skip(self, content), name = "fs.put")]
    async fn put(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        mod_time: SystemTime,
    ) -> VfsResult<Object> {
        let key = self.key(path)?;
        let remote = self.remote(&key);

        let uploaded = self
            .channel
            .upload(&format!("{remote}{ATTACHMENT_SUFFIX}"), content, size)
            .await
            .map_err(|e| VfsError::remote("upload", path, e))?;

        let record = IndexRecord::new(uploaded.file_id, uploaded.message_id, size, mod_time);
        let replaced = self.index.update(key.clone(), record.clone());
        tracing::info!(key = %key, message = %record.message_id, size, "stored file");
        self.flush().await?;

        // Overwriting put: the previous message is no longer referenced.
        if let Some(old) = replaced.filter(|old| old.message_id != record.message_id) {
            if let Err(e) = self.channel.delete(old.message_id).await {
                tracing::warn!(
                    key = %key,
                    message = %old.message_id,
                    error = %e,
                    "failed to delete replaced message"
                );
            }
        }

        Ok(self.object(key, &record))
    }

    #[tracing::instrument(skip(self, content), name = "fs.update")]
    async fn update(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> VfsResult<Object> {
        let (key, record) = self.lookup(path)?;

        let remote = self.remote(&key);
        let file_id: FileId = self
            .channel
            .replace(
                record.message_id,
                &format!("{remote}{ATTACHMENT_SUFFIX}"),
                content,
                size,
            )
            .await
            .map_err(|e| VfsError::remote("edit", path, e))?;

        let updated = self
            .index
            .modify(&key, |r| {
                r.size = size;
                r.file_id = file_id;
            })
            .ok_or_else(|| VfsError::not_found(path))?;
        tracing::info!(key = %key, message = %updated.message_id, size, "updated file");
        self.flush().await?;

        Ok(self.object(key, &updated))
    }

    #[tracing::instrument(skip(self), name = "fs.set_mod_time")]
    async fn set_mod_time(&self, path: &str, mod_time: SystemTime) -> VfsResult<Object> {
        let key = self.key(path)?;
        let updated = self
            .index
            .modify(&key, |r| r.set_modified(mod_time))
            .ok_or_else(|| VfsError::not_found(path))?;
        self.flush().await?;

        Ok(self.object(key, &updated))
    }

    #[tracing::instrument(skip(self), name = "fs.remove")]
    async fn remove(&self, path: &str) -> VfsResult<()> {
        let (key, record) = self.lookup(path)?;

        // The index only forgets the object once the remote delete succeeded.
        self.channel
            .delete(record.message_id)
            .await
            .map_err(|e| VfsError::remote("delete", path, e))?;

        self.index.remove(&key);
        tracing::info!(key = %key, message = %record.message_id, "removed file");
        self.flush().await
    }

    async fn mkdir(&self, dir: &str) -> VfsResult<()> {
        tracing::debug!(dir, "mkdir is a no-op: directories are inferred");
        Ok(())
    }

    async fn rmdir(&self, dir: &str) -> VfsResult<()> {
        tracing::debug!(dir, "rmdir is a no-op: directories are inferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelOp, MemoryChannel};

    async fn fs_on(channel: &Arc<MemoryChannel>, root: &str) -> ChannelFs {
        ChannelFs::connect("test", root, channel.clone()).await.unwrap()
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn test_connect_initializes_fresh_channel() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "").await;

        assert_eq!(channel.pinned_message(), Some(fs.index_message()));
        let index = IndexStore::deserialize(&channel.pinned_content().unwrap()).unwrap();
        assert!(index.is_empty());
        assert_eq!(fs.root(), ".");
    }

    #[tokio::test]
    async fn test_connect_loads_existing_index() {
        let channel = Arc::new(MemoryChannel::new());
        {
            let fs = fs_on(&channel, "").await;
            fs.write_all("a/b.txt", b"abc", at(100)).await.unwrap();
        }

        let fs = fs_on(&channel, "").await;
        let obj = fs.stat("a/b.txt").await.unwrap();
        assert_eq!(obj.size(), 3);
        assert_eq!(obj.mod_time(), at(100));
        assert_eq!(channel.calls(ChannelOp::Upload), 2);
    }

    #[tokio::test]
    async fn test_connect_fails_on_corrupt_index() {
        let channel = Arc::new(MemoryChannel::new());
        let obj = channel.upload(INDEX_FILE_NAME, &mut &b"garbage"[..], 7).await.unwrap();
        channel.pin(obj.message_id).await.unwrap();

        let err = ChannelFs::connect("test", "", channel.clone()).await.unwrap_err();
        assert!(matches!(err, VfsError::Initialization { .. }));
    }

    #[tokio::test]
    async fn test_connect_fails_when_unreachable() {
        let channel = Arc::new(MemoryChannel::new());
        channel.fail_next(ChannelOp::Pinned);

        let err = ChannelFs::connect("test", "", channel.clone()).await.unwrap_err();
        assert!(matches!(err, VfsError::Initialization { .. }));
    }

    #[tokio::test]
    async fn test_root_prefixes_keys() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "/backup/").await;
        assert_eq!(fs.root(), "backup");

        let obj = fs.write_all("x/y.txt", b"1", at(1)).await.unwrap();
        assert_eq!(obj.key(), "backup/x/y.txt");
        assert_eq!(obj.remote(), "x/y.txt");

        let whole = fs_on(&channel, ".").await;
        assert!(whole.exists("backup/x/y.txt").await);

        let entries = fs.list("").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "x");
        assert!(entries[0].kind.is_dir());
    }

    #[tokio::test]
    async fn test_path_cannot_escape_root() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "jail").await;
        let obj = fs.write_all("../../outside", b"1", at(1)).await.unwrap();
        assert_eq!(obj.key(), "jail/outside");
    }

    #[tokio::test]
    async fn test_root_path_is_not_a_file() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "").await;
        assert!(matches!(fs.stat("/").await, Err(VfsError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_flush_skips_persisted_generation() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "").await;
        fs.write_all("a", b"1", at(1)).await.unwrap();
        let replaces = channel.calls(ChannelOp::Replace);

        fs.sync().await.unwrap();
        assert_eq!(channel.calls(ChannelOp::Replace), replaces);
    }

    #[tokio::test]
    async fn test_sync_recovers_failed_flush() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "").await;

        channel.fail_next(ChannelOp::Replace);
        let err = fs.write_all("a", b"1", at(1)).await.unwrap_err();
        assert!(matches!(err, VfsError::IndexPersist(_)));

        // Remote index is stale, in-memory index is authoritative
        let remote = IndexStore::deserialize(&channel.pinned_content().unwrap()).unwrap();
        assert!(remote.get("a").is_none());
        assert!(fs.exists("a").await);

        fs.sync().await.unwrap();
        let remote = IndexStore::deserialize(&channel.pinned_content().unwrap()).unwrap();
        assert!(remote.get("a").is_some());
    }

    #[tokio::test]
    async fn test_overwriting_put_deletes_old_message() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "").await;

        let mut first: &[u8] = b"one";
        fs.put("a", &mut first, 3, at(1)).await.unwrap();
        let mut second: &[u8] = b"two!";
        fs.put("a", &mut second, 4, at(2)).await.unwrap();

        // Index message plus the one live file
        assert_eq!(channel.message_count(), 2);
        assert_eq!(fs.read_all("a").await.unwrap(), b"two!");
    }

    #[tokio::test]
    async fn test_identity() {
        let channel = Arc::new(MemoryChannel::new());
        let fs = fs_on(&channel, "r").await;
        assert_eq!(fs.name(), "test");
        assert_eq!(fs.precision(), Duration::from_secs(1));
        assert_eq!(fs.hashes(), HashType::None);
        assert_eq!(fs.hashes().to_string(), "none");
    }
}
