//! The path index: full virtual path → remote location.
//!
//! The index is the filesystem's only metadata source. It lives in memory for
//! the session and is persisted whole, as one JSON document attached to the
//! channel's pinned message:
//!
//! ```json
//! { "files": { "docs/a.txt": { "file_id": "BQAC…", "message_id": 17,
//!                              "size": 12, "mod_time": 1700000000 } },
//!   "version": 3 }
//! ```
//!
//! `version` is the mutation generation. It is optional on read so documents
//! written without it still load.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{FileId, MessageId};

/// Attachment name of the persisted index.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Remote location and metadata of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Handle of the attachment content.
    pub file_id: FileId,
    /// Handle of the message wrapping the attachment.
    pub message_id: MessageId,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, unix seconds.
    pub mod_time: i64,
}

impl IndexRecord {
    pub fn new(file_id: FileId, message_id: MessageId, size: u64, modified: SystemTime) -> Self {
        Self {
            file_id,
            message_id,
            size,
            mod_time: to_unix_secs(modified),
        }
    }

    /// Modification time as a `SystemTime` (second precision).
    pub fn modified(&self) -> SystemTime {
        from_unix_secs(self.mod_time)
    }

    pub fn set_modified(&mut self, modified: SystemTime) {
        self.mod_time = to_unix_secs(modified);
    }
}

/// Truncate a timestamp to whole unix seconds.
pub fn to_unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

pub fn from_unix_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Persisted form of the index.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default, deserialize_with = "null_as_empty")]
    files: BTreeMap<String, IndexRecord>,
    #[serde(default)]
    version: u64,
}

fn null_as_empty<'de, D>(de: D) -> Result<BTreeMap<String, IndexRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<BTreeMap<String, IndexRecord>>::deserialize(de).map(Option::unwrap_or_default)
}

/// Thread-safe path index.
///
/// Every read and mutation goes through one mutex around the whole mapping.
/// Each effective mutation bumps the generation, which callers use to tell
/// whether a snapshot is newer than the last one they persisted.
#[derive(Debug, Default)]
pub struct IndexStore {
    inner: Mutex<IndexDocument>,
}

impl IndexStore {
    /// Create an empty index at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a persisted index document.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let doc: IndexDocument = serde_json::from_slice(bytes)?;
        Ok(Self {
            inner: Mutex::new(doc),
        })
    }

    /// Encode the whole index.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.snapshot().map(|(bytes, _)| bytes)
    }

    /// Encode the whole index together with the generation it reflects.
    ///
    /// Both are taken under the same lock, so the bytes contain exactly the
    /// mutations up to and including `generation`.
    pub fn snapshot(&self) -> Result<(Vec<u8>, u64), serde_json::Error> {
        let doc = self.inner.lock();
        let bytes = serde_json::to_vec(&*doc)?;
        Ok((bytes, doc.version))
    }

    /// Look up a record. A miss is not an error.
    pub fn get(&self, key: &str) -> Option<IndexRecord> {
        self.inner.lock().files.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().files.contains_key(key)
    }

    /// Insert or overwrite a record, returning the one it displaced.
    pub fn update(&self, key: impl Into<String>, record: IndexRecord) -> Option<IndexRecord> {
        let mut doc = self.inner.lock();
        let previous = doc.files.insert(key.into(), record);
        doc.version += 1;
        previous
    }

    /// Read-modify-write one record in a single critical section.
    ///
    /// Returns the updated record, or `None` (and changes nothing) if the key
    /// is absent.
    pub fn modify<F>(&self, key: &str, f: F) -> Option<IndexRecord>
    where
        F: FnOnce(&mut IndexRecord),
    {
        let mut doc = self.inner.lock();
        let record = doc.files.get_mut(key)?;
        f(record);
        let updated = record.clone();
        doc.version += 1;
        Some(updated)
    }

    /// Delete a record if present.
    pub fn remove(&self, key: &str) -> Option<IndexRecord> {
        let mut doc = self.inner.lock();
        let removed = doc.files.remove(key);
        if removed.is_some() {
            doc.version += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().files.is_empty()
    }

    /// Generation of the latest mutation.
    pub fn generation(&self) -> u64 {
        self.inner.lock().version
    }

    /// Run `f` over a read-only view of the mapping while holding the lock.
    pub fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<String, IndexRecord>) -> R) -> R {
        f(&self.inner.lock().files)
    }

    /// Clone of the current mapping.
    pub fn entries(&self) -> BTreeMap<String, IndexRecord> {
        self.with_entries(Clone::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str, message: i64, size: u64, mod_time: i64) -> IndexRecord {
        IndexRecord {
            file_id: FileId::new(file),
            message_id: MessageId::new(message),
            size,
            mod_time,
        }
    }

    #[test]
    fn test_get_update_remove() {
        let index = IndexStore::new();
        assert!(index.get("a.txt").is_none());

        index.update("a.txt", record("f1", 1, 10, 100));
        assert_eq!(index.get("a.txt"), Some(record("f1", 1, 10, 100)));

        let previous = index.update("a.txt", record("f2", 1, 20, 200));
        assert_eq!(previous, Some(record("f1", 1, 10, 100)));
        assert_eq!(index.get("a.txt").unwrap().size, 20);
        assert_eq!(index.len(), 1);

        assert!(index.remove("a.txt").is_some());
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let index = IndexStore::new();
        index.update("keep", record("f1", 1, 1, 1));
        let generation = index.generation();

        assert!(index.remove("missing").is_none());
        assert_eq!(index.len(), 1);
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn test_modify() {
        let index = IndexStore::new();
        assert!(index.modify("nope", |r| r.size = 5).is_none());
        assert_eq!(index.generation(), 0);

        index.update("a", record("f1", 1, 1, 1));
        let updated = index.modify("a", |r| r.mod_time = 999).unwrap();
        assert_eq!(updated.mod_time, 999);
        assert_eq!(updated.size, 1);
        assert_eq!(index.generation(), 2);
    }

    #[test]
    fn test_serialize_round_trip() {
        let index = IndexStore::new();
        index.update("a/b.txt", record("f1", 10, 3, 1_700_000_000));
        index.update("a/c/d.txt", record("f2", 11, 0, 0));
        index.update("e.txt", record("f3", 12, u64::from(u32::MAX) + 1, -5));

        let bytes = index.serialize().unwrap();
        let decoded = IndexStore::deserialize(&bytes).unwrap();
        assert_eq!(decoded.entries(), index.entries());
        assert_eq!(decoded.generation(), index.generation());
    }

    #[test]
    fn test_persisted_layout() {
        let index = IndexStore::new();
        index.update("x/y", record("BQAC", 17, 12, 1_700_000_000));

        let value: serde_json::Value = serde_json::from_slice(&index.serialize().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "files": {
                    "x/y": { "file_id": "BQAC", "message_id": 17, "size": 12, "mod_time": 1_700_000_000 }
                },
                "version": 1
            })
        );
    }

    #[test]
    fn test_deserialize_without_version() {
        let doc = br#"{"files":{"a":{"file_id":"f","message_id":3,"size":1,"mod_time":2}}}"#;
        let index = IndexStore::deserialize(doc).unwrap();
        assert_eq!(index.generation(), 0);
        assert_eq!(index.get("a").unwrap().message_id, MessageId::new(3));
    }

    #[test]
    fn test_deserialize_null_files() {
        let index = IndexStore::deserialize(br#"{"files":null}"#).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        assert!(IndexStore::deserialize(b"not json").is_err());
    }

    #[test]
    fn test_unix_secs_truncates() {
        let t = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(to_unix_secs(t), 1);
        assert_eq!(from_unix_secs(1), UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(to_unix_secs(from_unix_secs(-30)), -30);
    }

    #[test]
    fn test_concurrent_updates() {
        let index = std::sync::Arc::new(IndexStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        index.update(format!("t{t}/f{i}"), record("f", i, 0, 0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.len(), 800);
        assert_eq!(index.generation(), 800);
    }
}
