//! Core VFS types.
//!
//! Paths in these types are relative to the filesystem root; index keys are
//! the full paths including the root.

use std::time::SystemTime;

use crate::index::IndexRecord;
use crate::resolve;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file, backed by one channel message.
    File,
    /// Directory, inferred from the keys beneath it.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Content hashes a filesystem can report.
///
/// Channel attachments carry no checksum the filesystem can trust, so `None`
/// is the only value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    None,
}

impl std::fmt::Display for HashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashType::None => f.write_str("none"),
        }
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (last segment).
    pub name: String,
    /// Path relative to the filesystem root.
    pub path: String,
    /// Entry type.
    pub kind: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Modification time. Directories have none stored and report the
    /// listing time.
    pub mtime: SystemTime,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(path: impl Into<String>, size: u64, mtime: SystemTime) -> Self {
        let path = path.into();
        Self {
            name: resolve::base_name(&path).to_string(),
            path,
            kind: FileType::File,
            size,
            mtime,
        }
    }

    /// Create a directory entry.
    pub fn directory(path: impl Into<String>, mtime: SystemTime) -> Self {
        let path = path.into();
        Self {
            name: resolve::base_name(&path).to_string(),
            path,
            kind: FileType::Directory,
            size: 0,
            mtime,
        }
    }
}

/// Handle to a stored file.
///
/// Ephemeral: rebuilt from the index on every lookup. It carries no identity
/// beyond its key, and its cached metadata goes stale as soon as the index
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    key: String,
    remote: String,
    size: u64,
    mod_time: SystemTime,
}

impl Object {
    pub(crate) fn from_record(key: String, remote: String, record: &IndexRecord) -> Self {
        Self {
            key,
            remote,
            size: record.size,
            mod_time: record.modified(),
        }
    }

    /// Full index key, including the filesystem root.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path relative to the filesystem root.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mod_time(&self) -> SystemTime {
        self.mod_time
    }
}
