//! VFS error types.

use std::io;
use thiserror::Error;

use crate::channel::{BoxError, ChannelError};

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The channel could not be reached, or its pinned index could not be
    /// read or decoded.
    #[error("initialization failed while {context}: {source}")]
    Initialization {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// No index record for the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// An upload, download, edit, or delete call failed.
    #[error("remote {op} failed for {path}: {source}")]
    RemoteTransfer {
        op: &'static str,
        path: String,
        #[source]
        source: ChannelError,
    },

    /// The in-memory index changed but could not be written back.
    #[error("index persist failed: {0}")]
    IndexPersist(#[source] ChannelError),

    /// The index could not be encoded.
    #[error("index encoding failed: {0}")]
    IndexEncoding(#[from] serde_json::Error),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Initialization error.
    pub fn init(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Initialization {
            context,
            source: source.into(),
        }
    }

    /// Create a RemoteTransfer error.
    pub fn remote(op: &'static str, path: impl Into<String>, source: ChannelError) -> Self {
        Self::RemoteTransfer {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true for a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
