//! Channel error types.

use std::io;
use thiserror::Error;

use crate::ids::{FileId, MessageId};

/// Boxed transport-level error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by a [`Channel`](super::Channel) implementation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The remote service rejected the call.
    #[error("channel API error {code}: {description}")]
    Api { code: i64, description: String },

    /// The referenced message does not exist.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// The referenced attachment does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(FileId),

    /// The service answered with something we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// I/O error while streaming content.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ChannelError {
    /// Create an Api error.
    pub fn api(code: i64, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
        }
    }

    /// Create a Malformed error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a Transport error.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Channel result type.
pub type ChannelResult<T> = Result<T, ChannelError>;
