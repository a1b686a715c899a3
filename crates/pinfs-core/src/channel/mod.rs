//! Remote channel abstraction.
//!
//! A channel is a flat, append-friendly message stream in which each message
//! may carry one binary attachment. The filesystem maps onto it as:
//!
//! - one message per stored file, created by [`Channel::upload`]
//! - in-place edits for content updates via [`Channel::replace`], which keep
//!   the message handle stable
//! - one pinned message whose attachment is the serialized index
//!
//! The channel offers no listing by path; everything the filesystem knows
//! about paths comes from the index.

mod error;
pub mod memory;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ids::{FileId, MessageId};

pub use error::{BoxError, ChannelError, ChannelResult};
pub use memory::{ChannelOp, MemoryChannel};

/// Streaming reader over an attachment's bytes.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Error for content whose length differs from the size declared for it.
pub fn length_mismatch(declared: u64, actual: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("content is {actual} bytes, declared {declared}"),
    )
}

/// A message together with its attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub message_id: MessageId,
    pub file_id: FileId,
}

/// Operations the filesystem needs from a message channel.
///
/// Every method is one or more remote round trips. Implementations report
/// failures as-is; the filesystem layer does not retry.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Post a new message carrying `content` as an attachment named `name`.
    ///
    /// `content` must yield exactly `size` bytes; anything else fails the
    /// upload.
    async fn upload(
        &self,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<RemoteObject>;

    /// Make `message_id` the channel's pinned message.
    ///
    /// The channel has a single pin slot; pinning supersedes any earlier pin.
    async fn pin(&self, message_id: MessageId) -> ChannelResult<()>;

    /// The currently pinned message, or `None` for a fresh channel.
    async fn pinned(&self) -> ChannelResult<Option<RemoteObject>>;

    /// Resolve a URL from which the attachment can be downloaded.
    async fn download_url(&self, file_id: &FileId) -> ChannelResult<String>;

    /// Replace the attachment of an existing message, keeping its handle.
    ///
    /// Returns the handle of the new attachment content.
    async fn replace(
        &self,
        message_id: MessageId,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<FileId>;

    /// Delete a message and its attachment.
    async fn delete(&self, message_id: MessageId) -> ChannelResult<()>;

    /// Open a download URL as a byte stream.
    async fn fetch(&self, url: &str) -> ChannelResult<ObjectReader>;

    /// Download a whole attachment into memory.
    async fn download(&self, file_id: &FileId) -> ChannelResult<Vec<u8>> {
        let url = self.download_url(file_id).await?;
        let mut reader = self.fetch(&url).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}
