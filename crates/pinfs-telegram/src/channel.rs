//! Telegram channel backend.
//!
//! Files are documents posted to a channel by a bot that administers it.
//! The index is the channel's pinned document. Downloads go through
//! `getFile`, which the Bot API limits to 20 MB per file.

use std::future::Future;
use std::io;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use pinfs_core::channel::{
    Channel, ChannelError, ChannelResult, ObjectReader, RemoteObject, length_mismatch,
};
use pinfs_core::{FileId, MessageId};

use crate::api::{
    BotApi, Chat, ChatRequest, File, FileRequest, InputMediaDocument, Message, MessageRequest,
    PinRequest,
};
use crate::config::{ConfigError, TelegramConfig};

/// Multipart field carrying the attachment.
const DOCUMENT_FIELD: &str = "document";

/// Read size for streamed uploads.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Chunks buffered between the reader and the request body.
const UPLOAD_QUEUE: usize = 4;

type Chunk = io::Result<Vec<u8>>;

/// Copy `content` into the body channel, failing the body if the length
/// differs from `size`.
async fn pump(
    content: &mut (dyn AsyncRead + Send + Unpin),
    size: u64,
    mut tx: mpsc::Sender<Chunk>,
) {
    let mut sent: u64 = 0;
    loop {
        let mut chunk = vec![0; UPLOAD_CHUNK];
        match content.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                chunk.truncate(n);
                sent += n as u64;
                // A closed receiver means the request already finished.
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
    if sent != size {
        let _ = tx.send(Err(length_mismatch(size, sent))).await;
    }
}

/// Error opening a Telegram channel.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("channel {chat_id} is not reachable: {source}")]
    Unreachable {
        chat_id: i64,
        #[source]
        source: ChannelError,
    },
}

/// A Telegram channel accessed through the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    api: BotApi,
    chat_id: i64,
}

impl TelegramChannel {
    /// Open the channel described by `config` and check that the bot can see
    /// it.
    #[tracing::instrument(skip(config), name = "channel.connect")]
    pub async fn connect(config: &TelegramConfig) -> Result<Self, ConnectError> {
        let token = config.require_bot_token()?;
        let chat_id = config.require_channel_id()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("pinfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ConnectError::Client)?;
        let channel = Self {
            api: BotApi::new(http, config.api_url(), token),
            chat_id,
        };

        let chat = channel
            .chat()
            .await
            .map_err(|source| ConnectError::Unreachable { chat_id, source })?;
        tracing::info!(
            chat_id = chat.id,
            pinned = chat.pinned_message.is_some(),
            "connected to channel"
        );
        Ok(channel)
    }

    /// Channel ID.
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    async fn chat(&self) -> ChannelResult<Chat> {
        self.api
            .call("getChat", &ChatRequest {
                chat_id: self.chat_id,
            })
            .await
    }

    /// Streaming attachment part plus the future that feeds it. The two must
    /// be driven together.
    fn document_part<'a>(
        name: &str,
        content: &'a mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> (Part, impl Future<Output = ()> + Send + 'a) {
        let (tx, rx) = mpsc::channel::<Chunk>(UPLOAD_QUEUE);
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(rx), size)
            .file_name(name.to_string());
        (part, pump(content, size, tx))
    }

    /// Send a multipart call whose `document` part streams from `content`.
    async fn call_with_document<T>(
        &self,
        method: &str,
        form: Form,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let (part, feed) = Self::document_part(name, content, size);
        let form = form.part(DOCUMENT_FIELD, part);
        let request = self.api.call_multipart(method, form);
        let (result, ()) = futures::future::join(request, feed).await;
        result
    }

    fn document_of(method: &str, message: Message) -> ChannelResult<RemoteObject> {
        let document = message.document.ok_or_else(|| {
            ChannelError::malformed(format!("{method}: message {} has no document", message.message_id))
        })?;
        Ok(RemoteObject {
            message_id: MessageId::new(message.message_id),
            file_id: FileId::new(document.file_id),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    #[tracing::instrument(skip(self, content), name = "channel.upload")]
    async fn upload(
        &self,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<RemoteObject> {
        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("disable_notification", "true");
        let message: Message = self
            .call_with_document("sendDocument", form, name, content, size)
            .await?;
        Self::document_of("sendDocument", message)
    }

    #[tracing::instrument(skip(self), name = "channel.pin")]
    async fn pin(&self, message_id: MessageId) -> ChannelResult<()> {
        let _: bool = self
            .api
            .call("pinChatMessage", &PinRequest {
                chat_id: self.chat_id,
                message_id: message_id.get(),
                disable_notification: true,
            })
            .await?;
        Ok(())
    }

    async fn pinned(&self) -> ChannelResult<Option<RemoteObject>> {
        match self.chat().await?.pinned_message {
            Some(message) => Self::document_of("getChat", message).map(Some),
            None => Ok(None),
        }
    }

    async fn download_url(&self, file_id: &FileId) -> ChannelResult<String> {
        let file: File = self
            .api
            .call("getFile", &FileRequest {
                file_id: file_id.as_str(),
            })
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| ChannelError::malformed(format!("getFile: no path for {file_id}")))?;
        Ok(self.api.file_url(&path))
    }

    #[tracing::instrument(skip(self, content), name = "channel.replace")]
    async fn replace(
        &self,
        message_id: MessageId,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<FileId> {
        let media = serde_json::to_string(&InputMediaDocument {
            kind: "document",
            media: "attach://document",
        })
        .map_err(|e| ChannelError::malformed(e.to_string()))?;

        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("message_id", message_id.get().to_string())
            .text("media", media);
        let message: Message = self
            .call_with_document("editMessageMedia", form, name, content, size)
            .await?;
        Self::document_of("editMessageMedia", message).map(|obj| obj.file_id)
    }

    #[tracing::instrument(skip(self), name = "channel.delete")]
    async fn delete(&self, message_id: MessageId) -> ChannelResult<()> {
        let _: bool = self
            .api
            .call("deleteMessage", &MessageRequest {
                chat_id: self.chat_id,
                message_id: message_id.get(),
            })
            .await?;
        Ok(())
    }

    async fn fetch(&self, url: &str) -> ChannelResult<ObjectReader> {
        let response = self.api.get(url).await?;
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn drain(data: &[u8], size: u64) -> Vec<Chunk> {
        let (tx, rx) = mpsc::channel::<Chunk>(UPLOAD_QUEUE);
        let mut content = data;
        let feed = pump(&mut content, size, tx);
        let (chunks, ()) = futures::future::join(rx.collect::<Vec<_>>(), feed).await;
        chunks
    }

    #[tokio::test]
    async fn test_pump_streams_in_chunks() {
        let data = vec![7u8; UPLOAD_CHUNK + 10];
        let chunks = drain(&data, data.len() as u64).await;

        let mut joined = Vec::new();
        for chunk in chunks {
            joined.extend(chunk.unwrap());
        }
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_pump_fails_body_on_length_mismatch() {
        for size in [2, 5] {
            let chunks = drain(b"abc", size).await;
            let last = chunks.last().unwrap();
            assert_eq!(
                last.as_ref().unwrap_err().kind(),
                io::ErrorKind::InvalidData,
                "declared {size}"
            );
        }
    }

    #[tokio::test]
    async fn test_pump_stops_when_body_dropped() {
        let (tx, rx) = mpsc::channel::<Chunk>(0);
        drop(rx);
        let data = vec![1u8; UPLOAD_CHUNK * 4];
        let mut content = data.as_slice();
        pump(&mut content, data.len() as u64, tx).await;
        // Only the first chunk was read before the closed body was noticed
        assert_eq!(content.len(), UPLOAD_CHUNK * 3);
    }
}
