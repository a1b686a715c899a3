//! In-memory channel.
//!
//! Used for testing and for running the filesystem without a network. It
//! mimics the remote semantics that matter to the index: message handles are
//! stable across edits, every edit mints a fresh attachment handle, and there
//! is a single pin slot. Failures can be injected per operation.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Channel, ChannelError, ChannelResult, ObjectReader, RemoteObject, length_mismatch};
use crate::ids::{FileId, MessageId};

const URL_SCHEME: &str = "memory://";

/// Channel operation, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOp {
    Upload,
    Pin,
    Pinned,
    DownloadUrl,
    Replace,
    Delete,
    Fetch,
}

#[derive(Debug, Clone)]
struct Message {
    name: String,
    file_id: FileId,
}

#[derive(Debug, Default)]
struct State {
    next_message: i64,
    next_file: u64,
    messages: HashMap<MessageId, Message>,
    objects: HashMap<FileId, Vec<u8>>,
    pinned: Option<MessageId>,
    calls: HashMap<ChannelOp, usize>,
    fail_once: HashSet<ChannelOp>,
    fail_always: HashSet<ChannelOp>,
}

impl State {
    /// Count the call and decide whether it should fail.
    fn enter(&mut self, op: ChannelOp) -> ChannelResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.fail_once.remove(&op) || self.fail_always.contains(&op) {
            return Err(ChannelError::other(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn store(&mut self, data: Vec<u8>) -> FileId {
        self.next_file += 1;
        let file_id = FileId::new(format!("mem-{:06}", self.next_file));
        self.objects.insert(file_id.clone(), data);
        file_id
    }
}

/// Read a whole upload, checking it against its declared size.
async fn read_content(
    content: &mut (dyn AsyncRead + Send + Unpin),
    size: u64,
) -> ChannelResult<Vec<u8>> {
    let mut data = Vec::new();
    content.read_to_end(&mut data).await?;
    if data.len() as u64 != size {
        return Err(length_mismatch(size, data.len() as u64).into());
    }
    Ok(data)
}

/// In-memory channel backend.
///
/// Thread-safe via an internal mutex. All data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    state: Mutex<State>,
}

impl MemoryChannel {
    /// Create an empty channel with nothing pinned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: ChannelOp) {
        self.state.lock().fail_once.insert(op);
    }

    /// Make every call of `op` fail until cleared.
    pub fn set_failing(&self, op: ChannelOp, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.fail_always.insert(op);
        } else {
            state.fail_always.remove(&op);
        }
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: ChannelOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Number of live messages.
    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Attachment name and content of a message.
    pub fn message(&self, message_id: MessageId) -> Option<(String, Vec<u8>)> {
        let state = self.state.lock();
        let message = state.messages.get(&message_id)?;
        let data = state.objects.get(&message.file_id)?;
        Some((message.name.clone(), data.clone()))
    }

    /// The pinned message's handle.
    pub fn pinned_message(&self) -> Option<MessageId> {
        self.state.lock().pinned
    }

    /// Content of the pinned message's attachment.
    pub fn pinned_content(&self) -> Option<Vec<u8>> {
        let pinned = self.pinned_message()?;
        self.message(pinned).map(|(_, data)| data)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn upload(
        &self,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<RemoteObject> {
        let data = read_content(content, size).await?;
        let mut state = self.state.lock();
        state.enter(ChannelOp::Upload)?;

        state.next_message += 1;
        let message_id = MessageId::new(state.next_message);
        let file_id = state.store(data);
        state.messages.insert(
            message_id,
            Message {
                name: name.to_string(),
                file_id: file_id.clone(),
            },
        );
        Ok(RemoteObject {
            message_id,
            file_id,
        })
    }

    async fn pin(&self, message_id: MessageId) -> ChannelResult<()> {
        let mut state = self.state.lock();
        state.enter(ChannelOp::Pin)?;

        if !state.messages.contains_key(&message_id) {
            return Err(ChannelError::MessageNotFound(message_id));
        }
        state.pinned = Some(message_id);
        Ok(())
    }

    async fn pinned(&self) -> ChannelResult<Option<RemoteObject>> {
        let mut state = self.state.lock();
        state.enter(ChannelOp::Pinned)?;

        Ok(state.pinned.and_then(|message_id| {
            state.messages.get(&message_id).map(|m| RemoteObject {
                message_id,
                file_id: m.file_id.clone(),
            })
        }))
    }

    async fn download_url(&self, file_id: &FileId) -> ChannelResult<String> {
        let mut state = self.state.lock();
        state.enter(ChannelOp::DownloadUrl)?;

        if !state.objects.contains_key(file_id) {
            return Err(ChannelError::ObjectNotFound(file_id.clone()));
        }
        Ok(format!("{URL_SCHEME}{file_id}"))
    }

    async fn replace(
        &self,
        message_id: MessageId,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> ChannelResult<FileId> {
        let data = read_content(content, size).await?;
        let mut state = self.state.lock();
        state.enter(ChannelOp::Replace)?;

        let old = state
            .messages
            .get(&message_id)
            .map(|m| m.file_id.clone())
            .ok_or(ChannelError::MessageNotFound(message_id))?;
        let file_id = state.store(data);
        state.objects.remove(&old);
        state.messages.insert(
            message_id,
            Message {
                name: name.to_string(),
                file_id: file_id.clone(),
            },
        );
        Ok(file_id)
    }

    async fn delete(&self, message_id: MessageId) -> ChannelResult<()> {
        let mut state = self.state.lock();
        state.enter(ChannelOp::Delete)?;

        let message = state
            .messages
            .remove(&message_id)
            .ok_or(ChannelError::MessageNotFound(message_id))?;
        state.objects.remove(&message.file_id);
        if state.pinned == Some(message_id) {
            state.pinned = None;
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> ChannelResult<ObjectReader> {
        let mut state = self.state.lock();
        state.enter(ChannelOp::Fetch)?;

        let file_id = url
            .strip_prefix(URL_SCHEME)
            .map(FileId::from)
            .ok_or_else(|| ChannelError::malformed(format!("not a memory URL: {url}")))?;
        let data = state
            .objects
            .get(&file_id)
            .cloned()
            .ok_or(ChannelError::ObjectNotFound(file_id))?;
        Ok(Box::pin(Cursor::new(data)))
    }
}
