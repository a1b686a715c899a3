//! # pinfs-core
//!
//! A hierarchical file store over a flat message channel.
//!
//! Each file is one channel message with one attachment. A single index,
//! mapping full virtual paths to message/attachment handles plus size and
//! modification time, is kept in memory and persisted whole as the attachment
//! of the channel's pinned message. Directories are never stored; they are
//! derived from the index keys at query time.
//!
//! - [`index`] - the path index and its persisted form
//! - [`resolve`] - directory view synthesis over the flat key space
//! - [`channel`] - the remote channel contract and an in-memory channel
//! - [`vfs`] - the filesystem facade

pub mod channel;
pub mod ids;
pub mod index;
pub mod resolve;
pub mod vfs;

pub use channel::{Channel, ChannelError, ChannelResult, MemoryChannel, ObjectReader, RemoteObject};
pub use ids::{FileId, MessageId};
pub use index::{INDEX_FILE_NAME, IndexRecord, IndexStore};
pub use resolve::{Listing, files_in_directory};
pub use vfs::{ChannelFs, DirEntry, FileType, HashType, Object, VfsError, VfsOps, VfsResult};
