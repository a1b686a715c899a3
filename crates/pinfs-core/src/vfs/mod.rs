//! Virtual Filesystem abstraction.
//!
//! Key components:
//!
//! - [`VfsOps`] - Filesystem contract exposed to the hosting layer
//! - [`ChannelFs`] - Implementation over a [`Channel`](crate::channel::Channel)
//!
//! ## Design Decisions
//!
//! - **Whole-object I/O**: files are written and replaced as a unit, matching
//!   one-attachment-per-message storage.
//! - **Inferred directories**: `mkdir`/`rmdir` are no-ops; a directory exists
//!   while some file lies beneath it.
//! - **Empty and missing look alike**: listing a directory nothing lies
//!   beneath returns an empty list, not `NotFound`.

mod channel_fs;
mod error;
mod ops;
mod types;

pub use channel_fs::ChannelFs;
pub use error::{VfsError, VfsResult};
pub use ops::VfsOps;
pub use types::{DirEntry, FileType, HashType, Object};
