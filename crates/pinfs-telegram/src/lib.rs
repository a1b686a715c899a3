//! # pinfs-telegram
//!
//! [`Channel`](pinfs_core::Channel) implementation over the Telegram Bot API.
//!
//! The bot must be an administrator of the channel with permission to post,
//! edit, delete, and pin messages.

mod api;
pub mod channel;
pub mod config;

pub use channel::{ConnectError, TelegramChannel};
pub use config::{BOT_TOKEN_ENV, ConfigError, DEFAULT_API_URL, TelegramConfig};
