//! Telegram channel configuration.
//!
//! Loaded from TOML, typically `~/.config/pinfs/config.toml`:
//!
//! ```toml
//! bot_token_env = "PINFS_BOT_TOKEN"   # or bot_token = "123:abc"
//! channel_id = -1001234567890
//! root = "backups"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Environment variable consulted when no token is configured.
pub const BOT_TOKEN_ENV: &str = "PINFS_BOT_TOKEN";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Settings for a Telegram-backed channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Token of a bot that is an administrator of the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Environment variable holding the token (alternative to inline token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token_env: Option<String>,

    /// ID of the channel to store files in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,

    /// Path inside the channel used as the filesystem root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// Bot API base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl TelegramConfig {
    /// Create a config for a channel.
    pub fn new(channel_id: i64) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    /// Set the bot token directly.
    pub fn with_bot_token(mut self, token: impl Into<String>) -> Self {
        self.bot_token = Some(token.into());
        self
    }

    /// Set the bot token from an environment variable name.
    pub fn with_bot_token_env(mut self, env_var: impl Into<String>) -> Self {
        self.bot_token_env = Some(env_var.into());
        self
    }

    /// Set the filesystem root.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the Bot API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pinfs").join("config.toml"))
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else the default file if it exists, else an
    /// empty config.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Overlay settings from `other` where they are set.
    pub fn merge(mut self, other: TelegramConfig) -> Self {
        if other.bot_token.is_some() {
            self.bot_token = other.bot_token;
        }
        if other.bot_token_env.is_some() {
            self.bot_token_env = other.bot_token_env;
        }
        if other.channel_id.is_some() {
            self.channel_id = other.channel_id;
        }
        if other.root.is_some() {
            self.root = other.root;
        }
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        self
    }

    /// Resolve the bot token: inline, then the named variable, then
    /// [`BOT_TOKEN_ENV`].
    pub fn resolve_bot_token(&self) -> Option<String> {
        // Direct token takes precedence
        if let Some(token) = &self.bot_token {
            return Some(token.clone());
        }

        if let Some(env_var) = &self.bot_token_env {
            return std::env::var(env_var).ok();
        }

        std::env::var(BOT_TOKEN_ENV).ok()
    }

    /// Bot API base URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }

    /// Filesystem root ("" for the whole channel).
    pub fn root(&self) -> &str {
        self.root.as_deref().unwrap_or("")
    }

    /// The channel ID, or an error if unset.
    pub fn require_channel_id(&self) -> Result<i64, ConfigError> {
        self.channel_id.ok_or(ConfigError::Missing("channel_id"))
    }

    /// The bot token, or an error if it cannot be resolved.
    pub fn require_bot_token(&self) -> Result<String, ConfigError> {
        self.resolve_bot_token().ok_or(ConfigError::Missing("bot_token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bot_token = "123:abc"
channel_id = -1001234567890
root = "backups"
"#
        )
        .unwrap();

        let config = TelegramConfig::load(file.path()).unwrap();
        assert_eq!(config.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.require_channel_id().unwrap(), -1001234567890);
        assert_eq!(config.root(), "backups");
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TelegramConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel_id = \"not a number\"").unwrap();
        let err = TelegramConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_inline_token_wins() {
        let config = TelegramConfig::new(1)
            .with_bot_token("inline")
            .with_bot_token_env("PINFS_TEST_UNSET_TOKEN_VAR");
        assert_eq!(config.resolve_bot_token().as_deref(), Some("inline"));
    }

    #[test]
    fn test_named_env_var_unset() {
        let config = TelegramConfig::new(1).with_bot_token_env("PINFS_TEST_UNSET_TOKEN_VAR");
        assert!(config.resolve_bot_token().is_none());
        assert!(matches!(
            config.require_bot_token(),
            Err(ConfigError::Missing("bot_token"))
        ));
    }

    #[test]
    fn test_merge_overrides_set_fields() {
        let file = TelegramConfig::new(1).with_root("a").with_bot_token("t");
        let flags = TelegramConfig {
            channel_id: Some(2),
            ..Default::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.channel_id, Some(2));
        assert_eq!(merged.root(), "a");
        assert_eq!(merged.bot_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_api_url_trailing_slash() {
        let config = TelegramConfig::default().with_api_url("http://localhost:8081/");
        assert_eq!(config.api_url(), "http://localhost:8081");
    }

    #[test]
    fn test_missing_channel_id() {
        assert!(matches!(
            TelegramConfig::default().require_channel_id(),
            Err(ConfigError::Missing("channel_id"))
        ));
    }
}
