//! Configuration management for flightgroup.
//!
//! Values are layered with figment: built-in defaults, then the TOML file,
//! then `FLIGHTGROUP_` environment variables. Nested keys are separated by a
//! double underscore, e.g. `FLIGHTGROUP_SERVER__ADDRESS=relay:3000`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::client::ClientOptions;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const DATA_DIR_NAME: &str = "flightgroup";
const DATABASE_FILE_NAME: &str = "flightgroup.db";
const ENV_PREFIX: &str = "FLIGHTGROUP_";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay connection.
    pub server: ServerConfig,
    /// Local pilot profile used on first registration.
    pub pilot: PilotConfig,
    /// Local persistence.
    pub storage: StorageConfig,
    /// Chat replay and retention.
    pub chat: ChatConfig,
    /// Roster status polling.
    pub roster: RosterConfig,
}

/// Relay connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the relay.
    pub address: String,
    /// Seconds before an unanswered request is given up.
    pub request_timeout_secs: u64,
}

/// Profile settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Display name. Falls back to the login name when empty.
    pub name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. Defaults to `~/.local/share/flightgroup/flightgroup.db`.
    pub database_path: Option<PathBuf>,
}

/// Chat settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Furthest back a chat replay reaches, in minutes.
    pub replay_window_minutes: u32,
    /// Messages of the current group loaded from disk at startup.
    pub history_limit: usize,
    /// Stored messages older than this many days are pruned; 0 keeps all.
    pub retention_days: u32,
}

/// Roster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Seconds between online-status polls; 0 disables polling.
    pub status_poll_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            replay_window_minutes: 30,
            history_limit: 200,
            retention_days: 30,
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            status_poll_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading the TOML file at `config_path` if given.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.config/flightgroup/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// `~/.local/share/flightgroup`.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Check values that would make the client unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.server.address.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.address must not be empty".to_string(),
            });
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "server.request_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.chat.replay_window_minutes == 0 {
            return Err(Error::ConfigValidation {
                message: "chat.replay_window_minutes must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Database file, resolving the default.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Chat replay window.
    #[must_use]
    pub fn replay_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.chat.replay_window_minutes))
    }

    /// How long stored chat is kept, `None` for forever.
    #[must_use]
    pub fn chat_retention(&self) -> Option<chrono::Duration> {
        match self.chat.retention_days {
            0 => None,
            days => Some(chrono::Duration::days(i64::from(days))),
        }
    }

    /// Status poll interval, `None` when disabled.
    #[must_use]
    pub fn status_poll_interval(&self) -> Option<Duration> {
        match self.roster.status_poll_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Options for the client core.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.request_timeout(),
            chat_replay_window: self.replay_window(),
        }
    }
}
