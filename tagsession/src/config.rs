//! Session tuning, loadable from a TOML file.

use crate::model::Action;
use crate::sansio::MultiTagPolicy;
use serde_derive::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default delay before a session reacts to an ambiguous poll.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration shared by every session opened through one utility.
///
/// ```
/// use tagsession::{MultiTagPolicy, SessionConfig};
///
/// let config = SessionConfig::from_toml("retry_delay_ms = 250").unwrap();
/// assert_eq!(config.retry_delay_ms, 250);
/// assert_eq!(config.read_policy, MultiTagPolicy::Invalidate);
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay before invalidating or restarting after zero or several tags.
    pub retry_delay_ms: u64,
    /// Multi-tag policy for read sessions.
    pub read_policy: MultiTagPolicy,
    /// Multi-tag policy for write and setup sessions.
    pub write_policy: MultiTagPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            read_policy: MultiTagPolicy::Invalidate,
            write_policy: MultiTagPolicy::RestartPolling,
        }
    }
}

impl SessionConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn policy_for(&self, action: &Action) -> MultiTagPolicy {
        if action.is_write() {
            self.write_policy
        } else {
            self.read_policy
        }
    }
}
