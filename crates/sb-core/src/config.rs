//! Configuration structures for scanbuddy.
//!
//! - [`WatchConfig`] - Watch root, filename pattern, poll interval
//! - [`Config`] - Root configuration, loadable from a JSON file
//!
//! All configuration types implement [`Default`] with values suited to a
//! scanner console exporting instances into a local directory.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default directory the watcher creates and monitors.
pub const DEFAULT_ROOT: &str = "/tmp/scanbuddy";

/// Default glob pattern for incoming instance files.
pub const DEFAULT_FILE_PATTERN: &str = "*.dcm";

/// Configuration for the acquisition watcher.
///
/// # Examples
///
/// ```
/// use sb_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.poll_interval_ms, 1000);
/// assert_eq!(config.file_pattern, "*.dcm");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory to watch. Created on start, removed on stop.
    pub root: Utf8PathBuf,

    /// Glob pattern matched against file names directly under `root`.
    pub file_pattern: String,

    /// Interval between directory polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Capacity of the broadcast channel carrying watch events.
    ///
    /// Subscribers that fall further behind than this lose the oldest events.
    pub event_capacity: usize,
}

impl WatchConfig {
    /// Returns the poll interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns a copy of this configuration watching `root` instead.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Checks the configuration for values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_str().is_empty() {
            return Err(ConfigError::invalid_path(
                self.root.clone(),
                "watch root must not be empty",
            ));
        }
        if self.file_pattern.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "file_pattern",
                "must not be empty",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "event_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from(DEFAULT_ROOT),
            file_pattern: DEFAULT_FILE_PATTERN.to_owned(),
            poll_interval_ms: 1000,
            event_capacity: 256,
        }
    }
}

/// Root configuration for scanbuddy.
///
/// # Examples
///
/// ```
/// use sb_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"watch": {"poll_interval_ms": 250}}"#).unwrap();
/// assert_eq!(config.watch.poll_interval_ms, 250);
/// assert_eq!(config.watch.file_pattern, "*.dcm");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Acquisition watcher configuration.
    pub watch: WatchConfig,
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.validate()
    }
}
