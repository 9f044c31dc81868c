//! Error types for the sb-core crate.
//!
//! This module provides [`ConfigError`] for configuration loading and
//! validation, and [`UidError`] for identifiers that cannot be used as
//! directory names.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use sb_core::ConfigError;
///
/// let error = ConfigError::invalid_option("poll_interval_ms", "must be greater than zero");
/// assert!(error.to_string().contains("poll_interval_ms"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The provided path is invalid or malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path.
        path: Utf8PathBuf,
        /// Explanation of why the path is invalid.
        reason: String,
    },

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The configuration file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ConfigError::InvalidPath`] error.
    #[inline]
    pub fn invalid_path(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a raw header value cannot become a [`Uid`](crate::Uid).
///
/// Study and series identifiers are used as directory names under the watch
/// root, so anything that could escape the root or confuse the filesystem is
/// rejected here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UidError {
    /// The value is empty once DICOM padding is removed.
    #[error("identifier is empty")]
    Empty,

    /// The value is a reserved path component (`.` or `..`).
    #[error("identifier '{0}' is a reserved path component")]
    Reserved(String),

    /// The value contains a path separator or control character.
    #[error("identifier '{value}' contains forbidden character {ch:?}")]
    ForbiddenCharacter {
        /// The offending value.
        value: String,
        /// The first forbidden character found.
        ch: char,
    },

    /// The value is longer than a single path component may be.
    #[error("identifier is {0} bytes long")]
    TooLong(usize),
}
