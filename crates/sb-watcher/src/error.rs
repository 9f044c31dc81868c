//! Error types for the sb-watcher crate.
//!
//! [`WatchError`] covers watcher lifecycle failures. [`CleanupError`] covers
//! the best-effort removals performed at a run boundary; those are logged and
//! never stop dispatch.

use camino::Utf8PathBuf;

use sb_core::ConfigError;

/// Errors that can occur while starting, running, or stopping the watcher.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the poller could not be set up
/// - **Root I/O** ([`WatchError::Io`]): Fatal - the watch root is unusable
/// - **Config / pattern** ([`WatchError::Config`], [`WatchError::Pattern`]): Fatal - fix the input
/// - **Lifecycle misuse** ([`WatchError::AlreadyStarted`], [`WatchError::Stopped`]): Fatal for the call
/// - **Task failure** ([`WatchError::TaskFailed`]): Fatal - the dispatch loop died
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
///
/// # Examples
///
/// ```
/// use sb_watcher::WatchError;
///
/// fn report(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("watcher stopped: {err}");
///     } else {
///         eprintln!("skipped: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify poller.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// An I/O error on the watch root itself.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path that failed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The watch configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The file pattern is not a valid glob.
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// `start` was called on a watcher that is already running.
    #[error("watcher is already started")]
    AlreadyStarted,

    /// `start` was called on a watcher that has been stopped.
    ///
    /// Stopping discards the watch root and the session, so a stopped
    /// watcher cannot be restarted. Build a new one instead.
    #[error("watcher has been stopped")]
    Stopped,

    /// The dispatch task panicked or was cancelled by the runtime.
    #[error("dispatch task failed: {0}")]
    TaskFailed(String),

    /// A path reported by the poller is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl WatchError {
    /// Creates a new [`WatchError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    ///
    /// Only event-specific problems are recoverable; everything else stops
    /// the watcher or rejects the call.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Notify(_)
            | Self::Config(_)
            | Self::Pattern(_)
            | Self::AlreadyStarted
            | Self::Stopped
            | Self::TaskFailed(_)
            | Self::NonUtf8Path(_) => None,
        }
    }
}

/// A removal that failed during boundary cleanup or teardown.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    /// A directory could not be listed.
    #[error("failed to list {path}: {source}")]
    ReadDir {
        /// The directory.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file or directory could not be removed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// The path that could not be removed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CleanupError {
    /// Returns the path the failed operation targeted.
    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            Self::ReadDir { path, .. } | Self::Remove { path, .. } => path,
        }
    }
}
