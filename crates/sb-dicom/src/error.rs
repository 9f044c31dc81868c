//! Error types for the sb-dicom crate.
//!
//! This module provides the [`ReadError`] type describing why a candidate
//! file could not be classified.

use camino::{Utf8Path, Utf8PathBuf};
use sb_core::UidError;

/// Reasons a candidate file could not be classified.
///
/// None of these are fatal to the watcher; they decide how loudly a skipped
/// file is logged.
///
/// # Error Recovery Strategy
///
/// - **Not DICOM** ([`ReadError::NotDicom`]) and **truncated**
///   ([`ReadError::Truncated`]): transient - temp files and partial writes,
///   skipped with an info log
/// - **Vanished** ([`ReadError::Vanished`]): transient - moved or deleted by
///   another process, skipped silently
/// - Everything else: unexpected - skipped with a warning
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file does not carry the Part 10 preamble and `DICM` prefix.
    #[error("not a DICOM file {path}: {reason}")]
    NotDicom {
        /// The file that was read.
        path: Utf8PathBuf,
        /// What was wrong with the prefix.
        reason: &'static str,
    },

    /// The file ended before the identifiers were found.
    ///
    /// Usually a file that is still being written, including one not yet
    /// long enough to hold the preamble.
    #[error("DICOM header truncated in {path}")]
    Truncated {
        /// The file that was read.
        path: Utf8PathBuf,
    },

    /// The file disappeared before the read completed.
    #[error("file vanished before it could be read: {path}")]
    Vanished {
        /// The file that was read.
        path: Utf8PathBuf,
    },

    /// Any other I/O failure.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The header is structurally invalid.
    #[error("malformed DICOM header in {path}: {reason}")]
    Malformed {
        /// The file that was read.
        path: Utf8PathBuf,
        /// Description of the defect.
        reason: String,
    },

    /// The dataset uses a transfer syntax the reader cannot decode.
    #[error("unsupported transfer syntax {uid} in {path}")]
    UnsupportedTransferSyntax {
        /// The file that was read.
        path: Utf8PathBuf,
        /// The transfer syntax UID.
        uid: String,
    },

    /// A required identifier is absent from the header.
    #[error("{element} missing from {path}")]
    MissingElement {
        /// The file that was read.
        path: Utf8PathBuf,
        /// Name of the missing element.
        element: &'static str,
    },

    /// A required identifier cannot be used as a directory name.
    #[error("invalid {element} in {path}: {source}")]
    InvalidUid {
        /// The file that was read.
        path: Utf8PathBuf,
        /// Name of the offending element.
        element: &'static str,
        /// Why the value was rejected.
        #[source]
        source: UidError,
    },
}

impl ReadError {
    /// Maps an I/O error to [`ReadError::Vanished`] or [`ReadError::Io`].
    pub fn from_io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::Vanished { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns `true` if this failure is expected under concurrent writers.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotDicom { .. } | Self::Truncated { .. } | Self::Vanished { .. }
        )
    }

    /// Returns `true` if the file is gone.
    #[inline]
    #[must_use]
    pub const fn is_vanished(&self) -> bool {
        matches!(self, Self::Vanished { .. })
    }

    /// Returns `true` if the file is not (yet) a readable DICOM instance.
    #[inline]
    #[must_use]
    pub const fn is_not_dicom(&self) -> bool {
        matches!(self, Self::NotDicom { .. } | Self::Truncated { .. })
    }

    /// Returns `true` if the file may still be in the middle of being written.
    #[inline]
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    /// Returns the path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::NotDicom { path, .. }
            | Self::Truncated { path }
            | Self::Vanished { path }
            | Self::Io { path, .. }
            | Self::Malformed { path, .. }
            | Self::UnsupportedTransferSyntax { path, .. }
            | Self::MissingElement { path, .. }
            | Self::InvalidUid { path, .. } => path,
        }
    }
}
