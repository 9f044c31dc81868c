//! A file paired with the header that classifies it.

use camino::{Utf8Path, Utf8PathBuf};

use super::header::HeaderFields;
use crate::path::destination;

/// An observed file, its parsed header, and where it will live.
///
/// Built once per observed file and consumed immediately by the dispatcher;
/// never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    /// Where the watcher observed the file.
    pub source: Utf8PathBuf,

    /// Header fields read from the file.
    pub header: HeaderFields,

    /// `root/study/series/file_name`.
    pub destination: Utf8PathBuf,
}

impl ClassifiedFile {
    /// Classifies `source` under `root`.
    ///
    /// Returns `None` if `source` has no file name component.
    #[must_use]
    pub fn new(root: &Utf8Path, source: Utf8PathBuf, header: HeaderFields) -> Option<Self> {
        let file_name = source.file_name()?;
        let destination = destination(root, &header.study_uid, &header.series_uid, file_name);
        Some(Self {
            source,
            header,
            destination,
        })
    }

    /// Returns the file name shared by the source and destination.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.destination.file_name()
    }
}
