//! Removal of previous-run data at a run boundary.
//!
//! Two operations run when the series changes:
//!
//! 1. [`delete_run_tree`] removes the previous run's study directory
//!    (everything under `<root>/<study>`).
//! 2. [`sweep_stray_files`] removes candidate files still sitting at the top
//!    of the root that were never classified, typically the tail of the old
//!    run that arrived after the boundary was detected.
//!
//! Both are best effort. Missing targets are not errors, and individual
//! failures are reported back to the caller instead of aborting the sweep.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use sb_core::{Uid, run_dir};

use crate::error::CleanupError;
use crate::filter::FileFilter;

/// Outcome of deleting a run tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRemoval {
    /// The directory existed and was removed.
    Removed,
    /// There was nothing to remove.
    Absent,
}

/// Recursively removes `<root>/<study>`.
///
/// A directory that does not exist (never created, or already removed by
/// someone else) is reported as [`TreeRemoval::Absent`].
pub fn delete_run_tree(root: &Utf8Path, study: &Uid) -> Result<TreeRemoval, CleanupError> {
    let dir = run_dir(root, study);
    match fs::remove_dir_all(&dir) {
        Ok(()) => Ok(TreeRemoval::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(TreeRemoval::Absent),
        Err(source) => Err(CleanupError::Remove { path: dir, source }),
    }
}

/// Result of a stray-file sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Files that were removed.
    pub removed: Vec<Utf8PathBuf>,
    /// Candidate files the keep predicate asked to retain.
    pub retained: Vec<Utf8PathBuf>,
    /// Removals (or the listing itself) that failed.
    pub failures: Vec<CleanupError>,
}

impl SweepReport {
    /// Returns `true` if every attempted removal succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes top-level files in `root` that pass `filter`, unless `keep`
/// returns `true` for them.
///
/// Subdirectories and non-UTF-8 names are never touched. Files that vanish
/// between listing and removal are silently skipped.
pub fn sweep_stray_files<F, K>(root: &Utf8Path, filter: &F, mut keep: K) -> SweepReport
where
    F: FileFilter + ?Sized,
    K: FnMut(&Utf8Path) -> bool,
{
    let mut report = SweepReport::default();

    let entries = match root.read_dir_utf8() {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(source) => {
            report.failures.push(CleanupError::ReadDir {
                path: root.to_owned(),
                source,
            });
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            // non-UTF-8 name
            Err(e) if e.kind() == io::ErrorKind::InvalidData => continue,
            Err(source) => {
                report.failures.push(CleanupError::ReadDir {
                    path: root.to_owned(),
                    source,
                });
                continue;
            }
        };

        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        if !filter.should_process(path) {
            continue;
        }
        if keep(path) {
            report.retained.push(path.to_owned());
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => report.removed.push(path.to_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => report.failures.push(CleanupError::Remove {
                path: path.to_owned(),
                source,
            }),
        }
    }

    report.removed.sort();
    report.retained.sort();
    report
}
