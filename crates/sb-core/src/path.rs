//! Path classification.
//!
//! Pure functions mapping identifiers to locations under the watch root.
//! Nothing here touches the filesystem.

use camino::{Utf8Path, Utf8PathBuf};

use crate::types::Uid;

/// Returns `root/study/series/file_name`.
///
/// Deterministic and free of I/O; the same inputs always produce the same
/// path.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use sb_core::{destination, Uid};
///
/// let study = Uid::parse("1.2.3").unwrap();
/// let series = Uid::parse("1.2.3.4").unwrap();
/// let path = destination(Utf8Path::new("/tmp/scanbuddy"), &study, &series, "IM1.dcm");
/// assert_eq!(path, "/tmp/scanbuddy/1.2.3/1.2.3.4/IM1.dcm");
/// ```
#[must_use]
pub fn destination(root: &Utf8Path, study: &Uid, series: &Uid, file_name: &str) -> Utf8PathBuf {
    let mut path = run_dir(root, study);
    path.push(series.as_str());
    path.push(file_name);
    path
}

/// Returns `root/study`, the directory holding every series of a study.
#[must_use]
pub fn run_dir(root: &Utf8Path, study: &Uid) -> Utf8PathBuf {
    root.join(study.as_str())
}
