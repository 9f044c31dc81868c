//! File filtering for poll events.
//!
//! Only files whose names match the configured pattern are treated as
//! candidate instances. Everything else that shows up in the watch root
//! (directories we created, editor temp files, lock files) is ignored
//! before any I/O happens.
//!
//! # Examples
//!
//! ```
//! use sb_watcher::{FileFilter, PatternFilter};
//! use camino::Utf8Path;
//!
//! let filter = PatternFilter::new("*.dcm").unwrap();
//!
//! assert!(filter.should_process(Utf8Path::new("/tmp/scanbuddy/IM0001.dcm")));
//! assert!(!filter.should_process(Utf8Path::new("/tmp/scanbuddy/IM0001.tmp")));
//! ```

use camino::Utf8Path;
use glob::{MatchOptions, Pattern, PatternError};
use smallvec::SmallVec;

/// A filter for determining which files the watcher should handle.
///
/// Used both when dispatching poll events and when sweeping stray files
/// from the watch root, so the two always agree on what a candidate is.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because they are used from the
/// blocking dispatch thread. They must also be `'static` to be moved into
/// the spawned task.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the file at the given path should be handled.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
///
/// ```
/// use sb_watcher::{FileFilter, AcceptAllFilter};
/// use camino::Utf8Path;
///
/// let filter = AcceptAllFilter;
/// assert!(filter.should_process(Utf8Path::new("anything.txt")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// A filter that matches the file name against one or more glob patterns.
///
/// Only the final path component is matched, so `*.dcm` never has to worry
/// about separators in the watch root itself. A file passes if any pattern
/// matches.
///
/// # Examples
///
/// ```
/// use sb_watcher::{FileFilter, PatternFilter};
/// use camino::Utf8Path;
///
/// let filter = PatternFilter::new("*.dcm")?
///     .or("*.ima")?
///     .case_insensitive();
///
/// assert!(filter.should_process(Utf8Path::new("/watch/IM0001.DCM")));
/// assert!(filter.should_process(Utf8Path::new("/watch/SCAN.IMA")));
/// assert!(!filter.should_process(Utf8Path::new("/watch/notes.txt")));
/// # Ok::<(), glob::PatternError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PatternFilter {
    patterns: SmallVec<[Pattern; 2]>,
    case_sensitive: bool,
}

impl PatternFilter {
    /// Creates a case-sensitive filter for a single pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let mut patterns = SmallVec::new();
        patterns.push(Pattern::new(pattern)?);
        Ok(Self {
            patterns,
            case_sensitive: true,
        })
    }

    /// Adds another accepted pattern.
    pub fn or(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.patterns.push(Pattern::new(pattern)?);
        Ok(self)
    }

    /// Makes matching ignore ASCII case.
    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Returns the patterns as written.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    fn options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
            ..MatchOptions::new()
        }
    }
}

impl FileFilter for PatternFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let options = self.options();
        self.patterns.iter().any(|p| p.matches_with(name, options))
    }
}

// Implement FileFilter for boxed filters
impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

// Implement FileFilter for Arc-wrapped filters (shared with the dispatch task)
impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        let filter = AcceptAllFilter;
        assert!(filter.should_process(Utf8Path::new("anything.txt")));
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_pattern_filter_matches_file_name() {
        let filter = PatternFilter::new("*.dcm").unwrap();

        assert!(filter.should_process(Utf8Path::new("/watch/IM0001.dcm")));
        assert!(filter.should_process(Utf8Path::new("IM0001.dcm")));
        assert!(!filter.should_process(Utf8Path::new("/watch/IM0001.dcm.part")));
        assert!(!filter.should_process(Utf8Path::new("/watch/IM0001.DCM")));
    }

    #[test]
    fn test_pattern_filter_ignores_directory_components() {
        let filter = PatternFilter::new("*.dcm").unwrap();

        // the root matching the pattern does not make its children match
        assert!(!filter.should_process(Utf8Path::new("/data.dcm/README")));
        assert!(!filter.should_process(Utf8Path::new("/")));
    }

    #[test]
    fn test_pattern_filter_case_insensitive() {
        let filter = PatternFilter::new("*.dcm").unwrap().case_insensitive();

        assert!(filter.should_process(Utf8Path::new("/watch/IM0001.DCM")));
        assert!(filter.should_process(Utf8Path::new("/watch/im0001.Dcm")));
    }

    #[test]
    fn test_pattern_filter_or() {
        let filter = PatternFilter::new("*.dcm").unwrap().or("MR.*").unwrap();

        assert!(filter.should_process(Utf8Path::new("/watch/a.dcm")));
        assert!(filter.should_process(Utf8Path::new("/watch/MR.1.2.3")));
        assert!(!filter.should_process(Utf8Path::new("/watch/CT.1.2.3")));
        assert_eq!(filter.patterns().collect::<Vec<_>>(), ["*.dcm", "MR.*"]);
    }

    #[test]
    fn test_pattern_filter_rejects_bad_glob() {
        assert!(PatternFilter::new("[").is_err());
        assert!(PatternFilter::new("*.dcm").unwrap().or("[").is_err());
    }

    #[test]
    fn test_boxed_filter() {
        let filter: Box<dyn FileFilter> = Box::new(PatternFilter::new("*.dcm").unwrap());
        assert!(filter.should_process(Utf8Path::new("a.dcm")));
        assert!(!filter.should_process(Utf8Path::new("a.txt")));
    }

    #[test]
    fn test_arc_filter() {
        let filter = std::sync::Arc::new(PatternFilter::new("*.dcm").unwrap());
        assert!(filter.should_process(Utf8Path::new("a.dcm")));
        assert!(!filter.should_process(Utf8Path::new("a.txt")));
    }
}
