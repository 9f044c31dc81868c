//! Per-file dispatch: read, classify, clean up on a boundary, move, announce.
//!
//! Every candidate goes through the same fixed order:
//!
//! 1. read the header (failures are classified and the file is skipped)
//! 2. feed the run identity to the session
//! 3. on a boundary, remove the previous run and publish a reset
//! 4. move the file into `<root>/<study>/<series>/`
//! 5. publish the arrival
//!
//! All of it runs on the single dispatch thread, so events are handled one
//! at a time and a reset always precedes the arrival that caused it.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use notify::EventKind;
use parking_lot::Mutex;
use sb_core::{ClassifiedFile, RunIdentity, Uid};
use sb_dicom::{ReadError, read_header};
use tokio_util::sync::CancellationToken;

use crate::cleanup::{TreeRemoval, delete_run_tree, sweep_stray_files};
use crate::error::WatchError;
use crate::events::{DispatchStats, EventPublisher};
use crate::filter::FileFilter;
use crate::session::{Transition, WatchSession};

/// What happened to a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Not a candidate (wrong place, wrong name, not a regular file).
    Ignored,
    /// A candidate that could not be read.
    Skipped,
    /// Read and classified, but the move failed.
    MoveFailed,
    /// Moved and announced. `reset` is set when it started a new run.
    Arrived { reset: bool },
}

/// State shared between the dispatch thread and the watcher handle.
pub(crate) struct Dispatcher<F> {
    root: Utf8PathBuf,
    filter: Arc<F>,
    session: Arc<Mutex<WatchSession>>,
    publisher: EventPublisher,
    stats: Arc<Mutex<DispatchStats>>,
    cancel: CancellationToken,
}

impl<F: FileFilter> Dispatcher<F> {
    pub(crate) fn new(
        root: Utf8PathBuf,
        filter: Arc<F>,
        session: Arc<Mutex<WatchSession>>,
        publisher: EventPublisher,
        stats: Arc<Mutex<DispatchStats>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            filter,
            session,
            publisher,
            stats,
            cancel,
        }
    }

    pub(crate) fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }

    /// Handles one notify event. Only creations and modifications matter.
    pub(crate) fn handle_event(&self, event: &notify::Event) {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
        ) {
            tracing::trace!(kind = ?event.kind, "ignoring event kind");
            return;
        }

        for path in &event.paths {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(path) = Utf8Path::from_path(path) else {
                let err = WatchError::non_utf8_path(path.clone());
                tracing::warn!(error = %err, "skipping file event");
                continue;
            };
            self.handle_path(path);
        }
    }

    /// Handles files already in the root, in name order.
    pub(crate) fn dispatch_existing(&self) -> usize {
        let entries = match self.root.read_dir_utf8() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root, error = %e, "failed to list watch root");
                return 0;
            }
        };

        let mut paths: Vec<Utf8PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(camino::Utf8DirEntry::into_path)
            .filter(|path| self.filter.should_process(path))
            .collect();
        paths.sort();

        let mut handled = 0;
        for path in &paths {
            if self.cancel.is_cancelled() {
                break;
            }
            self.handle_path(path);
            handled += 1;
        }
        if handled > 0 {
            tracing::info!(count = handled, "dispatched files already present");
        }
        handled
    }

    pub(crate) fn handle_path(&self, path: &Utf8Path) -> Outcome {
        if !self.is_candidate(path) {
            tracing::trace!(path = %path, "not a candidate");
            return Outcome::Ignored;
        }
        if !path.is_file() {
            // moved by an earlier event, or never a file
            tracing::trace!(path = %path, "not a regular file");
            return Outcome::Ignored;
        }

        let header = match read_header(path) {
            Ok(header) => header,
            Err(err) => {
                self.record_read_failure(&err);
                return Outcome::Skipped;
            }
        };

        let Some(file) = ClassifiedFile::new(&self.root, path.to_owned(), header) else {
            return Outcome::Ignored;
        };

        let identity = file.header.run_identity();
        let transition = self
            .session
            .lock()
            .observe(&identity, |previous| self.reset(previous, &file));

        match relocate(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %file.source, "file vanished before it could be moved");
                self.stats.lock().skipped_vanished += 1;
                return Outcome::MoveFailed;
            }
            Err(e) => {
                tracing::warn!(
                    path = %file.source,
                    destination = %file.destination,
                    error = %e,
                    "failed to move file"
                );
                self.stats.lock().move_failures += 1;
                return Outcome::MoveFailed;
            }
        }

        tracing::debug!(
            path = %file.destination,
            instance = ?file.header.instance_number,
            transition = transition_label(&transition),
            "moved file"
        );
        self.stats.lock().arrivals += 1;
        self.publisher.publish_arrival(file.header, file.destination);

        Outcome::Arrived {
            reset: transition.is_boundary(),
        }
    }

    fn is_candidate(&self, path: &Utf8Path) -> bool {
        path.parent() == Some(self.root.as_path()) && self.filter.should_process(path)
    }

    /// Removes the previous run and announces the reset.
    fn reset(&self, previous: &RunIdentity, trigger: &ClassifiedFile) {
        match delete_run_tree(&self.root, &previous.study) {
            Ok(TreeRemoval::Removed) => {
                tracing::info!(study = %previous.study, "removed previous run");
            }
            Ok(TreeRemoval::Absent) => {
                tracing::debug!(study = %previous.study, "previous run already gone");
            }
            Err(err) => tracing::warn!(error = %err, "failed to remove previous run"),
        }

        let series = &trigger.header.series_uid;
        let report = sweep_stray_files(&self.root, &*self.filter, |path| {
            path == trigger.source.as_path() || belongs_to_run(path, series)
        });
        for failure in &report.failures {
            tracing::warn!(error = %failure, "failed to remove stray file");
        }
        if !report.removed.is_empty() {
            tracing::info!(count = report.removed.len(), "removed stray files");
        }

        self.stats.lock().resets += 1;
        self.publisher.publish_reset();
    }

    /// Counts a read failure. Transient failures log quietly; anything
    /// else is a warning.
    fn record_read_failure(&self, err: &ReadError) {
        let mut stats = self.stats.lock();
        if !err.is_transient() {
            tracing::warn!(path = %err.path(), error = %err, "failed to read file");
            stats.skipped_failed += 1;
        } else if err.is_vanished() {
            tracing::debug!(path = %err.path(), "file vanished before it could be read");
            stats.skipped_vanished += 1;
        } else {
            tracing::info!(path = %err.path(), reason = %err, "not a dicom file");
            stats.skipped_not_dicom += 1;
        }
    }
}

/// Whether a stray file should survive the sweep for the run `series`.
///
/// Files still being written are kept; they will be handled once complete.
fn belongs_to_run(path: &Utf8Path, series: &Uid) -> bool {
    match read_header(path) {
        Ok(header) => header.series_uid == *series,
        Err(err) => err.is_incomplete(),
    }
}

fn relocate(file: &ClassifiedFile) -> io::Result<()> {
    if let Some(parent) = file.destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&file.source, &file.destination)
}

/// Returns a short label for a transition, for log fields.
pub(crate) const fn transition_label(transition: &Transition) -> &'static str {
    match transition {
        Transition::Adopted => "adopted",
        Transition::Continued => "continued",
        Transition::Boundary { .. } => "boundary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WatchEvent;
    use crate::filter::PatternFilter;
    use sb_dicom::synth::SynthInstance;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    struct Harness {
        _dir: TempDir,
        root: Utf8PathBuf,
        dispatcher: Dispatcher<PatternFilter>,
        session: Arc<Mutex<WatchSession>>,
        stats: Arc<Mutex<DispatchStats>>,
        events: broadcast::Receiver<WatchEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
            let session = Arc::new(Mutex::new(WatchSession::new(root.clone())));
            let stats = Arc::new(Mutex::new(DispatchStats::default()));
            let publisher = EventPublisher::new(64);
            let events = publisher.subscribe();
            let dispatcher = Dispatcher::new(
                root.clone(),
                Arc::new(PatternFilter::new("*.dcm").unwrap()),
                Arc::clone(&session),
                publisher,
                Arc::clone(&stats),
                CancellationToken::new(),
            );
            Self {
                _dir: dir,
                root,
                dispatcher,
                session,
                stats,
                events,
            }
        }

        fn drop_file(&self, name: &str, study: &str, series: &str) -> Utf8PathBuf {
            let path = self.root.join(name);
            SynthInstance::new(study, series).write_to(&path).unwrap();
            path
        }

        fn drain(&mut self) -> Vec<WatchEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[test]
    fn test_first_file_is_moved_and_announced() {
        let mut h = Harness::new();
        let path = h.drop_file("a.dcm", "1.1", "1.1.1");

        let outcome = h.dispatcher.handle_path(&path);

        assert_eq!(outcome, Outcome::Arrived { reset: false });
        let dest = h.root.join("1.1").join("1.1.1").join("a.dcm");
        assert!(dest.is_file());
        assert!(!path.exists());

        let events = h.drain();
        assert_eq!(events.len(), 1);
        let arrival = events[0].as_arrival().unwrap();
        assert_eq!(arrival.path, dest);
        assert_eq!(arrival.header.series_uid.as_str(), "1.1.1");
        assert_eq!(h.stats.lock().arrivals, 1);
    }

    #[test]
    fn test_same_series_accumulates() {
        let mut h = Harness::new();
        for name in ["a.dcm", "b.dcm", "c.dcm"] {
            let path = h.drop_file(name, "1.1", "1.1.1");
            assert_eq!(h.dispatcher.handle_path(&path), Outcome::Arrived { reset: false });
        }

        let series_dir = h.root.join("1.1").join("1.1.1");
        assert_eq!(series_dir.read_dir_utf8().unwrap().count(), 3);
        assert!(h.drain().iter().all(|e| e.as_arrival().is_some()));
    }

    #[test]
    fn test_series_change_resets_before_arrival() {
        let mut h = Harness::new();
        let first = h.drop_file("a.dcm", "1.1", "1.1.1");
        h.dispatcher.handle_path(&first);
        h.drain();

        let second = h.drop_file("b.dcm", "1.1", "1.1.2");
        let outcome = h.dispatcher.handle_path(&second);

        assert_eq!(outcome, Outcome::Arrived { reset: true });
        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_reset());
        assert_eq!(
            events[1].as_arrival().unwrap().path,
            h.root.join("1.1").join("1.1.2").join("b.dcm")
        );
        // the whole previous study tree went, then the new series was created
        assert!(!h.root.join("1.1").join("1.1.1").exists());
        assert_eq!(h.stats.lock().resets, 1);
        let baseline = h.session.lock().baseline().cloned().unwrap();
        assert_eq!(baseline.series.as_str(), "1.1.2");
    }

    #[test]
    fn test_one_reset_right_before_first_new_series_arrival() {
        let mut h = Harness::new();
        for (name, series) in [("1.dcm", "1.1.1"), ("2.dcm", "1.1.1"), ("3.dcm", "1.1.2"), ("4.dcm", "1.1.2")] {
            let path = h.drop_file(name, "1.1", series);
            h.dispatcher.handle_path(&path);
        }

        let kinds: Vec<&str> = h
            .drain()
            .iter()
            .map(|e| if e.is_reset() { "reset" } else { "arrival" })
            .collect();
        assert_eq!(kinds, ["arrival", "arrival", "reset", "arrival", "arrival"]);
    }

    #[test]
    fn test_boundary_sweeps_old_strays_and_keeps_new_ones() {
        let mut h = Harness::new();
        let first = h.drop_file("a.dcm", "1.1", "1.1.1");
        h.dispatcher.handle_path(&first);

        // stragglers waiting at the top of the root
        let old_stray = h.drop_file("old.dcm", "1.1", "1.1.1");
        let new_stray = h.drop_file("new.dcm", "1.1", "1.1.2");
        let partial = h.root.join("partial.dcm");
        fs::write(&partial, b"DICM").unwrap();
        let unrelated = h.root.join("notes.txt");
        fs::write(&unrelated, b"x").unwrap();

        let trigger = h.drop_file("b.dcm", "1.1", "1.1.2");
        h.dispatcher.handle_path(&trigger);

        assert!(!old_stray.exists());
        assert!(new_stray.exists());
        assert!(partial.exists());
        assert!(unrelated.exists());
        h.drain();

        // the kept stray is still dispatched normally afterwards
        assert_eq!(h.dispatcher.handle_path(&new_stray), Outcome::Arrived { reset: false });
    }

    #[test]
    fn test_not_dicom_is_skipped_without_state_change() {
        let mut h = Harness::new();
        let path = h.root.join("junk.dcm");
        fs::write(&path, vec![0u8; 200]).unwrap();

        assert_eq!(h.dispatcher.handle_path(&path), Outcome::Skipped);
        assert!(path.exists());
        assert!(h.session.lock().baseline().is_none());
        assert!(h.drain().is_empty());
        assert_eq!(h.stats.lock().skipped_not_dicom, 1);
    }

    #[test]
    fn test_missing_identifiers_count_as_failed() {
        let mut h = Harness::new();
        let path = h.root.join("noseries.dcm");
        SynthInstance::new("1.1", "1.1.1")
            .without_series()
            .write_to(&path)
            .unwrap();

        assert_eq!(h.dispatcher.handle_path(&path), Outcome::Skipped);
        assert!(path.exists());
        assert!(h.drain().is_empty());
        let stats = *h.stats.lock();
        assert_eq!(stats.skipped_failed, 1);
        assert_eq!(stats.skipped_not_dicom, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_cleanup_still_moves_trigger() {
        use std::os::unix::fs::PermissionsExt;

        let mut h = Harness::new();
        let first = h.drop_file("a.dcm", "1.1", "1.1.1");
        h.dispatcher.handle_path(&first);
        h.drain();

        // the old study can be read but its series folder cannot be unlinked
        let locked = h.root.join("1.1");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        let privileged = fs::create_dir(locked.join("writable")).is_ok();

        let trigger = h.drop_file("b.dcm", "2.2", "2.2.1");
        let outcome = h.dispatcher.handle_path(&trigger);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(outcome, Outcome::Arrived { reset: true });
        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_reset());
        let dest = h.root.join("2.2").join("2.2.1").join("b.dcm");
        assert_eq!(events[1].as_arrival().unwrap().path, dest);
        assert!(dest.is_file());
        assert!(!trigger.exists());

        let baseline = h.session.lock().baseline().cloned().unwrap();
        assert_eq!(baseline.series.as_str(), "2.2.1");
        assert_eq!(h.stats.lock().resets, 1);
        if !privileged {
            assert!(locked.join("1.1.1").exists());
        }
    }

    #[test]
    fn test_vanished_file_is_ignored() {
        let mut h = Harness::new();
        let path = h.root.join("gone.dcm");

        assert_eq!(h.dispatcher.handle_path(&path), Outcome::Ignored);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_non_matching_and_nested_paths_are_ignored() {
        let h = Harness::new();
        let txt = h.root.join("a.txt");
        SynthInstance::new("1.1", "1.1.1").write_to(&txt).unwrap();
        let nested_dir = h.root.join("1.1");
        fs::create_dir_all(&nested_dir).unwrap();
        let nested = nested_dir.join("b.dcm");
        SynthInstance::new("1.1", "1.1.1").write_to(&nested).unwrap();

        assert_eq!(h.dispatcher.handle_path(&txt), Outcome::Ignored);
        assert_eq!(h.dispatcher.handle_path(&nested), Outcome::Ignored);
        assert!(txt.exists());
        assert!(nested.exists());
    }

    #[test]
    fn test_move_replaces_existing_destination() {
        let mut h = Harness::new();
        let first = h.drop_file("a.dcm", "1.1", "1.1.1");
        h.dispatcher.handle_path(&first);

        let again = h.drop_file("a.dcm", "1.1", "1.1.1");
        assert_eq!(h.dispatcher.handle_path(&again), Outcome::Arrived { reset: false });
        assert_eq!(h.drain().len(), 2);
    }

    #[test]
    fn test_dispatch_existing_handles_files_in_name_order() {
        let mut h = Harness::new();
        h.drop_file("b.dcm", "1.1", "1.1.2");
        h.drop_file("a.dcm", "1.1", "1.1.1");

        assert_eq!(h.dispatcher.dispatch_existing(), 2);

        let events = h.drain();
        // a.dcm adopts 1.1.1, b.dcm then starts 1.1.2
        assert_eq!(events.len(), 3);
        assert!(events[1].is_reset());
        assert_eq!(h.stats.lock().resets, 1);
    }

    #[test]
    fn test_handle_event_skips_removals() {
        let mut h = Harness::new();
        let path = h.drop_file("a.dcm", "1.1", "1.1.1");

        let removal = notify::Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
            .add_path(path.clone().into_std_path_buf());
        h.dispatcher.handle_event(&removal);
        assert!(path.exists());

        let create = notify::Event::new(EventKind::Create(notify::event::CreateKind::Any))
            .add_path(path.clone().into_std_path_buf());
        h.dispatcher.handle_event(&create);
        assert!(!path.exists());
        assert_eq!(h.drain().len(), 1);
    }

    #[test]
    fn test_transition_label() {
        assert_eq!(transition_label(&Transition::Adopted), "adopted");
        assert_eq!(transition_label(&Transition::Continued), "continued");
    }
}
