//! The polling watcher and its lifecycle.
//!
//! [`DicomWatcher`] owns the watch root for its whole life: `start` creates
//! it, `stop` removes it. In between a blocking task polls the root and
//! feeds each change through the dispatcher.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Blocking Thread (spawn_blocking)             │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐  │
//! │  │ PollWatcher      │ -> │ std mpsc       │ -> │ Dispatcher │  │
//! │  │ (notify)         │    │ (recv_timeout) │    │ (one file) │  │
//! │  └──────────────────┘    └────────────────┘    └─────┬──────┘  │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │
//!                                       broadcast::send  │
//!                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌─────────────────────┐                │
//! │  │ DicomWatcher     │    │ broadcast::Receiver │ -> subscribers │
//! │  │ (cancel token)   │    │ (WatchEvent)        │                │
//! │  └──────────────────┘    └─────────────────────┘                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use sb_core::WatchConfig;
//! use sb_watcher::{DicomWatcher, WatchEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut watcher = DicomWatcher::new(&WatchConfig::default())?;
//!     let mut events = watcher.subscribe();
//!     watcher.start().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             WatchEvent::Arrival(arrival) => println!("new file: {}", arrival.path),
//!             WatchEvent::Reset => println!("new run"),
//!         }
//!     }
//!
//!     watcher.stop().await?;
//!     Ok(())
//! }
//! ```

use std::io;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::{PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use sb_core::{RunIdentity, WatchConfig};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::WatchError;
use crate::events::{DispatchStats, EventPublisher, WatchEvent};
use crate::filter::{FileFilter, PatternFilter};
use crate::session::WatchSession;

/// Upper bound on how long the dispatch loop waits before rechecking for
/// cancellation.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A cloneable handle that stops a running [`DicomWatcher`].
///
/// Useful when the watcher itself is owned elsewhere, e.g. by a task that
/// is awaiting [`DicomWatcher::join`]. Stopping through the handle ends the
/// dispatch loop and tears down the root; the owner observes it as `join`
/// returning.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Requests a stop. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Watches a root directory for incoming DICOM instances and sorts them into
/// `<root>/<study>/<series>/`.
///
/// # Lifecycle
///
/// 1. **Creation**: [`DicomWatcher::new`] validates the configuration. Nothing
///    touches the filesystem yet.
/// 2. **Start**: [`DicomWatcher::start`] creates the root, handles any files
///    already there, and begins polling.
/// 3. **Stop**: [`DicomWatcher::stop`] halts polling, waits for the dispatch
///    loop to finish the file in hand, then removes the root and everything
///    under it. No event is published after `stop` returns.
///
/// Dropping a started watcher without calling `stop` requests the same
/// shutdown but does not wait for it.
pub struct DicomWatcher<F: FileFilter = PatternFilter> {
    root: Utf8PathBuf,
    poll_interval: Duration,
    filter: Arc<F>,
    session: Arc<Mutex<WatchSession>>,
    publisher: EventPublisher,
    stats: Arc<Mutex<DispatchStats>>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,
}

impl<F: FileFilter> std::fmt::Debug for DicomWatcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DicomWatcher")
            .field("root", &self.root)
            .field("poll_interval", &self.poll_interval)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DicomWatcher<PatternFilter> {
    /// Creates a watcher that accepts files matching `config.file_pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] if the configuration is invalid and
    /// [`WatchError::Pattern`] if the file pattern is not a valid glob.
    pub fn new(config: &WatchConfig) -> Result<Self, WatchError> {
        let filter = PatternFilter::new(&config.file_pattern)?;
        Self::with_filter(config, filter)
    }
}

impl<F: FileFilter> DicomWatcher<F> {
    /// Creates a watcher with a custom candidate filter.
    ///
    /// `config.file_pattern` is ignored; `filter` decides instead.
    pub fn with_filter(config: &WatchConfig, filter: F) -> Result<Self, WatchError> {
        config.validate()?;
        Ok(Self {
            root: config.root.clone(),
            poll_interval: config.poll_interval(),
            filter: Arc::new(filter),
            session: Arc::new(Mutex::new(WatchSession::new(config.root.clone()))),
            publisher: EventPublisher::new(config.event_capacity),
            stats: Arc::new(Mutex::new(DispatchStats::default())),
            cancel: CancellationToken::new(),
            task_handle: None,
        })
    }

    /// Registers a subscriber for arrival and reset events.
    ///
    /// Subscribe before [`start`](Self::start) to see events for files that
    /// were already in the root.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.publisher.subscribe()
    }

    /// The watch root. Absolute once the watcher has started.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The run currently being collected, if any instance has arrived.
    #[must_use]
    pub fn baseline(&self) -> Option<RunIdentity> {
        self.session.lock().baseline().cloned()
    }

    /// A snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }

    /// Returns a handle that can stop this watcher from elsewhere.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.cancel.clone(),
        }
    }

    /// Returns `true` while the dispatch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Creates the root and begins polling it.
    ///
    /// Files already in the root are handled first, in name order, before
    /// any poll event.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadyStarted`] or [`WatchError::Stopped`] when
    /// called at the wrong point in the lifecycle, [`WatchError::Io`] if the
    /// root cannot be created, and [`WatchError::Notify`] if the poller
    /// cannot be set up.
    pub async fn start(&mut self) -> Result<(), WatchError> {
        if self.cancel.is_cancelled() {
            return Err(WatchError::Stopped);
        }
        if self.task_handle.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        let root = self.root.clone();
        let root = tokio::task::spawn_blocking(move || prepare_root(&root))
            .await
            .map_err(|e| WatchError::TaskFailed(e.to_string()))??;
        self.root.clone_from(&root);
        *self.session.lock() = WatchSession::new(root.clone());

        let (raw_tx, raw_rx) = mpsc::channel();
        let poll_config = notify::Config::default().with_poll_interval(self.poll_interval);
        let mut poller = PollWatcher::new(raw_tx, poll_config)?;
        poller.watch(root.as_std_path(), RecursiveMode::NonRecursive)?;

        let dispatcher = Dispatcher::new(
            root.clone(),
            Arc::clone(&self.filter),
            Arc::clone(&self.session),
            self.publisher.clone(),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        );
        let cancel = self.cancel.clone();
        let tick = self.poll_interval.min(CANCEL_CHECK_INTERVAL);

        self.task_handle = Some(tokio::task::spawn_blocking(move || {
            run_dispatch_loop(&dispatcher, poller, &raw_rx, &cancel, tick);
            teardown_root(&root);
            Ok(())
        }));

        tracing::info!(
            root = %self.root,
            poll_interval = ?self.poll_interval,
            "watcher started"
        );
        Ok(())
    }

    /// Waits for the dispatch loop to end, e.g. after a [`StopHandle`] fired.
    ///
    /// Returns immediately if the watcher was never started.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TaskFailed`] if the dispatch task panicked.
    pub async fn join(&mut self) -> Result<(), WatchError> {
        let Some(handle) = self.task_handle.as_mut() else {
            return Ok(());
        };
        // Cleared only once the task has finished.
        let joined = handle.await;
        self.task_handle = None;
        joined.map_err(|e| WatchError::TaskFailed(e.to_string()))?
    }

    /// Stops polling, waits for the dispatch loop, and removes the root.
    ///
    /// Safe to call more than once, and on a watcher that never started.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TaskFailed`] if the dispatch task panicked.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        self.cancel.cancel();
        if self.task_handle.is_some() {
            self.join().await
        } else {
            let root = self.root.clone();
            tokio::task::spawn_blocking(move || teardown_root(&root))
                .await
                .map_err(|e| WatchError::TaskFailed(e.to_string()))
        }
    }
}

impl<F: FileFilter> Drop for DicomWatcher<F> {
    fn drop(&mut self) {
        // The task notices the cancellation on its next tick and tears down
        // the root on its own.
        self.cancel.cancel();
    }
}

/// Creates the root if needed and returns its absolute form.
fn prepare_root(root: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    std::fs::create_dir_all(root).map_err(|e| WatchError::io(root, e))?;
    root.canonicalize_utf8().map_err(|e| WatchError::io(root, e))
}

/// Pulls poll events and dispatches them until cancelled.
///
/// The poller is dropped before returning so nothing is scanning the root
/// while it is being removed.
fn run_dispatch_loop<F: FileFilter>(
    dispatcher: &Dispatcher<F>,
    poller: PollWatcher,
    raw_rx: &mpsc::Receiver<notify::Result<notify::Event>>,
    cancel: &CancellationToken,
    tick: Duration,
) {
    dispatcher.dispatch_existing();

    while !cancel.is_cancelled() {
        match raw_rx.recv_timeout(tick) {
            Ok(Ok(event)) => dispatcher.handle_event(&event),
            Ok(Err(error)) => tracing::warn!(error = %error, "poll error"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!("poller channel closed, stopping dispatch");
                break;
            }
        }
    }

    drop(poller);
    let stats = dispatcher.stats();
    tracing::info!(
        arrivals = stats.arrivals,
        resets = stats.resets,
        skipped = stats.skipped(),
        "watcher stopped"
    );
}

/// Removes the root and everything below it. Failures are logged.
fn teardown_root(root: &Utf8Path) {
    match std::fs::remove_dir_all(root) {
        Ok(()) => tracing::info!(root = %root, "removed watch root"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(root = %root, "watch root already gone");
        }
        Err(e) => tracing::warn!(root = %root, error = %e, "failed to remove watch root"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAllFilter;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Accepts everything, but holds up the first file it is asked about.
    #[derive(Default)]
    struct StallingFilter {
        stalled: AtomicBool,
    }

    impl FileFilter for StallingFilter {
        fn should_process(&self, _path: &Utf8Path) -> bool {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(800));
            }
            true
        }
    }

    fn config_in(dir: &TempDir) -> WatchConfig {
        let root = Utf8PathBuf::from_path_buf(dir.path().join("incoming")).unwrap();
        let mut config = WatchConfig::default().with_root(root);
        config.poll_interval_ms = 50;
        config
    }

    #[tokio::test]
    async fn test_new_does_not_touch_filesystem() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let watcher = DicomWatcher::new(&config).unwrap();

        assert!(!config.root.exists());
        assert!(!watcher.is_running());
        assert!(watcher.baseline().is_none());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_pattern() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.file_pattern = "[".to_owned();

        let err = DicomWatcher::new(&config).unwrap_err();
        assert!(matches!(err, WatchError::Pattern(_)));
    }

    #[tokio::test]
    async fn test_start_creates_and_stop_removes_root() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut watcher = DicomWatcher::with_filter(&config, AcceptAllFilter).unwrap();

        watcher.start().await.unwrap();
        assert!(watcher.root().is_dir());
        assert!(watcher.is_running());

        watcher.stop().await.unwrap();
        assert!(!config.root.exists());
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DicomWatcher::new(&config_in(&dir)).unwrap();

        watcher.start().await.unwrap();
        assert!(matches!(watcher.start().await, Err(WatchError::AlreadyStarted)));
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_stop_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DicomWatcher::new(&config_in(&dir)).unwrap();

        watcher.start().await.unwrap();
        watcher.stop().await.unwrap();
        assert!(matches!(watcher.start().await, Err(WatchError::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_works_unstarted() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.root).unwrap();
        let mut watcher = DicomWatcher::new(&config).unwrap();

        watcher.stop().await.unwrap();
        watcher.stop().await.unwrap();
        assert!(!config.root.exists());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_join() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut watcher = DicomWatcher::new(&config).unwrap();
        watcher.start().await.unwrap();

        let handle = watcher.stop_handle();
        handle.stop();
        assert!(handle.is_stopped());

        tokio::time::timeout(Duration::from_secs(5), watcher.join())
            .await
            .unwrap()
            .unwrap();
        assert!(!config.root.exists());
    }

    #[tokio::test]
    async fn test_stop_waits_after_abandoned_join() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.root).unwrap();
        std::fs::write(config.root.join("first.dcm"), b"not yet").unwrap();

        let mut watcher = DicomWatcher::with_filter(&config, StallingFilter::default()).unwrap();
        watcher.start().await.unwrap();

        // The loop is stuck on the first file, so this join gives up.
        let abandoned = tokio::time::timeout(Duration::from_millis(20), watcher.join()).await;
        assert!(abandoned.is_err());

        watcher.stop().await.unwrap();
        assert!(!config.root.exists());
        assert!(!watcher.is_running());

        // Nothing from the old loop may touch the folder once stop returned.
        std::fs::create_dir_all(&config.root).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(config.root.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_succeeds_when_root_cannot_be_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut watcher = DicomWatcher::with_filter(&config, AcceptAllFilter).unwrap();
        watcher.start().await.unwrap();

        // the root's parent refuses unlinks, so removing the root fails
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o500)).unwrap();
        let privileged = std::fs::create_dir(dir.path().join("writable")).is_ok();

        let stopped = watcher.stop().await;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        stopped.unwrap();
        assert!(!watcher.is_running());
        if !privileged {
            assert!(config.root.exists());
        }
    }
}
