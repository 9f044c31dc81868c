//! Events published by the watcher and the publisher that fans them out.
//!
//! Two kinds of event leave the watcher:
//!
//! - [`WatchEvent::Arrival`] once an instance has been moved into its
//!   `<root>/<study>/<series>/` folder
//! - [`WatchEvent::Reset`] when a run boundary has been detected and the
//!   previous run's data removed
//!
//! For a file that triggers a boundary, the reset is always published
//! before that file's arrival.
//!
//! # Event Flow
//!
//! ```text
//! poll event ─► read header ─► session ─┬─► cleanup ─► Reset
//!                                       └─► move ─────► Arrival
//!                                                          │
//!                                             broadcast::Sender
//!                                                          │
//!                                          ┌───────────────┼───────────────┐
//!                                          ▼               ▼               ▼
//!                                     subscriber      subscriber      subscriber
//! ```

use camino::Utf8PathBuf;
use sb_core::HeaderFields;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An instance that has been moved into its run folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    /// Header fields read from the instance.
    pub header: HeaderFields,

    /// Where the file now lives.
    pub path: Utf8PathBuf,
}

/// A notification emitted by the watcher.
///
/// Serialized with a `kind` tag so JSON consumers can switch on it:
///
/// ```
/// use sb_watcher::WatchEvent;
///
/// let json = serde_json::to_string(&WatchEvent::Reset).unwrap();
/// assert_eq!(json, r#"{"kind":"reset"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchEvent {
    /// An instance was classified and moved.
    Arrival(Arrival),

    /// The previous run was discarded.
    Reset,
}

impl WatchEvent {
    /// Returns the arrival payload, if this is an arrival.
    #[must_use]
    pub const fn as_arrival(&self) -> Option<&Arrival> {
        match self {
            Self::Arrival(arrival) => Some(arrival),
            Self::Reset => None,
        }
    }

    /// Returns `true` for [`WatchEvent::Reset`].
    #[must_use]
    pub const fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }
}

/// Fan-out publisher for [`WatchEvent`]s.
///
/// Any number of subscribers may listen. Publishing with no subscribers is
/// not an error; the event is simply dropped. A subscriber that falls more
/// than the channel capacity behind sees `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<WatchEvent>,
}

impl EventPublisher {
    /// Creates a publisher whose channel holds up to `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber.
    ///
    /// The subscriber sees every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an arrival. Returns the number of subscribers reached.
    pub fn publish_arrival(&self, header: HeaderFields, path: Utf8PathBuf) -> usize {
        tracing::info!(path = %path, series = %header.series_uid, "publishing arrival");
        self.publish(WatchEvent::Arrival(Arrival { header, path }))
    }

    /// Publishes a reset. Returns the number of subscribers reached.
    pub fn publish_reset(&self) -> usize {
        tracing::debug!("publishing reset");
        self.publish(WatchEvent::Reset)
    }

    fn publish(&self, event: WatchEvent) -> usize {
        // Err only means nobody is listening right now.
        self.sender.send(event).unwrap_or(0)
    }
}

/// Counters describing what the dispatch loop has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Instances moved and announced.
    pub arrivals: u64,

    /// Run boundaries handled.
    pub resets: u64,

    /// Candidates that were not (yet) readable as DICOM.
    pub skipped_not_dicom: u64,

    /// Candidates that disappeared before they could be handled.
    pub skipped_vanished: u64,

    /// Candidates that failed to read for any other reason.
    pub skipped_failed: u64,

    /// Instances that were read but could not be moved.
    pub move_failures: u64,
}

impl DispatchStats {
    /// Total number of candidates that did not produce an arrival.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped_not_dicom + self.skipped_vanished + self.skipped_failed + self.move_failures
    }
}
