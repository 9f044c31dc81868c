//! Polling acquisition watcher that sorts DICOM instances by run.
//!
//! A scanner (or a DICOM receiver) drops instance files into a flat watch
//! root. This crate polls that root, reads each new file's study and series
//! identifiers, and moves the file to `<root>/<study>/<series>/<name>`.
//!
//! # Overview
//!
//! - The first instance of a session becomes the **baseline** run
//! - Instances of the same series simply accumulate
//! - An instance of a different series is a **run boundary**: the previous
//!   run's study directory and any stray top-level files are removed, a
//!   [`WatchEvent::Reset`] is published, and the new series becomes the
//!   baseline
//! - Every moved instance is announced as a [`WatchEvent::Arrival`]
//! - Files that are not (yet) readable as DICOM are skipped and picked up
//!   again on their next modification
//!
//! Only one run is ever kept on disk. Stopping the watcher removes the root
//! entirely.
//!
//! # Crate Dependencies
//!
//! ```text
//! sb-cli ──► sb-watcher ──► sb-dicom ──► sb-core
//!                      └─────────────────►
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use sb_core::WatchConfig;
//! use sb_watcher::{DicomWatcher, WatchEvent};
//!
//! # async fn example() -> Result<(), sb_watcher::WatchError> {
//! let config = WatchConfig::default().with_root("/data/incoming");
//! let mut watcher = DicomWatcher::new(&config)?;
//! let mut events = watcher.subscribe();
//! watcher.start().await?;
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let WatchEvent::Arrival(arrival) = event {
//!             println!("{} -> series {}", arrival.path, arrival.header.series_uid);
//!         }
//!     }
//! });
//!
//! // ... later
//! watcher.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Per-file problems never stop the watcher. They are logged through
//! `tracing` and counted in [`DispatchStats`]. Only lifecycle failures
//! surface as [`WatchError`]:
//!
//! ```
//! use sb_watcher::WatchError;
//!
//! fn handle_watch_error(err: WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {err}");
//!     } else {
//!         eprintln!("Warning: {err}");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod cleanup;
mod dispatcher;
pub mod error;
pub mod events;
pub mod filter;
pub mod session;
pub mod watcher;

// Re-export error types
pub use error::{CleanupError, WatchError};

// Re-export event types
pub use events::{Arrival, DispatchStats, EventPublisher, WatchEvent};

// Re-export filter types
pub use filter::{AcceptAllFilter, FileFilter, PatternFilter};

// Re-export state machine types
pub use session::{RunState, Transition, WatchSession};

// Re-export watcher types
pub use watcher::{DicomWatcher, StopHandle};
