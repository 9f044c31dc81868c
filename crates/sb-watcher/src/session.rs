//! Run-boundary state machine.
//!
//! The session remembers the run identity of the first instance it saw
//! (the baseline) and compares every later instance against it by series.
//! A different series is a boundary: the caller cleans up the previous run
//! and the incoming identity becomes the new baseline.
//!
//! ```text
//!              first instance                  different series
//! Uninitialized ──────────────► Tracking(X) ───────────────────► Tracking(Y)
//!                                   │  ▲
//!                                   └──┘ same series
//! ```
//!
//! The session never leaves `Tracking` once entered; only a fresh watcher
//! starts uninitialized again.

use camino::{Utf8Path, Utf8PathBuf};
use sb_core::RunIdentity;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState<'a> {
    /// No instance has been classified yet.
    Uninitialized,
    /// Instances are compared against this baseline.
    Tracking(&'a RunIdentity),
}

/// What observing an incoming identity did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First instance of the session; it became the baseline.
    Adopted,
    /// Same series as the baseline.
    Continued,
    /// A different series. `previous` is the run that was replaced.
    Boundary {
        /// The baseline before this instance arrived.
        previous: RunIdentity,
    },
}

impl Transition {
    /// Returns `true` for [`Transition::Boundary`].
    #[must_use]
    pub const fn is_boundary(&self) -> bool {
        matches!(self, Self::Boundary { .. })
    }
}

/// Per-watcher session state.
#[derive(Debug, Clone)]
pub struct WatchSession {
    root: Utf8PathBuf,
    baseline: Option<RunIdentity>,
}

impl WatchSession {
    /// Creates an uninitialized session for `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            baseline: None,
        }
    }

    /// The watch root this session classifies into.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The current baseline, if any.
    #[must_use]
    pub const fn baseline(&self) -> Option<&RunIdentity> {
        self.baseline.as_ref()
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> RunState<'_> {
        match &self.baseline {
            None => RunState::Uninitialized,
            Some(baseline) => RunState::Tracking(baseline),
        }
    }

    /// Decides what `incoming` would do without changing anything.
    #[must_use]
    pub fn evaluate(&self, incoming: &RunIdentity) -> Transition {
        match &self.baseline {
            None => Transition::Adopted,
            Some(baseline) if baseline.same_run(incoming) => Transition::Continued,
            Some(baseline) => Transition::Boundary {
                previous: baseline.clone(),
            },
        }
    }

    /// Observes an incoming identity and updates the baseline.
    ///
    /// On a boundary, `on_boundary` runs with the previous baseline before
    /// the new identity is installed, so cleanup always targets the old run.
    pub fn observe<B>(&mut self, incoming: &RunIdentity, on_boundary: B) -> Transition
    where
        B: FnOnce(&RunIdentity),
    {
        let transition = self.evaluate(incoming);
        match &transition {
            Transition::Adopted => {
                tracing::info!(study = %incoming.study, series = %incoming.series, "found first series");
                self.baseline = Some(incoming.clone());
            }
            Transition::Continued => {}
            Transition::Boundary { previous } => {
                tracing::info!(
                    previous_series = %previous.series,
                    series = %incoming.series,
                    "found new series"
                );
                on_boundary(previous);
                self.baseline = Some(incoming.clone());
            }
        }
        transition
    }
}
