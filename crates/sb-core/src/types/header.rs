//! Header fields extracted from an instance and the run they identify.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::uid::Uid;

/// The `(study, series)` pair identifying one acquisition run.
///
/// Two identities belong to the same run when their series match; the study
/// is carried so the previous run's directory can be located on disk.
///
/// # Examples
///
/// ```
/// use sb_core::{RunIdentity, Uid};
///
/// let a = RunIdentity::new(Uid::parse("1.1").unwrap(), Uid::parse("1.1.1").unwrap());
/// let b = RunIdentity::new(Uid::parse("1.2").unwrap(), Uid::parse("1.1.1").unwrap());
/// assert!(a.same_run(&b));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Study Instance UID (0020,000D).
    pub study: Uid,
    /// Series Instance UID (0020,000E).
    pub series: Uid,
}

impl RunIdentity {
    /// Creates a new run identity.
    #[inline]
    #[must_use]
    pub const fn new(study: Uid, series: Uid) -> Self {
        Self { study, series }
    }

    /// Returns `true` if `other` continues this run.
    ///
    /// Only the series is compared. A repeated study with a new series is a
    /// new run.
    #[inline]
    #[must_use]
    pub fn same_run(&self, other: &Self) -> bool {
        self.series == other.series
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.study, self.series)
    }
}

/// The header fields read from one instance, without any pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    /// Study Instance UID (0020,000D).
    pub study_uid: Uid,

    /// Series Instance UID (0020,000E).
    pub series_uid: Uid,

    /// SOP Instance UID (0008,0018), if present and valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sop_instance_uid: Option<Uid>,

    /// Series Number (0020,0011), if present and numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_number: Option<i32>,

    /// Instance Number (0020,0013), if present and numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_number: Option<i32>,
}

impl HeaderFields {
    /// Creates header fields carrying only the required identifiers.
    #[must_use]
    pub const fn new(study_uid: Uid, series_uid: Uid) -> Self {
        Self {
            study_uid,
            series_uid,
            sop_instance_uid: None,
            series_number: None,
            instance_number: None,
        }
    }

    /// Returns the run this instance belongs to.
    #[must_use]
    pub fn run_identity(&self) -> RunIdentity {
        RunIdentity::new(self.study_uid.clone(), self.series_uid.clone())
    }
}
