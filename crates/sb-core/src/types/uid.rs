//! Validated DICOM unique identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UidError;

/// Longest identifier accepted; one path component on common filesystems.
const MAX_UID_BYTES: usize = 255;

/// A study or series identifier that is safe to use as a directory name.
///
/// Raw header values are trimmed of DICOM padding (trailing NUL and space)
/// before validation. The inner string never contains a path separator or
/// control character and is never `.` or `..`.
///
/// # Examples
///
/// ```
/// use sb_core::Uid;
///
/// let uid = Uid::parse("1.2.840.113619.2.55\0").unwrap();
/// assert_eq!(uid.as_str(), "1.2.840.113619.2.55");
///
/// assert!(Uid::parse("../etc").is_err());
/// assert!(Uid::parse("\0 ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Parses a raw header value into a validated identifier.
    pub fn parse(raw: &str) -> Result<Self, UidError> {
        let value = raw.trim_matches(|c: char| c == '\0' || c == ' ');
        if value.is_empty() {
            return Err(UidError::Empty);
        }
        if value == "." || value == ".." {
            return Err(UidError::Reserved(value.to_owned()));
        }
        if value.len() > MAX_UID_BYTES {
            return Err(UidError::TooLong(value.len()));
        }
        if let Some(ch) = value
            .chars()
            .find(|&c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(UidError::ForbiddenCharacter {
                value: value.to_owned(),
                ch,
            });
        }
        Ok(Self(value.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uid {
    type Error = UidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}
