//! Domain types for scanbuddy.
//!
//! - [`uid`] - Validated study/series identifiers
//! - [`header`] - Header fields and run identity
//! - [`classified`] - A file paired with its destination
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use sb_core::{ClassifiedFile, HeaderFields, RunIdentity, Uid};
//! ```

mod classified;
mod header;
mod uid;

pub use classified::ClassifiedFile;
pub use header::{HeaderFields, RunIdentity};
pub use uid::Uid;
