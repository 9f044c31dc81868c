//! Minimal DICOM Part 10 header reader.
//!
//! Incoming instances only need to be classified into their acquisition run,
//! so this crate reads just enough of each file to extract the study and
//! series identifiers (plus a few cheap extras) and stops before pixel data.
//!
//! # Overview
//!
//! - [`read_header`] - Open a file and return its [`HeaderFields`]
//! - [`ReadError`] - Why a file was skipped, classified for logging
//! - [`TransferSyntax`] - Dataset encodings the reader understands
//!
//! # Usage
//!
//! ```no_run
//! use camino::Utf8Path;
//! use sb_dicom::read_header;
//!
//! match read_header(Utf8Path::new("/tmp/scanbuddy/IM0001.dcm")) {
//!     Ok(header) => println!("series {}", header.series_uid),
//!     Err(err) if err.is_transient() => {} // partial write or already moved
//!     Err(err) => eprintln!("skipping: {err}"),
//! }
//! ```
//!
//! # Supported Encodings
//!
//! The file meta group is always explicit VR little endian. The dataset may
//! be implicit VR little endian, explicit VR little endian (including every
//! encapsulated pixel syntax), or explicit VR big endian. Deflated datasets
//! are rejected.
//!
//! [`HeaderFields`]: sb_core::HeaderFields

#![deny(clippy::all)]
#![warn(missing_docs)]

mod element;
pub mod error;
pub mod reader;
pub mod syntax;
pub mod tags;

#[cfg(any(test, feature = "test-support"))]
pub mod synth;

pub use error::ReadError;
pub use reader::{read_header, read_header_from};
pub use syntax::{Endian, TransferSyntax};
pub use tags::Tag;
