//! Core types, configuration, and path classification for scanbuddy.
//!
//! This crate provides the foundational pieces shared across the workspace:
//!
//! - Configuration structures ([`Config`], [`WatchConfig`])
//! - Error types ([`ConfigError`], [`UidError`])
//! - Domain types ([`Uid`], [`RunIdentity`], [`HeaderFields`], [`ClassifiedFile`])
//! - The path classifier ([`destination`], [`run_dir`])
//!
//! # Crate Dependencies
//!
//! ```text
//! sb-cli ──► sb-watcher ──► sb-dicom ──► sb-core
//!                      └─────────────────►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod path;
pub mod types;

pub use config::{Config, WatchConfig};
pub use error::{ConfigError, UidError};
pub use path::{destination, run_dir};
pub use types::{ClassifiedFile, HeaderFields, RunIdentity, Uid};
