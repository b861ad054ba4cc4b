//! Portable dataset archives.
//!
//! # Responsibility
//! - Pack a full dataset snapshot plus photo assets into one zip container.
//! - Unpack containers, merge their settings with running defaults and
//!   replace the live dataset atomically.
//!
//! # Invariants
//! - Nothing is written to the store unless parsing, asset decoding and
//!   reconciliation all succeed.
//! - The commit clears and refills every collection in one transaction.

use crate::db::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod codec;
pub mod document;
pub mod photo;
pub mod reconcile;
pub mod restore;

pub use codec::{export_archive, export_to_path, open_container, unpack_archive, ExportSummary};
pub use document::{snapshot, ArchiveDocument};
pub use reconcile::{merge_menu_order, reconcile_settings};
pub use restore::{import_archive, import_from_path, ImportStage, ImportSummary};

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors from archive export/import.
#[derive(Debug)]
pub enum ArchiveError {
    /// Container is not a zip, lacks `data.json`, or holds a malformed document.
    Format(String),
    /// One binary asset entry could not be decoded.
    AssetDecode { entry: String, reason: String },
    /// Archived settings could not be merged with the running defaults.
    Reconciliation(String),
    Store(StoreError),
    Io(std::io::Error),
}

impl ArchiveError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Format(_) => "archive_format",
            Self::AssetDecode { .. } => "asset_decode",
            Self::Reconciliation(_) => "reconciliation",
            Self::Store(err) => err.code(),
            Self::Io(_) => "io_error",
        }
    }
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(message) => write!(f, "invalid archive: {message}"),
            Self::AssetDecode { entry, reason } => {
                write!(f, "failed to decode archive asset `{entry}`: {reason}")
            }
            Self::Reconciliation(message) => {
                write!(f, "failed to merge archived settings: {message}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "archive i/o failed: {err}"),
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ArchiveError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
