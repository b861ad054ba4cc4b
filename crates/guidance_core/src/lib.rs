//! Core domain logic for the guidance counseling records store.
//! This crate is the single source of truth for storage and archive invariants.

pub mod archive;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;

pub use archive::{
    export_archive, export_to_path, import_archive, import_from_path, snapshot, ArchiveDocument,
    ArchiveError, ArchiveResult, ExportSummary, ImportStage, ImportSummary,
};
pub use config::CoreConfig;
pub use db::{open_db, open_db_in_memory, Collection, Store, StoreError, StoreResult, Tx};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::roster::{Classroom, CounselingNeededInfo, SpecialStudentInfo, Student};
pub use model::session::{Session, SessionType};
pub use model::settings::{AppSettings, SyncState, WorkingDays};
pub use service::roster_service::{CascadeReport, RosterError, RosterResult, RosterService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
