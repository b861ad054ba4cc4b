//! Structured archive document (`data.json`).
//!
//! # Invariants
//! - Missing or `null` collection keys read as empty sequences, so archives
//!   from older schema versions still parse.
//! - Missing `settings` / `workingDays` read as omitted.
//! - Unknown top-level keys are ignored.

use crate::db::{Collection, Record, Store, StoreResult};
use crate::model::roster::{Classroom, CounselingNeededInfo, SpecialStudentInfo, Student};
use crate::model::session::{Session, SessionType};
use crate::model::settings::{AppSettings, WorkingDays};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Well-known name of the structured document inside the container.
pub const DOCUMENT_ENTRY: &str = "data.json";
/// Directory holding one binary entry per exported photo.
pub const PHOTOS_DIR: &str = "photos/";
pub const ARCHIVE_FORMAT: &str = "guidance-archive";
/// Newest document layout this build writes and reads.
pub const ARCHIVE_VERSION: u32 = 2;

/// Full dataset snapshot in archive shape.
///
/// Also the snapshot shape handed to the sync collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub classrooms: Vec<Classroom>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub students: Vec<Student>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub sessions: Vec<Session>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub session_types: Vec<SessionType>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub special_student_info: Vec<SpecialStudentInfo>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub counseling_needed_info: Vec<CounselingNeededInfo>,
    /// Kept untyped so reconciliation sees exactly which fields were archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_days: Option<WorkingDays>,
}

impl ArchiveDocument {
    /// Returns the first collection holding a record without a key.
    pub(crate) fn first_keyless_collection(&self) -> Option<Collection> {
        fn keyless<R: Record>(records: &[R]) -> Option<Collection> {
            records
                .iter()
                .any(|record| record.key().trim().is_empty())
                .then_some(R::COLLECTION)
        }

        keyless(&self.classrooms)
            .or_else(|| keyless(&self.students))
            .or_else(|| keyless(&self.sessions))
            .or_else(|| keyless(&self.session_types))
            .or_else(|| keyless(&self.special_student_info))
            .or_else(|| keyless(&self.counseling_needed_info))
    }
}

/// Reads every collection and singleton in one consistent transaction.
pub fn snapshot(store: &Store) -> StoreResult<ArchiveDocument> {
    store.transaction(&Collection::ALL, |tx| {
        let settings = tx.singleton::<AppSettings>()?.unwrap_or_default();
        Ok(ArchiveDocument {
            format: Some(ARCHIVE_FORMAT.to_string()),
            version: Some(ARCHIVE_VERSION),
            exported_at: Some(Utc::now()),
            classrooms: tx.get_all()?,
            students: tx.get_all()?,
            sessions: tx.get_all()?,
            session_types: tx.get_all()?,
            special_student_info: tx.get_all()?,
            counseling_needed_info: tx.get_all()?,
            settings: Some(serde_json::to_value(&settings)?),
            working_days: tx.singleton::<WorkingDays>()?,
        })
    })
}

fn nullable_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::ArchiveDocument;

    #[test]
    fn older_documents_without_newer_collections_still_parse() {
        let document: ArchiveDocument = serde_json::from_str(
            r#"{
                "classrooms": [{"id": "c1", "name": "9-A"}],
                "students": null,
                "legacyField": 42
            }"#,
        )
        .unwrap();

        assert_eq!(document.classrooms.len(), 1);
        assert!(document.students.is_empty());
        assert!(document.special_student_info.is_empty());
        assert!(document.counseling_needed_info.is_empty());
        assert!(document.settings.is_none());
        assert!(document.working_days.is_none());
        assert_eq!(document.first_keyless_collection(), None);
    }
}
