//! Collection catalog and record contracts.
//!
//! # Responsibility
//! - Name every persisted collection and map it to its SQLite table.
//! - Declare the secondary indexes each collection supports.
//! - Define how typed records and singleton slots bind to collections.
//!
//! # Invariants
//! - Every table has the shape `(id TEXT PRIMARY KEY, data TEXT NOT NULL)`.
//! - Index lookups compare `json_extract(data, path)` with the probe key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Persisted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Classrooms,
    Students,
    Sessions,
    SessionTypes,
    SpecialStudentInfo,
    CounselingNeededInfo,
    /// Key-value slot table holding singleton records.
    Settings,
}

/// Secondary index over one JSON field of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Caller-facing index name (the indexed field name).
    pub name: &'static str,
    /// JSON path passed to `json_extract`.
    pub path: &'static str,
    /// SQLite index object name.
    pub sql_name: &'static str,
    pub unique: bool,
}

const CLASSROOM_INDEXES: &[IndexSpec] = &[IndexSpec {
    name: "academicYear",
    path: "$.academicYear",
    sql_name: "idx_classrooms_academic_year",
    unique: false,
}];

const STUDENT_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "classroomId",
        path: "$.classroomId",
        sql_name: "idx_students_classroom_id",
        unique: false,
    },
    IndexSpec {
        name: "nationalId",
        path: "$.nationalId",
        sql_name: "idx_students_national_id",
        unique: true,
    },
    IndexSpec {
        name: "academicYear",
        path: "$.academicYear",
        sql_name: "idx_students_academic_year",
        unique: false,
    },
];

const SESSION_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "studentId",
        path: "$.studentId",
        sql_name: "idx_sessions_student_id",
        unique: false,
    },
    IndexSpec {
        name: "sessionTypeId",
        path: "$.sessionTypeId",
        sql_name: "idx_sessions_session_type_id",
        unique: false,
    },
    IndexSpec {
        name: "academicYear",
        path: "$.academicYear",
        sql_name: "idx_sessions_academic_year",
        unique: false,
    },
];

impl Collection {
    pub const COUNT: usize = 7;

    /// Every collection, in global lock order.
    pub const ALL: [Collection; Self::COUNT] = [
        Collection::Classrooms,
        Collection::CounselingNeededInfo,
        Collection::SessionTypes,
        Collection::Sessions,
        Collection::Settings,
        Collection::SpecialStudentInfo,
        Collection::Students,
    ];

    /// External name, used in archives, logs and lock ordering.
    pub fn name(self) -> &'static str {
        match self {
            Self::Classrooms => "classrooms",
            Self::Students => "students",
            Self::Sessions => "sessions",
            Self::SessionTypes => "sessionTypes",
            Self::SpecialStudentInfo => "specialStudentInfo",
            Self::CounselingNeededInfo => "counselingNeededInfo",
            Self::Settings => "settings",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Classrooms => "classrooms",
            Self::Students => "students",
            Self::Sessions => "sessions",
            Self::SessionTypes => "session_types",
            Self::SpecialStudentInfo => "special_student_info",
            Self::CounselingNeededInfo => "counseling_needed_info",
            Self::Settings => "settings",
        }
    }

    pub fn indexes(self) -> &'static [IndexSpec] {
        match self {
            Self::Classrooms => CLASSROOM_INDEXES,
            Self::Students => STUDENT_INDEXES,
            Self::Sessions => SESSION_INDEXES,
            Self::SessionTypes
            | Self::SpecialStudentInfo
            | Self::CounselingNeededInfo
            | Self::Settings => &[],
        }
    }

    pub fn index(self, name: &str) -> Option<&'static IndexSpec> {
        self.indexes().iter().find(|spec| spec.name == name)
    }

    /// Position in the lock table.
    pub(crate) fn slot(self) -> usize {
        match self {
            Self::Classrooms => 0,
            Self::CounselingNeededInfo => 1,
            Self::SessionTypes => 2,
            Self::Sessions => 3,
            Self::Settings => 4,
            Self::SpecialStudentInfo => 5,
            Self::Students => 6,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed record stored in exactly one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Primary key value.
    fn key(&self) -> &str;
}

/// A record whose key is generated by the store on `add`.
///
/// Records keyed by another record's id (the per-student flags) do not
/// implement this and can only be written with `put`.
///
/// ```compile_fail
/// use guidance_core::{open_db_in_memory, SpecialStudentInfo};
///
/// let store = open_db_in_memory().unwrap();
/// store.add(SpecialStudentInfo {
///     student_id: "s1".to_string(),
///     is_special: true,
///     notes: None,
/// });
/// ```
pub trait EngineKeyed: Record {
    /// Replaces the primary key with an engine id.
    fn set_key(&mut self, key: String);
}

/// A singleton record stored under a fixed slot of `Collection::Settings`.
pub trait Singleton: Serialize + DeserializeOwned + Default {
    const SLOT: &'static str;
}

#[cfg(test)]
mod tests {
    use super::Collection;

    #[test]
    fn all_is_sorted_by_name_and_matches_slots() {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        for (position, collection) in Collection::ALL.iter().enumerate() {
            assert_eq!(collection.slot(), position);
        }
    }

    #[test]
    fn index_lookup_is_per_collection() {
        assert!(Collection::Students.index("classroomId").is_some());
        assert!(Collection::Sessions.index("classroomId").is_none());
        assert!(Collection::SessionTypes.indexes().is_empty());
    }
}
