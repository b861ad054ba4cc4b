//! Classrooms, students and per-student flag records.
//!
//! # Invariants
//! - `Student::classroom_id` must name an existing classroom (checked by the
//!   roster service, not the store).
//! - `Student::national_id`, when set, is unique across students.
//! - Flag records are keyed by the owning student's id.

use crate::db::{Collection, EngineKeyed, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
}

impl Classroom {
    /// Creates an unsaved classroom; the store assigns `id` on add.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            display_order: None,
            academic_year: None,
        }
    }
}

impl Record for Classroom {
    const COLLECTION: Collection = Collection::Classrooms;

    fn key(&self) -> &str {
        &self.id
    }
}

impl EngineKeyed for Classroom {
    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub classroom_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    /// Inline photo as a `data:<mime>;base64,<payload>` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
}

impl Student {
    pub fn new(
        classroom_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            classroom_id: classroom_id.into(),
            student_number: None,
            gender: None,
            national_id: None,
            photo: None,
            academic_year: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Record for Student {
    const COLLECTION: Collection = Collection::Students;

    fn key(&self) -> &str {
        &self.id
    }
}

impl EngineKeyed for Student {
    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}

/// Special-needs flag for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialStudentInfo {
    pub student_id: String,
    #[serde(default)]
    pub is_special: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Record for SpecialStudentInfo {
    const COLLECTION: Collection = Collection::SpecialStudentInfo;

    fn key(&self) -> &str {
        &self.student_id
    }
}

/// Marks a student as needing counseling follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselingNeededInfo {
    pub student_id: String,
    #[serde(default)]
    pub is_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Record for CounselingNeededInfo {
    const COLLECTION: Collection = Collection::CounselingNeededInfo;

    fn key(&self) -> &str {
        &self.student_id
    }
}
