//! Counseling sessions and session types.

use crate::db::{Collection, EngineKeyed, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One counseling session held with a student.
///
/// `session_type_id` is not enforced: deleting a session type leaves it
/// dangling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub held_at: DateTime<Utc>,
    pub session_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
}

impl Session {
    pub fn new(
        student_id: impl Into<String>,
        session_type_id: impl Into<String>,
        held_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            student_id: student_id.into(),
            held_at,
            session_type_id: session_type_id.into(),
            topic: None,
            notes: None,
            duration_minutes: None,
            academic_year: None,
        }
    }
}

impl Record for Session {
    const COLLECTION: Collection = Collection::Sessions;

    fn key(&self) -> &str {
        &self.id
    }
}

impl EngineKeyed for Session {
    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionType {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
}

impl SessionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            display_order: None,
        }
    }
}

impl Record for SessionType {
    const COLLECTION: Collection = Collection::SessionTypes;

    fn key(&self) -> &str {
        &self.id
    }
}

impl EngineKeyed for SessionType {
    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}
