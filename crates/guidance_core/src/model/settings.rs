//! Singleton configuration records.
//!
//! # Responsibility
//! - Define application settings, working days and sync bookkeeping.
//! - Provide the running defaults used by restore reconciliation.
//!
//! # Invariants
//! - `AppSettings` keeps fields it does not recognize, so settings written by
//!   a newer build survive a round trip through an older one.
//! - `more_menu_order` holds each menu identifier at most once.

use crate::db::Singleton;
use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Menu identifiers recognized by this build, in default order.
pub const DEFAULT_MORE_MENU_ORDER: &[&str] = &[
    "classrooms",
    "students",
    "sessions",
    "sessionTypes",
    "specialStudents",
    "counselingNeeded",
    "workingDays",
    "reports",
    "backup",
    "settings",
];

/// First month (September) of a new academic year.
const ACADEMIC_YEAR_START_MONTH: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Academic year tag, formatted `YYYY-YYYY`.
    pub academic_year: String,
    pub school_name: Option<String>,
    pub counselor_name: Option<String>,
    pub theme: String,
    pub show_weekends: bool,
    pub confirm_deletes: bool,
    pub photos_enabled: bool,
    pub default_session_minutes: u32,
    /// User-ordered menu identifiers.
    pub more_menu_order: Vec<String>,
    /// Fields this build does not know about.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            academic_year: default_academic_year(),
            school_name: None,
            counselor_name: None,
            theme: "system".to_string(),
            show_weekends: false,
            confirm_deletes: true,
            photos_enabled: true,
            default_session_minutes: 40,
            more_menu_order: DEFAULT_MORE_MENU_ORDER
                .iter()
                .map(|id| id.to_string())
                .collect(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Singleton for AppSettings {
    const SLOT: &'static str = "appSettings";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkingDays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Default for WorkingDays {
    fn default() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
        }
    }
}

impl Singleton for WorkingDays {
    const SLOT: &'static str = "workingDays";
}

/// Bookkeeping slot owned by the sync collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncState {
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Singleton for SyncState {
    const SLOT: &'static str = "syncState";
}

/// Academic year containing today's local date.
pub fn default_academic_year() -> String {
    academic_year_for(Local::now().date_naive())
}

/// Academic year containing `date`; years start in September.
pub fn academic_year_for(date: NaiveDate) -> String {
    let start = if date.month() >= ACADEMIC_YEAR_START_MONTH {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

#[cfg(test)]
mod tests {
    use super::{academic_year_for, AppSettings, DEFAULT_MORE_MENU_ORDER};
    use chrono::NaiveDate;

    #[test]
    fn academic_year_rolls_over_in_september() {
        let august = NaiveDate::from_ymd_opt(2024, 8, 31).unwrap();
        let september = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        assert_eq!(academic_year_for(august), "2023-2024");
        assert_eq!(academic_year_for(september), "2024-2025");
    }

    #[test]
    fn settings_keep_unknown_fields() {
        let parsed: AppSettings = serde_json::from_str(
            r#"{"academicYear":"2022-2023","futureToggle":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.academic_year, "2022-2023");
        assert_eq!(parsed.more_menu_order.len(), DEFAULT_MORE_MENU_ORDER.len());
        assert_eq!(
            parsed.extra.get("futureToggle"),
            Some(&serde_json::Value::Bool(true))
        );

        let encoded = serde_json::to_value(&parsed).unwrap();
        assert_eq!(encoded["futureToggle"], serde_json::Value::Bool(true));
    }
}
