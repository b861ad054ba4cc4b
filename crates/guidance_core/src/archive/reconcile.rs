//! Merges archived data with the running build's defaults.
//!
//! # Invariants
//! - Settings fields missing from an archive, or archived as `null`, take the
//!   running defaults.
//! - Archived fields unknown to this build are carried through untouched.
//! - The reconciled menu order keeps the archived order and contains every
//!   default menu id exactly once.

use super::document::ArchiveDocument;
use super::{ArchiveError, ArchiveResult};
use crate::model::roster::Student;
use crate::model::settings::AppSettings;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const MENU_ORDER_FIELD: &str = "moreMenuOrder";

/// Archived order first, duplicates dropped, then missing defaults appended.
pub fn merge_menu_order(archived: &[String], defaults: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(archived.len().max(defaults.len()));
    for id in archived.iter().chain(defaults) {
        if seen.insert(id.as_str()) {
            merged.push(id.clone());
        }
    }
    merged
}

/// Overlays archived settings onto `defaults`.
///
/// `None` or JSON `null` yields the defaults unchanged.
pub fn reconcile_settings(
    defaults: &AppSettings,
    archived: Option<&Value>,
) -> ArchiveResult<AppSettings> {
    let archived = match archived {
        None | Some(Value::Null) => return Ok(defaults.clone()),
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            return Err(ArchiveError::Reconciliation(format!(
                "settings must be an object, found {}",
                json_kind(other)
            )))
        }
    };

    let archived_order = match archived.get(MENU_ORDER_FIELD) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value::<Vec<String>>(value.clone()).map_err(|err| {
            ArchiveError::Reconciliation(format!("{MENU_ORDER_FIELD} is malformed: {err}"))
        })?,
    };

    let mut base = match serde_json::to_value(defaults) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(ArchiveError::Reconciliation(
                "default settings are not an object".to_string(),
            ))
        }
        Err(err) => return Err(ArchiveError::Reconciliation(err.to_string())),
    };
    // Archived nulls fall back to the running default.
    for (key, value) in archived.iter().filter(|(_, value)| !value.is_null()) {
        base.insert(key.clone(), value.clone());
    }
    let merged_order = merge_menu_order(&archived_order, &defaults.more_menu_order);
    base.insert(
        MENU_ORDER_FIELD.to_string(),
        Value::from(merged_order),
    );

    serde_json::from_value(Value::Object(base))
        .map_err(|err| ArchiveError::Reconciliation(err.to_string()))
}

/// Restores inline photos from decoded assets keyed by national id.
///
/// Students that already carry an inline photo keep it. Returns how many
/// students received a photo.
pub fn rehydrate_photos(students: &mut [Student], assets: &HashMap<String, String>) -> usize {
    let mut restored = 0;
    for student in students.iter_mut().filter(|s| s.photo.is_none()) {
        let Some(data_url) = student
            .national_id
            .as_deref()
            .and_then(|id| assets.get(id))
        else {
            continue;
        };
        student.photo = Some(data_url.clone());
        restored += 1;
    }
    restored
}

/// Archive contents ready to commit.
#[derive(Debug, Clone)]
pub struct ReconciledDataset {
    pub document: ArchiveDocument,
    pub settings: AppSettings,
    pub photos_restored: usize,
}

/// Applies photo rehydration and settings reconciliation to a parsed document.
pub fn reconcile(
    mut document: ArchiveDocument,
    assets: &HashMap<String, String>,
    defaults: &AppSettings,
) -> ArchiveResult<ReconciledDataset> {
    let settings = reconcile_settings(defaults, document.settings.as_ref())?;
    let photos_restored = rehydrate_photos(&mut document.students, assets);
    Ok(ReconciledDataset {
        document,
        settings,
        photos_restored,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_menu_order, rehydrate_photos, reconcile_settings};
    use crate::archive::ArchiveError;
    use crate::model::roster::Student;
    use crate::model::settings::AppSettings;
    use serde_json::json;
    use std::collections::HashMap;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn menu_order_keeps_archived_order_and_appends_new_defaults() {
        assert_eq!(
            merge_menu_order(&ids(&["b", "a"]), &ids(&["a", "b", "c"])),
            ids(&["b", "a", "c"])
        );
        assert_eq!(
            merge_menu_order(&ids(&["a", "a", "x"]), &ids(&["a", "b"])),
            ids(&["a", "x", "b"])
        );
        assert_eq!(merge_menu_order(&[], &ids(&["a", "b"])), ids(&["a", "b"]));
    }

    #[test]
    fn archived_fields_override_defaults_and_missing_fields_default() {
        let defaults = AppSettings::default();
        let archived = json!({
            "schoolName": "North High",
            "showWeekends": true,
            "moreMenuOrder": ["settings", "students"],
            "legacyFlag": "kept"
        });

        let merged = reconcile_settings(&defaults, Some(&archived)).unwrap();

        assert_eq!(merged.school_name.as_deref(), Some("North High"));
        assert!(merged.show_weekends);
        assert_eq!(merged.theme, defaults.theme);
        assert_eq!(merged.default_session_minutes, defaults.default_session_minutes);
        assert_eq!(merged.more_menu_order[0], "settings");
        assert_eq!(merged.more_menu_order[1], "students");
        assert_eq!(merged.more_menu_order.len(), defaults.more_menu_order.len());
        assert_eq!(merged.extra.get("legacyFlag"), Some(&json!("kept")));
    }

    #[test]
    fn archived_nulls_take_running_defaults() {
        let mut defaults = AppSettings::default();
        defaults.school_name = Some("South High".to_string());
        let archived = json!({
            "theme": null,
            "defaultSessionMinutes": null,
            "schoolName": null,
            "showWeekends": true
        });

        let merged = reconcile_settings(&defaults, Some(&archived)).unwrap();

        assert_eq!(merged.theme, defaults.theme);
        assert_eq!(merged.default_session_minutes, defaults.default_session_minutes);
        assert_eq!(merged.school_name.as_deref(), Some("South High"));
        assert!(merged.show_weekends);
    }

    #[test]
    fn non_object_settings_are_rejected() {
        let defaults = AppSettings::default();
        let err = reconcile_settings(&defaults, Some(&json!([1, 2]))).unwrap_err();
        assert!(matches!(err, ArchiveError::Reconciliation(_)));

        let err =
            reconcile_settings(&defaults, Some(&json!({"moreMenuOrder": "nope"}))).unwrap_err();
        assert!(matches!(err, ArchiveError::Reconciliation(_)));

        let err = reconcile_settings(&defaults, Some(&json!({"showWeekends": "yes"}))).unwrap_err();
        assert!(matches!(err, ArchiveError::Reconciliation(_)));

        assert_eq!(reconcile_settings(&defaults, None).unwrap(), defaults);
    }

    #[test]
    fn rehydration_only_fills_missing_photos() {
        let mut keeps = Student::new("c1", "Ada", "Lovelace");
        keeps.national_id = Some("1".to_string());
        keeps.photo = Some("data:image/png;base64,AAAA".to_string());
        let mut fills = Student::new("c1", "Alan", "Turing");
        fills.national_id = Some("2".to_string());
        let unmatched = Student::new("c1", "Grace", "Hopper");

        let assets = HashMap::from([
            ("1".to_string(), "data:image/jpeg;base64,BBBB".to_string()),
            ("2".to_string(), "data:image/jpeg;base64,CCCC".to_string()),
        ]);
        let mut students = vec![keeps, fills, unmatched];

        assert_eq!(rehydrate_photos(&mut students, &assets), 1);
        assert_eq!(students[0].photo.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(students[1].photo.as_deref(), Some("data:image/jpeg;base64,CCCC"));
        assert!(students[2].photo.is_none());
    }
}
