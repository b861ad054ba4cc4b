//! Schema migration registry and runner.
//!
//! # Responsibility
//! - Register upgrade steps tagged with the version they upgrade from.
//! - Apply pending steps in ascending order, one transaction per step.
//!
//! # Invariants
//! - `from` values are strictly increasing.
//! - A step and its version marker commit in the same transaction, so a
//!   version transition never runs twice.
//! - Step bodies are safe to reapply (create-if-absent, backfill-if-absent).

use crate::db::{Collection, Singleton, StoreError, StoreResult};
use crate::model::settings::{default_academic_year, AppSettings};
use log::{error, info};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

/// One schema upgrade, applied when the stored version equals `from`.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    /// Version this step upgrades from; it leaves the store at `from + 1`.
    pub from: u32,
    pub name: &'static str,
    /// Collections read or written by the step.
    pub touches: &'static [Collection],
    pub apply: fn(&Connection) -> rusqlite::Result<()>,
}

/// Outcome of one runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// `from` tags of the steps that ran, in order.
    pub applied: Vec<u32>,
}

const STEPS: &[MigrationStep] = &[
    MigrationStep {
        from: 0,
        name: "core_collections",
        touches: &[
            Collection::Classrooms,
            Collection::Students,
            Collection::Sessions,
            Collection::SessionTypes,
            Collection::Settings,
        ],
        apply: |conn| conn.execute_batch(include_str!("0001_core_collections.sql")),
    },
    MigrationStep {
        from: 1,
        name: "student_flags",
        touches: &[
            Collection::SpecialStudentInfo,
            Collection::CounselingNeededInfo,
        ],
        apply: |conn| conn.execute_batch(include_str!("0002_student_flags.sql")),
    },
    MigrationStep {
        from: 2,
        name: "academic_year",
        touches: &[
            Collection::Classrooms,
            Collection::Students,
            Collection::Sessions,
            Collection::Settings,
        ],
        apply: apply_academic_year,
    },
    MigrationStep {
        from: 3,
        name: "national_id_unique",
        touches: &[Collection::Students],
        apply: |conn| conn.execute_batch(include_str!("0004_national_id_unique.sql")),
    },
];

/// Registered steps, ascending by `from`.
pub fn steps() -> &'static [MigrationStep] {
    STEPS
}

/// Returns the schema version this build expects.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.from + 1)
}

/// Applies every pending registered step.
pub fn apply_migrations(conn: &mut Connection) -> StoreResult<MigrationReport> {
    run_steps(conn, STEPS, latest_version())
}

/// Applies registered steps until the store reaches `target`.
///
/// Used to stage stores at historical versions.
pub fn migrate_to(conn: &mut Connection, target: u32) -> StoreResult<MigrationReport> {
    run_steps(conn, STEPS, target.min(latest_version()))
}

/// Runs every step of `steps` with `current <= from < target`.
pub fn run_steps(
    conn: &mut Connection,
    steps: &[MigrationStep],
    target: u32,
) -> StoreResult<MigrationReport> {
    let current = current_user_version(conn)?;
    if current > target {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: target,
        });
    }

    let mut report = MigrationReport {
        from_version: current,
        to_version: current,
        applied: Vec::new(),
    };

    for step in steps
        .iter()
        .filter(|step| step.from >= current && step.from < target)
    {
        apply_step(conn, step)?;
        report.to_version = step.from + 1;
        report.applied.push(step.from);
    }

    Ok(report)
}

fn apply_step(conn: &mut Connection, step: &MigrationStep) -> StoreResult<()> {
    let fail = |err: rusqlite::Error| {
        error!(
            "event=migration_step module=db status=error from={} name={} error={}",
            step.from, step.name, err
        );
        StoreError::Migration {
            from_version: step.from,
            cause: err.to_string(),
        }
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(fail)?;
    (step.apply)(&tx).map_err(fail)?;
    tx.pragma_update(None, "user_version", step.from + 1)
        .map_err(fail)?;
    tx.commit().map_err(fail)?;

    info!(
        "event=migration_step module=db status=ok from={} to={} name={} touches={}",
        step.from,
        step.from + 1,
        step.name,
        step.touches
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(",")
    );
    Ok(())
}

/// Stamps the configured academic year onto records that predate the field.
fn apply_academic_year(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(include_str!("0003_academic_year.sql"))?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT CAST(json_extract(data, '$.academicYear') AS TEXT)
             FROM settings
             WHERE id = ?1;",
            [AppSettings::SLOT],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let year = stored
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(default_academic_year);

    for collection in [
        Collection::Classrooms,
        Collection::Students,
        Collection::Sessions,
    ] {
        conn.execute(
            &format!(
                "UPDATE {}
                 SET data = json_set(data, '$.academicYear', ?1)
                 WHERE json_extract(data, '$.academicYear') IS NULL;",
                collection.table()
            ),
            [year.as_str()],
        )?;
    }
    Ok(())
}

pub(crate) fn current_user_version(conn: &Connection) -> StoreResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{latest_version, steps};

    #[test]
    fn step_tags_are_strictly_increasing_from_zero() {
        let tags: Vec<u32> = steps().iter().map(|step| step.from).collect();
        assert_eq!(tags.first(), Some(&0));
        assert!(tags.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(latest_version(), tags.len() as u32);
    }
}
