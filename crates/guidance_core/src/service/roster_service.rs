//! Roster use-case service.
//!
//! # Responsibility
//! - Create classrooms, students, sessions and flags with their referential
//!   checks.
//! - Run cascading deletes as single transactions over declared scopes.
//!
//! # Invariants
//! - A student is only stored when its classroom exists.
//! - A national id is held by at most one student.
//! - Deleting a classroom or student removes every dependent record in the
//!   same transaction, or nothing at all.
//! - Deleting a session type never touches sessions.

use crate::db::{Collection, Store, StoreError, StoreResult, Tx};
use crate::model::roster::{Classroom, CounselingNeededInfo, SpecialStudentInfo, Student};
use crate::model::session::{Session, SessionType};
use crate::model::settings::{AppSettings, SyncState};
use chrono::{DateTime, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Collections touched by `delete_classroom`.
pub const CLASSROOM_CASCADE: &[Collection] = &[
    Collection::Classrooms,
    Collection::Students,
    Collection::Sessions,
    Collection::SpecialStudentInfo,
    Collection::CounselingNeededInfo,
];

/// Collections touched by `delete_student`.
pub const STUDENT_CASCADE: &[Collection] = &[
    Collection::Students,
    Collection::Sessions,
    Collection::SpecialStudentInfo,
    Collection::CounselingNeededInfo,
];

/// Errors from roster use-cases.
#[derive(Debug)]
pub enum RosterError {
    ClassroomNotFound(String),
    StudentNotFound(String),
    /// Another student already holds this national id.
    DuplicateNationalId(String),
    Store(StoreError),
}

impl Display for RosterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassroomNotFound(id) => write!(f, "classroom not found: {id}"),
            Self::StudentNotFound(id) => write!(f, "student not found: {id}"),
            Self::DuplicateNationalId(value) => {
                write!(f, "national id already assigned to another student: {value}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RosterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for RosterError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound {
                collection: Collection::Classrooms,
                id,
            } => Self::ClassroomNotFound(id),
            StoreError::NotFound {
                collection: Collection::Students,
                id,
            } => Self::StudentNotFound(id),
            other => Self::Store(other),
        }
    }
}

pub type RosterResult<T> = Result<T, RosterError>;

/// Records removed by one cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub classrooms: usize,
    pub students: usize,
    pub sessions: usize,
    pub flags: usize,
}

impl CascadeReport {
    fn absorb(&mut self, other: CascadeReport) {
        self.classrooms += other.classrooms;
        self.students += other.students;
        self.sessions += other.sessions;
        self.flags += other.flags;
    }
}

/// Roster facade over one store handle.
pub struct RosterService<'s> {
    store: &'s Store,
}

impl<'s> RosterService<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Adds a classroom, stamping the current academic year when unset.
    pub fn add_classroom(&self, classroom: Classroom) -> RosterResult<Classroom> {
        self.store
            .transaction(&[Collection::Classrooms, Collection::Settings], |tx| {
                let mut classroom = classroom;
                if classroom.academic_year.is_none() {
                    classroom.academic_year = Some(current_year(tx)?);
                }
                Ok(tx.add(classroom)?)
            })
    }

    /// Adds a student to an existing classroom.
    pub fn add_student(&self, student: Student) -> RosterResult<Student> {
        self.store.transaction(
            &[
                Collection::Classrooms,
                Collection::Settings,
                Collection::Students,
            ],
            |tx| {
                let mut student = normalize_student(student);
                ensure_classroom(tx, &student.classroom_id)?;
                ensure_national_id_free(tx, student.national_id.as_deref(), None)?;
                if student.academic_year.is_none() {
                    student.academic_year = Some(current_year(tx)?);
                }
                Ok(tx.add(student)?)
            },
        )
    }

    /// Replaces an existing student record.
    pub fn update_student(&self, student: Student) -> RosterResult<Student> {
        self.store
            .transaction(&[Collection::Classrooms, Collection::Students], |tx| {
                let student = normalize_student(student);
                tx.require::<Student>(&student.id)?;
                ensure_classroom(tx, &student.classroom_id)?;
                ensure_national_id_free(tx, student.national_id.as_deref(), Some(&student.id))?;
                tx.put(&student)?;
                Ok(student)
            })
    }

    /// Adds a session for an existing student.
    pub fn add_session(&self, session: Session) -> RosterResult<Session> {
        self.store.transaction(
            &[
                Collection::Sessions,
                Collection::Settings,
                Collection::Students,
            ],
            |tx| {
                let mut session = session;
                tx.require::<Student>(&session.student_id)?;
                if session.academic_year.is_none() {
                    session.academic_year = Some(current_year(tx)?);
                }
                Ok(tx.add(session)?)
            },
        )
    }

    pub fn add_session_type(&self, session_type: SessionType) -> RosterResult<SessionType> {
        Ok(self.store.add(session_type)?)
    }

    /// Deletes a session type; sessions referencing it keep the dangling id.
    pub fn delete_session_type(&self, id: &str) -> RosterResult<()> {
        Ok(self.store.delete::<SessionType>(id)?)
    }

    pub fn set_special_info(&self, info: SpecialStudentInfo) -> RosterResult<()> {
        self.store.transaction(
            &[Collection::SpecialStudentInfo, Collection::Students],
            |tx| {
                tx.require::<Student>(&info.student_id)?;
                Ok(tx.put(&info)?)
            },
        )
    }

    pub fn set_counseling_needed(&self, info: CounselingNeededInfo) -> RosterResult<()> {
        self.store.transaction(
            &[Collection::CounselingNeededInfo, Collection::Students],
            |tx| {
                tx.require::<Student>(&info.student_id)?;
                Ok(tx.put(&info)?)
            },
        )
    }

    pub fn students_of(&self, classroom_id: &str) -> RosterResult<Vec<Student>> {
        Ok(self.store.get_by_index("classroomId", classroom_id)?)
    }

    pub fn sessions_of(&self, student_id: &str) -> RosterResult<Vec<Session>> {
        Ok(self.store.get_by_index("studentId", student_id)?)
    }

    /// Deletes a classroom with its students and everything they own.
    pub fn delete_classroom(&self, id: &str) -> RosterResult<CascadeReport> {
        let started_at = Instant::now();
        let report = self
            .store
            .transaction(CLASSROOM_CASCADE, |tx| delete_classroom_in(tx, id))?;
        log_cascade("classroom", &report, started_at);
        Ok(report)
    }

    /// Deletes a student with its sessions and flag records.
    pub fn delete_student(&self, id: &str) -> RosterResult<CascadeReport> {
        let started_at = Instant::now();
        let report = self
            .store
            .transaction(STUDENT_CASCADE, |tx| delete_student_in(tx, id))?;
        log_cascade("student", &report, started_at);
        Ok(report)
    }

    /// Stores the sync collaborator's last successful sync time.
    pub fn record_sync(&self, at: DateTime<Utc>) -> RosterResult<()> {
        Ok(self.store.put_singleton(&SyncState {
            last_synced_at: Some(at),
        })?)
    }

    pub fn last_synced_at(&self) -> RosterResult<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .singleton_or_default::<SyncState>()?
            .last_synced_at)
    }
}

/// Classroom cascade for use inside a caller's transaction.
///
/// The transaction scope must cover `CLASSROOM_CASCADE`.
pub fn delete_classroom_in(tx: &mut Tx<'_>, id: &str) -> StoreResult<CascadeReport> {
    tx.require::<Classroom>(id)?;
    let mut report = CascadeReport::default();
    for student in tx.get_by_index::<Student>("classroomId", id)? {
        report.absorb(delete_student_in(tx, &student.id)?);
    }
    tx.delete::<Classroom>(id)?;
    report.classrooms += 1;
    Ok(report)
}

/// Student cascade for use inside a caller's transaction.
///
/// The transaction scope must cover `STUDENT_CASCADE`.
pub fn delete_student_in(tx: &mut Tx<'_>, id: &str) -> StoreResult<CascadeReport> {
    tx.require::<Student>(id)?;
    let mut report = CascadeReport::default();
    for session in tx.get_by_index::<Session>("studentId", id)? {
        tx.delete::<Session>(&session.id)?;
        report.sessions += 1;
    }
    if tx.delete_if_exists::<SpecialStudentInfo>(id)? {
        report.flags += 1;
    }
    if tx.delete_if_exists::<CounselingNeededInfo>(id)? {
        report.flags += 1;
    }
    tx.delete::<Student>(id)?;
    report.students += 1;
    Ok(report)
}

fn current_year(tx: &Tx<'_>) -> StoreResult<String> {
    Ok(tx
        .singleton::<AppSettings>()?
        .unwrap_or_default()
        .academic_year)
}

fn ensure_classroom(tx: &Tx<'_>, classroom_id: &str) -> RosterResult<()> {
    if tx.get::<Classroom>(classroom_id)?.is_none() {
        return Err(RosterError::ClassroomNotFound(classroom_id.to_string()));
    }
    Ok(())
}

fn ensure_national_id_free(
    tx: &Tx<'_>,
    national_id: Option<&str>,
    owner: Option<&str>,
) -> RosterResult<()> {
    let Some(national_id) = national_id else {
        return Ok(());
    };
    let holders = tx.get_by_index::<Student>("nationalId", national_id)?;
    if holders.iter().any(|holder| Some(holder.id.as_str()) != owner) {
        return Err(RosterError::DuplicateNationalId(national_id.to_string()));
    }
    Ok(())
}

/// Blank national ids are stored as absent so they never collide.
fn normalize_student(mut student: Student) -> Student {
    student.national_id = student
        .national_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    student
}

fn log_cascade(target: &str, report: &CascadeReport, started_at: Instant) {
    info!(
        "event=cascade_delete module=roster status=ok target={} classrooms={} students={} sessions={} flags={} duration_ms={}",
        target,
        report.classrooms,
        report.students,
        report.sessions,
        report.flags,
        started_at.elapsed().as_millis()
    );
}
