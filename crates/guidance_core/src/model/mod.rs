//! Record model for the counseling dataset.
//!
//! # Responsibility
//! - Define the persisted shape of every collection's records.
//! - Bind each record type to its collection and key field.
//!
//! # Invariants
//! - Records serialize as camelCase JSON; the same shape is used in archives.
//! - Optional fields absent from older records deserialize as `None`.

pub mod roster;
pub mod session;
pub mod settings;
