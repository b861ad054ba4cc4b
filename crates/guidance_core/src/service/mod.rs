//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into use-case level APIs.
//! - Own referential rules the store does not enforce (cascades, foreign keys).

pub mod roster_service;
