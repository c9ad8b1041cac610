//! Record-centric domain model.
//!
//! # Responsibility
//! - Define records, field values and per-kind entity schemas.
//! - Define explicit query values (filter, sort, section) instead of
//!   reflection-style key paths.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Relationships are identity references, never embedded graphs.

pub mod attribute;
pub mod query;
pub mod record;
pub mod schema;
