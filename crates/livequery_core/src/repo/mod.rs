//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the durable record store contract used by services.
//! - Isolate SQLite query details from projection maintenance.
//!
//! # Invariants
//! - Repository writes validate records before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod record_repo;
