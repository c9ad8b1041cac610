//! Live, filtered, sorted and sectioned views over record collections.
//!
//! # Responsibility
//! - Materialize a fetch request into sections and rows.
//! - Translate single-record mutations into typed structural events.
//!
//! # Invariants
//! - Layout code never touches storage; callers feed it records.
//! - A position change is reported as delete + insert, never as a move.

pub mod event;
pub mod layout;
pub mod ordering;
pub mod subscriber;
