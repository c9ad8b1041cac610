//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and live projections into use-case APIs.
//! - Keep CLI and presentation layers decoupled from storage details.

pub mod query_service;
pub mod seed_import;
