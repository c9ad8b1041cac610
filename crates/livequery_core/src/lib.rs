//! Core of LiveQuery: live, sectioned and sorted projections over a
//! SQLite-backed record store.
//! This crate is the single source of truth for query and storage invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod projection;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::attribute::{AttributeCodec, AttributeDecodeError, ColorAttributeCodec, Rgba};
pub use model::query::{
    CompareOp, Comparator, FetchRequest, Filter, QueryValidationError, SectionKey, SortField,
    SortKey,
};
pub use model::record::{FieldValue, Record, RecordId, RecordValidationError};
pub use model::schema::{EntitySchema, FieldSpec, FieldType};
pub use projection::event::{ChangeEvent, ChangeKind, IndexPath};
pub use projection::layout::{ProjectionLayout, Section};
pub use projection::subscriber::{ChangeLog, NoopSubscriber, ProjectionSubscriber};
pub use repo::record_repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};
pub use service::query_service::{ProjectionHandle, QueryError, QueryResult, QueryService};
pub use service::seed_import::{import_seed_if_empty, SeedError, SeedImportReport};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
