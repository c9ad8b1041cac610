//! Record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/update/delete by identity and filtered scans over
//!   the `records` table.
//! - Stage mutations in an open transaction until an explicit flush.
//! - Keep SQL and JSON field encoding inside the persistence boundary.
//!
//! # Invariants
//! - Write paths validate the record (and its registered schema) before SQL.
//! - Staged mutations are visible to reads on the same connection and are
//!   lost if the connection closes before `flush`.
//! - Deleted identities are retired and rejected on later inserts.
//! - A batch rolls back to its savepoint without touching writes staged
//!   before it.
//! - Read paths reject malformed rows instead of masking them.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::query::Filter;
use crate::model::record::{FieldValue, Record, RecordId, RecordValidationError};
use crate::model::schema::EntitySchema;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT uuid, kind, fields FROM records";
const BATCH_SAVEPOINT: &str = "record_batch";
const DELETE_SAVEPOINT: &str = "record_delete";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Store cannot be opened, read or written.
    StorageUnavailable(DbError),
    /// Record rejected before reaching storage.
    Validation(RecordValidationError),
    /// Mutation referenced an identity that is not stored.
    NotFound(RecordId),
    /// Persisted row or aggregate input cannot be interpreted.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Migrated connection lacks a table this repository reads.
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StorageUnavailable(DbError::Sqlite(value))
    }
}

/// Durable store contract used by query services.
pub trait RecordRepository {
    /// Registered schema for one kind, if any.
    fn schema(&self, kind: &str) -> Option<&EntitySchema>;
    fn insert_record(&self, record: &Record) -> RepoResult<RecordId>;
    fn update_record(&self, record: &Record) -> RepoResult<()>;
    fn delete_record(&self, id: RecordId) -> RepoResult<()>;
    fn get_record(&self, id: RecordId) -> RepoResult<Option<Record>>;
    /// Returns every record of `kind` matching `filter`, ordered by identity.
    fn scan(&self, kind: &str, filter: &Filter) -> RepoResult<Vec<Record>>;
    fn has_staged_changes(&self) -> bool;
    /// Makes every staged mutation durable. No-op when nothing is staged.
    fn flush(&self) -> RepoResult<()>;
    /// Drops every staged mutation.
    fn discard(&self) -> RepoResult<()>;
    /// Opens a nested batch inside the staging transaction.
    fn begin_batch(&self) -> RepoResult<()>;
    /// Keeps the batch's writes staged with everything before it.
    fn commit_batch(&self) -> RepoResult<()>;
    /// Undoes the writes of the innermost open batch only.
    fn rollback_batch(&self) -> RepoResult<()>;

    fn count(&self, kind: &str, filter: &Filter) -> RepoResult<u64> {
        Ok(self.scan(kind, filter)?.len() as u64)
    }

    /// Sums a numeric field over matching records; null values are skipped.
    fn sum(&self, kind: &str, filter: &Filter, field: &str) -> RepoResult<f64> {
        let mut total = 0.0;
        for record in self.scan(kind, filter)? {
            let value = record.value(field);
            if value.is_null() {
                continue;
            }
            total += value.as_number().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "field `{field}` of record {} is not numeric",
                    record.id
                ))
            })?;
        }
        Ok(total)
    }
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
    schemas: HashMap<String, EntitySchema>,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            schemas: HashMap::new(),
        })
    }

    /// Registers the entity schema enforced on writes of `schema.kind()`.
    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.insert(schema.kind().to_string(), schema);
        self
    }

    fn validate(&self, record: &Record) -> RepoResult<()> {
        match self.schemas.get(record.kind.as_str()) {
            Some(schema) => schema.validate(record)?,
            None => record.validate()?,
        }
        Ok(())
    }

    fn begin_staging(&self) -> RepoResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE;")?;
            debug!("event=store_stage module=repo status=begin");
        }
        Ok(())
    }

    fn open_savepoint(&self, name: &str) -> RepoResult<()> {
        self.begin_staging()?;
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> RepoResult<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {name};"))?;
        Ok(())
    }

    fn rollback_savepoint(&self, name: &str) -> RepoResult<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"))?;
        Ok(())
    }

    fn stored_kind(&self, id: RecordId) -> RepoResult<Option<String>> {
        let kind = self
            .conn
            .query_row(
                "SELECT kind FROM records WHERE uuid = ?1;",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(kind)
    }

    fn is_retired(&self, id: RecordId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM retired_record_ids WHERE uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn schema(&self, kind: &str) -> Option<&EntitySchema> {
        self.schemas.get(kind)
    }

    fn insert_record(&self, record: &Record) -> RepoResult<RecordId> {
        self.validate(record)?;
        if self.is_retired(record.id)? {
            return Err(RecordValidationError::RetiredIdentity(record.id).into());
        }
        if self.stored_kind(record.id)?.is_some() {
            return Err(RecordValidationError::DuplicateIdentity(record.id).into());
        }

        let fields = encode_fields(&record.fields)?;
        self.begin_staging()?;
        self.conn.execute(
            "INSERT INTO records (uuid, kind, fields) VALUES (?1, ?2, ?3);",
            params![record.id.to_string(), record.kind.as_str(), fields],
        )?;
        debug!(
            "event=record_insert module=repo status=staged kind={}",
            record.kind
        );
        Ok(record.id)
    }

    fn update_record(&self, record: &Record) -> RepoResult<()> {
        self.validate(record)?;
        let Some(stored_kind) = self.stored_kind(record.id)? else {
            return Err(RepoError::NotFound(record.id));
        };
        if stored_kind != record.kind {
            return Err(RecordValidationError::KindChanged {
                id: record.id,
                stored: stored_kind,
                requested: record.kind.clone(),
            }
            .into());
        }

        let fields = encode_fields(&record.fields)?;
        self.begin_staging()?;
        self.conn.execute(
            "UPDATE records
             SET fields = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![fields, record.id.to_string()],
        )?;
        debug!(
            "event=record_update module=repo status=staged kind={}",
            record.kind
        );
        Ok(())
    }

    fn delete_record(&self, id: RecordId) -> RepoResult<()> {
        let Some(kind) = self.stored_kind(id)? else {
            return Err(RepoError::NotFound(id));
        };

        self.open_savepoint(DELETE_SAVEPOINT)?;
        let deleted = self
            .conn
            .execute("DELETE FROM records WHERE uuid = ?1;", [id.to_string()])
            .and_then(|_| {
                self.conn.execute(
                    "INSERT OR IGNORE INTO retired_record_ids (uuid, kind) VALUES (?1, ?2);",
                    params![id.to_string(), kind.as_str()],
                )
            });
        if let Err(err) = deleted {
            self.rollback_savepoint(DELETE_SAVEPOINT)?;
            return Err(err.into());
        }
        self.release_savepoint(DELETE_SAVEPOINT)?;
        debug!("event=record_delete module=repo status=staged kind={kind}");
        Ok(())
    }

    fn get_record(&self, id: RecordId) -> RepoResult<Option<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row)?));
        }
        Ok(None)
    }

    fn scan(&self, kind: &str, filter: &Filter) -> RepoResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL} WHERE kind = ?1 ORDER BY uuid ASC;"
        ))?;
        let mut rows = stmt.query([kind])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let record = parse_record_row(row)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn count(&self, kind: &str, filter: &Filter) -> RepoResult<u64> {
        if !matches!(filter, Filter::All) {
            return Ok(self.scan(kind, filter)?.len() as u64);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1;",
            [kind],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn has_staged_changes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn flush(&self) -> RepoResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT;")?;
        info!("event=store_flush module=repo status=ok");
        Ok(())
    }

    fn discard(&self) -> RepoResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK;")?;
        info!("event=store_discard module=repo status=ok");
        Ok(())
    }

    fn begin_batch(&self) -> RepoResult<()> {
        self.open_savepoint(BATCH_SAVEPOINT)?;
        debug!("event=store_batch module=repo status=begin");
        Ok(())
    }

    fn commit_batch(&self) -> RepoResult<()> {
        self.release_savepoint(BATCH_SAVEPOINT)?;
        debug!("event=store_batch module=repo status=released");
        Ok(())
    }

    fn rollback_batch(&self) -> RepoResult<()> {
        self.rollback_savepoint(BATCH_SAVEPOINT)?;
        info!("event=store_batch module=repo status=rolled_back");
        Ok(())
    }
}

fn encode_fields(fields: &BTreeMap<String, FieldValue>) -> RepoResult<String> {
    serde_json::to_string(fields)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode record fields: {err}")))
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in records.uuid"))
    })?;

    let fields_text: String = row.get("fields")?;
    let fields: BTreeMap<String, FieldValue> =
        serde_json::from_str(&fields_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid fields of record {id}: {err}"))
        })?;

    let record = Record {
        id,
        kind: row.get("kind")?,
        fields,
    };
    record.validate()?;
    Ok(record)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["records", "retired_record_ids"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
