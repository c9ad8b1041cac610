//! One-time bulk import of seed documents into an empty collection.
//!
//! # Responsibility
//! - Parse a JSON array of field maps into records of one kind.
//! - Stage every insert in one batch, then reload open projections once.
//!
//! # Invariants
//! - A non-empty collection is never touched.
//! - Import is all-or-nothing. A failure undoes the import's inserts and
//!   nothing staged before it.
//! - With nothing staged beforehand the import is flushed; otherwise it
//!   stays staged with the caller's writes.
//! - Open projections see one reload and no per-row events.

use crate::model::query::Filter;
use crate::model::record::{FieldValue, Record};
use crate::model::schema::{EntitySchema, FieldType};
use crate::repo::record_repo::{RecordRepository, RepoResult};
use crate::service::query_service::{QueryError, QueryService};
use log::{error, info, warn};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
pub enum SeedError {
    /// Document is not a JSON array of objects with supported values.
    InvalidDocument(String),
    Query(QueryError),
}

impl Display for SeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDocument(message) => write!(f, "invalid seed document: {message}"),
            Self::Query(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDocument(_) => None,
            Self::Query(err) => Some(err),
        }
    }
}

impl From<QueryError> for SeedError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

/// Outcome of one import attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedImportReport {
    /// Collection already had records; nothing was read or written.
    Skipped { existing: u64 },
    Imported { count: usize },
}

impl SeedImportReport {
    pub fn imported_count(self) -> usize {
        match self {
            Self::Skipped { .. } => 0,
            Self::Imported { count } => count,
        }
    }
}

/// Imports `json` into collection `kind` when that collection is empty.
///
/// # Errors
/// - `InvalidDocument` for malformed JSON or unsupported values.
/// - `Query(Repo(..))` when an insert or the flush is rejected; writes
///   staged before the call are kept.
pub fn import_seed_if_empty<R: RecordRepository>(
    service: &mut QueryService<R>,
    kind: &str,
    json: &str,
) -> Result<SeedImportReport, SeedError> {
    let existing = service.count(kind, &Filter::All)?;
    if existing > 0 {
        info!(
            "event=seed_import module=seed status=skipped kind={} existing={}",
            kind, existing
        );
        return Ok(SeedImportReport::Skipped { existing });
    }

    let started_at = Instant::now();
    let records = parse_seed_document(kind, json, service.repo().schema(kind))?;
    let count = records.len();
    let had_staged = service.has_staged_changes();

    if let Err(err) = stage_batch(service.repo(), &records, had_staged) {
        error!(
            "event=seed_import module=seed status=error kind={} error={}",
            kind, err
        );
        if let Err(rollback_err) = abandon_batch(service.repo(), had_staged) {
            warn!(
                "event=seed_rollback module=seed status=error kind={} error={}",
                kind, rollback_err
            );
        }
        return Err(SeedError::Query(err.into()));
    }
    service.reload_kind(kind)?;

    info!(
        "event=seed_import module=seed status=ok kind={} count={} flushed={} duration_ms={}",
        kind,
        count,
        !had_staged,
        started_at.elapsed().as_millis()
    );
    Ok(SeedImportReport::Imported { count })
}

/// Stages every record inside one batch. Open projections are not fed;
/// the caller reloads them once the batch is in.
fn stage_batch<R: RecordRepository>(
    repo: &R,
    records: &[Record],
    had_staged: bool,
) -> RepoResult<()> {
    repo.begin_batch()?;
    for record in records {
        repo.insert_record(record)?;
    }
    repo.commit_batch()?;
    if !had_staged {
        repo.flush()?;
    }
    Ok(())
}

fn abandon_batch<R: RecordRepository>(repo: &R, had_staged: bool) -> RepoResult<()> {
    if had_staged {
        return repo.rollback_batch();
    }
    // Nothing of the caller's is staged, so the whole transaction goes.
    repo.discard()
}

/// Parses a seed document without touching storage.
pub fn parse_seed_document(
    kind: &str,
    json: &str,
    schema: Option<&EntitySchema>,
) -> Result<Vec<Record>, SeedError> {
    let document: Value = serde_json::from_str(json)
        .map_err(|err| SeedError::InvalidDocument(format!("malformed JSON: {err}")))?;
    let Value::Array(items) = document else {
        return Err(SeedError::InvalidDocument(
            "top-level value must be an array".to_string(),
        ));
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(object) => parse_object(kind, object, schema)
                .map_err(|message| SeedError::InvalidDocument(format!("item {index}: {message}"))),
            _ => Err(SeedError::InvalidDocument(format!(
                "item {index} must be an object"
            ))),
        })
        .collect()
}

fn parse_object(
    kind: &str,
    object: &Map<String, Value>,
    schema: Option<&EntitySchema>,
) -> Result<Record, String> {
    let mut record = Record::new(kind);
    for (name, value) in object {
        let declared = schema
            .and_then(|schema| schema.field(name))
            .map(|spec| spec.field_type);
        let field = match declared {
            Some(field_type) => typed_value(field_type, value),
            None => inferred_value(value),
        }
        .map_err(|message| format!("field `{name}`: {message}"))?;
        record.set(name.as_str(), field);
    }
    Ok(record)
}

fn typed_value(field_type: FieldType, value: &Value) -> Result<FieldValue, String> {
    match (field_type, value) {
        (_, Value::Null) => Ok(FieldValue::Null),
        (FieldType::Date, Value::Number(number)) => number
            .as_i64()
            .map(FieldValue::Date)
            .ok_or_else(|| format!("date must be integer milliseconds, got {number}")),
        (FieldType::Real, Value::Number(number)) => number
            .as_f64()
            .map(FieldValue::Real)
            .ok_or_else(|| format!("unsupported number {number}")),
        (FieldType::Reference, Value::String(text)) => Uuid::parse_str(text)
            .map(FieldValue::Reference)
            .map_err(|err| format!("reference must be a UUID: {err}")),
        (FieldType::Blob, Value::Array(items)) => blob_value(items),
        _ => inferred_value(value),
    }
}

fn inferred_value(value: &Value) -> Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(flag) => Ok(FieldValue::Bool(*flag)),
        Value::String(text) => Ok(FieldValue::Text(text.clone())),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Ok(FieldValue::Integer(integer)),
            None => number
                .as_f64()
                .map(FieldValue::Real)
                .ok_or_else(|| format!("unsupported number {number}")),
        },
        Value::Array(items) => blob_value(items),
        Value::Object(_) => Err("nested objects are not supported".to_string()),
    }
}

fn blob_value(items: &[Value]) -> Result<FieldValue, String> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|byte| u8::try_from(byte).ok())
                .ok_or_else(|| format!("blob items must be bytes, got {item}"))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(FieldValue::Blob)
}
