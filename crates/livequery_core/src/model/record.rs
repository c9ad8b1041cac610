//! Record domain model.
//!
//! # Responsibility
//! - Define the canonical record shape shared by every collection kind.
//! - Provide typed field access without reflection-style key paths.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - Field names are non-empty; real values are finite.
//! - A missing field reads as `FieldValue::Null`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::model::schema::FieldType;

/// Stable identifier of one record inside the store.
pub type RecordId = Uuid;

static NULL_VALUE: FieldValue = FieldValue::Null;

/// Typed value stored under one record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    /// Unix epoch milliseconds.
    Date(i64),
    Bool(bool),
    Blob(Vec<u8>),
    /// Identity of another record, resolved on demand.
    Reference(RecordId),
}

impl FieldValue {
    /// Returns the declared type of this value, `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(FieldType::Text),
            Self::Integer(_) => Some(FieldType::Integer),
            Self::Real(_) => Some(FieldType::Real),
            Self::Date(_) => Some(FieldType::Date),
            Self::Bool(_) => Some(FieldType::Bool),
            Self::Blob(_) => Some(FieldType::Blob),
            Self::Reference(_) => Some(FieldType::Reference),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view used by aggregates. Integers widen to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<i64> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<RecordId> {
        match self {
            Self::Reference(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Blob(value) => write!(f, "<{} bytes>", value.len()),
            Self::Reference(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<RecordId> for FieldValue {
    fn from(value: RecordId) -> Self {
        Self::Reference(value)
    }
}

/// Validation errors raised before a record reaches storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValidationError {
    EmptyKind,
    EmptyFieldName,
    NonFiniteReal {
        field: String,
    },
    MissingRequiredField {
        kind: String,
        field: String,
    },
    UnknownField {
        kind: String,
        field: String,
    },
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },
    /// Update attempted to move a record into another collection.
    KindChanged {
        id: RecordId,
        stored: String,
        requested: String,
    },
    /// Identity belonged to a deleted record and cannot be reused.
    RetiredIdentity(RecordId),
    DuplicateIdentity(RecordId),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "record kind must not be blank"),
            Self::EmptyFieldName => write!(f, "record field names must not be blank"),
            Self::NonFiniteReal { field } => {
                write!(f, "field `{field}` holds a non-finite real value")
            }
            Self::MissingRequiredField { kind, field } => {
                write!(f, "{kind} requires field `{field}`")
            }
            Self::UnknownField { kind, field } => {
                write!(f, "{kind} has no field named `{field}`")
            }
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "field `{field}` expects {expected} but got {actual}"
            ),
            Self::KindChanged {
                id,
                stored,
                requested,
            } => write!(
                f,
                "record {id} is stored as {stored} and cannot become {requested}"
            ),
            Self::RetiredIdentity(id) => write!(f, "record identity {id} was retired"),
            Self::DuplicateIdentity(id) => write!(f, "record identity {id} already exists"),
        }
    }
}

impl Error for RecordValidationError {}

/// One persisted entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Collection name, e.g. `Team` or `Walk`.
    pub kind: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record with a freshly generated identity.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind)
    }

    /// Creates an empty record with a caller-provided identity.
    ///
    /// Used by import paths and by callers replaying a known record.
    pub fn with_id(id: RecordId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Reads a field, treating a missing field as null.
    pub fn value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&NULL_VALUE)
    }

    /// Checks structural invariants independent of any schema.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.kind.trim().is_empty() {
            return Err(RecordValidationError::EmptyKind);
        }

        for (name, value) in &self.fields {
            if name.trim().is_empty() {
                return Err(RecordValidationError::EmptyFieldName);
            }
            if let FieldValue::Real(real) = value {
                if !real.is_finite() {
                    return Err(RecordValidationError::NonFiniteReal {
                        field: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
