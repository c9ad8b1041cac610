//! Entity definitions for record collections.
//!
//! # Responsibility
//! - Describe which fields a collection kind accepts and which are required.
//! - Reject malformed records before they are staged in the store.
//!
//! # Invariants
//! - A kind without a registered schema accepts any structurally valid record.
//! - `Integer` values are accepted by `Real` fields; no other coercion happens.

use crate::model::record::{Record, RecordValidationError};
use std::fmt::{Display, Formatter};

/// Declared storage type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Date,
    Bool,
    Blob,
    Reference,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Date => "date",
            Self::Bool => "bool",
            Self::Blob => "blob",
            Self::Reference => "reference",
        };
        f.write_str(name)
    }
}

impl FieldType {
    fn accepts(self, actual: FieldType) -> bool {
        self == actual || (self == FieldType::Real && actual == FieldType::Integer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// Field layout of one collection kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    kind: String,
    fields: Vec<FieldSpec>,
}

impl EntitySchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Declares a field that must be present and non-null on every record.
    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push(name.into(), field_type, true);
        self
    }

    /// Declares a field that may be missing or null.
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push(name.into(), field_type, false);
        self
    }

    fn push(&mut self, name: String, field_type: FieldType, required: bool) {
        self.fields.retain(|spec| spec.name != name);
        self.fields.push(FieldSpec {
            name,
            field_type,
            required,
        });
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Validates one record against this schema.
    ///
    /// Structural checks (`Record::validate`) run first.
    pub fn validate(&self, record: &Record) -> Result<(), RecordValidationError> {
        record.validate()?;

        for (name, value) in &record.fields {
            let Some(spec) = self.field(name) else {
                return Err(RecordValidationError::UnknownField {
                    kind: self.kind.clone(),
                    field: name.clone(),
                });
            };
            if let Some(actual) = value.field_type() {
                if !spec.field_type.accepts(actual) {
                    return Err(RecordValidationError::TypeMismatch {
                        field: name.clone(),
                        expected: spec.field_type,
                        actual,
                    });
                }
            }
        }

        for spec in self.fields.iter().filter(|spec| spec.required) {
            if record.value(&spec.name).is_null() {
                return Err(RecordValidationError::MissingRequiredField {
                    kind: self.kind.clone(),
                    field: spec.name.clone(),
                });
            }
        }

        Ok(())
    }
}
