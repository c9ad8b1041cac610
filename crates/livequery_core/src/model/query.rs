//! Query value objects: filters, sort keys, section keys and fetch requests.
//!
//! # Responsibility
//! - Express predicates and orderings as explicit tagged values.
//! - Validate query shape at construction sites before any scan runs.
//!
//! # Invariants
//! - `SortKey::compare` is a strict total order: ties after every sort field
//!   fall back to record identity.
//! - Filter evaluation never fails; incomparable operands evaluate to false
//!   (except `!=`, which is true).

use crate::model::record::{FieldValue, Record};
use crate::projection::ordering::{compare_for_filter, compare_values, localized_compare};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Query shape errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    EmptyKind,
    EmptyFieldName,
    /// `And`/`Or` without operands.
    EmptyCompound,
    /// `Between` bounds are inverted or not comparable.
    InvalidRange { field: String },
}

impl Display for QueryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "fetch request kind must not be blank"),
            Self::EmptyFieldName => write!(f, "query field names must not be blank"),
            Self::EmptyCompound => write!(f, "and/or filters need at least one operand"),
            Self::InvalidRange { field } => {
                write!(f, "range on `{field}` has inverted or incomparable bounds")
            }
        }
    }
}

impl Error for QueryValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Ne, None) => true,
            (_, None) => false,
            (Self::Eq, Some(ordering)) => ordering == Ordering::Equal,
            (Self::Ne, Some(ordering)) => ordering != Ordering::Equal,
            (Self::Lt, Some(ordering)) => ordering == Ordering::Less,
            (Self::Le, Some(ordering)) => ordering != Ordering::Greater,
            (Self::Gt, Some(ordering)) => ordering == Ordering::Greater,
            (Self::Ge, Some(ordering)) => ordering != Ordering::Less,
        }
    }
}

/// Boolean predicate over record fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every record.
    #[default]
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    /// Inclusive range.
    Between {
        field: String,
        low: FieldValue,
        high: FieldValue,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> Self {
        Self::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::All => other,
            Self::And(mut operands) => {
                operands.push(other);
                Self::And(operands)
            }
            current => Self::And(vec![current, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut operands) => {
                operands.push(other);
                Self::Or(operands)
            }
            current => Self::Or(vec![current, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates this predicate against one record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Compare { field, op, value } => {
                op.holds(compare_for_filter(record.value(field), value))
            }
            Self::Between { field, low, high } => {
                let actual = record.value(field);
                CompareOp::Ge.holds(compare_for_filter(actual, low))
                    && CompareOp::Le.holds(compare_for_filter(actual, high))
            }
            Self::And(operands) => operands.iter().all(|operand| operand.matches(record)),
            Self::Or(operands) => operands.iter().any(|operand| operand.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        match self {
            Self::All => Ok(()),
            Self::Compare { field, .. } => validate_field_name(field),
            Self::Between { field, low, high } => {
                validate_field_name(field)?;
                match compare_for_filter(low, high) {
                    Some(Ordering::Less) | Some(Ordering::Equal) => Ok(()),
                    _ => Err(QueryValidationError::InvalidRange {
                        field: field.clone(),
                    }),
                }
            }
            Self::And(operands) | Self::Or(operands) => {
                if operands.is_empty() {
                    return Err(QueryValidationError::EmptyCompound);
                }
                operands.iter().try_for_each(Filter::validate)
            }
            Self::Not(inner) => inner.validate(),
        }
    }
}

/// String collation used by one sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// Code-point order for text, natural order for everything else.
    #[default]
    Natural,
    /// Case-insensitive, digit-aware order for text.
    Localized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub ascending: bool,
    pub comparator: Comparator,
}

impl SortField {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
            comparator: Comparator::Natural,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            ascending: false,
            ..Self::ascending(field)
        }
    }

    pub fn localized(mut self) -> Self {
        self.comparator = Comparator::Localized;
        self
    }

    /// Same field and collation, opposite direction.
    pub fn reversed(mut self) -> Self {
        self.ascending = !self.ascending;
        self
    }

    fn compare(&self, left: &Record, right: &Record) -> Ordering {
        let left_value = left.value(&self.field);
        let right_value = right.value(&self.field);
        let ordering = match (self.comparator, left_value, right_value) {
            (Comparator::Localized, FieldValue::Text(a), FieldValue::Text(b)) => {
                localized_compare(a, b)
            }
            _ => compare_values(left_value, right_value),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Ordered list of sort fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortKey {
    fields: Vec<SortField>,
}

impl SortKey {
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    pub fn then(mut self, field: SortField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Strict total order; identity breaks every remaining tie.
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        self.fields
            .iter()
            .map(|field| field.compare(left, right))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| left.id.cmp(&right.id))
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        self.fields
            .iter()
            .try_for_each(|field| validate_field_name(&field.field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSource {
    /// Section by the raw field value.
    Field(String),
    /// Section by the upper-cased first character of a text field.
    FirstLetter(String),
}

/// Grouping rule that partitions a projection into sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionKey {
    pub source: SectionSource,
    pub ascending: bool,
}

impl SectionKey {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            source: SectionSource::Field(name.into()),
            ascending: true,
        }
    }

    pub fn first_letter(name: impl Into<String>) -> Self {
        Self {
            source: SectionSource::FirstLetter(name.into()),
            ascending: true,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Derives the section value of one record.
    pub fn section_value(&self, record: &Record) -> FieldValue {
        match &self.source {
            SectionSource::Field(field) => record.value(field).clone(),
            SectionSource::FirstLetter(field) => match record.value(field) {
                FieldValue::Text(text) => text
                    .trim_start()
                    .chars()
                    .next()
                    .map(|first| FieldValue::Text(first.to_uppercase().collect()))
                    .unwrap_or(FieldValue::Null),
                _ => FieldValue::Null,
            },
        }
    }

    /// Orders two section values in section direction.
    pub fn compare_values(&self, left: &FieldValue, right: &FieldValue) -> Ordering {
        let ordering = compare_values(left, right);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }

    fn validate(&self) -> Result<(), QueryValidationError> {
        match &self.source {
            SectionSource::Field(field) | SectionSource::FirstLetter(field) => {
                validate_field_name(field)
            }
        }
    }
}

/// Everything needed to scan one collection into an ordered result.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub kind: String,
    pub filter: Filter,
    pub sort: SortKey,
    /// `None` keeps every row in one unnamed section.
    pub section: Option<SectionKey>,
}

impl FetchRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filter: Filter::All,
            sort: SortKey::default(),
            section: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sorted_by(mut self, field: SortField) -> Self {
        self.sort = self.sort.then(field);
        self
    }

    pub fn sectioned_by(mut self, section: SectionKey) -> Self {
        self.section = Some(section);
        self
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.kind.trim().is_empty() {
            return Err(QueryValidationError::EmptyKind);
        }
        self.filter.validate()?;
        self.sort.validate()?;
        if let Some(section) = &self.section {
            section.validate()?;
        }
        Ok(())
    }

    /// Section value of a record under this request.
    pub fn section_value(&self, record: &Record) -> FieldValue {
        self.section
            .as_ref()
            .map_or(FieldValue::Null, |section| section.section_value(record))
    }

    /// Compares two section values; all values are equal without a section key.
    pub fn compare_sections(&self, left: &FieldValue, right: &FieldValue) -> Ordering {
        self.section
            .as_ref()
            .map_or(Ordering::Equal, |section| section.compare_values(left, right))
    }

    /// Full row order: section first, then sort key, then identity.
    pub fn compare_records(&self, left: &Record, right: &Record) -> Ordering {
        self.compare_sections(&self.section_value(left), &self.section_value(right))
            .then_with(|| self.sort.compare(left, right))
    }
}

fn validate_field_name(field: &str) -> Result<(), QueryValidationError> {
    if field.trim().is_empty() {
        return Err(QueryValidationError::EmptyFieldName);
    }
    Ok(())
}
