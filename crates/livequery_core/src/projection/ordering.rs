//! Value ordering primitives shared by filters, sorts and sections.
//!
//! # Invariants
//! - `compare_values` is a total order over every `FieldValue`.
//! - `compare_for_filter` returns `None` when the two values are not
//!   comparable (null on either side, or unrelated types).
//! - `localized_compare` never consults process locale; it is a fixed
//!   case-insensitive, digit-aware collation.

use crate::model::record::FieldValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static COLLATION_CHUNK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+|\D+").expect("valid collation chunk regex"));

/// Total natural order over field values.
///
/// Null sorts first; numbers compare across integer/real; unrelated types
/// fall back to a fixed type rank.
pub fn compare_values(left: &FieldValue, right: &FieldValue) -> Ordering {
    match compare_numbers(left, right) {
        Some(ordering) => ordering,
        None => match (left, right) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Blob(a), FieldValue::Blob(b)) => a.cmp(b),
            (FieldValue::Reference(a), FieldValue::Reference(b)) => a.cmp(b),
            _ => type_rank(left).cmp(&type_rank(right)),
        },
    }
}

/// Partial order used by filter predicates.
pub fn compare_for_filter(left: &FieldValue, right: &FieldValue) -> Option<Ordering> {
    if let Some(ordering) = compare_numbers(left, right) {
        return Some(ordering);
    }
    match (left, right) {
        (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
        (FieldValue::Null, _) | (_, FieldValue::Null) => None,
        _ if type_rank(left) == type_rank(right) => Some(compare_values(left, right)),
        _ => None,
    }
}

/// Case-insensitive comparison where digit runs compare by numeric value.
///
/// `"Item 2"` sorts before `"Item 10"`, `"apple"` and `"Apple"` are equal.
pub fn localized_compare(left: &str, right: &str) -> Ordering {
    let mut left_chunks = COLLATION_CHUNK_RE.find_iter(left);
    let mut right_chunks = COLLATION_CHUNK_RE.find_iter(right);

    loop {
        match (left_chunks.next(), right_chunks.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                let ordering = compare_chunk(a.as_str(), b.as_str());
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_chunk(left: &str, right: &str) -> Ordering {
    let left_digits = left.bytes().all(|byte| byte.is_ascii_digit());
    let right_digits = right.bytes().all(|byte| byte.is_ascii_digit());
    if left_digits && right_digits {
        let a = left.trim_start_matches('0');
        let b = right.trim_start_matches('0');
        return a.len().cmp(&b.len()).then_with(|| a.cmp(b));
    }
    left.to_lowercase().cmp(&right.to_lowercase())
}

fn compare_numbers(left: &FieldValue, right: &FieldValue) -> Option<Ordering> {
    match (left, right) {
        (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
        (FieldValue::Integer(a), FieldValue::Real(b)) => Some(compare_integer_real(*a, *b)),
        (FieldValue::Real(a), FieldValue::Integer(b)) => {
            Some(compare_integer_real(*b, *a).reverse())
        }
        (FieldValue::Real(a), FieldValue::Real(b)) => Some(a.total_cmp(b)),
        _ => None,
    }
}

/// Exact integer/real comparison, consistent with `f64::total_cmp`.
///
/// `-0.0` sits just below integer zero, NaN beyond every integer.
fn compare_integer_real(integer: i64, real: f64) -> Ordering {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    if real.is_nan() {
        return if real.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if real >= I64_BOUND {
        return Ordering::Less;
    }
    if real < -I64_BOUND {
        return Ordering::Greater;
    }
    if integer == 0 && real == 0.0 && real.is_sign_negative() {
        return Ordering::Greater;
    }
    let whole = real.trunc();
    integer
        .cmp(&(whole as i64))
        .then_with(|| 0.0_f64.total_cmp(&(real - whole)))
}

fn type_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Null => 0,
        FieldValue::Bool(_) => 1,
        FieldValue::Integer(_) | FieldValue::Real(_) => 2,
        FieldValue::Date(_) => 3,
        FieldValue::Text(_) => 4,
        FieldValue::Blob(_) => 5,
        FieldValue::Reference(_) => 6,
    }
}
