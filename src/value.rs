//! Cell values and the scalar rules shared by expressions, joins, grouping
//! and sorting.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

#[derive(Clone, Copy)]
pub(crate) enum NumericValue {
    Integer(i64),
    Real(f64),
}

/// Hashable form of a value used for join and grouping keys.
///
/// Reals holding an exact integer collapse onto the integer key so that
/// `1` and `1.0` land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Integer(i64),
    Real(u64),
    Text(String),
}

impl Value {
    /// Infers a value from a raw CSV field: integer, then real, then text.
    /// Empty fields are NULL.
    pub fn infer(field: &str) -> Value {
        if field.is_empty() {
            return Value::Null;
        }
        match parse_numeric_text(field) {
            Some(NumericValue::Integer(v)) => Value::Integer(v),
            Some(NumericValue::Real(v)) => Value::Real(v),
            None => Value::Text(field.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
        }
    }

    /// Renders a value the way result sets print it: `NULL`, plain integers,
    /// reals with three decimals.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format!("{:.3}", v),
            Value::Text(s) => s.clone(),
        }
    }

    /// Ordering used by ORDER BY and MIN/MAX. NULL sorts first, numbers
    /// before text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
            (Value::Real(l), Value::Real(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
            (Value::Integer(l), Value::Real(r)) => {
                (*l as f64).partial_cmp(r).unwrap_or(Ordering::Equal)
            }
            (Value::Real(l), Value::Integer(r)) => {
                l.partial_cmp(&(*r as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::Text(l), Value::Text(r)) => l.cmp(r),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
        }
    }

    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Integer(v) => ValueKey::Integer(*v),
            Value::Real(v) => {
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    ValueKey::Integer(*v as i64)
                } else {
                    ValueKey::Real(v.to_bits())
                }
            }
            Value::Text(s) => ValueKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{:?}", v),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

pub(crate) fn parse_numeric_text(text: &str) -> Option<NumericValue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.contains(['.', 'e', 'E']) {
        if let Ok(value) = trimmed.parse::<i64>() {
            return Some(NumericValue::Integer(value));
        }
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        if value.is_finite() {
            return Some(NumericValue::Real(value));
        }
    }
    None
}

/// Numeric view of a value. Text is never coerced here; comparing `'10'`
/// with `9` falls back to text ordering instead.
pub(crate) fn numeric_value(value: &Value) -> Option<NumericValue> {
    match value {
        Value::Integer(v) => Some(NumericValue::Integer(*v)),
        Value::Real(v) => Some(NumericValue::Real(*v)),
        _ => None,
    }
}

pub(crate) fn numeric_to_f64(value: NumericValue) -> (f64, bool) {
    match value {
        NumericValue::Integer(v) => (v as f64, false),
        NumericValue::Real(v) => (v, true),
    }
}

pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(text) => text.clone(),
    }
}

pub(crate) fn value_to_truth_value(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(*v != 0),
        Value::Real(v) => Some(*v != 0.0),
        Value::Text(text) => Some(match parse_numeric_text(text) {
            Some(num) => numeric_to_f64(num).0 != 0.0,
            None => false,
        }),
    }
}

pub(crate) fn value_to_bool(value: &Value) -> bool {
    value_to_truth_value(value).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_prefers_integer_then_real_then_text() {
        assert_eq!(Value::infer("42"), Value::Integer(42));
        assert_eq!(Value::infer("-2.5"), Value::Real(-2.5));
        assert_eq!(Value::infer("abc"), Value::Text("abc".into()));
        assert_eq!(Value::infer(""), Value::Null);
    }

    #[test]
    fn integral_reals_share_integer_keys() {
        assert_eq!(Value::Real(3.0).key(), Value::Integer(3).key());
        assert_ne!(Value::Real(3.5).key(), Value::Integer(3).key());
    }

    #[test]
    fn nulls_sort_first() {
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(-5)), Ordering::Less);
        assert_eq!(
            Value::Integer(2).sort_cmp(&Value::Real(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            Value::Text("a".into()).sort_cmp(&Value::Integer(100)),
            Ordering::Greater
        );
    }
}
