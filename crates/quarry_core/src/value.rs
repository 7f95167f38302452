//! Runtime values flowing through compiled pipelines.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// A totally ordered float64.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[repr(transparent)]
pub struct OrdF64(f64);

impl From<f64> for OrdF64 {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl From<OrdF64> for f64 {
    fn from(v: OrdF64) -> Self {
        v.0
    }
}

impl Deref for OrdF64 {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for OrdF64 {
    fn eq(&self, other: &Self) -> bool {
        f64::total_cmp(self, other).is_eq()
    }
}

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }
}

/// A single record, positionally aligned with a schema.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(OrdF64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Values of a REPEATED field.
    List(Vec<Value>),
    /// Values of a RECORD field, keyed by nested field name.
    Record(Vec<(String, Value)>),
}

/// Canonical numeric form so that `1` and `1.0` compare and hash the same.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(OrdF64),
}

impl Numeric {
    fn from_float(f: f64) -> Self {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Numeric::Int(f as i64)
        } else {
            Numeric::Float(f.into())
        }
    }

    fn cmp(self, other: Numeric) -> Ordering {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
            (Numeric::Float(a), Numeric::Float(b)) => a.cmp(&b),
            (Numeric::Int(a), Numeric::Float(b)) => {
                OrdF64::from(a as f64).cmp(&b).then(Ordering::Less)
            }
            (Numeric::Float(a), Numeric::Int(b)) => {
                a.cmp(&OrdF64::from(b as f64)).then(Ordering::Greater)
            }
        }
    }
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::DateTime(_) => 5,
            Value::Time(_) => 6,
            Value::List(_) => 7,
            Value::Record(_) => 8,
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Value::Integer(i) => Some(Numeric::Int(*i)),
            Value::Float(f) => Some(Numeric::from_float(**f)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Only `true` passes a filter, NULL and `false` do not.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(**f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Type of the value, NULL for `Value::Null`.
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::DateTime(_) => DataType::DateTime,
            Value::Time(_) => DataType::Time,
            Value::List(vals) => vals.first().map(Value::datatype).unwrap_or(DataType::Null),
            Value::Record(_) => DataType::Record,
        }
    }

    /// Approximate in-memory footprint, inline size plus owned heap bytes.
    pub fn size_estimate(&self) -> usize {
        let heap = match self {
            Value::String(s) => s.capacity(),
            Value::List(vals) => vals.iter().map(Value::size_estimate).sum(),
            Value::Record(fields) => fields
                .iter()
                .map(|(name, val)| name.capacity() + std::mem::size_of::<String>() + val.size_estimate())
                .sum(),
            _ => 0,
        };
        std::mem::size_of::<Value>() + heap
    }
}

/// Approximate footprint of a row and all of its elements.
pub fn row_size_estimate(row: &[Value]) -> usize {
    std::mem::size_of::<Row>() + row.iter().map(Value::size_estimate).sum::<usize>()
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b)) => a.cmp(b),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => (),
            Value::Boolean(b) => b.hash(state),
            Value::Integer(_) | Value::Float(_) => match self.numeric() {
                Some(Numeric::Int(i)) => i.hash(state),
                Some(Numeric::Float(f)) => f.to_bits().hash(state),
                None => (),
            },
            Value::String(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::List(vals) => vals.hash(state),
            Value::Record(fields) => fields.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{}", **v),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::List(vals) => {
                write!(f, "[")?;
                for (idx, val) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{val}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (idx, (name, val)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {val}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Build a row from heterogenous literals.
///
/// `row![1234, "Tom", Value::Null]`
#[macro_export]
macro_rules! row {
    ($($val:expr),* $(,)?) => {
        vec![$($crate::value::Value::from($val)),*]
    };
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(v: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn integer_and_integral_float_equal() {
        let a = Value::Integer(3);
        let b = Value::from(3.0);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn negative_zero_matches_zero() {
        assert_eq!(Value::from(-0.0), Value::Integer(0));
        assert_eq!(hash_of(&Value::from(-0.0)), hash_of(&Value::from(0.0)));
    }

    #[test]
    fn null_sorts_first() {
        let mut vals = vec![
            Value::from("b"),
            Value::Integer(4),
            Value::Null,
            Value::from(1.5),
            Value::Boolean(false),
        ];
        vals.sort();
        assert_eq!(
            vec![
                Value::Null,
                Value::Boolean(false),
                Value::from(1.5),
                Value::Integer(4),
                Value::from("b"),
            ],
            vals
        );
    }

    #[test]
    fn non_integral_float_between_integers() {
        assert!(Value::Integer(1) < Value::from(1.5));
        assert!(Value::from(1.5) < Value::Integer(2));
    }

    #[test]
    fn size_estimate_counts_heap() {
        let small = Value::from("a");
        let large = Value::from("a".repeat(1000));
        assert!(large.size_estimate() >= small.size_estimate() + 999);
    }

    #[test]
    fn row_macro() {
        let row = row![1234, "Tom", Value::Null];
        assert_eq!(
            vec![Value::Integer(1234), Value::from("Tom"), Value::Null],
            row
        );
    }
}
