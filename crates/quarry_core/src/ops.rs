//! Scalar operator semantics over runtime values.
//!
//! Equality is structural, so `NULL = NULL` holds. Ordering comparisons,
//! arithmetic and pattern matching involving NULL produce NULL. Logical
//! operators use three-valued logic.
use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::errors::{Result, execution};
use crate::expr::{BinaryOperator, UnaryOperator};
use crate::schema::DataType;
use crate::value::Value;

/// Evaluate a binary operator.
///
/// Pattern operators compile their pattern on every call, callers with a
/// constant pattern should use `like_regex` and `pattern_match` instead.
pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    use BinaryOperator::*;

    match op {
        Eq | Is => Ok(Value::Boolean(left == right)),
        NotEq | IsNot => Ok(Value::Boolean(left != right)),
        Lt | LtEq | Gt | GtEq => Ok(compare(op, left, right)),
        In => contains(left, right),
        Like | NotLike | RLike | NotRLike | Regexp => {
            let Some(pattern) = pattern_str(right)? else {
                return Ok(Value::Null);
            };
            let regex = match op {
                Like | NotLike => like_regex(pattern)?,
                _ => Regex::new(pattern)?,
            };
            pattern_match(op, left, &regex)
        }
        Plus | Minus | Multiply | Divide => arithmetic(op, left, right),
        And => and(left, right),
        Or => or(left, right),
    }
}

/// Evaluate a unary operator.
///
/// Sort direction markers are consumed by the sort operator and never
/// evaluated as values.
pub fn unary(op: UnaryOperator, value: Value) -> Result<Value> {
    match op {
        UnaryOperator::Asc | UnaryOperator::Desc => {
            Err(execution!("sort direction {op} outside of ORDER BY"))
        }
        UnaryOperator::Neg => match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| execution!("integer overflow negating {i}")),
            Value::Float(f) => Ok(Value::from(-*f)),
            other => Err(execution!("can't negate {other}")),
        },
        UnaryOperator::Not => match truth(&value)? {
            Some(b) => Ok(Value::Boolean(!b)),
            None => Ok(Value::Null),
        },
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    let ord = left.cmp(right);
    let result = match op {
        BinaryOperator::Lt => ord == Ordering::Less,
        BinaryOperator::LtEq => ord != Ordering::Greater,
        BinaryOperator::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    };
    Value::Boolean(result)
}

fn contains(needle: &Value, haystack: &Value) -> Result<Value> {
    if needle.is_null() {
        return Ok(Value::Null);
    }
    match haystack {
        Value::List(vals) => Ok(Value::Boolean(vals.contains(needle))),
        Value::Null => Ok(Value::Null),
        other => Err(execution!("IN requires a list, got {other}")),
    }
}

/// Three-valued truth of a value, `None` for NULL.
fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(execution!("expected a boolean, got {other}")),
    }
}

fn and(left: &Value, right: &Value) -> Result<Value> {
    Ok(match (truth(left)?, truth(right)?) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    })
}

fn or(left: &Value, right: &Value) -> Result<Value> {
    Ok(match (truth(left)?, truth(right)?) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    })
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOperator::Plus => a.checked_add(b),
                BinaryOperator::Minus => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                _ => {
                    if b == 0 {
                        return Err(execution!("division by zero"));
                    }
                    a.checked_div(b)
                }
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| execution!("integer overflow evaluating {a} {op} {b}"))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOperator::Plus => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => {
                let result = match op {
                    BinaryOperator::Plus => a + b,
                    BinaryOperator::Minus => a - b,
                    BinaryOperator::Multiply => a * b,
                    _ => {
                        if b == 0.0 {
                            return Err(execution!("division by zero"));
                        }
                        a / b
                    }
                };
                Ok(Value::from(result))
            }
            _ => Err(execution!("unsupported operands for {op}: {a}, {b}")),
        },
    }
}

fn pattern_str(pattern: &Value) -> Result<Option<&str>> {
    match pattern {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(execution!("pattern must be a string, got {other}")),
    }
}

/// Compile a SQL LIKE pattern into an anchored regex.
///
/// `%` matches any sequence, `_` matches a single character.
pub fn like_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

/// Match a value against a compiled pattern for one of the pattern
/// operators.
pub fn pattern_match(op: BinaryOperator, value: &Value, regex: &Regex) -> Result<Value> {
    let s = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s,
        other => return Err(execution!("{op} requires a string, got {other}")),
    };
    let matched = regex.is_match(s);
    Ok(Value::Boolean(match op {
        BinaryOperator::NotLike | BinaryOperator::NotRLike => !matched,
        _ => matched,
    }))
}

/// Index into a list by position or a record by field name.
pub fn item_get(value: &Value, key: &Value) -> Result<Value> {
    match (value, key) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(vals), Value::Integer(idx)) => Ok(usize::try_from(*idx)
            .ok()
            .and_then(|idx| vals.get(idx))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::Record(fields), Value::String(name)) => Ok(fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, val)| val.clone())
            .unwrap_or(Value::Null)),
        (value, key) => Err(execution!("can't index {value} with {key}")),
    }
}

/// Convert a value to another type.
pub fn cast(value: Value, datatype: DataType) -> Result<Value> {
    if value.is_null() || datatype == DataType::Null {
        return Ok(value);
    }

    let fail = |value: &Value| execution!("can't cast {value} to {datatype}");

    match datatype {
        DataType::Integer => match &value {
            Value::Integer(_) => Ok(value),
            Value::Float(f) => {
                let truncated = f.trunc();
                if truncated.is_finite()
                    && truncated >= i64::MIN as f64
                    && truncated < i64::MAX as f64
                {
                    Ok(Value::Integer(truncated as i64))
                } else {
                    Err(fail(&value))
                }
            }
            Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        DataType::Float => match &value {
            Value::Float(_) => Ok(value),
            Value::Integer(i) => Ok(Value::from(*i as f64)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        DataType::String => match value {
            Value::String(_) => Ok(value),
            Value::List(_) | Value::Record(_) => Err(fail(&value)),
            other => Ok(Value::String(other.to_string())),
        },
        DataType::Boolean => match &value {
            Value::Boolean(_) => Ok(value),
            Value::Integer(i) => Ok(Value::Boolean(*i != 0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(fail(&value)),
            },
            _ => Err(fail(&value)),
        },
        DataType::Date => match &value {
            Value::Date(_) => Ok(value),
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        DataType::DateTime => match &value {
            Value::DateTime(_) => Ok(value),
            Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
            Value::String(s) => ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
                .map(Value::DateTime)
                .ok_or_else(|| fail(&value)),
            _ => Err(fail(&value)),
        },
        DataType::Time => match &value {
            Value::Time(_) => Ok(value),
            Value::DateTime(dt) => Ok(Value::Time(dt.time())),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
                .map(Value::Time)
                .map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        DataType::Record | DataType::Binary | DataType::Null => Err(fail(&value)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BinaryOperator::Eq, Value::Null, Value::Null, Value::Boolean(true))]
    #[case(BinaryOperator::Eq, Value::Integer(1), Value::Null, Value::Boolean(false))]
    #[case(BinaryOperator::IsNot, Value::Integer(1), Value::Null, Value::Boolean(true))]
    #[case(BinaryOperator::Lt, Value::Null, Value::Integer(1), Value::Null)]
    #[case(BinaryOperator::Lt, Value::Integer(1), Value::from(1.5), Value::Boolean(true))]
    #[case(BinaryOperator::GtEq, Value::from("b"), Value::from("a"), Value::Boolean(true))]
    #[case(BinaryOperator::And, Value::Null, Value::Boolean(false), Value::Boolean(false))]
    #[case(BinaryOperator::And, Value::Null, Value::Boolean(true), Value::Null)]
    #[case(BinaryOperator::Or, Value::Null, Value::Boolean(true), Value::Boolean(true))]
    #[case(BinaryOperator::Or, Value::Null, Value::Boolean(false), Value::Null)]
    #[case(BinaryOperator::Plus, Value::Integer(1), Value::from(0.5), Value::from(1.5))]
    #[case(BinaryOperator::Plus, Value::from("ab"), Value::from("cd"), Value::from("abcd"))]
    #[case(BinaryOperator::Divide, Value::Integer(7), Value::Integer(2), Value::Integer(3))]
    #[case(BinaryOperator::Minus, Value::Integer(7), Value::Null, Value::Null)]
    #[case(BinaryOperator::Like, Value::from("Sally"), Value::from("S%y"), Value::Boolean(true))]
    #[case(BinaryOperator::Like, Value::from("Sal.y"), Value::from("Sa__y"), Value::Boolean(true))]
    #[case(BinaryOperator::Like, Value::from("Sally"), Value::from("Sal"), Value::Boolean(false))]
    #[case(BinaryOperator::NotLike, Value::from("Tom"), Value::from("S%"), Value::Boolean(true))]
    #[case(BinaryOperator::RLike, Value::from("Mark"), Value::from("ar"), Value::Boolean(true))]
    #[case(BinaryOperator::Regexp, Value::from("Mark"), Value::from("^ar"), Value::Boolean(false))]
    #[case(BinaryOperator::In, Value::Integer(2), Value::from(vec![1, 2]), Value::Boolean(true))]
    #[case(BinaryOperator::In, Value::Null, Value::from(vec![1, 2]), Value::Null)]
    fn binary_cases(
        #[case] op: BinaryOperator,
        #[case] left: Value,
        #[case] right: Value,
        #[case] expected: Value,
    ) {
        assert_eq!(expected, binary(op, &left, &right).unwrap());
    }

    #[rstest]
    #[case(BinaryOperator::Divide, Value::Integer(1), Value::Integer(0))]
    #[case(BinaryOperator::Divide, Value::from(1.0), Value::Integer(0))]
    #[case(BinaryOperator::Plus, Value::Integer(i64::MAX), Value::Integer(1))]
    #[case(BinaryOperator::Multiply, Value::from("a"), Value::Integer(2))]
    #[case(BinaryOperator::And, Value::Integer(1), Value::Boolean(true))]
    fn binary_errors(#[case] op: BinaryOperator, #[case] left: Value, #[case] right: Value) {
        binary(op, &left, &right).unwrap_err();
    }

    #[test]
    fn not_is_three_valued() {
        assert_eq!(Value::Null, unary(UnaryOperator::Not, Value::Null).unwrap());
        assert_eq!(
            Value::Boolean(false),
            unary(UnaryOperator::Not, Value::Boolean(true)).unwrap()
        );
    }

    #[test]
    fn sort_direction_is_not_a_value() {
        unary(UnaryOperator::Desc, Value::from("x")).unwrap_err();
        unary(UnaryOperator::Asc, Value::Integer(1)).unwrap_err();
    }

    #[test]
    fn item_get_list_and_record() {
        let list = Value::from(vec!["a", "b"]);
        assert_eq!(Value::from("b"), item_get(&list, &Value::Integer(1)).unwrap());
        assert_eq!(Value::Null, item_get(&list, &Value::Integer(5)).unwrap());

        let record = Value::Record(vec![("name".to_string(), Value::from("Tom"))]);
        assert_eq!(
            Value::from("Tom"),
            item_get(&record, &Value::from("name")).unwrap()
        );
    }

    #[rstest]
    #[case(Value::from("42"), DataType::Integer, Value::Integer(42))]
    #[case(Value::from(2.9), DataType::Integer, Value::Integer(2))]
    #[case(Value::Integer(3), DataType::String, Value::from("3"))]
    #[case(Value::from("true"), DataType::Boolean, Value::Boolean(true))]
    #[case(Value::Null, DataType::Integer, Value::Null)]
    #[case(
        Value::from("2024-02-29"),
        DataType::Date,
        Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    )]
    fn cast_cases(#[case] value: Value, #[case] datatype: DataType, #[case] expected: Value) {
        assert_eq!(expected, cast(value, datatype).unwrap());
    }

    #[rstest]
    #[case::bad_string(Value::from("nope"))]
    #[case::too_large(Value::from(1e30))]
    #[case::too_small(Value::from(-1e19))]
    #[case::not_a_number(Value::from(f64::NAN))]
    #[case::infinite(Value::from(f64::INFINITY))]
    fn cast_to_integer_fails(#[case] value: Value) {
        cast(value, DataType::Integer).unwrap_err();
    }
}
