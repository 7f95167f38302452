//! Aggregates as (initial, combine, finalize) state machines.
use std::fmt::{self, Debug};
use std::sync::Arc;

use super::ReturnField;
use crate::errors::{Result, internal};
use crate::expr::BinaryOperator;
use crate::ops;
use crate::schema::{DataType, Field};
use crate::value::Value;

pub type CombineFn = Arc<dyn Fn(Value, &[Value]) -> Result<Value> + Sync + Send>;
pub type FinalizeFn = Arc<dyn Fn(Value) -> Result<Value> + Sync + Send>;

#[derive(Clone)]
pub struct Aggregate {
    pub name: String,
    /// Fold one row's argument values into the state.
    pub combine: CombineFn,
    /// State before any row has been combined.
    pub initial: Value,
    /// Convert the final state into the output value. Identity if absent.
    pub finalize: Option<FinalizeFn>,
    pub returns: ReturnField,
}

impl Aggregate {
    pub fn new<F>(name: impl Into<String>, returns: ReturnField, initial: Value, combine: F) -> Self
    where
        F: Fn(Value, &[Value]) -> Result<Value> + Sync + Send + 'static,
    {
        Aggregate {
            name: name.into(),
            combine: Arc::new(combine),
            initial,
            finalize: None,
            returns,
        }
    }

    pub fn with_finalize<F>(mut self, finalize: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Sync + Send + 'static,
    {
        self.finalize = Some(Arc::new(finalize));
        self
    }

    pub fn combine(&self, state: Value, args: &[Value]) -> Result<Value> {
        (self.combine)(state, args)
    }

    pub fn finalize(&self, state: Value) -> Result<Value> {
        match &self.finalize {
            Some(finalize) => finalize(state),
            None => Ok(state),
        }
    }
}

impl Debug for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// First argument, or NULL if called without arguments.
fn first_arg(args: &[Value]) -> &Value {
    args.first().unwrap_or(&Value::Null)
}

/// Combine non-null values with `f`, the first non-null value seeds the
/// state.
fn skip_nulls<F>(f: F) -> impl Fn(Value, &[Value]) -> Result<Value> + Sync + Send + 'static
where
    F: Fn(Value, &Value) -> Result<Value> + Sync + Send + 'static,
{
    move |state, args| {
        let arg = first_arg(args);
        match (state, arg) {
            (state, Value::Null) => Ok(state),
            (Value::Null, arg) => Ok(arg.clone()),
            (state, arg) => f(state, arg),
        }
    }
}

pub fn count() -> Aggregate {
    Aggregate::new(
        "count",
        ReturnField::fixed(Field::new("count", DataType::Integer)),
        Value::Integer(0),
        |state, args| {
            // count() counts rows, count(x) counts non-null x.
            if args.first().is_some_and(Value::is_null) {
                return Ok(state);
            }
            ops::binary(BinaryOperator::Plus, &state, &Value::Integer(1))
        },
    )
}

pub fn sum() -> Aggregate {
    Aggregate::new(
        "sum",
        ReturnField::FirstArgument {
            name: "sum".to_string(),
        },
        Value::Null,
        skip_nulls(|state, arg| ops::binary(BinaryOperator::Plus, &state, arg)),
    )
}

pub fn min() -> Aggregate {
    Aggregate::new(
        "min",
        ReturnField::FirstArgument {
            name: "min".to_string(),
        },
        Value::Null,
        skip_nulls(|state, arg| Ok(if *arg < state { arg.clone() } else { state })),
    )
}

pub fn max() -> Aggregate {
    Aggregate::new(
        "max",
        ReturnField::FirstArgument {
            name: "max".to_string(),
        },
        Value::Null,
        skip_nulls(|state, arg| Ok(if *arg > state { arg.clone() } else { state })),
    )
}

/// State is `[count, sum]`.
pub fn avg() -> Aggregate {
    Aggregate::new(
        "avg",
        ReturnField::fixed(Field::new("avg", DataType::Float)),
        Value::List(vec![Value::Integer(0), Value::from(0.0)]),
        |state, args| {
            let arg = first_arg(args);
            if arg.is_null() {
                return Ok(state);
            }
            let (count, sum) = avg_state(state)?;
            let sum = ops::binary(BinaryOperator::Plus, &sum, arg)?;
            Ok(Value::List(vec![Value::Integer(count + 1), sum]))
        },
    )
    .with_finalize(|state| {
        let (count, sum) = avg_state(state)?;
        if count == 0 {
            return Ok(Value::Null);
        }
        ops::binary(
            BinaryOperator::Divide,
            &Value::from(sum.as_f64().unwrap_or_default()),
            &Value::from(count as f64),
        )
    })
}

fn avg_state(state: Value) -> Result<(i64, Value)> {
    match state {
        Value::List(mut vals) if vals.len() == 2 => {
            let sum = vals.pop().unwrap_or_default();
            match vals.pop() {
                Some(Value::Integer(count)) => Ok((count, sum)),
                other => Err(internal!("invalid avg count: {other:?}")),
            }
        }
        other => Err(internal!("invalid avg state: {other}")),
    }
}

pub fn builtin_aggregates() -> Vec<Aggregate> {
    vec![count(), sum(), min(), max(), avg()]
}
