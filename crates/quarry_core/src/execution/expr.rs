use std::sync::Arc;

use regex::Regex;

use super::ExecutionContext;
use crate::errors::{QuarryError, Result, internal};
use crate::expr::{BinaryOperator, Expression, UnaryOperator};
use crate::functions::FunctionRegistry;
use crate::functions::scalar::ScalarFunction;
use crate::ops;
use crate::schema::{DataType, Schema};
use crate::value::Value;

/// An expression bound to positions of an input row.
#[derive(Debug, Clone)]
pub enum PhysicalScalarExpression {
    /// Reference to a column in the input row.
    Column(usize),
    Literal(Value),
    /// Query parameter, read from the execution context.
    Param(usize),
    Unary {
        op: UnaryOperator,
        input: Box<PhysicalScalarExpression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<PhysicalScalarExpression>,
        right: Box<PhysicalScalarExpression>,
    },
    /// Pattern match against a constant pattern, compiled once.
    Like {
        op: BinaryOperator,
        input: Box<PhysicalScalarExpression>,
        pattern: Regex,
    },
    Between {
        input: Box<PhysicalScalarExpression>,
        low: Box<PhysicalScalarExpression>,
        high: Box<PhysicalScalarExpression>,
    },
    Tuple(Vec<PhysicalScalarExpression>),
    ScalarFunction {
        function: Arc<dyn ScalarFunction>,
        inputs: Vec<PhysicalScalarExpression>,
    },
    Case {
        /// When <left>, then <right>
        when_then: Vec<(PhysicalScalarExpression, PhysicalScalarExpression)>,
        default: Option<Box<PhysicalScalarExpression>>,
    },
    Cast {
        input: Box<PhysicalScalarExpression>,
        to: DataType,
    },
    ItemGet {
        input: Box<PhysicalScalarExpression>,
        key: Value,
    },
}

impl PhysicalScalarExpression {
    /// Bind a logical expression against the schema of the input rows.
    ///
    /// Aggregate calls and `*` are handled by the operators containing them
    /// and are rejected here.
    pub fn plan(expr: &Expression, input: &Schema, registry: &FunctionRegistry) -> Result<Self> {
        let plan = |expr: &Expression| Self::plan(expr, input, registry).map(Box::new);

        Ok(match expr {
            Expression::Var(path) => Self::Column(input.field_position(path)?),
            Expression::Const(value) => Self::Literal(value.clone()),
            Expression::Param(idx) => Self::Param(*idx),
            Expression::Unary { op, expr } => Self::Unary {
                op: *op,
                input: plan(expr)?,
            },
            Expression::Binary { op, left, right } => match (op, right.as_ref()) {
                (
                    BinaryOperator::Like | BinaryOperator::NotLike,
                    Expression::Const(Value::String(pattern)),
                ) => Self::Like {
                    op: *op,
                    input: plan(left)?,
                    pattern: ops::like_regex(pattern)?,
                },
                (
                    BinaryOperator::RLike | BinaryOperator::NotRLike | BinaryOperator::Regexp,
                    Expression::Const(Value::String(pattern)),
                ) => Self::Like {
                    op: *op,
                    input: plan(left)?,
                    pattern: Regex::new(pattern)?,
                },
                _ => Self::Binary {
                    op: *op,
                    left: plan(left)?,
                    right: plan(right)?,
                },
            },
            Expression::Between { expr, low, high } => Self::Between {
                input: plan(expr)?,
                low: plan(low)?,
                high: plan(high)?,
            },
            Expression::Tuple(exprs) => Self::Tuple(
                exprs
                    .iter()
                    .map(|e| Self::plan(e, input, registry))
                    .collect::<Result<_>>()?,
            ),
            Expression::Function { name, args } => {
                if registry.is_aggregate(name) {
                    return Err(QuarryError::Execution(format!(
                        "aggregate '{name}' is not allowed in a scalar expression"
                    )));
                }
                Self::ScalarFunction {
                    function: registry.get_scalar(name)?,
                    inputs: args
                        .iter()
                        .map(|e| Self::plan(e, input, registry))
                        .collect::<Result<_>>()?,
                }
            }
            Expression::Rename { expr, .. } => Self::plan(expr, input, registry)?,
            Expression::SelectAll(_) => {
                return Err(internal!("'*' must be expanded before planning"));
            }
            Expression::CaseWhen {
                conditions,
                default,
            } => Self::Case {
                when_then: conditions
                    .iter()
                    .map(|(when, then)| {
                        Ok((
                            Self::plan(when, input, registry)?,
                            Self::plan(then, input, registry)?,
                        ))
                    })
                    .collect::<Result<_>>()?,
                default: default.as_deref().map(plan).transpose()?,
            },
            Expression::Cast { expr, datatype } => Self::Cast {
                input: plan(expr)?,
                to: *datatype,
            },
            Expression::ItemGet { expr, key } => Self::ItemGet {
                input: plan(expr)?,
                key: key.clone(),
            },
        })
    }

    /// Evaluate against a single row.
    pub fn eval(&self, row: &[Value], ctx: &ExecutionContext) -> Result<Value> {
        match self {
            Self::Column(idx) => row
                .get(*idx)
                .cloned()
                .ok_or_else(|| internal!("column {idx} out of bounds for row of {}", row.len())),
            Self::Literal(value) => Ok(value.clone()),
            Self::Param(idx) => ctx.param(*idx).cloned(),
            Self::Unary { op, input } => ops::unary(*op, input.eval(row, ctx)?),
            Self::Binary { op, left, right } => {
                let left = left.eval(row, ctx)?;
                let right = right.eval(row, ctx)?;
                ops::binary(*op, &left, &right)
            }
            Self::Like { op, input, pattern } => {
                ops::pattern_match(*op, &input.eval(row, ctx)?, pattern)
            }
            Self::Between { input, low, high } => {
                let val = input.eval(row, ctx)?;
                let above = ops::binary(BinaryOperator::GtEq, &val, &low.eval(row, ctx)?)?;
                let below = ops::binary(BinaryOperator::LtEq, &val, &high.eval(row, ctx)?)?;
                ops::binary(BinaryOperator::And, &above, &below)
            }
            Self::Tuple(exprs) => Ok(Value::List(
                exprs
                    .iter()
                    .map(|e| e.eval(row, ctx))
                    .collect::<Result<_>>()?,
            )),
            Self::ScalarFunction { function, inputs } => {
                let args = inputs
                    .iter()
                    .map(|e| e.eval(row, ctx))
                    .collect::<Result<Vec<_>>>()?;
                function.invoke(&args)
            }
            Self::Case { when_then, default } => {
                for (when, then) in when_then {
                    if when.eval(row, ctx)?.is_true() {
                        return then.eval(row, ctx);
                    }
                }
                match default {
                    Some(default) => default.eval(row, ctx),
                    None => Ok(Value::Null),
                }
            }
            Self::Cast { input, to } => ops::cast(input.eval(row, ctx)?, *to),
            Self::ItemGet { input, key } => ops::item_get(&input.eval(row, ctx)?, key),
        }
    }

    /// Evaluate as a filter predicate, NULL doesn't pass.
    pub fn select(&self, row: &[Value], ctx: &ExecutionContext) -> Result<bool> {
        Ok(self.eval(row, ctx)?.is_true())
    }
}
