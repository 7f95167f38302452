//! Join strategies.
//!
//! Equality joins use a hash join, everything else (including cross joins)
//! falls back to a nested block join. Both buffer one side at a time in
//! blocks bounded by the configured join buffer size.
pub mod buffer;
pub mod hash_join;
pub mod nested_block_join;
pub mod outer_join_tracker;

use crate::config::ExecutionConfig;
use crate::expr::{BinaryOperator, Expression};
use crate::schema::Schema;
use crate::value::{Row, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Equality keys as `(left position, right position)` pairs.
    Hash { keys: Vec<(usize, usize)> },
    NestedBlock,
}

/// Pick the join strategy for a predicate over the concatenated schema of a
/// join, `left_len` being the number of fields coming from the left side.
pub fn select_strategy(
    predicate: Option<&Expression>,
    schema: &Schema,
    left_len: usize,
    config: &ExecutionConfig,
) -> JoinStrategy {
    if config.force_nested_block_join {
        return JoinStrategy::NestedBlock;
    }
    match predicate.and_then(|p| extract_equi_keys(p, schema, left_len)) {
        Some(keys) => JoinStrategy::Hash { keys },
        None => JoinStrategy::NestedBlock,
    }
}

/// Extract key pairs if `predicate` is a conjunction of equalities each
/// relating a left field to a right field, in either order.
///
/// Returns `None` as soon as one conjunct doesn't fit.
pub fn extract_equi_keys(
    predicate: &Expression,
    schema: &Schema,
    left_len: usize,
) -> Option<Vec<(usize, usize)>> {
    let mut conjuncts = Vec::new();
    collect_conjuncts(predicate, &mut conjuncts);

    conjuncts
        .into_iter()
        .map(|conjunct| match conjunct {
            Expression::Binary {
                op: BinaryOperator::Eq,
                left,
                right,
            } => {
                let a = var_position(left, schema)?;
                let b = var_position(right, schema)?;
                if a < left_len && b >= left_len {
                    Some((a, b - left_len))
                } else if b < left_len && a >= left_len {
                    Some((b, a - left_len))
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect()
}

fn collect_conjuncts<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Binary {
            op: BinaryOperator::And,
            left,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        expr => out.push(expr),
    }
}

fn var_position(expr: &Expression, schema: &Schema) -> Option<usize> {
    match expr {
        Expression::Var(path) => schema.field_position(path).ok(),
        _ => None,
    }
}

pub(crate) fn concat_rows(left: &[Value], right: &[Value]) -> Row {
    let mut row = Vec::with_capacity(left.len() + right.len());
    row.extend_from_slice(left);
    row.extend_from_slice(right);
    row
}
