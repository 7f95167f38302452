use std::cmp::Ordering;
use std::sync::Arc;

use super::deferred;
use crate::errors::Result;
use crate::execution::expr::PhysicalScalarExpression;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::value::{Row, Value};

#[derive(Debug, Clone)]
pub struct PhysicalSortExpression {
    pub expr: PhysicalScalarExpression,
    pub desc: bool,
}

/// Fully materializes its input and emits it stably sorted.
#[derive(Debug)]
pub struct PhysicalSort {
    input: Arc<dyn ExecutableOperator>,
    exprs: Arc<[PhysicalSortExpression]>,
}

impl PhysicalSort {
    pub fn new(input: Arc<dyn ExecutableOperator>, exprs: Vec<PhysicalSortExpression>) -> Self {
        PhysicalSort {
            input,
            exprs: exprs.into(),
        }
    }
}

fn compare_keys(exprs: &[PhysicalSortExpression], a: &[Value], b: &[Value]) -> Ordering {
    for ((expr, a), b) in exprs.iter().zip(a).zip(b) {
        let ord = if expr.desc { b.cmp(a) } else { a.cmp(b) };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl ExecutableOperator for PhysicalSort {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let input = self.input.clone();
        let exprs = self.exprs.clone();
        let ctx = ctx.clone();

        Ok(deferred(move || {
            let mut keyed: Vec<(Vec<Value>, Row)> = Vec::new();
            for row in input.execute(&ctx)? {
                let row = row?;
                let key = exprs
                    .iter()
                    .map(|e| e.expr.eval(&row, &ctx))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((key, row));
            }

            keyed.sort_by(|(a, _), (b, _)| compare_keys(&exprs, a, b));

            Ok(Box::new(keyed.into_iter().map(|(_, row)| Ok(row))))
        }))
    }
}
