use std::sync::Arc;

use crate::errors::Result;
use crate::execution::expr::PhysicalScalarExpression;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

#[derive(Debug)]
pub struct PhysicalFilter {
    input: Arc<dyn ExecutableOperator>,
    /// Rows pass only when this evaluates to true. No predicate passes
    /// everything.
    predicate: Option<Arc<PhysicalScalarExpression>>,
}

impl PhysicalFilter {
    pub fn new(
        input: Arc<dyn ExecutableOperator>,
        predicate: Option<PhysicalScalarExpression>,
    ) -> Self {
        PhysicalFilter {
            input,
            predicate: predicate.map(Arc::new),
        }
    }
}

impl ExecutableOperator for PhysicalFilter {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let input = self.input.execute(ctx)?;
        let Some(predicate) = self.predicate.clone() else {
            return Ok(input);
        };
        let ctx = ctx.clone();

        Ok(Box::new(input.filter_map(move |row| {
            let row = match row {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            match predicate.select(&row, &ctx) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        })))
    }
}
