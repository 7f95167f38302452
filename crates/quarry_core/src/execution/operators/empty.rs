use std::sync::Arc;

use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

/// Produces a single row with no columns.
#[derive(Debug, Default)]
pub struct PhysicalEmpty;

impl ExecutableOperator for PhysicalEmpty {
    fn execute(&self, _ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        Ok(Box::new(std::iter::once(Ok(Vec::new()))))
    }
}
