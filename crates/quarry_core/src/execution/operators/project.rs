use std::sync::Arc;

use crate::errors::Result;
use crate::execution::expr::PhysicalScalarExpression;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

#[derive(Debug)]
pub struct PhysicalProject {
    input: Arc<dyn ExecutableOperator>,
    exprs: Arc<[PhysicalScalarExpression]>,
}

impl PhysicalProject {
    pub fn new(input: Arc<dyn ExecutableOperator>, exprs: Vec<PhysicalScalarExpression>) -> Self {
        PhysicalProject {
            input,
            exprs: exprs.into(),
        }
    }
}

impl ExecutableOperator for PhysicalProject {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let input = self.input.execute(ctx)?;
        let exprs = self.exprs.clone();
        let ctx = ctx.clone();

        Ok(Box::new(input.map(move |row| {
            let row = row?;
            exprs.iter().map(|expr| expr.eval(&row, &ctx)).collect()
        })))
    }
}
