use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::value::Row;

/// Operator producing a fixed set of rows.
#[derive(Debug)]
pub struct TestValues {
    rows: Vec<Row>,
}

impl ExecutableOperator for TestValues {
    fn execute(&self, _ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        Ok(Box::new(self.rows.clone().into_iter().map(Ok)))
    }
}

pub fn values(rows: Vec<Row>) -> Arc<dyn ExecutableOperator> {
    Arc::new(TestValues { rows })
}

pub fn test_context() -> Arc<ExecutionContext> {
    test_context_with_config(ExecutionConfig::default())
}

pub fn test_context_with_config(config: ExecutionConfig) -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::new(
        Arc::new(Dataset::new()),
        Vec::new(),
        config,
    ))
}

pub fn run(op: &dyn ExecutableOperator) -> Vec<Row> {
    let ctx = test_context();
    op.execute(&ctx)
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

pub fn run_with_config(op: &dyn ExecutableOperator, config: ExecutionConfig) -> Vec<Row> {
    let ctx = test_context_with_config(config);
    op.execute(&ctx)
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}
