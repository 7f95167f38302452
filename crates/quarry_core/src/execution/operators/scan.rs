use std::sync::Arc;

use crate::adapter::RecordSource;
use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

/// Reads all rows of a base relation.
#[derive(Debug)]
pub struct PhysicalScan {
    name: String,
    source: Arc<dyn RecordSource>,
}

impl PhysicalScan {
    pub fn new(name: impl Into<String>, source: Arc<dyn RecordSource>) -> Self {
        PhysicalScan {
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ExecutableOperator for PhysicalScan {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        self.source.records(ctx)
    }
}
