use std::sync::Arc;

use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::functions::table::{TableFunction, TableFunctionInput};

#[derive(Debug)]
pub struct PhysicalTableFunction {
    function: Arc<dyn TableFunction>,
    inputs: Arc<[TableFunctionInput]>,
}

impl PhysicalTableFunction {
    pub fn new(function: Arc<dyn TableFunction>, inputs: Vec<TableFunctionInput>) -> Self {
        PhysicalTableFunction {
            function,
            inputs: inputs.into(),
        }
    }
}

impl ExecutableOperator for PhysicalTableFunction {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        self.function.invoke(ctx, &self.inputs)
    }
}
