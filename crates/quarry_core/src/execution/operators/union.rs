use std::sync::Arc;

use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

/// All rows of the left input followed by all rows of the right.
#[derive(Debug)]
pub struct PhysicalUnion {
    left: Arc<dyn ExecutableOperator>,
    right: Arc<dyn ExecutableOperator>,
}

impl PhysicalUnion {
    pub fn new(left: Arc<dyn ExecutableOperator>, right: Arc<dyn ExecutableOperator>) -> Self {
        PhysicalUnion { left, right }
    }
}

impl ExecutableOperator for PhysicalUnion {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let left = self.left.execute(ctx)?;
        let right = self.right.clone();
        let ctx = ctx.clone();

        // Right side isn't started until the left is exhausted.
        let right = std::iter::once(()).flat_map(move |_| -> RowIter {
            match right.execute(&ctx) {
                Ok(iter) => iter,
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        });

        Ok(Box::new(left.chain(right)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::testutil::{run, values};
    use crate::row;

    #[test]
    fn left_then_right() {
        let union = PhysicalUnion::new(values(vec![row![1], row![2]]), values(vec![row![3]]));
        assert_eq!(vec![row![1], row![2], row![3]], run(&union));
    }
}
