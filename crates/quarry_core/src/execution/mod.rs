//! Pull based execution of compiled plans.
//!
//! Every physical operator produces a lazy row iterator when executed.
//! Operators own their children behind `Arc`s, so the iterators they return
//! don't borrow from the plan.
pub mod compiler;
pub mod expr;
pub mod join;
pub mod operators;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::dataset::Dataset;
use crate::errors::{Result, execution};
use crate::value::{Row, Value};

pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// State for a single execution of a query.
///
/// Read only once created.
#[derive(Debug)]
pub struct ExecutionContext {
    pub dataset: Arc<Dataset>,
    pub params: Vec<Value>,
    pub config: ExecutionConfig,
}

impl ExecutionContext {
    pub fn new(dataset: Arc<Dataset>, params: Vec<Value>, config: ExecutionConfig) -> Self {
        ExecutionContext {
            dataset,
            params,
            config,
        }
    }

    pub fn param(&self, idx: usize) -> Result<&Value> {
        self.params
            .get(idx)
            .ok_or_else(|| execution!("missing query parameter {idx}, {} given", self.params.len()))
    }
}

pub trait ExecutableOperator: Sync + Send + Debug {
    /// Start producing rows.
    ///
    /// Errors raised while producing individual rows are yielded by the
    /// iterator.
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter>;
}

/// Collect all rows, stopping at the first error.
pub fn collect_rows(iter: RowIter) -> Result<Vec<Row>> {
    iter.collect()
}
