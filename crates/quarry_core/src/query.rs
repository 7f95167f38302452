//! Query entry point.
use std::sync::Arc;

use tracing::debug;

use crate::config::ExecutionConfig;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::execution::compiler::PlanCompiler;
use crate::execution::{ExecutionContext, RowIter};
use crate::explain::ExplainConfig;
use crate::logical::cursor::walk;
use crate::logical::operator::LogicalOperator;
use crate::logical::resolver::SchemaResolver;
use crate::rewrite::{AdapterEvaluation, ViewSubstitution};
use crate::schema::Schema;
use crate::value::Value;

/// Substitute views, let adapters rewrite their loads and resolve the schema
/// of every node, in a single walk over the plan.
pub(crate) fn resolve(dataset: &Dataset, op: LogicalOperator) -> Result<LogicalOperator> {
    let functions = dataset.functions();
    let views = ViewSubstitution::new(dataset);
    let adapters = AdapterEvaluation::new(dataset);
    let resolver = SchemaResolver::new(dataset, &functions);

    walk(op, &[&views, &adapters, &resolver])
}

/// A resolved plan, ready to be executed any number of times.
#[derive(Debug, Clone)]
pub struct Query {
    dataset: Arc<Dataset>,
    operator: LogicalOperator,
    schema: Schema,
}

impl Query {
    pub fn new(dataset: Arc<Dataset>, op: LogicalOperator) -> Result<Self> {
        let operator = resolve(&dataset, op)?;
        let schema = operator.output_schema()?.clone();
        debug!(%schema, "resolved query");

        Ok(Query {
            dataset,
            operator,
            schema,
        })
    }

    /// Schema of the rows produced by this query.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The resolved plan.
    pub fn operator(&self) -> &LogicalOperator {
        &self.operator
    }

    /// Store this query as a view of the dataset.
    pub fn create_view(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(%name, "created view from query");
        self.dataset.insert_view(name, self.operator.clone());
    }

    /// Execute with the dataset's default config.
    pub fn execute(&self, params: Vec<Value>) -> Result<RowIter> {
        self.execute_with_config(params, self.dataset.config().clone())
    }

    /// Compile and start executing the plan.
    ///
    /// Compilation errors are returned directly, errors while producing rows
    /// come out of the iterator.
    pub fn execute_with_config(&self, params: Vec<Value>, config: ExecutionConfig) -> Result<RowIter> {
        let functions = self.dataset.functions();
        let plan = PlanCompiler::new(&self.dataset, &functions, &config).compile(&self.operator)?;
        debug!(params = params.len(), join_buffer_size = config.join_buffer_size, "compiled query");

        let ctx = Arc::new(ExecutionContext::new(self.dataset.clone(), params, config));
        plan.execute(&ctx)
    }

    /// Indented rendering of the resolved plan.
    pub fn explain(&self, conf: ExplainConfig) -> String {
        self.operator.explain_node(conf).to_string()
    }
}
