//! The dataset ties adapters, views and functions together.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::adapter::{Adapter, Relation};
use crate::config::ExecutionConfig;
use crate::errors::{QuarryError, Result};
use crate::functions::FunctionRegistry;
use crate::functions::aggregate::Aggregate;
use crate::functions::scalar::ScalarFunction;
use crate::functions::table::TableFunction;
use crate::logical::operator::LogicalOperator;
use crate::query::{self, Query};
use crate::schema::Schema;

/// Relations, views and functions available to queries.
///
/// Views shadow adapter relations of the same name. When several adapters
/// have a relation with the same name, the one added first wins.
#[derive(Debug, Default)]
pub struct Dataset {
    adapters: RwLock<Vec<Arc<dyn Adapter>>>,
    /// Views keyed by name, stored with schemas resolved.
    views: RwLock<HashMap<String, LogicalOperator>>,
    functions: RwLock<FunctionRegistry>,
    config: ExecutionConfig,
}

impl Dataset {
    /// An empty dataset without any functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty dataset with the builtin functions registered.
    pub fn with_builtins() -> Self {
        Dataset {
            functions: RwLock::new(FunctionRegistry::with_builtins()),
            ..Default::default()
        }
    }

    /// Set the default config used by `Query::execute`.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn add_adapter(&self, adapter: Arc<dyn Adapter>) {
        debug!(adapter = adapter.name(), "adding adapter");
        self.adapters.write().push(adapter);
    }

    /// The adapter providing `name`, if any.
    pub fn adapter_for(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .read()
            .iter()
            .find(|adapter| adapter.has(name))
            .cloned()
    }

    /// All views and relations with their schemas, views first.
    pub fn relations(&self) -> Vec<(String, Schema)> {
        let mut seen = HashSet::new();
        let mut relations = Vec::new();

        let views = self.views.read();
        let mut names: Vec<_> = views.keys().collect();
        names.sort();
        for name in names {
            if let Some(schema) = views.get(name).and_then(|view| view.schema()) {
                seen.insert(name.clone());
                relations.push((name.clone(), schema.clone()));
            }
        }

        for adapter in self.adapters.read().iter() {
            for (name, schema) in adapter.relations() {
                if seen.insert(name.clone()) {
                    relations.push((name, schema));
                }
            }
        }

        relations
    }

    pub fn get_schema(&self, name: &str) -> Result<Schema> {
        if let Some(view) = self.views.read().get(name) {
            return view.output_schema().cloned();
        }

        self.adapter_for(name)
            .and_then(|adapter| adapter.schema(name))
            .ok_or_else(|| QuarryError::RelationNotFound(name.to_string()))
    }

    pub fn get_relation(&self, name: &str) -> Result<Relation> {
        let adapter = self
            .adapter_for(name)
            .ok_or_else(|| QuarryError::RelationNotFound(name.to_string()))?;

        adapter
            .get_relation(name)
            .ok_or_else(|| QuarryError::Adapter {
                adapter: adapter.name().to_string(),
                message: format!("relation '{name}' has no source"),
            })
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.read().contains_key(name)
    }

    pub fn get_view(&self, name: &str) -> Option<LogicalOperator> {
        self.views.read().get(name).cloned()
    }

    /// Store a view as is, without resolving it.
    pub(crate) fn insert_view(&self, name: impl Into<String>, view: LogicalOperator) {
        self.views.write().insert(name.into(), view);
    }

    /// Resolve `view` and store it under `name`, replacing any previous view
    /// with that name.
    ///
    /// Views referenced by `view` are substituted at creation, later changes
    /// to them don't affect this view.
    pub fn create_view(&self, name: impl Into<String>, view: LogicalOperator) -> Result<()> {
        let name = name.into();
        let view = query::resolve(self, view)?;
        debug!(%name, "created view");
        self.insert_view(name, view);
        Ok(())
    }

    /// Remove a view, returning whether it existed.
    pub fn drop_view(&self, name: &str) -> bool {
        self.views.write().remove(name).is_some()
    }

    /// Snapshot of the registered functions.
    pub fn functions(&self) -> FunctionRegistry {
        self.functions.read().clone()
    }

    pub fn register_scalar(&self, func: impl ScalarFunction + 'static) {
        self.functions.write().register_scalar(func);
    }

    pub fn register_aggregate(&self, agg: Aggregate) {
        self.functions.write().register_aggregate(agg);
    }

    pub fn register_table_function(&self, func: impl TableFunction + 'static) {
        self.functions.write().register_table_function(func);
    }

    /// Resolve `op` into a query against this dataset.
    pub fn query(self: &Arc<Self>, op: LogicalOperator) -> Result<Query> {
        Query::new(self.clone(), op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::expr::{col, eq, lit};
    use crate::row;
    use crate::schema::{DataType, Field};

    fn adapter(name: &str, table: &str, column: &str) -> Arc<dyn Adapter> {
        Arc::new(
            MemoryAdapter::new(name)
                .with_table(
                    table,
                    vec![Field::new(column, DataType::Integer)],
                    vec![row![1]],
                )
                .unwrap(),
        )
    }

    #[test]
    fn first_adapter_wins() {
        let dataset = Dataset::new();
        dataset.add_adapter(adapter("a", "numbers", "first"));
        dataset.add_adapter(adapter("b", "numbers", "second"));

        assert_eq!("a", dataset.adapter_for("numbers").unwrap().name());
        let schema = dataset.get_schema("numbers").unwrap();
        assert_eq!("first", schema.fields()[0].name);
        assert_eq!(1, dataset.relations().len());
    }

    #[test]
    fn missing_relation() {
        let dataset = Dataset::new();
        assert!(matches!(
            dataset.get_schema("nope"),
            Err(QuarryError::RelationNotFound(name)) if name == "nope"
        ));
        assert!(matches!(
            dataset.get_relation("nope"),
            Err(QuarryError::RelationNotFound(_))
        ));
    }

    #[test]
    fn create_and_drop_view() {
        let dataset = Dataset::with_builtins();
        dataset.add_adapter(adapter("a", "numbers", "n"));

        dataset
            .create_view("ones", LogicalOperator::load("numbers").select(eq(col("n"), lit(1))))
            .unwrap();
        assert!(dataset.has_view("ones"));
        assert!(dataset.get_view("ones").unwrap().schema().is_some());

        let names: Vec<_> = dataset.relations().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"ones".to_string()));
        assert!(names.contains(&"numbers".to_string()));

        assert!(dataset.drop_view("ones"));
        assert!(!dataset.drop_view("ones"));
        assert!(!dataset.has_view("ones"));
    }

    #[test]
    fn invalid_view_rejected() {
        let dataset = Dataset::with_builtins();
        dataset.add_adapter(adapter("a", "numbers", "n"));
        dataset
            .create_view("bad", LogicalOperator::load("numbers").project([col("m")]))
            .unwrap_err();
        assert!(!dataset.has_view("bad"));
    }
}
