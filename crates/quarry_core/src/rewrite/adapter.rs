use tracing::trace;

use crate::dataset::Dataset;
use crate::errors::Result;
use crate::logical::cursor::{Cursor, CursorRule};
use crate::logical::operator::LogicalOperator;

/// Hand unresolved loads to the adapter owning the relation.
///
/// The adapter may leave the load in place or replace it with an arbitrary
/// subtree, see [`crate::adapter::Adapter::evaluate`].
#[derive(Debug)]
pub struct AdapterEvaluation<'a> {
    dataset: &'a Dataset,
}

impl<'a> AdapterEvaluation<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        AdapterEvaluation { dataset }
    }
}

fn unresolved_load(cursor: &Cursor) -> Option<&str> {
    match cursor.node() {
        LogicalOperator::Load(load) if load.schema.get().is_none() && !load.name.is_empty() => {
            Some(&load.name)
        }
        _ => None,
    }
}

impl CursorRule for AdapterEvaluation<'_> {
    fn name(&self) -> &'static str {
        "evaluate_adapter"
    }

    fn matches(&self, cursor: &Cursor) -> bool {
        unresolved_load(cursor).is_some_and(|name| self.dataset.adapter_for(name).is_some())
    }

    fn transform(&self, cursor: &mut Cursor) -> Result<()> {
        let Some(name) = unresolved_load(cursor) else {
            return Ok(());
        };
        let Some(adapter) = self.dataset.adapter_for(name) else {
            return Ok(());
        };
        trace!(adapter = adapter.name(), relation = name, "evaluating load");
        adapter.evaluate(cursor)
    }
}
