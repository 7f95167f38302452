use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use super::{Adapter, RecordSource, Relation};
use crate::errors::{QuarryError, Result};
use crate::execution::{ExecutionContext, RowIter};
use crate::schema::{Field, FieldMode, Schema};
use crate::value::{Row, Value};

#[derive(Debug)]
struct MemoryTable {
    schema: Schema,
    rows: Vec<Row>,
}

impl RecordSource for MemoryTable {
    fn records(&self, _ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        Ok(Box::new(self.rows.clone().into_iter().map(Ok)))
    }
}

/// Named tables held in memory.
#[derive(Debug)]
pub struct MemoryAdapter {
    name: String,
    tables: HashMap<String, Arc<MemoryTable>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryAdapter {
            name: name.into(),
            tables: HashMap::new(),
        }
    }

    pub fn with_table(
        mut self,
        name: impl Into<String>,
        fields: Vec<Field>,
        rows: Vec<Row>,
    ) -> Result<Self> {
        self.add_table(name, fields, rows)?;
        Ok(self)
    }

    /// Add or replace a table.
    ///
    /// Rows shorter than the schema are padded, missing REPEATED values
    /// become empty lists and anything else NULL. Longer rows are an error.
    pub fn add_table(
        &mut self,
        name: impl Into<String>,
        fields: Vec<Field>,
        rows: Vec<Row>,
    ) -> Result<()> {
        let name = name.into();

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                if row.len() > fields.len() {
                    return Err(QuarryError::Adapter {
                        adapter: self.name.clone(),
                        message: format!(
                            "row {idx} of '{name}' has {} values, schema has {} fields",
                            row.len(),
                            fields.len()
                        ),
                    });
                }
                for field in &fields[row.len()..] {
                    row.push(match field.mode {
                        FieldMode::Repeated => Value::List(Vec::new()),
                        _ => Value::Null,
                    });
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(adapter = %self.name, table = %name, rows = rows.len(), "adding table");

        let schema = Schema::named(name.clone(), fields);
        self.tables
            .insert(name, Arc::new(MemoryTable { schema, rows }));

        Ok(())
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn relations(&self) -> Vec<(String, Schema)> {
        let mut relations: Vec<_> = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.schema.clone()))
            .collect();
        relations.sort_by(|a, b| a.0.cmp(&b.0));
        relations
    }

    fn has(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn schema(&self, name: &str) -> Option<Schema> {
        self.tables.get(name).map(|t| t.schema.clone())
    }

    fn get_relation(&self, name: &str) -> Option<Relation> {
        let table = self.tables.get(name)?;
        Some(Relation {
            schema: table.schema.clone(),
            source: table.clone(),
        })
    }
}
