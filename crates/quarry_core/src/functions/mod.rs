pub mod aggregate;
pub mod scalar;
pub mod table;

use std::fmt::Debug;
use std::sync::Arc;

use hashbrown::HashMap;

use self::aggregate::Aggregate;
use self::scalar::ScalarFunction;
use self::table::TableFunction;
use crate::errors::{QuarryError, Result};
use crate::schema::Field;

/// Declared return field of a function or aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnField {
    /// Always returns this field.
    Fixed(Field),
    /// Returns the type of the first argument under the given name.
    FirstArgument { name: String },
}

impl ReturnField {
    pub fn fixed(field: Field) -> Self {
        ReturnField::Fixed(field)
    }

    pub fn resolve(&self, args: &[Field]) -> Result<Field> {
        match self {
            Self::Fixed(field) => Ok(field.clone()),
            Self::FirstArgument { name } => match args.first() {
                Some(arg) => Ok(Field::new(name.clone(), arg.datatype)),
                None => Err(QuarryError::Execution(format!(
                    "'{name}' requires at least one argument"
                ))),
            },
        }
    }
}

/// Scalar, aggregate and relation valued functions, keyed by lowercase
/// name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    scalars: HashMap<String, Arc<dyn ScalarFunction>>,
    aggregates: HashMap<String, Arc<Aggregate>>,
    tables: HashMap<String, Arc<dyn TableFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin aggregates and table functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for agg in aggregate::builtin_aggregates() {
            registry.register_aggregate(agg);
        }
        registry.register_table_function(table::Flatten);
        registry
    }

    pub fn register_scalar(&mut self, func: impl ScalarFunction + 'static) {
        self.scalars
            .insert(func.name().to_lowercase(), Arc::new(func));
    }

    pub fn register_aggregate(&mut self, agg: Aggregate) {
        self.aggregates
            .insert(agg.name.to_lowercase(), Arc::new(agg));
    }

    pub fn register_table_function(&mut self, func: impl TableFunction + 'static) {
        self.tables.insert(func.name().to_lowercase(), Arc::new(func));
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.aggregates.contains_key(&name.to_lowercase())
    }

    pub fn get_scalar(&self, name: &str) -> Result<Arc<dyn ScalarFunction>> {
        self.scalars
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| QuarryError::FunctionNotFound(name.to_string()))
    }

    pub fn get_aggregate(&self, name: &str) -> Result<Arc<Aggregate>> {
        self.aggregates
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| QuarryError::AggregateNotFound(name.to_string()))
    }

    pub fn get_table_function(&self, name: &str) -> Result<Arc<dyn TableFunction>> {
        self.tables
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| QuarryError::FunctionNotFound(name.to_string()))
    }
}
