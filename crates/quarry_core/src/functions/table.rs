//! Relation valued functions.
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::errors::{QuarryError, Result, internal};
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::schema::{DataType, Field, FieldMode, Schema};
use crate::value::{Row, Value};

/// Argument of a table function during schema resolution.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedArg<'a> {
    Constant(&'a Value),
    Relation(&'a Schema),
}

/// Argument of a table function at execution.
#[derive(Debug, Clone)]
pub enum TableFunctionInput {
    Constant(Value),
    Relation {
        schema: Schema,
        operator: Arc<dyn ExecutableOperator>,
    },
}

pub trait TableFunction: Debug + Sync + Send {
    fn name(&self) -> &str;

    /// Output schema for the given arguments.
    fn schema(&self, args: &[ResolvedArg<'_>]) -> Result<Schema>;

    /// Produce rows. Arguments are in the same order as given to `schema`.
    fn invoke(&self, ctx: &Arc<ExecutionContext>, args: &[TableFunctionInput]) -> Result<RowIter>;
}

pub type TableSchemaFn = Arc<dyn Fn(&[ResolvedArg<'_>]) -> Result<Schema> + Sync + Send>;
pub type TableInvokeFn =
    Arc<dyn Fn(&Arc<ExecutionContext>, &[TableFunctionInput]) -> Result<RowIter> + Sync + Send>;

/// Table function backed by closures.
#[derive(Clone)]
pub struct SimpleTableFunction {
    name: String,
    schema: TableSchemaFn,
    invoke: TableInvokeFn,
}

impl SimpleTableFunction {
    pub fn new<S, I>(name: impl Into<String>, schema: S, invoke: I) -> Self
    where
        S: Fn(&[ResolvedArg<'_>]) -> Result<Schema> + Sync + Send + 'static,
        I: Fn(&Arc<ExecutionContext>, &[TableFunctionInput]) -> Result<RowIter>
            + Sync
            + Send
            + 'static,
    {
        SimpleTableFunction {
            name: name.into(),
            schema: Arc::new(schema),
            invoke: Arc::new(invoke),
        }
    }
}

impl Debug for SimpleTableFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleTableFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TableFunction for SimpleTableFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self, args: &[ResolvedArg<'_>]) -> Result<Schema> {
        (self.schema)(args)
    }

    fn invoke(&self, ctx: &Arc<ExecutionContext>, args: &[TableFunctionInput]) -> Result<RowIter> {
        (self.invoke)(ctx, args)
    }
}

/// `flatten(relation, 'field')`
///
/// Emits one row per element of a REPEATED field. Scalar elements replace
/// the field in place, record elements are spread into one column per
/// nested field named `<field>_<nested>`. Rows with an empty or NULL list
/// produce nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

/// Resolved layout of a flatten call.
struct FlattenPlan {
    position: usize,
    /// Nested field names when flattening records.
    nested: Option<Vec<String>>,
    schema: Schema,
}

impl Flatten {
    fn plan(input: &Schema, path: &Value) -> Result<FlattenPlan> {
        let path = path
            .as_str()
            .ok_or_else(|| QuarryError::Execution(format!("flatten expects a field name, got {path}")))?;
        let (position, field) = input.resolve(path)?;

        if field.mode != FieldMode::Repeated {
            return Err(QuarryError::Execution(format!(
                "Can not flatten non-repeating field {path}"
            )));
        }

        let (replacement, nested) = if field.datatype == DataType::Record {
            let fields: Vec<Field> = field
                .fields
                .iter()
                .map(|f| {
                    f.clone()
                        .with_name(format!("{}_{}", field.name, f.name))
                        .with_schema_name(field.schema_name.clone())
                })
                .collect();
            let names = field.fields.iter().map(|f| f.name.clone()).collect();
            (fields, Some(names))
        } else {
            (vec![field.clone().with_mode(FieldMode::Nullable)], None)
        };

        let mut fields = input.fields().to_vec();
        fields.splice(position..=position, replacement);

        let schema = match input.name() {
            Some(name) => Schema::named(name, fields),
            None => Schema::new(fields),
        };

        Ok(FlattenPlan {
            position,
            nested,
            schema,
        })
    }

    fn args<'a>(args: &'a [ResolvedArg<'a>]) -> Result<(&'a Schema, &'a Value)> {
        match args {
            [ResolvedArg::Relation(schema), ResolvedArg::Constant(path)] => Ok((*schema, *path)),
            _ => Err(QuarryError::Execution(
                "flatten expects a relation and a field name".to_string(),
            )),
        }
    }
}

fn flatten_row(row: Row, position: usize, nested: Option<&[String]>) -> Vec<Row> {
    let elements = match row.get(position) {
        Some(Value::List(elements)) => elements.clone(),
        _ => return Vec::new(),
    };

    elements
        .into_iter()
        .map(|element| {
            let replacement = match (nested, element) {
                (Some(names), Value::Record(values)) => names
                    .iter()
                    .map(|name| {
                        values
                            .iter()
                            .find(|(field, _)| field == name)
                            .map(|(_, v)| v.clone())
                            .unwrap_or_default()
                    })
                    .collect(),
                (Some(names), _) => vec![Value::Null; names.len()],
                (None, element) => vec![element],
            };
            let mut out = row.clone();
            out.splice(position..=position, replacement);
            out
        })
        .collect()
}

impl TableFunction for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn schema(&self, args: &[ResolvedArg<'_>]) -> Result<Schema> {
        let (input, path) = Self::args(args)?;
        Ok(Self::plan(input, path)?.schema)
    }

    fn invoke(&self, ctx: &Arc<ExecutionContext>, args: &[TableFunctionInput]) -> Result<RowIter> {
        let (schema, operator, path) = match args {
            [
                TableFunctionInput::Relation { schema, operator },
                TableFunctionInput::Constant(path),
            ] => (schema, operator, path),
            _ => return Err(internal!("flatten invoked with unresolved arguments")),
        };

        let plan = Self::plan(schema, path)?;
        let rows = operator.execute(ctx)?;

        Ok(Box::new(rows.flat_map(move |row| -> Vec<Result<Row>> {
            match row {
                Ok(row) => flatten_row(row, plan.position, plan.nested.as_deref())
                    .into_iter()
                    .map(Ok)
                    .collect(),
                Err(e) => vec![Err(e)],
            }
        })))
    }
}
