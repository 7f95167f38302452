//! Schema resolution.
//!
//! Runs as a cursor rule at every position of a walk. Children are resolved
//! before their parent, so resolving a node only ever looks at the schemas
//! of its direct children.
use tracing::trace;

use super::cursor::{Cursor, CursorRule};
use super::operator::{
    AggregateBinding, GroupBy, Join, JoinType, LogicalOperator, Projection, TableFunctionArg,
    TableFunctionCall, UnionAll,
};
use crate::dataset::Dataset;
use crate::errors::{QuarryError, Result, field_not_found, internal, invalid_plan};
use crate::expr::{BinaryOperator, Expression, UnaryOperator};
use crate::functions::FunctionRegistry;
use crate::functions::table::ResolvedArg;
use crate::schema::{DataType, Field, FieldMode, Schema};
use crate::value::Value;

/// Name of computed columns that weren't renamed.
pub const ANONYMOUS_COLUMN: &str = "?column?";

#[derive(Debug)]
pub struct SchemaResolver<'a> {
    dataset: &'a Dataset,
    functions: &'a FunctionRegistry,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(dataset: &'a Dataset, functions: &'a FunctionRegistry) -> Self {
        SchemaResolver { dataset, functions }
    }

    /// Compute the output schema of `op`, assuming its children are
    /// resolved.
    pub fn resolve(&self, op: &LogicalOperator) -> Result<Schema> {
        match op {
            LogicalOperator::Load(load) => {
                if load.name.is_empty() {
                    return Ok(Schema::empty());
                }
                // Loads inside substituted views keep the schema they were
                // resolved with, a view may since shadow the relation.
                if let Some(schema) = load.schema.get() {
                    return Ok(schema.clone());
                }
                let schema = self.dataset.get_schema(&load.name)?;
                Ok(match schema.name() {
                    Some(_) => schema,
                    None => schema.with_name(Some(load.name.clone())),
                })
            }
            LogicalOperator::Alias(alias) => Ok(alias.input.output_schema()?.qualified(&alias.name)),
            LogicalOperator::Projection(proj) => self.resolve_projection(proj),
            LogicalOperator::Selection(sel) => {
                let input = sel.input.output_schema()?;
                if let Some(predicate) = &sel.predicate {
                    field_from_expr(predicate, input, self.functions)?;
                }
                Ok(input.clone())
            }
            LogicalOperator::Join(join) => self.resolve_join(join),
            LogicalOperator::UnionAll(union) => resolve_union(union),
            LogicalOperator::OrderBy(order) => {
                let input = order.input.output_schema()?;
                for expr in &order.exprs {
                    field_from_expr(sort_key(expr).0, input, self.functions)?;
                }
                Ok(input.clone())
            }
            LogicalOperator::GroupBy(group) => {
                let proj = grouped_projection(group)?;
                let input = proj.input.output_schema()?;
                for key in group_keys(group, self.functions)? {
                    field_from_expr(&key, input, self.functions)?;
                }
                Ok(group.input.output_schema()?.clone())
            }
            LogicalOperator::Slice(slice) => Ok(slice.input.output_schema()?.clone()),
            LogicalOperator::TableFunction(call) => self.resolve_table_function(call),
            LogicalOperator::Placeholder => Err(internal!("cannot resolve a placeholder")),
        }
    }

    fn resolve_projection(&self, proj: &Projection) -> Result<Schema> {
        let input = proj.input.output_schema()?;
        let mut fields = Vec::with_capacity(proj.exprs.len());
        for expr in &proj.exprs {
            fields.extend(fields_from_expr(expr, input, self.functions)?);
        }
        Ok(Schema::new(fields))
    }

    fn resolve_join(&self, join: &Join) -> Result<Schema> {
        let left = join.left.output_schema()?;
        let right = join.right.output_schema()?;
        let merged = Schema::merge(left, right);

        let schema = match join.join_type {
            JoinType::Inner => merged,
            JoinType::Left => {
                let fields = merged
                    .into_fields()
                    .into_iter()
                    .enumerate()
                    .map(|(idx, field)| {
                        if idx >= left.len() && field.mode == FieldMode::Required {
                            field.with_mode(FieldMode::Nullable)
                        } else {
                            field
                        }
                    })
                    .collect::<Vec<_>>();
                Schema::new(fields)
            }
        };

        if let Some(predicate) = &join.predicate {
            field_from_expr(predicate, &schema, self.functions)?;
        }

        Ok(schema)
    }

    fn resolve_table_function(&self, call: &TableFunctionCall) -> Result<Schema> {
        let function = self.functions.get_table_function(&call.name)?;
        let args = call
            .args
            .iter()
            .map(|arg| match arg {
                TableFunctionArg::Constant(value) => Ok(ResolvedArg::Constant(value)),
                TableFunctionArg::Relation(op) => Ok(ResolvedArg::Relation(op.output_schema()?)),
            })
            .collect::<Result<Vec<_>>>()?;
        function.schema(&args)
    }
}

impl CursorRule for SchemaResolver<'_> {
    fn name(&self) -> &'static str {
        "resolve_schema"
    }

    fn matches(&self, cursor: &Cursor) -> bool {
        !matches!(cursor.node(), LogicalOperator::Placeholder)
    }

    fn transform(&self, cursor: &mut Cursor) -> Result<()> {
        cursor.replace_with(|op| {
            let schema = self.resolve(&op)?;
            trace!(node = op.kind(), %schema, "resolved schema");

            let op = match op {
                LogicalOperator::GroupBy(mut group) => {
                    let proj = grouped_projection(&group)?;
                    group.aggregates = aggregate_bindings(
                        &proj.exprs,
                        proj.input.output_schema()?,
                        self.functions,
                    )?;
                    LogicalOperator::GroupBy(group)
                }
                op => op,
            };

            Ok(op.with_schema(schema))
        })
    }
}

fn resolve_union(union: &UnionAll) -> Result<Schema> {
    let left = union.left.output_schema()?;
    let right = union.right.output_schema()?;

    if left.len() != right.len() {
        return Err(invalid_plan!(
            "UnionAll inputs have {} and {} fields",
            left.len(),
            right.len()
        ));
    }

    for (l, r) in left.fields().iter().zip(right.fields()) {
        if !l.datatype.is_compatible_with(&r.datatype) {
            return Err(QuarryError::TypeMismatch {
                left: l.datatype,
                right: r.datatype,
            });
        }
    }

    Ok(left.clone())
}

/// The projection a `GroupBy` groups.
pub fn grouped_projection(group: &GroupBy) -> Result<&Projection> {
    match group.input.as_ref() {
        LogicalOperator::Projection(proj) => Ok(proj),
        other => Err(internal!("GroupBy input must be a Projection, got {}", other.kind())),
    }
}

/// Grouping expressions bound against the grouped projection's input.
///
/// A bare name that only exists in the projection's output refers to the
/// projected expression, so grouping by an alias works.
pub fn group_keys(group: &GroupBy, functions: &FunctionRegistry) -> Result<Vec<Expression>> {
    let proj = grouped_projection(group)?;
    let input = proj.input.output_schema()?;
    let output = group.input.output_schema()?;

    group
        .exprs
        .iter()
        .map(|expr| {
            let Expression::Var(path) = expr else {
                return Ok(expr.clone());
            };
            if input.try_resolve(path)?.is_some() {
                return Ok(expr.clone());
            }
            let Some((position, _)) = output.try_resolve(path)? else {
                return Ok(expr.clone());
            };

            let projected = projection_expr_at(&proj.exprs, input, position)?;
            if is_aggregate_call(projected, functions) {
                return Err(invalid_plan!("cannot group by aggregate '{path}'"));
            }
            Ok(projected.clone())
        })
        .collect()
}

/// The (unaliased) projection expression producing output `position`.
fn projection_expr_at<'a>(
    exprs: &'a [Expression],
    input: &Schema,
    position: usize,
) -> Result<&'a Expression> {
    let mut offset = 0;
    for expr in exprs {
        let width = match expr {
            Expression::SelectAll(qualifier) => input.select_all(qualifier.as_deref())?.len(),
            _ => 1,
        };
        if position < offset + width {
            return Ok(expr.unaliased());
        }
        offset += width;
    }
    Err(internal!("projection has no output position {position}"))
}

fn is_aggregate_call(expr: &Expression, functions: &FunctionRegistry) -> bool {
    matches!(expr.unaliased(), Expression::Function { name, .. } if functions.is_aggregate(name))
}

/// Check if any top level projection expression is an aggregate call.
pub fn has_aggregates(exprs: &[Expression], functions: &FunctionRegistry) -> bool {
    exprs.iter().any(|expr| is_aggregate_call(expr, functions))
}

/// Locate the aggregate calls of a projection by output position.
pub fn aggregate_bindings(
    exprs: &[Expression],
    input: &Schema,
    functions: &FunctionRegistry,
) -> Result<Vec<AggregateBinding>> {
    let mut bindings = Vec::new();
    let mut position = 0;

    for expr in exprs {
        match expr.unaliased() {
            Expression::SelectAll(qualifier) => {
                position += input.select_all(qualifier.as_deref())?.len();
                continue;
            }
            Expression::Function { name, args } if functions.is_aggregate(name) => {
                bindings.push(AggregateBinding {
                    position,
                    function: name.clone(),
                    args: args.clone(),
                });
            }
            _ => (),
        }
        position += 1;
    }

    Ok(bindings)
}

/// Fields produced by a projection expression, `*` produces several.
pub fn fields_from_expr(
    expr: &Expression,
    schema: &Schema,
    functions: &FunctionRegistry,
) -> Result<Vec<Field>> {
    match expr {
        Expression::SelectAll(qualifier) => Ok(schema
            .select_all(qualifier.as_deref())?
            .into_iter()
            .map(|idx| qualified_field(schema, &schema.fields()[idx]))
            .collect()),
        expr => Ok(vec![field_from_expr(expr, schema, functions)?]),
    }
}

/// Field produced by evaluating `expr` against rows of `schema`.
pub fn field_from_expr(
    expr: &Expression,
    schema: &Schema,
    functions: &FunctionRegistry,
) -> Result<Field> {
    let field = |expr: &Expression| field_from_expr(expr, schema, functions);

    Ok(match expr {
        Expression::Var(path) => qualified_field(schema, schema.resolve(path)?.1),
        Expression::Const(value) => Field::new(ANONYMOUS_COLUMN, value.datatype()),
        Expression::Param(_) => Field::new(ANONYMOUS_COLUMN, DataType::Null),
        Expression::Unary { op, expr } => {
            let inner = field(expr)?;
            match op {
                UnaryOperator::Asc | UnaryOperator::Desc => {
                    return Err(invalid_plan!("'{op}' is only allowed on ORDER BY keys"));
                }
                UnaryOperator::Neg => {
                    let name = format!("neg({})", inner.name);
                    inner.with_name(name).with_schema_name(None)
                }
                UnaryOperator::Not => Field::new(format!("not({})", inner.name), DataType::Boolean),
            }
        }
        Expression::ItemGet { expr, key } => {
            let inner = field(expr)?;
            match (inner.mode, key) {
                (FieldMode::Repeated, _) => inner
                    .with_mode(FieldMode::Nullable)
                    .with_name(ANONYMOUS_COLUMN)
                    .with_schema_name(None),
                (_, Value::String(name)) if inner.datatype == DataType::Record => {
                    match inner.nested(name) {
                        Some(nested) => nested.clone(),
                        None => {
                            let candidates = inner.fields.iter().map(|f| f.name.as_str());
                            return Err(field_not_found(
                                format!("{}.{name}", inner.name),
                                candidates,
                            ));
                        }
                    }
                }
                _ => Field::new(ANONYMOUS_COLUMN, DataType::Null),
            }
        }
        Expression::Binary { op, left, right } => {
            let left = field(left)?;
            let right = field(right)?;
            let datatype = binary_type(*op, left.datatype, right.datatype)?;
            Field::new(ANONYMOUS_COLUMN, datatype)
        }
        Expression::Between { expr, low, high } => {
            let input = field(expr)?.datatype;
            for bound in [low, high] {
                binary_type(BinaryOperator::GtEq, input, field(bound)?.datatype)?;
            }
            Field::new(ANONYMOUS_COLUMN, DataType::Boolean)
        }
        Expression::Tuple(exprs) => {
            let datatype = match exprs.first() {
                Some(first) => field(first)?.datatype,
                None => DataType::Null,
            };
            Field::new(ANONYMOUS_COLUMN, datatype).with_mode(FieldMode::Repeated)
        }
        Expression::Function { name, args } => {
            let args = args.iter().map(field).collect::<Result<Vec<_>>>()?;
            if functions.is_aggregate(name) {
                functions.get_aggregate(name)?.returns.resolve(&args)?
            } else {
                functions.get_scalar(name)?.return_field(&args)?
            }
        }
        Expression::Rename { alias, expr } => field(expr)?
            .with_name(alias.clone())
            .with_schema_name(None),
        Expression::SelectAll(_) => {
            return Err(invalid_plan!("'{expr}' is only allowed as a projection expression"));
        }
        Expression::CaseWhen {
            conditions,
            default,
        } => {
            let mut datatype = DataType::Null;
            for (cond, result) in conditions {
                field(cond)?;
                let result = field(result)?.datatype;
                if datatype == DataType::Null {
                    datatype = result;
                }
            }
            if let Some(default) = default {
                let default = field(default)?.datatype;
                if datatype == DataType::Null {
                    datatype = default;
                }
            }
            Field::new(ANONYMOUS_COLUMN, datatype)
        }
        Expression::Cast { expr, datatype } => {
            let inner = field(expr)?;
            Field {
                datatype: *datatype,
                fields: Vec::new(),
                ..inner
            }
        }
    })
}

/// Split an ORDER BY key into the sorted expression and whether it sorts
/// descending.
pub fn sort_key(expr: &Expression) -> (&Expression, bool) {
    match expr {
        Expression::Unary {
            op: UnaryOperator::Desc,
            expr,
        } => (expr.as_ref(), true),
        Expression::Unary {
            op: UnaryOperator::Asc,
            expr,
        } => (expr.as_ref(), false),
        expr => (expr, false),
    }
}

/// Field as seen from outside its schema, keeping qualified lookups of it
/// working above a projection.
fn qualified_field(schema: &Schema, field: &Field) -> Field {
    match (&field.schema_name, schema.name()) {
        (None, Some(name)) => field.clone().with_schema_name(Some(name.to_string())),
        _ => field.clone(),
    }
}

/// Result type of a binary operator, checking that the operands can be
/// compared or combined.
fn binary_type(op: BinaryOperator, left: DataType, right: DataType) -> Result<DataType> {
    let checked = op.is_arithmetic()
        || (op.is_comparison() && !op.is_pattern_match() && op != BinaryOperator::In);
    if checked && !left.is_compatible_with(&right) {
        return Err(QuarryError::TypeMismatch { left, right });
    }

    if !op.is_arithmetic() {
        return Ok(DataType::Boolean);
    }

    Ok(match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => other,
        (DataType::Integer, DataType::Integer) => DataType::Integer,
        (l, r) if l.is_numeric() && r.is_numeric() => DataType::Float,
        (l, _) => l,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::expr::{col, desc, eq, func, lit, null, plus, rename, select_all, select_all_from};
    use crate::logical::cursor::walk;
    use crate::row;

    fn dataset() -> Dataset {
        let fields = vec![
            Field::new("id", DataType::Integer).with_mode(FieldMode::Required),
            Field::new("name", DataType::String),
            Field::new("manager_id", DataType::Integer),
        ];
        let adapter = MemoryAdapter::new("memory")
            .with_table(
                "employees",
                fields,
                vec![
                    row![1234, "Tom", Value::Null],
                    row![4567, "Sally", 1234],
                    row![8901, "Mark", 1234],
                ],
            )
            .unwrap();
        let dataset = Dataset::with_builtins();
        dataset.add_adapter(Arc::new(adapter));
        dataset
    }

    fn resolve(op: LogicalOperator) -> Result<LogicalOperator> {
        let dataset = dataset();
        let functions = dataset.functions();
        let resolver = SchemaResolver::new(&dataset, &functions);
        walk(op, &[&resolver])
    }

    fn names(op: &LogicalOperator) -> Vec<String> {
        op.output_schema()
            .unwrap()
            .fields()
            .iter()
            .map(Field::path)
            .collect()
    }

    #[test]
    fn every_node_resolved() {
        let op = resolve(
            LogicalOperator::load("employees")
                .select(eq(col("manager_id"), null()))
                .project([col("name")])
                .slice(Some(0), None),
        )
        .unwrap();

        let mut stack = vec![&op];
        while let Some(node) = stack.pop() {
            assert!(node.schema().is_some(), "{} unresolved", node.kind());
            stack.extend(node.children());
        }
        assert_eq!(vec!["employees.name"], names(&op));
    }

    #[test]
    fn resolution_is_deterministic() {
        let plan = LogicalOperator::load("employees")
            .alias("e")
            .project([select_all(), rename("next", plus(col("id"), lit(1)))]);
        let a = resolve(plan.clone()).unwrap();
        let b = resolve(plan).unwrap();
        assert_eq!(a.output_schema().unwrap(), b.output_schema().unwrap());
    }

    #[test]
    fn join_qualifies_both_sides() {
        let op = resolve(
            LogicalOperator::load("employees")
                .alias("e")
                .join(
                    LogicalOperator::load("employees").alias("m"),
                    eq(col("m.id"), col("e.manager_id")),
                )
                .project([select_all_from("m")]),
        )
        .unwrap();
        assert_eq!(vec!["m.id", "m.name", "m.manager_id"], names(&op));
    }

    #[test]
    fn left_join_right_side_nullable() {
        let op = resolve(LogicalOperator::load("employees").alias("e").left_join(
            LogicalOperator::load("employees").alias("m"),
            eq(col("m.id"), col("e.manager_id")),
        ))
        .unwrap();
        let schema = op.output_schema().unwrap();
        assert_eq!(FieldMode::Required, schema.resolve("e.id").unwrap().1.mode);
        assert_eq!(FieldMode::Nullable, schema.resolve("m.id").unwrap().1.mode);
    }

    #[test]
    fn unqualified_self_join_is_ambiguous() {
        let err = resolve(
            LogicalOperator::load("employees")
                .alias("e")
                .join(LogicalOperator::load("employees").alias("m"), None)
                .project([col("name")]),
        )
        .unwrap_err();
        assert!(matches!(err, QuarryError::AmbiguousField { .. }), "{err}");
    }

    #[test]
    fn missing_field_suggests() {
        let err = resolve(LogicalOperator::load("employees").project([col("manger_id")])).unwrap_err();
        assert!(err.to_string().contains("did you mean 'manager_id'"), "{err}");
    }

    #[test]
    fn binary_type_mismatch() {
        let err = resolve(LogicalOperator::load("employees").project([plus(col("name"), col("id"))]))
            .unwrap_err();
        assert!(matches!(err, QuarryError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn comparison_is_boolean() {
        let op = resolve(LogicalOperator::load("employees").project([eq(col("id"), lit(1.5))])).unwrap();
        let schema = op.output_schema().unwrap();
        assert_eq!(DataType::Boolean, schema.fields()[0].datatype);
        assert_eq!(ANONYMOUS_COLUMN, schema.fields()[0].name);
    }

    #[test]
    fn union_all_accepts_null_either_side() {
        let typed = LogicalOperator::load("employees").project([col("id")]);
        let nulls = LogicalOperator::load("").project([null()]);
        resolve(typed.clone().union_all(nulls.clone())).unwrap();
        resolve(nulls.union_all(typed)).unwrap();
    }

    #[test]
    fn union_all_mismatch() {
        let ids = LogicalOperator::load("employees").project([col("id")]);
        let names = LogicalOperator::load("employees").project([col("name")]);
        resolve(ids.clone().union_all(names)).unwrap_err();
        let both = LogicalOperator::load("employees").project([col("id"), col("name")]);
        let err = resolve(ids.union_all(both)).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidPlan(_)), "{err}");
    }

    #[test]
    fn group_by_binds_aggregates() {
        let op = resolve(
            LogicalOperator::load("employees")
                .project([col("manager_id"), rename("total", func("count", []))])
                .group_by([col("manager_id")]),
        )
        .unwrap();

        let LogicalOperator::GroupBy(group) = &op else {
            panic!("expected GroupBy, got {}", op.kind());
        };
        assert_eq!(
            vec![AggregateBinding {
                position: 1,
                function: "count".to_string(),
                args: Vec::new(),
            }],
            group.aggregates
        );
        assert_eq!(vec!["employees.manager_id", "total"], names(&op));
    }

    #[test]
    fn group_by_projection_alias() {
        let op = resolve(
            LogicalOperator::load("employees")
                .project([rename("boss", col("manager_id")), func("count", [])])
                .group_by([col("boss")]),
        )
        .unwrap();
        let LogicalOperator::GroupBy(group) = &op else {
            panic!("expected GroupBy, got {}", op.kind());
        };
        let functions = FunctionRegistry::with_builtins();
        assert_eq!(vec![col("manager_id")], group_keys(group, &functions).unwrap());
    }

    #[test]
    fn desc_only_on_order_by_keys() {
        let op = resolve(LogicalOperator::load("employees").order_by([desc(col("name"))])).unwrap();
        assert_eq!(3, op.output_schema().unwrap().len());

        let err = resolve(LogicalOperator::load("employees").project([desc(col("id"))])).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidPlan(_)), "{err}");
        let err = resolve(
            LogicalOperator::load("employees").order_by([plus(desc(col("id")), lit(1))]),
        )
        .unwrap_err();
        assert!(matches!(err, QuarryError::InvalidPlan(_)), "{err}");
    }

    #[test]
    fn group_by_requires_projection() {
        resolve(LogicalOperator::load("employees").group_by([col("id")])).unwrap_err();
    }

    #[test]
    fn unknown_relation() {
        let err = resolve(LogicalOperator::load("nope")).unwrap_err();
        assert!(matches!(err, QuarryError::RelationNotFound(_)), "{err}");
    }

    #[test]
    fn empty_load_has_no_fields() {
        let op = resolve(LogicalOperator::load("").project([rename("one", lit(1))])).unwrap();
        assert_eq!(vec!["one"], names(&op));
    }
}
