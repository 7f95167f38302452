//! Compilation of resolved logical plans into physical operators.
use std::sync::Arc;

use tracing::debug;

use super::ExecutableOperator;
use super::expr::PhysicalScalarExpression;
use super::join::hash_join::PhysicalHashJoin;
use super::join::nested_block_join::PhysicalNestedBlockJoin;
use super::join::{JoinStrategy, select_strategy};
use super::operators::aggregate::{AggregateOutput, PhysicalStreamingAggregate};
use super::operators::empty::PhysicalEmpty;
use super::operators::filter::PhysicalFilter;
use super::operators::limit::PhysicalLimit;
use super::operators::project::PhysicalProject;
use super::operators::scan::PhysicalScan;
use super::operators::sort::{PhysicalSort, PhysicalSortExpression};
use super::operators::table_function::PhysicalTableFunction;
use super::operators::union::PhysicalUnion;
use crate::config::ExecutionConfig;
use crate::dataset::Dataset;
use crate::errors::{Result, internal};
use crate::expr::Expression;
use crate::functions::FunctionRegistry;
use crate::functions::table::TableFunctionInput;
use crate::logical::operator::{
    AggregateBinding, GroupBy, Join, LogicalOperator, OrderBy, Projection, TableFunctionArg,
    TableFunctionCall,
};
use crate::logical::resolver::{
    aggregate_bindings, group_keys, grouped_projection, has_aggregates, sort_key,
};
use crate::schema::Schema;

/// Compiles a fully resolved plan.
///
/// Every schema annotation must be present, compilation errors if one is
/// missing.
#[derive(Debug)]
pub struct PlanCompiler<'a> {
    dataset: &'a Dataset,
    functions: &'a FunctionRegistry,
    config: &'a ExecutionConfig,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(
        dataset: &'a Dataset,
        functions: &'a FunctionRegistry,
        config: &'a ExecutionConfig,
    ) -> Self {
        PlanCompiler {
            dataset,
            functions,
            config,
        }
    }

    pub fn compile(&self, op: &LogicalOperator) -> Result<Arc<dyn ExecutableOperator>> {
        Ok(match op {
            LogicalOperator::Load(load) if load.name.is_empty() => Arc::new(PhysicalEmpty),
            LogicalOperator::Load(load) => {
                let relation = self.dataset.get_relation(&load.name)?;
                Arc::new(PhysicalScan::new(load.name.clone(), relation.source))
            }
            LogicalOperator::Alias(alias) => self.compile(&alias.input)?,
            LogicalOperator::Projection(proj) => self.compile_projection(proj)?,
            LogicalOperator::Selection(sel) => {
                let predicate = sel
                    .predicate
                    .as_ref()
                    .map(|p| self.plan_expr(p, sel.input.output_schema()?))
                    .transpose()?;
                Arc::new(PhysicalFilter::new(self.compile(&sel.input)?, predicate))
            }
            LogicalOperator::Join(join) => self.compile_join(join, op.output_schema()?)?,
            LogicalOperator::UnionAll(union) => Arc::new(PhysicalUnion::new(
                self.compile(&union.left)?,
                self.compile(&union.right)?,
            )),
            LogicalOperator::OrderBy(order) => self.compile_order_by(order)?,
            LogicalOperator::GroupBy(group) => self.compile_group_by(group)?,
            LogicalOperator::Slice(slice) => Arc::new(PhysicalLimit::new(
                self.compile(&slice.input)?,
                slice.start,
                slice.stop,
            )),
            LogicalOperator::TableFunction(call) => self.compile_table_function(call)?,
            LogicalOperator::Placeholder => return Err(internal!("cannot compile a placeholder")),
        })
    }

    fn plan_expr(&self, expr: &Expression, schema: &Schema) -> Result<PhysicalScalarExpression> {
        PhysicalScalarExpression::plan(expr, schema, self.functions)
    }

    /// Plan projection expressions, expanding `*`.
    fn plan_projection(
        &self,
        exprs: &[Expression],
        schema: &Schema,
    ) -> Result<Vec<PhysicalScalarExpression>> {
        let mut planned = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                Expression::SelectAll(qualifier) => planned.extend(
                    schema
                        .select_all(qualifier.as_deref())?
                        .into_iter()
                        .map(PhysicalScalarExpression::Column),
                ),
                expr => planned.push(self.plan_expr(expr, schema)?),
            }
        }
        Ok(planned)
    }

    fn compile_projection(&self, proj: &Projection) -> Result<Arc<dyn ExecutableOperator>> {
        let schema = proj.input.output_schema()?;
        let input = self.compile(&proj.input)?;

        if has_aggregates(&proj.exprs, self.functions) {
            // Aggregating without grouping, the whole input is one group.
            let bindings = aggregate_bindings(&proj.exprs, schema, self.functions)?;
            let outputs = self.aggregate_outputs(&proj.exprs, schema, &bindings)?;
            return Ok(Arc::new(PhysicalStreamingAggregate::new(
                input,
                Vec::new(),
                outputs,
            )));
        }

        let exprs = self.plan_projection(&proj.exprs, schema)?;
        Ok(Arc::new(PhysicalProject::new(input, exprs)))
    }

    fn aggregate_outputs(
        &self,
        exprs: &[Expression],
        schema: &Schema,
        bindings: &[AggregateBinding],
    ) -> Result<Vec<AggregateOutput>> {
        let mut outputs = Vec::with_capacity(exprs.len());
        for expr in exprs {
            if let Expression::SelectAll(qualifier) = expr {
                outputs.extend(
                    schema
                        .select_all(qualifier.as_deref())?
                        .into_iter()
                        .map(|idx| AggregateOutput::Scalar(PhysicalScalarExpression::Column(idx))),
                );
                continue;
            }

            let position = outputs.len();
            let output = match bindings.iter().find(|b| b.position == position) {
                Some(binding) => AggregateOutput::Aggregate {
                    aggregate: self.functions.get_aggregate(&binding.function)?,
                    inputs: binding
                        .args
                        .iter()
                        .map(|arg| self.plan_expr(arg, schema))
                        .collect::<Result<_>>()?,
                },
                None => AggregateOutput::Scalar(self.plan_expr(expr, schema)?),
            };
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn compile_order_by(&self, order: &OrderBy) -> Result<Arc<dyn ExecutableOperator>> {
        let schema = order.input.output_schema()?;
        let exprs = order
            .exprs
            .iter()
            .map(|expr| {
                let (expr, desc) = sort_key(expr);
                Ok(PhysicalSortExpression {
                    expr: self.plan_expr(expr, schema)?,
                    desc,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(PhysicalSort::new(self.compile(&order.input)?, exprs)))
    }

    fn compile_group_by(&self, group: &GroupBy) -> Result<Arc<dyn ExecutableOperator>> {
        let proj = grouped_projection(group)?;
        let schema = proj.input.output_schema()?;

        let keys = group_keys(group, self.functions)?
            .iter()
            .map(|key| self.plan_expr(key, schema))
            .collect::<Result<Vec<_>>>()?;

        let mut input = self.compile(&proj.input)?;
        if !keys.is_empty() {
            // Streaming aggregation needs equal keys to be adjacent.
            let sort_exprs = keys
                .iter()
                .map(|key| PhysicalSortExpression {
                    expr: key.clone(),
                    desc: false,
                })
                .collect();
            input = Arc::new(PhysicalSort::new(input, sort_exprs));
        }

        let outputs = self.aggregate_outputs(&proj.exprs, schema, &group.aggregates)?;
        Ok(Arc::new(PhysicalStreamingAggregate::new(input, keys, outputs)))
    }

    fn compile_join(&self, join: &Join, schema: &Schema) -> Result<Arc<dyn ExecutableOperator>> {
        let left_len = join.left.output_schema()?.len();
        let right_len = join.right.output_schema()?.len();
        let left = self.compile(&join.left)?;
        let right = self.compile(&join.right)?;

        let strategy = select_strategy(join.predicate.as_ref(), schema, left_len, self.config);
        debug!(?strategy, join_type = %join.join_type, "compiled join");

        Ok(match strategy {
            JoinStrategy::Hash { keys } => Arc::new(PhysicalHashJoin::new(
                left,
                right,
                keys,
                join.join_type,
                right_len,
            )),
            JoinStrategy::NestedBlock => {
                let predicate = join
                    .predicate
                    .as_ref()
                    .map(|p| self.plan_expr(p, schema))
                    .transpose()?;
                Arc::new(PhysicalNestedBlockJoin::new(
                    left,
                    right,
                    predicate,
                    join.join_type,
                    right_len,
                ))
            }
        })
    }

    fn compile_table_function(
        &self,
        call: &TableFunctionCall,
    ) -> Result<Arc<dyn ExecutableOperator>> {
        let function = self.functions.get_table_function(&call.name)?;
        let inputs = call
            .args
            .iter()
            .map(|arg| {
                Ok(match arg {
                    TableFunctionArg::Constant(value) => TableFunctionInput::Constant(value.clone()),
                    TableFunctionArg::Relation(op) => TableFunctionInput::Relation {
                        schema: op.output_schema()?.clone(),
                        operator: self.compile(op)?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(PhysicalTableFunction::new(function, inputs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::expr::{col, desc, func, lit, rename, select_all};
    use crate::query::Query;
    use crate::row;
    use crate::schema::{DataType, Field, FieldMode};
    use crate::value::{Row, Value};

    fn dataset() -> Arc<Dataset> {
        let adapter = MemoryAdapter::new("memory")
            .with_table(
                "employees",
                vec![
                    Field::new("id", DataType::Integer),
                    Field::new("name", DataType::String),
                    Field::new("manager_id", DataType::Integer),
                ],
                vec![
                    row![1234, "Tom", Value::Null],
                    row![4567, "Sally", 1234],
                    row![8901, "Mark", 1234],
                ],
            )
            .unwrap()
            .with_table(
                "teams",
                vec![
                    Field::new("team", DataType::String),
                    Field::new("members", DataType::String).with_mode(FieldMode::Repeated),
                ],
                vec![
                    row!["core", vec!["Tom", "Sally"]],
                    row!["infra", Value::List(Vec::new())],
                    row!["ops", vec!["Mark"]],
                ],
            )
            .unwrap();

        let dataset = Dataset::with_builtins();
        dataset.add_adapter(Arc::new(adapter));
        Arc::new(dataset)
    }

    fn run(op: LogicalOperator) -> Vec<Row> {
        Query::new(dataset(), op)
            .unwrap()
            .execute(Vec::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap()
    }

    #[test]
    fn order_by_desc() {
        let rows = run(LogicalOperator::load("employees")
            .order_by([desc(col("name"))])
            .project([col("name")]));
        assert_eq!(vec![row!["Tom"], row!["Sally"], row!["Mark"]], rows);
    }

    #[test]
    fn whole_table_aggregate() {
        let rows = run(LogicalOperator::load("employees").project([
            func("count", []),
            func("max", [col("id")]),
            func("avg", [col("manager_id")]),
        ]));
        assert_eq!(vec![row![3, 8901, 1234.0]], rows);
    }

    #[test]
    fn whole_table_aggregate_empty_input() {
        let rows = run(LogicalOperator::load("employees")
            .select(lit(false))
            .project([func("count", [])]));
        assert!(rows.is_empty());
    }

    #[test]
    fn group_by_sorts_input() {
        let rows = run(LogicalOperator::load("employees")
            .order_by([desc(col("id"))])
            .project([col("manager_id"), rename("total", func("sum", [col("id")]))])
            .group_by([col("manager_id")]));
        assert_eq!(vec![row![Value::Null, 1234], row![1234, 4567 + 8901]], rows);
    }

    #[test]
    fn flatten_table_function() {
        let rows = run(LogicalOperator::table_function(
            "flatten",
            vec![
                TableFunctionArg::Relation(LogicalOperator::load("teams")),
                TableFunctionArg::Constant(Value::from("members")),
            ],
        )
        .project([select_all()]));
        assert_eq!(
            vec![row!["core", "Tom"], row!["core", "Sally"], row!["ops", "Mark"]],
            rows
        );
    }

    #[test]
    fn constant_projection_without_source() {
        let rows = run(LogicalOperator::load("").project([lit(1), lit("a")]));
        assert_eq!(vec![row![1, "a"]], rows);
    }

    #[test]
    fn unresolved_plan_fails_to_compile() {
        let dataset = dataset();
        let functions = dataset.functions();
        let config = ExecutionConfig::default();
        let compiler = PlanCompiler::new(&dataset, &functions, &config);
        compiler
            .compile(&LogicalOperator::load("employees").project([col("id")]))
            .unwrap_err();
    }
}
