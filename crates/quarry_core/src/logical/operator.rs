use std::fmt;

use crate::errors::{Result, internal};
use crate::explain::{ExplainConfig, ExplainEntry, ExplainNode, Explainable};
use crate::expr::Expression;
use crate::schema::Schema;
use crate::value::Value;

/// Resolved output schema attached to an operator.
///
/// Always compares equal, operator equality is structural over the plan
/// only.
#[derive(Debug, Clone, Default)]
pub struct SchemaAnnotation(Option<Schema>);

impl SchemaAnnotation {
    pub fn new(schema: Schema) -> Self {
        SchemaAnnotation(Some(schema))
    }

    pub fn get(&self) -> Option<&Schema> {
        self.0.as_ref()
    }
}

impl PartialEq for SchemaAnnotation {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LogicalOperator {
    Load(Load),
    Alias(Alias),
    Projection(Projection),
    Selection(Selection),
    Join(Join),
    UnionAll(UnionAll),
    OrderBy(OrderBy),
    GroupBy(GroupBy),
    Slice(Slice),
    TableFunction(TableFunctionCall),
    /// Hole left behind while a cursor has a child detached from its parent.
    #[default]
    Placeholder,
}

/// Reference to a base relation or a view by name.
///
/// The empty name refers to a relation with no fields and a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub name: String,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub input: Box<LogicalOperator>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub input: Box<LogicalOperator>,
    pub exprs: Vec<Expression>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub input: Box<LogicalOperator>,
    /// A `None` predicate passes every row through.
    pub predicate: Option<Expression>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    /// Left outer join, unmatched left rows are padded with NULLs.
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Box<LogicalOperator>,
    pub right: Box<LogicalOperator>,
    /// A `None` predicate produces the cross product.
    pub predicate: Option<Expression>,
    pub join_type: JoinType,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionAll {
    pub left: Box<LogicalOperator>,
    pub right: Box<LogicalOperator>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub input: Box<LogicalOperator>,
    /// Sort expressions, optionally wrapped in `Asc` or `Desc`.
    pub exprs: Vec<Expression>,
    pub schema: SchemaAnnotation,
}

/// An aggregate computed at a position of the grouped projection.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBinding {
    /// Output position in the projection.
    pub position: usize,
    /// Name of the registered aggregate.
    pub function: String,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    /// The grouped projection.
    pub input: Box<LogicalOperator>,
    /// Grouping expressions, evaluated against the projection's input.
    pub exprs: Vec<Expression>,
    /// Filled in during schema resolution.
    pub aggregates: Vec<AggregateBinding>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub input: Box<LogicalOperator>,
    pub start: Option<usize>,
    pub stop: Option<usize>,
    pub schema: SchemaAnnotation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFunctionArg {
    Constant(Value),
    Relation(LogicalOperator),
}

/// Call to a relation valued function.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFunctionCall {
    pub name: String,
    pub args: Vec<TableFunctionArg>,
    pub schema: SchemaAnnotation,
}

impl LogicalOperator {
    pub fn load(name: impl Into<String>) -> Self {
        LogicalOperator::Load(Load {
            name: name.into(),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn table_function(name: impl Into<String>, args: Vec<TableFunctionArg>) -> Self {
        LogicalOperator::TableFunction(TableFunctionCall {
            name: name.into(),
            args,
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn alias(self, name: impl Into<String>) -> Self {
        LogicalOperator::Alias(Alias {
            name: name.into(),
            input: Box::new(self),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn project(self, exprs: impl IntoIterator<Item = Expression>) -> Self {
        LogicalOperator::Projection(Projection {
            input: Box::new(self),
            exprs: exprs.into_iter().collect(),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn select(self, predicate: impl Into<Option<Expression>>) -> Self {
        LogicalOperator::Selection(Selection {
            input: Box::new(self),
            predicate: predicate.into(),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn join(self, right: LogicalOperator, predicate: impl Into<Option<Expression>>) -> Self {
        self.join_with_type(right, predicate.into(), JoinType::Inner)
    }

    pub fn left_join(
        self,
        right: LogicalOperator,
        predicate: impl Into<Option<Expression>>,
    ) -> Self {
        self.join_with_type(right, predicate.into(), JoinType::Left)
    }

    fn join_with_type(
        self,
        right: LogicalOperator,
        predicate: Option<Expression>,
        join_type: JoinType,
    ) -> Self {
        LogicalOperator::Join(Join {
            left: Box::new(self),
            right: Box::new(right),
            predicate,
            join_type,
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn union_all(self, right: LogicalOperator) -> Self {
        LogicalOperator::UnionAll(UnionAll {
            left: Box::new(self),
            right: Box::new(right),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn order_by(self, exprs: impl IntoIterator<Item = Expression>) -> Self {
        LogicalOperator::OrderBy(OrderBy {
            input: Box::new(self),
            exprs: exprs.into_iter().collect(),
            schema: SchemaAnnotation::default(),
        })
    }

    /// Group a projection, an empty set of expressions aggregates the whole
    /// input.
    pub fn group_by(self, exprs: impl IntoIterator<Item = Expression>) -> Self {
        LogicalOperator::GroupBy(GroupBy {
            input: Box::new(self),
            exprs: exprs.into_iter().collect(),
            aggregates: Vec::new(),
            schema: SchemaAnnotation::default(),
        })
    }

    pub fn slice(self, start: Option<usize>, stop: Option<usize>) -> Self {
        LogicalOperator::Slice(Slice {
            input: Box::new(self),
            start,
            stop,
            schema: SchemaAnnotation::default(),
        })
    }

    /// Name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "Load",
            Self::Alias(_) => "Alias",
            Self::Projection(_) => "Projection",
            Self::Selection(_) => "Selection",
            Self::Join(_) => "Join",
            Self::UnionAll(_) => "UnionAll",
            Self::OrderBy(_) => "OrderBy",
            Self::GroupBy(_) => "GroupBy",
            Self::Slice(_) => "Slice",
            Self::TableFunction(_) => "TableFunction",
            Self::Placeholder => "Placeholder",
        }
    }

    fn annotation(&self) -> Option<&SchemaAnnotation> {
        Some(match self {
            Self::Load(n) => &n.schema,
            Self::Alias(n) => &n.schema,
            Self::Projection(n) => &n.schema,
            Self::Selection(n) => &n.schema,
            Self::Join(n) => &n.schema,
            Self::UnionAll(n) => &n.schema,
            Self::OrderBy(n) => &n.schema,
            Self::GroupBy(n) => &n.schema,
            Self::Slice(n) => &n.schema,
            Self::TableFunction(n) => &n.schema,
            Self::Placeholder => return None,
        })
    }

    /// Resolved schema, if resolution has happened.
    pub fn schema(&self) -> Option<&Schema> {
        self.annotation().and_then(SchemaAnnotation::get)
    }

    /// Resolved schema, erroring if the operator hasn't been resolved.
    pub fn output_schema(&self) -> Result<&Schema> {
        self.schema()
            .ok_or_else(|| internal!("{} has no resolved schema", self.kind()))
    }

    /// Same operator with its schema annotation replaced.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        let annotation = SchemaAnnotation::new(schema);
        match &mut self {
            Self::Load(n) => n.schema = annotation,
            Self::Alias(n) => n.schema = annotation,
            Self::Projection(n) => n.schema = annotation,
            Self::Selection(n) => n.schema = annotation,
            Self::Join(n) => n.schema = annotation,
            Self::UnionAll(n) => n.schema = annotation,
            Self::OrderBy(n) => n.schema = annotation,
            Self::GroupBy(n) => n.schema = annotation,
            Self::Slice(n) => n.schema = annotation,
            Self::TableFunction(n) => n.schema = annotation,
            Self::Placeholder => (),
        }
        self
    }

    /// Child operators in order.
    ///
    /// Relation arguments of a table function are its children.
    pub fn children(&self) -> Vec<&LogicalOperator> {
        match self {
            Self::Load(_) | Self::Placeholder => Vec::new(),
            Self::Alias(n) => vec![n.input.as_ref()],
            Self::Projection(n) => vec![n.input.as_ref()],
            Self::Selection(n) => vec![n.input.as_ref()],
            Self::OrderBy(n) => vec![n.input.as_ref()],
            Self::GroupBy(n) => vec![n.input.as_ref()],
            Self::Slice(n) => vec![n.input.as_ref()],
            Self::Join(n) => vec![n.left.as_ref(), n.right.as_ref()],
            Self::UnionAll(n) => vec![n.left.as_ref(), n.right.as_ref()],
            Self::TableFunction(n) => n
                .args
                .iter()
                .filter_map(|arg| match arg {
                    TableFunctionArg::Relation(op) => Some(op),
                    TableFunctionArg::Constant(_) => None,
                })
                .collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut LogicalOperator> {
        match self {
            Self::Load(_) | Self::Placeholder => Vec::new(),
            Self::Alias(n) => vec![n.input.as_mut()],
            Self::Projection(n) => vec![n.input.as_mut()],
            Self::Selection(n) => vec![n.input.as_mut()],
            Self::OrderBy(n) => vec![n.input.as_mut()],
            Self::GroupBy(n) => vec![n.input.as_mut()],
            Self::Slice(n) => vec![n.input.as_mut()],
            Self::Join(n) => vec![n.left.as_mut(), n.right.as_mut()],
            Self::UnionAll(n) => vec![n.left.as_mut(), n.right.as_mut()],
            Self::TableFunction(n) => n
                .args
                .iter_mut()
                .filter_map(|arg| match arg {
                    TableFunctionArg::Relation(op) => Some(op),
                    TableFunctionArg::Constant(_) => None,
                })
                .collect(),
        }
    }

    pub fn num_children(&self) -> usize {
        self.children().len()
    }

    /// Detach all children, leaving placeholders in their place.
    pub fn take_children(mut self) -> (LogicalOperator, Vec<LogicalOperator>) {
        let children = self
            .children_mut()
            .into_iter()
            .map(std::mem::take)
            .collect();
        (self, children)
    }

    /// Rebuild this operator with new children.
    ///
    /// Errors if the number of children doesn't match what the variant
    /// requires.
    pub fn with_children(mut self, children: Vec<LogicalOperator>) -> Result<Self> {
        let expected = self.num_children();
        if expected != children.len() {
            return Err(internal!(
                "{} expects {} children, got {}",
                self.kind(),
                expected,
                children.len()
            ));
        }
        for (slot, child) in self.children_mut().into_iter().zip(children) {
            *slot = child;
        }
        Ok(self)
    }

    /// Build the explain tree for this plan.
    pub fn explain_node(&self, conf: ExplainConfig) -> ExplainNode {
        ExplainNode {
            entry: self.explain_entry(conf),
            children: self
                .children()
                .into_iter()
                .map(|child| child.explain_node(conf))
                .collect(),
        }
    }
}

impl Explainable for LogicalOperator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let entry = match self {
            Self::Load(n) => ExplainEntry::new("Load").with_value("name", &n.name),
            Self::Alias(n) => ExplainEntry::new("Alias").with_value("name", &n.name),
            Self::Projection(n) => {
                ExplainEntry::new("Projection").with_values("expressions", &n.exprs)
            }
            Self::Selection(n) => match &n.predicate {
                Some(predicate) => ExplainEntry::new("Selection").with_value("predicate", predicate),
                None => ExplainEntry::new("Selection"),
            },
            Self::Join(n) => {
                let entry = ExplainEntry::new("Join").with_value("join_type", n.join_type);
                match &n.predicate {
                    Some(predicate) => entry.with_value("predicate", predicate),
                    None => entry,
                }
            }
            Self::UnionAll(_) => ExplainEntry::new("UnionAll"),
            Self::OrderBy(n) => ExplainEntry::new("OrderBy").with_values("expressions", &n.exprs),
            Self::GroupBy(n) => {
                let entry = ExplainEntry::new("GroupBy").with_values("expressions", &n.exprs);
                if n.aggregates.is_empty() {
                    entry
                } else {
                    entry.with_values(
                        "aggregates",
                        n.aggregates
                            .iter()
                            .map(|agg| format!("#{} {}", agg.position, agg.function)),
                    )
                }
            }
            Self::Slice(n) => ExplainEntry::new("Slice")
                .with_value("start", n.start.unwrap_or(0))
                .with_value(
                    "stop",
                    n.stop.map(|s| s.to_string()).unwrap_or_else(|| "None".to_string()),
                ),
            Self::TableFunction(n) => ExplainEntry::new("TableFunction")
                .with_value("name", &n.name)
                .with_values(
                    "constants",
                    n.args.iter().filter_map(|arg| match arg {
                        TableFunctionArg::Constant(v) => Some(v),
                        TableFunctionArg::Relation(_) => None,
                    }),
                ),
            Self::Placeholder => ExplainEntry::new("Placeholder"),
        };

        match (conf.verbose, self.schema()) {
            (true, Some(schema)) => entry.with_value("schema", schema),
            _ => entry,
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain_node(ExplainConfig::default()))
    }
}
