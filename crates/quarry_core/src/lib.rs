//! Relational queries over pluggable data sources.
//!
//! A query is a tree of [`LogicalOperator`]s over named relations. Building a
//! [`Query`] substitutes views, lets adapters rewrite the loads of their
//! relations and resolves the schema of every node. Executing it compiles
//! the tree into pull based operators producing rows lazily.
pub mod adapter;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod execution;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod logical;
pub mod ops;
pub mod query;
pub mod rewrite;
pub mod schema;
pub mod value;

pub use config::ExecutionConfig;
pub use dataset::Dataset;
pub use errors::{QuarryError, Result};
pub use execution::RowIter;
pub use expr::Expression;
pub use logical::operator::LogicalOperator;
pub use query::Query;
pub use schema::{DataType, Field, FieldMode, Schema};
pub use value::{Row, Value};
