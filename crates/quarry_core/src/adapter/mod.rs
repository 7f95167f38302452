//! Data sources.
//!
//! An adapter owns a set of named relations. Besides providing schemas and
//! rows, an adapter may rewrite any `Load` of one of its relations into an
//! arbitrary subtree before the query is compiled.
pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::Result;
use crate::execution::{ExecutionContext, RowIter};
use crate::logical::cursor::Cursor;
use crate::schema::Schema;

/// Produces the rows of a relation.
pub trait RecordSource: Debug + Sync + Send {
    fn records(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter>;
}

/// A schema paired with the source of its rows.
#[derive(Debug, Clone)]
pub struct Relation {
    pub schema: Schema,
    pub source: Arc<dyn RecordSource>,
}

pub trait Adapter: Debug + Sync + Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// All relations with their schemas.
    fn relations(&self) -> Vec<(String, Schema)>;

    fn has(&self, name: &str) -> bool {
        self.schema(name).is_some()
    }

    fn schema(&self, name: &str) -> Option<Schema>;

    fn get_relation(&self, name: &str) -> Option<Relation>;

    /// Rewrite the `Load` under the cursor.
    ///
    /// Called once per `Load` of a relation this adapter has, before schema
    /// resolution of that position. The default leaves the `Load` in place.
    /// An adapter replacing the node with a subtree must call
    /// `Cursor::leftmost_descendant` so the new subtree is resolved.
    fn evaluate(&self, cursor: &mut Cursor) -> Result<()> {
        let _ = cursor;
        Ok(())
    }
}
