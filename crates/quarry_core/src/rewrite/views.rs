use tracing::trace;

use crate::dataset::Dataset;
use crate::errors::{Result, internal};
use crate::logical::cursor::{Cursor, CursorRule};
use crate::logical::operator::LogicalOperator;

/// Replace loads of views with the stored plan of the view.
///
/// The walk continues from the leftmost leaf of the substituted plan, so
/// views referencing other views are substituted as well.
#[derive(Debug)]
pub struct ViewSubstitution<'a> {
    dataset: &'a Dataset,
}

impl<'a> ViewSubstitution<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        ViewSubstitution { dataset }
    }
}

impl CursorRule for ViewSubstitution<'_> {
    fn name(&self) -> &'static str {
        "substitute_view"
    }

    fn matches(&self, cursor: &Cursor) -> bool {
        match cursor.node() {
            LogicalOperator::Load(load) => {
                load.schema.get().is_none() && self.dataset.has_view(&load.name)
            }
            _ => false,
        }
    }

    fn transform(&self, cursor: &mut Cursor) -> Result<()> {
        let LogicalOperator::Load(load) = cursor.node() else {
            return Err(internal!("view substitution at {}", cursor.node().kind()));
        };
        let name = load.name.clone();
        let view = self
            .dataset
            .get_view(&name)
            .ok_or_else(|| internal!("view '{name}' disappeared during substitution"))?;

        trace!(%name, "substituting view");
        cursor.replace(view);
        cursor.leftmost_descendant()
    }
}
