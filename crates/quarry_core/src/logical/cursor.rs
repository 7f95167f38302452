//! Zipper over an owned operator tree.
//!
//! The cursor focuses a single node. Moving down detaches the child from its
//! parent, leaving a placeholder in the parent shell, moving up rebuilds the
//! parent with the (possibly replaced) child. Nothing is mutated in place
//! outside of the focused node.
use tracing::trace;

use super::operator::LogicalOperator;
use crate::errors::{Result, internal};

#[derive(Debug)]
struct Frame {
    /// Parent with its children detached.
    parent: LogicalOperator,
    /// Siblings before the focus, in order.
    left: Vec<LogicalOperator>,
    /// Siblings after the focus, in reverse order.
    right: Vec<LogicalOperator>,
}

#[derive(Debug)]
pub struct Cursor {
    node: LogicalOperator,
    path: Vec<Frame>,
    /// Set when a rule moves the cursor to a different subtree that still
    /// needs visiting.
    repositioned: bool,
}

impl Cursor {
    pub fn new(root: LogicalOperator) -> Self {
        Cursor {
            node: root,
            path: Vec::new(),
            repositioned: false,
        }
    }

    pub fn node(&self) -> &LogicalOperator {
        &self.node
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Position of the focus among its siblings, `None` at the root.
    pub fn position(&self) -> Option<usize> {
        self.path.last().map(|frame| frame.left.len())
    }

    /// Replace the focused node with an arbitrary subtree.
    pub fn replace(&mut self, node: LogicalOperator) {
        self.node = node;
    }

    /// Replace the focused node with the result of `f`.
    pub fn replace_with<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(LogicalOperator) -> Result<LogicalOperator>,
    {
        let node = std::mem::take(&mut self.node);
        self.node = f(node)?;
        Ok(())
    }

    /// Move to the parent, rebuilding it with the current node.
    ///
    /// Returns false if already at the root.
    pub fn up(&mut self) -> Result<bool> {
        let Some(frame) = self.path.pop() else {
            return Ok(false);
        };

        let Frame {
            parent,
            mut left,
            mut right,
        } = frame;

        left.push(std::mem::take(&mut self.node));
        right.reverse();
        left.append(&mut right);

        self.node = parent.with_children(left)?;
        Ok(true)
    }

    /// Move to the child at `idx`.
    ///
    /// Returns false, leaving the cursor in place, if there's no such child.
    pub fn down(&mut self, idx: usize) -> Result<bool> {
        if idx >= self.node.num_children() {
            return Ok(false);
        }

        let node = std::mem::take(&mut self.node);
        let (parent, mut children) = node.take_children();

        let mut right = children.split_off(idx + 1);
        right.reverse();
        let focus = children
            .pop()
            .ok_or_else(|| internal!("missing child {idx} of {}", parent.kind()))?;

        self.path.push(Frame {
            parent,
            left: children,
            right,
        });
        self.node = focus;

        Ok(true)
    }

    /// Move to the next sibling, false if this is the last one.
    pub fn right(&mut self) -> Result<bool> {
        let Some(frame) = self.path.last_mut() else {
            return Ok(false);
        };
        let Some(next) = frame.right.pop() else {
            return Ok(false);
        };
        let prev = std::mem::replace(&mut self.node, next);
        frame.left.push(prev);
        Ok(true)
    }

    fn descend_leftmost(&mut self) -> Result<()> {
        while self.down(0)? {}
        Ok(())
    }

    /// Move to the deepest leftmost descendant of the current node and mark
    /// the cursor as repositioned so the walk revisits from there.
    pub fn leftmost_descendant(&mut self) -> Result<()> {
        self.descend_leftmost()?;
        self.repositioned = true;
        Ok(())
    }

    fn take_repositioned(&mut self) -> bool {
        std::mem::take(&mut self.repositioned)
    }

    /// Advance in post-order.
    ///
    /// Returns false once the root has been visited.
    pub fn next(&mut self) -> Result<bool> {
        if self.right()? {
            self.descend_leftmost()?;
            return Ok(true);
        }
        self.up()
    }

    /// Move to the root, returning the rebuilt tree.
    pub fn into_root(mut self) -> Result<LogicalOperator> {
        while self.up()? {}
        Ok(self.node)
    }
}

/// A rewrite applied at cursor positions during a walk.
pub trait CursorRule {
    /// Name used in trace logging.
    fn name(&self) -> &'static str;

    /// Whether this rule applies at the current position.
    fn matches(&self, cursor: &Cursor) -> bool;

    /// Rewrite at the current position.
    ///
    /// A rule that moves the cursor must either return it to the position
    /// it started from, or call `leftmost_descendant` to have the walk
    /// continue from the new position.
    fn transform(&self, cursor: &mut Cursor) -> Result<()>;
}

/// Walk the tree once in post-order, applying rules at each position.
///
/// Rules run in order. If a rule repositions the cursor, rules start over
/// at the new position so that freshly inserted subtrees are themselves
/// visited.
pub fn walk(root: LogicalOperator, rules: &[&dyn CursorRule]) -> Result<LogicalOperator> {
    let mut cursor = Cursor::new(root);
    cursor.descend_leftmost()?;

    loop {
        let mut idx = 0;
        while let Some(rule) = rules.get(idx) {
            if rule.matches(&cursor) {
                trace!(rule = rule.name(), node = cursor.node().kind(), depth = cursor.depth(), "applying rule");
                rule.transform(&mut cursor)?;
                if cursor.take_repositioned() {
                    idx = 0;
                    continue;
                }
            }
            idx += 1;
        }

        if !cursor.next()? {
            break;
        }
    }

    cursor.into_root()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::expr::{col, lit, eq};

    fn plan() -> LogicalOperator {
        LogicalOperator::load("a")
            .select(eq(col("x"), lit(1)))
            .join(LogicalOperator::load("b").alias("bb"), None)
            .slice(None, Some(3))
    }

    /// Records the kind of every visited node.
    struct Record(RefCell<Vec<String>>);

    impl CursorRule for Record {
        fn name(&self) -> &'static str {
            "record"
        }

        fn matches(&self, _cursor: &Cursor) -> bool {
            true
        }

        fn transform(&self, cursor: &mut Cursor) -> Result<()> {
            let label = match cursor.node() {
                LogicalOperator::Load(load) => format!("Load({})", load.name),
                other => other.kind().to_string(),
            };
            self.0.borrow_mut().push(label);
            Ok(())
        }
    }

    /// Expands `Load(v)` into `Load(a) UNION ALL Load(b)`.
    struct Expand;

    impl CursorRule for Expand {
        fn name(&self) -> &'static str {
            "expand"
        }

        fn matches(&self, cursor: &Cursor) -> bool {
            matches!(cursor.node(), LogicalOperator::Load(load) if load.name == "v")
        }

        fn transform(&self, cursor: &mut Cursor) -> Result<()> {
            cursor.replace(LogicalOperator::load("a").union_all(LogicalOperator::load("b")));
            cursor.leftmost_descendant()
        }
    }

    #[test]
    fn walk_visits_post_order() {
        let record = Record(RefCell::new(Vec::new()));
        let out = walk(plan(), &[&record]).unwrap();
        assert_eq!(plan(), out);
        assert_eq!(
            vec!["Load(a)", "Selection", "Load(b)", "Alias", "Join", "Slice"],
            record.0.into_inner()
        );
    }

    #[test]
    fn walk_revisits_inserted_subtree() {
        let record = Record(RefCell::new(Vec::new()));
        let input = LogicalOperator::load("v").slice(None, None);
        let out = walk(input, &[&Expand, &record]).unwrap();

        let expected = LogicalOperator::load("a")
            .union_all(LogicalOperator::load("b"))
            .slice(None, None);
        assert_eq!(expected, out);
        assert_eq!(
            vec!["Load(a)", "Load(b)", "UnionAll", "Slice"],
            record.0.into_inner()
        );
    }

    #[test]
    fn down_and_up_preserve_tree() {
        let mut cursor = Cursor::new(plan());
        assert!(cursor.down(0).unwrap());
        assert!(cursor.down(1).unwrap());
        assert_eq!(Some(1), cursor.position());
        assert!(matches!(cursor.node(), LogicalOperator::Alias(_)));
        assert!(!cursor.down(3).unwrap());
        assert_eq!(plan(), cursor.into_root().unwrap());
    }

    #[test]
    fn replace_then_rebuild() {
        let mut cursor = Cursor::new(plan());
        cursor.down(0).unwrap();
        cursor.down(0).unwrap();
        cursor
            .replace_with(|node| match node {
                LogicalOperator::Selection(sel) => Ok(*sel.input),
                other => Ok(other),
            })
            .unwrap();

        let expected = LogicalOperator::load("a")
            .join(LogicalOperator::load("b").alias("bb"), None)
            .slice(None, Some(3));
        assert_eq!(expected, cursor.into_root().unwrap());
    }

    #[test]
    fn next_ends_at_root() {
        let mut cursor = Cursor::new(LogicalOperator::load("a"));
        assert!(!cursor.next().unwrap());
        assert!(cursor.is_root());
    }
}
