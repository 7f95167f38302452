//! Key predicate pushdown.
//!
//! Relations backed by a key enumeration step (file paths, object keys)
//! can drop records before the expensive extraction step if the predicates
//! over key fields run first. Adapters call [`push_key_predicates`] from
//! their `evaluate` with the cursor on the node enumerating keys. Selections
//! above it are split into the part over key fields, which is moved down to
//! directly wrap the key node, and the rest, which stays where it was.
use tracing::trace;

use crate::errors::Result;
use crate::expr::{BinaryOperator, Expression};
use crate::logical::cursor::Cursor;
use crate::logical::operator::{LogicalOperator, Selection};

/// Field names of the key enumeration, and the qualifiers they may be
/// referenced with.
#[derive(Debug, Clone)]
pub struct KeyFields<'a> {
    fields: &'a [&'a str],
    qualifiers: Vec<String>,
}

impl<'a> KeyFields<'a> {
    pub fn new(relation: &str, fields: &'a [&'a str]) -> Self {
        KeyFields {
            fields,
            qualifiers: vec![relation.to_string()],
        }
    }

    fn add_qualifier(&mut self, qualifier: &str) {
        self.qualifiers.push(qualifier.to_string());
    }

    /// Strip an allowed qualifier from a path.
    fn unqualified<'p>(&self, path: &'p str) -> Option<&'p str> {
        match path.split_once('.') {
            Some((qualifier, name)) => self
                .qualifiers
                .iter()
                .any(|q| q == qualifier)
                .then_some(name),
            None => Some(path),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.unqualified(path)
            .is_some_and(|name| self.fields.contains(&name))
    }

    fn strip(&self, expr: Expression) -> Expression {
        expr.map_vars(&|path| match self.unqualified(&path) {
            Some(name) => name.to_string(),
            None => path,
        })
    }
}

/// Check if `expr` can be evaluated from key fields alone.
pub fn is_partitionable(keys: &KeyFields<'_>, expr: &Expression) -> bool {
    match expr {
        Expression::Var(path) => keys.contains(path),
        Expression::SelectAll(_) => false,
        expr => {
            let mut partitionable = true;
            expr.for_each_child(&mut |child| {
                partitionable = partitionable && is_partitionable(keys, child);
            });
            partitionable
        }
    }
}

/// Split a predicate into `(record, key)` parts.
///
/// The conjunction of the returned parts is equivalent to `expr`. A `None`
/// part is `true`.
pub fn split_key_predicate(
    keys: &KeyFields<'_>,
    expr: &Expression,
) -> (Option<Expression>, Option<Expression>) {
    match expr {
        Expression::Binary {
            op: BinaryOperator::And,
            left,
            right,
        } => {
            let (left_record, left_key) = split_key_predicate(keys, left);
            let (right_record, right_key) = split_key_predicate(keys, right);
            (
                Expression::and_all(left_record.into_iter().chain(right_record)),
                Expression::and_all(left_key.into_iter().chain(right_key)),
            )
        }
        Expression::Binary {
            op: BinaryOperator::Or,
            left,
            right,
        } => {
            // A disjunction only moves if neither side needs the record.
            let (left_record, _) = split_key_predicate(keys, left);
            let (right_record, _) = split_key_predicate(keys, right);
            if left_record.is_none() && right_record.is_none() {
                (None, Some(expr.clone()))
            } else {
                (Some(expr.clone()), None)
            }
        }
        expr if is_partitionable(keys, expr) => (None, Some(expr.clone())),
        expr => (Some(expr.clone()), None),
    }
}

/// Move key predicates from the selections above the cursor down onto the
/// node under the cursor.
///
/// Only selections reachable through `Selection`, `OrderBy` and `Alias`
/// nodes are considered, anything else may change which rows a predicate
/// sees. A selection left with no record part is removed. The cursor ends
/// up on the new selection wrapping the key node, or on the key node itself
/// if nothing was pushed.
pub fn push_key_predicates(cursor: &mut Cursor, mut keys: KeyFields<'_>) -> Result<()> {
    let mut collected = Vec::new();
    // Single child levels between the key node and the cursor.
    let mut levels = 0;

    while let Some(position) = cursor.position() {
        cursor.up()?;

        match cursor.node() {
            LogicalOperator::Selection(Selection {
                predicate: Some(predicate),
                ..
            }) => {
                let (record, key) = split_key_predicate(&keys, predicate);
                let Some(key) = key else {
                    levels += 1;
                    continue;
                };
                collected.push(keys.strip(key));

                match record {
                    Some(record) => {
                        levels += 1;
                        cursor.replace_with(|op| match op {
                            LogicalOperator::Selection(sel) => {
                                Ok(LogicalOperator::Selection(Selection {
                                    predicate: Some(record),
                                    ..sel
                                }))
                            }
                            op => Ok(op),
                        })?;
                    }
                    None => {
                        cursor.replace_with(|op| match op {
                            LogicalOperator::Selection(sel) => Ok(*sel.input),
                            op => Ok(op),
                        })?;
                    }
                }
            }
            LogicalOperator::Selection(_) | LogicalOperator::OrderBy(_) => levels += 1,
            LogicalOperator::Alias(alias) => {
                let name = alias.name.clone();
                keys.add_qualifier(&name);
                levels += 1;
            }
            _ => {
                cursor.down(position)?;
                break;
            }
        }
    }

    for _ in 0..levels {
        cursor.down(0)?;
    }

    if let Some(predicate) = Expression::and_all(collected) {
        trace!(%predicate, "pushed key predicate");
        cursor.replace_with(|op| Ok(op.select(predicate)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::expr::{and, col, eq, func, gt, in_list, lit, or};

    const KEY_FIELDS: &[&str] = &["path", "year"];

    fn keys() -> KeyFields<'static> {
        KeyFields::new("docs", KEY_FIELDS)
    }

    #[rstest]
    #[case::key_only(eq(col("year"), lit("2024")), None, Some(eq(col("year"), lit("2024"))))]
    #[case::qualified_key(eq(col("docs.path"), lit("a")), None, Some(eq(col("docs.path"), lit("a"))))]
    #[case::record_only(gt(col("size"), lit(1)), Some(gt(col("size"), lit(1))), None)]
    #[case::foreign_qualifier(eq(col("other.path"), lit("a")), Some(eq(col("other.path"), lit("a"))), None)]
    #[case::function_over_key(
        eq(func("lower", [col("path")]), lit("a")),
        None,
        Some(eq(func("lower", [col("path")]), lit("a")))
    )]
    #[case::tuple_over_key(
        in_list(col("year"), [lit("2023"), lit("2024")]),
        None,
        Some(in_list(col("year"), [lit("2023"), lit("2024")]))
    )]
    #[case::and_splits(
        and(eq(col("year"), lit("2024")), gt(col("size"), lit(1))),
        Some(gt(col("size"), lit(1))),
        Some(eq(col("year"), lit("2024")))
    )]
    #[case::or_of_keys_lifts(
        or(eq(col("year"), lit("2024")), eq(col("path"), lit("a"))),
        None,
        Some(or(eq(col("year"), lit("2024")), eq(col("path"), lit("a"))))
    )]
    #[case::mixed_or_stays(
        or(eq(col("year"), lit("2024")), gt(col("size"), lit(1))),
        Some(or(eq(col("year"), lit("2024")), gt(col("size"), lit(1)))),
        None
    )]
    fn split(
        #[case] expr: Expression,
        #[case] record: Option<Expression>,
        #[case] key: Option<Expression>,
    ) {
        assert_eq!((record, key), split_key_predicate(&keys(), &expr));
    }

    #[test]
    fn nested_and_keeps_both_halves() {
        let expr = and(
            and(eq(col("year"), lit("2024")), gt(col("size"), lit(1))),
            and(eq(col("path"), lit("a")), gt(col("size"), lit(2))),
        );
        let (record, key) = split_key_predicate(&keys(), &expr);
        assert_eq!(
            Some(and(gt(col("size"), lit(1)), gt(col("size"), lit(2)))),
            record
        );
        assert_eq!(
            Some(and(eq(col("year"), lit("2024")), eq(col("path"), lit("a")))),
            key
        );
    }

    fn key_node() -> LogicalOperator {
        LogicalOperator::table_function("doc_keys", Vec::new())
    }

    /// Run the pushdown with the cursor placed on the leftmost leaf.
    fn push(plan: LogicalOperator) -> LogicalOperator {
        let mut cursor = Cursor::new(plan);
        while cursor.down(0).unwrap() {}
        push_key_predicates(&mut cursor, keys()).unwrap();
        cursor.into_root().unwrap()
    }

    #[test]
    fn key_only_selection_removed() {
        let out = push(key_node().select(eq(col("docs.year"), lit("2024"))).project([col("path")]));
        let expected = key_node()
            .select(eq(col("year"), lit("2024")))
            .project([col("path")]);
        assert_eq!(expected, out);
    }

    #[test]
    fn record_part_stays_above() {
        let out = push(
            key_node()
                .order_by([col("path")])
                .alias("d")
                .select(and(eq(col("d.year"), lit("2024")), gt(col("d.size"), lit(1)))),
        );
        let expected = key_node()
            .select(eq(col("year"), lit("2024")))
            .order_by([col("path")])
            .alias("d")
            .select(gt(col("d.size"), lit(1)));
        assert_eq!(expected, out);
    }

    #[test]
    fn stops_at_slice() {
        let plan = key_node()
            .slice(None, Some(1))
            .select(eq(col("year"), lit("2024")));
        assert_eq!(plan.clone(), push(plan));
    }

    #[test]
    fn stops_at_join_and_returns_to_key_node() {
        let plan = LogicalOperator::load("other")
            .join(key_node().select(eq(col("path"), lit("a"))), None)
            .select(eq(col("year"), lit("2024")));
        let mut cursor = Cursor::new(plan);
        cursor.down(0).unwrap();
        cursor.down(1).unwrap();
        cursor.down(0).unwrap();
        assert_eq!(&key_node(), cursor.node());

        push_key_predicates(&mut cursor, keys()).unwrap();
        assert_eq!(&key_node().select(eq(col("path"), lit("a"))), cursor.node());

        let expected = LogicalOperator::load("other")
            .join(key_node().select(eq(col("path"), lit("a"))), None)
            .select(eq(col("year"), lit("2024")));
        assert_eq!(expected, cursor.into_root().unwrap());
    }
}
