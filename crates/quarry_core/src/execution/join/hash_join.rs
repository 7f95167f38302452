use std::collections::VecDeque;
use std::iter::Enumerate;
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use tracing::trace;

use super::buffer::BlockReader;
use super::concat_rows;
use super::outer_join_tracker::OuterJoinTracker;
use crate::errors::{Result, internal};
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::logical::operator::JoinType;
use crate::value::{Row, Value};

type JoinHashTable = HashMap<Vec<Value>, Vec<Row>, RandomState>;

/// Equality join.
///
/// The right input is read in size bounded blocks. For each block a hash
/// table keyed on the right key values is built and the whole left input
/// is streamed through it. Left outer joins emit the left rows that never
/// matched once all blocks have been probed.
#[derive(Debug)]
pub struct PhysicalHashJoin {
    left: Arc<dyn ExecutableOperator>,
    right: Arc<dyn ExecutableOperator>,
    /// `(left position, right position)` of each key.
    keys: Arc<[(usize, usize)]>,
    join_type: JoinType,
    right_arity: usize,
}

impl PhysicalHashJoin {
    pub fn new(
        left: Arc<dyn ExecutableOperator>,
        right: Arc<dyn ExecutableOperator>,
        keys: Vec<(usize, usize)>,
        join_type: JoinType,
        right_arity: usize,
    ) -> Self {
        PhysicalHashJoin {
            left,
            right,
            keys: keys.into(),
            join_type,
            right_arity,
        }
    }
}

impl ExecutableOperator for PhysicalHashJoin {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let budget = ctx.config.join_side_budget();
        Ok(Box::new(HashJoinStream {
            ctx: ctx.clone(),
            left: self.left.clone(),
            right_blocks: BlockReader::new(self.right.execute(ctx)?, budget),
            keys: self.keys.clone(),
            join_type: self.join_type,
            right_padding: vec![Value::Null; self.right_arity],
            tracker: OuterJoinTracker::default(),
            pending: VecDeque::new(),
            state: ProbeState::NextBlock,
        }))
    }
}

enum ProbeState {
    /// Build the table for the next right block.
    NextBlock,
    /// Stream the left input through the current table.
    Probing {
        table: JoinHashTable,
        left: Enumerate<RowIter>,
    },
    /// Emit left rows that never matched.
    Unmatched(Enumerate<RowIter>),
    Done,
}

struct HashJoinStream {
    ctx: Arc<ExecutionContext>,
    left: Arc<dyn ExecutableOperator>,
    right_blocks: BlockReader,
    keys: Arc<[(usize, usize)]>,
    join_type: JoinType,
    right_padding: Row,
    tracker: OuterJoinTracker,
    pending: VecDeque<Row>,
    state: ProbeState,
}

fn key_values(row: &[Value], positions: impl Iterator<Item = usize>) -> Result<Vec<Value>> {
    positions
        .map(|idx| {
            row.get(idx)
                .cloned()
                .ok_or_else(|| internal!("join key {idx} out of bounds for row of {}", row.len()))
        })
        .collect()
}

impl HashJoinStream {
    fn build_table(&self, block: Vec<Row>) -> Result<JoinHashTable> {
        let mut table = JoinHashTable::with_hasher(RandomState::new());
        for row in block {
            let key = key_values(&row, self.keys.iter().map(|(_, right)| *right))?;
            table.entry(key).or_default().push(row);
        }
        Ok(table)
    }

    /// Advance the state machine by one step, possibly queueing output
    /// rows. Returns false once there's nothing left to do.
    fn step(&mut self) -> Result<bool> {
        match &mut self.state {
            ProbeState::NextBlock => {
                self.state = match self.right_blocks.next_block()? {
                    Some(block) => {
                        let table = self.build_table(block)?;
                        trace!(keys = table.len(), "built hash join table");
                        ProbeState::Probing {
                            table,
                            left: self.left.execute(&self.ctx)?.enumerate(),
                        }
                    }
                    None => match self.join_type {
                        JoinType::Left => ProbeState::Unmatched(self.left.execute(&self.ctx)?.enumerate()),
                        JoinType::Inner => ProbeState::Done,
                    },
                };
            }
            ProbeState::Probing { table, left } => match left.next() {
                Some((idx, row)) => {
                    let row = row?;
                    let key = key_values(&row, self.keys.iter().map(|(left, _)| *left))?;
                    if let Some(matches) = table.get(&key) {
                        self.tracker.set_match(idx);
                        self.pending
                            .extend(matches.iter().map(|right| concat_rows(&row, right)));
                    }
                }
                None => self.state = ProbeState::NextBlock,
            },
            ProbeState::Unmatched(left) => match left.next() {
                Some((idx, row)) => {
                    let row = row?;
                    if !self.tracker.is_match(idx) {
                        self.pending.push_back(concat_rows(&row, &self.right_padding));
                    }
                }
                None => self.state = ProbeState::Done,
            },
            ProbeState::Done => return Ok(false),
        }
        Ok(true)
    }
}

impl Iterator for HashJoinStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            match self.step() {
                Ok(true) => (),
                Ok(false) => return None,
                Err(e) => {
                    self.state = ProbeState::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::execution::operators::testutil::{run, run_with_config, values};
    use crate::row;

    fn employees() -> Arc<dyn ExecutableOperator> {
        values(vec![
            row![1234, "Tom", Value::Null],
            row![4567, "Sally", 1234],
            row![8901, "Mark", 1234],
        ])
    }

    fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
        rows.sort();
        rows
    }

    #[test]
    fn inner_join_on_manager() {
        // e.manager_id = m.id
        let join = PhysicalHashJoin::new(employees(), employees(), vec![(2, 0)], JoinType::Inner, 3);
        assert_eq!(
            sorted(vec![
                row![4567, "Sally", 1234, 1234, "Tom", Value::Null],
                row![8901, "Mark", 1234, 1234, "Tom", Value::Null],
            ]),
            sorted(run(&join))
        );
    }

    #[test]
    fn left_join_pads_unmatched() {
        let join = PhysicalHashJoin::new(employees(), employees(), vec![(2, 0)], JoinType::Left, 3);
        assert_eq!(
            sorted(vec![
                row![1234, "Tom", Value::Null, Value::Null, Value::Null, Value::Null],
                row![4567, "Sally", 1234, 1234, "Tom", Value::Null],
                row![8901, "Mark", 1234, 1234, "Tom", Value::Null],
            ]),
            sorted(run(&join))
        );
    }

    #[test]
    fn small_blocks_same_result() {
        let left: Vec<Row> = (0..20).map(|i| row![i, i % 3]).collect();
        let right: Vec<Row> = (0..9).map(|i| row![i % 3, format!("r{i}")]).collect();

        let join = PhysicalHashJoin::new(values(left), values(right), vec![(1, 0)], JoinType::Left, 2);
        let unbounded = sorted(run(&join));
        let tiny = sorted(run_with_config(
            &join,
            ExecutionConfig {
                join_buffer_size: 2,
                ..Default::default()
            },
        ));

        assert_eq!(60, unbounded.len());
        assert_eq!(unbounded, tiny);
    }

    #[test]
    fn left_join_empty_right() {
        let join = PhysicalHashJoin::new(employees(), values(Vec::new()), vec![(0, 0)], JoinType::Left, 1);
        assert_eq!(3, run(&join).len());
        let inner = PhysicalHashJoin::new(employees(), values(Vec::new()), vec![(0, 0)], JoinType::Inner, 1);
        assert!(run(&inner).is_empty());
    }
}
