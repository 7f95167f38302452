use std::collections::VecDeque;
use std::iter::Enumerate;
use std::sync::Arc;

use super::buffer::BlockReader;
use super::concat_rows;
use super::outer_join_tracker::OuterJoinTracker;
use crate::errors::Result;
use crate::execution::expr::PhysicalScalarExpression;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::logical::operator::JoinType;
use crate::value::{Row, Value};

/// Join evaluating an arbitrary predicate over every pair of rows.
///
/// Both inputs are read in size bounded blocks, the right input once and
/// the left input once per right block, so memory is bounded by two blocks
/// regardless of input size. A missing predicate produces the cross
/// product.
#[derive(Debug)]
pub struct PhysicalNestedBlockJoin {
    left: Arc<dyn ExecutableOperator>,
    right: Arc<dyn ExecutableOperator>,
    /// Evaluated against the concatenated left and right row.
    predicate: Option<Arc<PhysicalScalarExpression>>,
    join_type: JoinType,
    right_arity: usize,
}

impl PhysicalNestedBlockJoin {
    pub fn new(
        left: Arc<dyn ExecutableOperator>,
        right: Arc<dyn ExecutableOperator>,
        predicate: Option<PhysicalScalarExpression>,
        join_type: JoinType,
        right_arity: usize,
    ) -> Self {
        PhysicalNestedBlockJoin {
            left,
            right,
            predicate: predicate.map(Arc::new),
            join_type,
            right_arity,
        }
    }
}

impl ExecutableOperator for PhysicalNestedBlockJoin {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let budget = ctx.config.join_side_budget();
        Ok(Box::new(NestedBlockStream {
            ctx: ctx.clone(),
            left: self.left.clone(),
            predicate: self.predicate.clone(),
            join_type: self.join_type,
            budget,
            right_blocks: BlockReader::new(self.right.execute(ctx)?, budget),
            right_block: Vec::new(),
            left_blocks: None,
            left_block: Vec::new(),
            left_offset: 0,
            left_idx: 0,
            right_idx: 0,
            right_padding: vec![Value::Null; self.right_arity],
            tracker: OuterJoinTracker::default(),
            pending: VecDeque::new(),
            state: BlockState::NextRightBlock,
        }))
    }
}

enum BlockState {
    NextRightBlock,
    NextLeftBlock,
    /// Pairing rows of the current left and right blocks.
    Pairing,
    /// Emit left rows that never matched.
    Unmatched(Enumerate<RowIter>),
    Done,
}

struct NestedBlockStream {
    ctx: Arc<ExecutionContext>,
    left: Arc<dyn ExecutableOperator>,
    predicate: Option<Arc<PhysicalScalarExpression>>,
    join_type: JoinType,
    budget: usize,
    right_blocks: BlockReader,
    right_block: Vec<Row>,
    left_blocks: Option<BlockReader>,
    left_block: Vec<Row>,
    /// Ordinal of the first row of `left_block` in the left input.
    left_offset: usize,
    left_idx: usize,
    right_idx: usize,
    right_padding: Row,
    tracker: OuterJoinTracker,
    pending: VecDeque<Row>,
    state: BlockState,
}

impl NestedBlockStream {
    fn step(&mut self) -> Result<bool> {
        match &mut self.state {
            BlockState::NextRightBlock => match self.right_blocks.next_block()? {
                Some(block) => {
                    self.right_block = block;
                    self.left_blocks = Some(BlockReader::new(self.left.execute(&self.ctx)?, self.budget));
                    self.left_offset = 0;
                    self.left_block.clear();
                    self.state = BlockState::NextLeftBlock;
                }
                None => {
                    self.state = match self.join_type {
                        JoinType::Left => BlockState::Unmatched(self.left.execute(&self.ctx)?.enumerate()),
                        JoinType::Inner => BlockState::Done,
                    };
                }
            },
            BlockState::NextLeftBlock => {
                let next = match self.left_blocks.as_mut() {
                    Some(blocks) => blocks.next_block()?,
                    None => None,
                };
                match next {
                    Some(block) => {
                        self.left_offset += self.left_block.len();
                        self.left_block = block;
                        self.left_idx = 0;
                        self.right_idx = 0;
                        self.state = BlockState::Pairing;
                    }
                    None => self.state = BlockState::NextRightBlock,
                }
            }
            BlockState::Pairing => {
                let (Some(left), Some(right)) = (
                    self.left_block.get(self.left_idx),
                    self.right_block.get(self.right_idx),
                ) else {
                    self.state = BlockState::NextLeftBlock;
                    return Ok(true);
                };

                let row = concat_rows(left, right);
                let ordinal = self.left_offset + self.left_idx;

                self.right_idx += 1;
                if self.right_idx >= self.right_block.len() {
                    self.right_idx = 0;
                    self.left_idx += 1;
                }

                let matched = match &self.predicate {
                    Some(predicate) => predicate.select(&row, &self.ctx)?,
                    None => true,
                };
                if matched {
                    self.tracker.set_match(ordinal);
                    self.pending.push_back(row);
                }
            }
            BlockState::Unmatched(left) => match left.next() {
                Some((idx, row)) => {
                    let row = row?;
                    if !self.tracker.is_match(idx) {
                        self.pending.push_back(concat_rows(&row, &self.right_padding));
                    }
                }
                None => self.state = BlockState::Done,
            },
            BlockState::Done => return Ok(false),
        }
        Ok(true)
    }
}

impl Iterator for NestedBlockStream {
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
                    self.state = BlockState::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}
