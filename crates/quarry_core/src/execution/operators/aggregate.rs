use std::sync::Arc;

use crate::errors::Result;
use crate::execution::expr::PhysicalScalarExpression;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};
use crate::functions::aggregate::Aggregate;
use crate::value::{Row, Value};

/// A single output column of an aggregation.
#[derive(Debug, Clone)]
pub enum AggregateOutput {
    /// Evaluated against the first row of each group.
    Scalar(PhysicalScalarExpression),
    Aggregate {
        aggregate: Arc<Aggregate>,
        inputs: Vec<PhysicalScalarExpression>,
    },
}

/// Aggregation over input already ordered by the grouping keys.
///
/// Emits one row each time the grouping key changes. Without grouping keys
/// the whole input forms one group. Empty input produces no rows.
#[derive(Debug)]
pub struct PhysicalStreamingAggregate {
    input: Arc<dyn ExecutableOperator>,
    group_exprs: Arc<[PhysicalScalarExpression]>,
    outputs: Arc<[AggregateOutput]>,
}

impl PhysicalStreamingAggregate {
    pub fn new(
        input: Arc<dyn ExecutableOperator>,
        group_exprs: Vec<PhysicalScalarExpression>,
        outputs: Vec<AggregateOutput>,
    ) -> Self {
        PhysicalStreamingAggregate {
            input,
            group_exprs: group_exprs.into(),
            outputs: outputs.into(),
        }
    }
}

impl ExecutableOperator for PhysicalStreamingAggregate {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        Ok(Box::new(GroupIter {
            input: self.input.execute(ctx)?,
            ctx: ctx.clone(),
            group_exprs: self.group_exprs.clone(),
            outputs: self.outputs.clone(),
            pending: None,
            finished: false,
        }))
    }
}

struct GroupIter {
    input: RowIter,
    ctx: Arc<ExecutionContext>,
    group_exprs: Arc<[PhysicalScalarExpression]>,
    outputs: Arc<[AggregateOutput]>,
    /// First row of the next group, read while scanning the previous one.
    pending: Option<(Vec<Value>, Row)>,
    finished: bool,
}

impl GroupIter {
    fn group_key(&self, row: &[Value]) -> Result<Vec<Value>> {
        self.group_exprs
            .iter()
            .map(|expr| expr.eval(row, &self.ctx))
            .collect()
    }

    fn combine(&self, states: &mut [Value], row: &[Value]) -> Result<()> {
        for (state, output) in states.iter_mut().zip(self.outputs.iter()) {
            if let AggregateOutput::Aggregate { aggregate, inputs } = output {
                let args = inputs
                    .iter()
                    .map(|expr| expr.eval(row, &self.ctx))
                    .collect::<Result<Vec<_>>>()?;
                *state = aggregate.combine(std::mem::take(state), &args)?;
            }
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<(Vec<Value>, Row)>> {
        match self.input.next() {
            Some(row) => {
                let row = row?;
                Ok(Some((self.group_key(&row)?, row)))
            }
            None => Ok(None),
        }
    }

    /// Scan one run of equal keys and produce its output row.
    fn next_group(&mut self) -> Result<Option<Row>> {
        let (key, first) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.next_row()? {
                Some(next) => next,
                None => return Ok(None),
            },
        };

        let mut states: Vec<Value> = self
            .outputs
            .iter()
            .map(|output| match output {
                AggregateOutput::Aggregate { aggregate, .. } => aggregate.initial.clone(),
                AggregateOutput::Scalar(_) => Value::Null,
            })
            .collect();

        self.combine(&mut states, &first)?;

        loop {
            match self.next_row()? {
                Some((next_key, row)) if next_key == key => self.combine(&mut states, &row)?,
                Some(next) => {
                    self.pending = Some(next);
                    break;
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        let row = states
            .into_iter()
            .zip(self.outputs.iter())
            .map(|(state, output)| match output {
                AggregateOutput::Scalar(expr) => expr.eval(&first, &self.ctx),
                AggregateOutput::Aggregate { aggregate, .. } => aggregate.finalize(state),
            })
            .collect::<Result<Row>>()?;

        Ok(Some(row))
    }
}

impl Iterator for GroupIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished && self.pending.is_none() {
            return None;
        }
        match self.next_group() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                self.pending = None;
                Some(Err(e))
            }
        }
    }
}
