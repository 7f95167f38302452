use std::sync::Arc;

use crate::errors::Result;
use crate::execution::{ExecutableOperator, ExecutionContext, RowIter};

/// Skip `start` rows then emit rows up to position `stop`.
#[derive(Debug)]
pub struct PhysicalLimit {
    input: Arc<dyn ExecutableOperator>,
    start: usize,
    /// Unbounded if `None`.
    stop: Option<usize>,
}

impl PhysicalLimit {
    pub fn new(input: Arc<dyn ExecutableOperator>, start: Option<usize>, stop: Option<usize>) -> Self {
        PhysicalLimit {
            input,
            start: start.unwrap_or(0),
            stop,
        }
    }
}

impl ExecutableOperator for PhysicalLimit {
    fn execute(&self, ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
        let input = skip_rows(self.input.execute(ctx)?, self.start);
        match self.stop {
            Some(stop) => Ok(Box::new(input.take(stop.saturating_sub(self.start)))),
            None => Ok(input),
        }
    }
}

/// Skip `n` rows, counting only successfully produced ones.
///
/// An error met while skipping is yielded instead of being dropped.
fn skip_rows(mut input: RowIter, n: usize) -> RowIter {
    let mut remaining = n;
    Box::new(std::iter::from_fn(move || {
        while remaining > 0 {
            match input.next()? {
                Ok(_) => remaining -= 1,
                Err(e) => return Some(Err(e)),
            }
        }
        input.next()
    }))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::execution::operators::testutil::{run, test_context, values};
    use crate::row;
    use crate::value::Row;

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| row![i]).collect()
    }

    #[rstest]
    #[case(None, None, vec![0, 1, 2, 3, 4])]
    #[case(Some(1), Some(2), vec![1])]
    #[case(Some(3), None, vec![3, 4])]
    #[case(None, Some(2), vec![0, 1])]
    #[case(Some(4), Some(2), vec![])]
    #[case(Some(2), Some(50), vec![2, 3, 4])]
    fn slices(#[case] start: Option<usize>, #[case] stop: Option<usize>, #[case] expected: Vec<i64>) {
        let limit = PhysicalLimit::new(values(rows(5)), start, stop);
        let expected: Vec<Row> = expected.into_iter().map(|i| row![i]).collect();
        assert_eq!(expected, run(&limit));
    }

    #[derive(Debug)]
    struct FailingRow(i64);

    impl ExecutableOperator for FailingRow {
        fn execute(&self, _ctx: &Arc<ExecutionContext>) -> Result<RowIter> {
            let failing = self.0;
            Ok(Box::new((0..5_i64).map(move |i| {
                if i == failing {
                    Err(crate::errors::QuarryError::Execution("boom".to_string()))
                } else {
                    Ok(row![i])
                }
            })))
        }
    }

    #[test]
    fn error_in_skipped_rows_surfaces() {
        let limit = PhysicalLimit::new(Arc::new(FailingRow(1)), Some(2), None);
        let mut rows = limit.execute(&test_context()).unwrap();
        assert!(rows.next().unwrap().is_err());
        // Skipping resumes counting after the error.
        assert_eq!(row![3], rows.next().unwrap().unwrap());
    }

    #[test]
    fn error_after_skipped_rows_surfaces() {
        let limit = PhysicalLimit::new(Arc::new(FailingRow(3)), Some(1), Some(4));
        let rows: Vec<_> = limit.execute(&test_context()).unwrap().collect();
        assert_eq!(3, rows.len());
        assert!(rows[2].is_err());
    }
}
