use tracing::trace;

use crate::errors::Result;
use crate::execution::RowIter;
use crate::value::{Row, row_size_estimate};

/// Reads an input in blocks bounded by an approximate size in bytes.
pub struct BlockReader {
    input: RowIter,
    budget: usize,
    exhausted: bool,
}

impl BlockReader {
    pub fn new(input: RowIter, budget: usize) -> Self {
        BlockReader {
            input,
            budget,
            exhausted: false,
        }
    }

    /// Read the next block, `None` once the input is exhausted.
    ///
    /// A block holds at least one row, even if that row alone exceeds the
    /// budget.
    pub fn next_block(&mut self) -> Result<Option<Vec<Row>>> {
        let mut block = Vec::new();
        let mut size = 0;

        while !self.exhausted && size < self.budget {
            match self.input.next() {
                Some(Ok(row)) => {
                    size += row_size_estimate(&row);
                    block.push(row);
                }
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e);
                }
                None => self.exhausted = true,
            }
        }

        if block.is_empty() {
            return Ok(None);
        }

        trace!(rows = block.len(), bytes = size, "buffered join block");
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::value::Value;

    fn input(rows: Vec<Row>) -> RowIter {
        Box::new(rows.into_iter().map(Ok))
    }

    #[test]
    fn splits_by_size() {
        let rows: Vec<Row> = (0..10).map(|i| row![i, "some text"]).collect();
        let row_size = row_size_estimate(&rows[0]);

        let mut reader = BlockReader::new(input(rows), row_size * 4);
        let mut sizes = Vec::new();
        while let Some(block) = reader.next_block().unwrap() {
            sizes.push(block.len());
        }
        assert_eq!(vec![4, 4, 2], sizes);
    }

    #[test]
    fn oversized_row_gets_own_block() {
        let mut reader = BlockReader::new(input(vec![row![1], row![2]]), 1);
        assert_eq!(Some(vec![row![1]]), reader.next_block().unwrap());
        assert_eq!(Some(vec![row![2]]), reader.next_block().unwrap());
        assert_eq!(None, reader.next_block().unwrap());
    }

    #[test]
    fn empty_input() {
        let mut reader = BlockReader::new(input(Vec::new()), 1024);
        assert_eq!(None, reader.next_block().unwrap());
    }

    #[test]
    fn error_stops_reading() {
        let rows: RowIter = Box::new(
            vec![
                Ok(row![1]),
                Err(crate::errors::QuarryError::Execution("boom".to_string())),
                Ok(row![Value::Null]),
            ]
            .into_iter(),
        );
        let mut reader = BlockReader::new(rows, 1024);
        reader.next_block().unwrap_err();
        assert_eq!(None, reader.next_block().unwrap());
    }
}
