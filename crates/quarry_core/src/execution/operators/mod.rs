pub mod aggregate;
pub mod empty;
pub mod filter;
pub mod limit;
pub mod project;
pub mod scan;
pub mod sort;
pub mod table_function;
pub mod union;

#[cfg(test)]
pub(crate) mod testutil;

use super::RowIter;
use crate::errors::Result;

/// Iterator that runs `init` on the first pull.
///
/// Used by operators that need to buffer their input before producing
/// anything, so that buffering errors come out of the iterator and nothing
/// is pulled until the consumer asks for a row.
pub(crate) fn deferred<F>(init: F) -> RowIter
where
    F: FnOnce() -> Result<RowIter> + Send + 'static,
{
    let mut init = Some(init);
    let mut rows: Option<RowIter> = None;

    Box::new(std::iter::from_fn(move || {
        if let Some(init) = init.take() {
            match init() {
                Ok(iter) => rows = Some(iter),
                Err(e) => return Some(Err(e)),
            }
        }
        rows.as_mut()?.next()
    }))
}
