use serde::Deserialize;

/// Default in-memory budget for buffering join inputs.
pub const DEFAULT_JOIN_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for a single execution of a query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Byte budget for join buffering, split evenly between both sides.
    pub join_buffer_size: usize,
    /// Always use the nested block join, even for equi-joins.
    pub force_nested_block_join: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            join_buffer_size: DEFAULT_JOIN_BUFFER_SIZE,
            force_nested_block_join: false,
        }
    }
}

impl ExecutionConfig {
    /// Byte budget for a single side of a join.
    ///
    /// Never zero, a block always holds at least one row.
    pub fn join_side_budget(&self) -> usize {
        (self.join_buffer_size / 2).max(1)
    }
}
