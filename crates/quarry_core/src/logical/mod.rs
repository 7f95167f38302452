//! Logical plans and the passes over them.
pub mod cursor;
pub mod operator;
pub mod resolver;
