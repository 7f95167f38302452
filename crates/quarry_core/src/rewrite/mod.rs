//! Rules applied to a plan while a query is constructed, ahead of schema
//! resolution.
pub mod adapter;
pub mod pushdown;
pub mod views;

pub use adapter::AdapterEvaluation;
pub use views::ViewSubstitution;
