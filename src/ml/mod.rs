//! Machine learning building blocks for the grid trainer.
//!
//! The boosted-tree trainer is the primary training capability; metrics are
//! used to summarize each trained cell in the logs.

pub mod gbdt;
pub mod metrics;
