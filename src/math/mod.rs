//! Small numeric helpers shared by the estimator and the report.

pub mod stats;

pub use stats::*;
