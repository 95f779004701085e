//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - dataset records and their typed cells (`Record`, `Cell`, `Scalar`)
//! - validation outputs (`Violation`, `ViolationKind`, `Severity`)
//! - scoring outputs (`AnomalyFlag`)
//! - run configuration (`RunConfig`, `SampleConfig`)

pub mod types;

pub use types::*;
