//! `edc-validator` library crate.
//!
//! The binary (`edcv`) is a thin wrapper around this library so that:
//!
//! - rule evaluation and outlier scoring are testable without spawning processes
//! - the pipeline can be embedded in other EDC tooling
//! - code stays easy to navigate as the rule catalogue grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod outlier;
pub mod report;
pub mod rules;
pub mod validate;
