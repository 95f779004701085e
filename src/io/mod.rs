//! Input/output helpers.
//!
//! - CSV ingest into records (`ingest`)
//! - CDISC Dataset-JSON ingest (`dataset_json`)
//! - findings CSV and JSON report exports (`export`)

pub mod dataset_json;
pub mod export;
pub mod ingest;

pub use dataset_json::*;
pub use export::*;
pub use ingest::*;
