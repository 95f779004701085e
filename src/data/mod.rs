//! Synthetic data sources.

pub mod sample;

pub use sample::{MOCK_COLUMNS, generate_mock, write_mock_csv};
