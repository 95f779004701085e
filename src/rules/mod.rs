//! Declarative validation rules.
//!
//! - rule file schema and compiled rule types (`registry`)
//! - the built-in clinical rule set (`defaults`)

pub mod defaults;
pub mod registry;

pub use registry::*;
