//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during validation and scoring
//! - exported to JSON/CSV
//! - compared in tests without any I/O

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Only ISO 8601 calendar dates are typed as dates. Slash and dash forms such
/// as `03/04/2024` are ambiguous between day-first and month-first exports, so
/// they stay text and date rules report them as "not a date".
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier of one record (subject/visit) within a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed interpretation of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

/// One input cell: the raw text as read, plus its typed interpretation.
///
/// Pattern and terminology rules look at `raw`; range and date rules look at
/// `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub raw: String,
    pub value: Scalar,
}

impl Cell {
    /// Type a trimmed, non-empty cell. Numbers win over dates, dates over text.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let value = if let Some(n) = parse_number(raw) {
            Scalar::Number(n)
        } else if let Some(d) = parse_date(raw) {
            Scalar::Date(d)
        } else {
            Scalar::Text(raw.to_string())
        };
        Self {
            raw: raw.to_string(),
            value,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            Scalar::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self.value {
            Scalar::Date(d) => Some(d),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// One subject/visit row.
///
/// Blank cells are not stored, so "absent" and "blank" are the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// 1-based CSV line (header is line 1) or Dataset-JSON `itemData` row;
    /// 0 for records built in memory.
    pub line: usize,
    pub fields: BTreeMap<String, Cell>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(id),
            line: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter used by tests and the mock generator.
    pub fn with(mut self, field: &str, raw: &str) -> Self {
        self.set(field, raw);
        self
    }

    pub fn set(&mut self, field: &str, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            self.fields.remove(field);
        } else {
            self.fields.insert(field.to_string(), Cell::parse(raw));
        }
    }

    pub fn get(&self, field: &str) -> Option<&Cell> {
        self.fields.get(field)
    }
}

/// Finding severity, ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Med,
    High,
    Crit,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Crit, Severity::High, Severity::Med, Severity::Low];

    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
            Severity::Crit => "CRIT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What kind of check a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    Range,
    Pattern,
    AllowedValues,
    CrossField,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::MissingField => "missing_field",
            ViolationKind::Range => "range",
            ViolationKind::Pattern => "pattern",
            ViolationKind::AllowedValues => "allowed_values",
            ViolationKind::CrossField => "cross_field",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule failure on a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub record_id: RecordId,
    pub rule_id: String,
    pub field: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    pub message: String,
}

/// Outlier classification for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub record_id: RecordId,
    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    pub score: f64,
    pub is_outlier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Clean,
    Flagged,
}

impl RecordStatus {
    pub fn label(self) -> &'static str {
        match self {
            RecordStatus::Clean => "clean",
            RecordStatus::Flagged => "flagged",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Resolved settings for one `edcv validate` run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dataset_path: PathBuf,
    /// Rules file; `None` means the built-in clinical rule set.
    pub rules_path: Option<PathBuf>,
    pub id_column: String,
    /// Dataset-JSON item group (OID or dataset name).
    pub item_group: Option<String>,
    pub numeric_fields: Vec<String>,
    pub contamination: f64,
    pub min_records: usize,
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
    /// Include clean records in the printed table.
    pub show_all: bool,
    pub export_findings: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

/// Settings for the mock dataset generator.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub count: usize,
    pub seed: u64,
    pub start_date: NaiveDate,
    /// Probability that a subject carries one injected rule break.
    pub rule_break_prob: f64,
    /// Probability that a subject carries an injected dose outlier.
    pub outlier_prob: f64,
    /// Dose multiplier for injected outliers.
    pub outlier_k: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_typing_prefers_number_then_date() {
        assert_eq!(Cell::parse("42").value, Scalar::Number(42.0));
        assert_eq!(
            Cell::parse("2024-03-01").value,
            Scalar::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(Cell::parse(" M ").value, Scalar::Text("M".to_string()));
        assert_eq!(Cell::parse(" M ").raw, "M");
    }

    #[test]
    fn ambiguous_dates_stay_text() {
        for raw in ["03/04/2024", "03-04-2024", "2024/04/03"] {
            let cell = Cell::parse(raw);
            assert_eq!(cell.as_date(), None, "{raw}");
            assert_eq!(cell.value, Scalar::Text(raw.to_string()));
        }
    }

    #[test]
    fn non_finite_numbers_are_text() {
        assert!(matches!(Cell::parse("NaN").value, Scalar::Text(_)));
        assert!(matches!(Cell::parse("inf").value, Scalar::Text(_)));
    }

    #[test]
    fn blank_cells_are_absent() {
        let r = Record::new("S1").with("age", "  ").with("sex", "F");
        assert!(r.get("age").is_none());
        assert_eq!(r.get("sex").map(|c| c.raw.as_str()), Some("F"));
    }

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Low < Severity::Med);
        assert!(Severity::High < Severity::Crit);
        assert_eq!(Severity::Med.to_string(), "MED");
    }
}
