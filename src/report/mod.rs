//! Compliance report: merge violations and anomaly flags per record.
//!
//! The report has one entry per input record, sorted by record id, including
//! records that passed everything (marked clean) so the output is a complete
//! audit of the batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{AnomalyFlag, Record, RecordId, RecordStatus, Severity, Violation};
use crate::error::AppError;

pub mod format;

pub use format::*;

/// Run metadata carried with the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub generated_at: DateTime<Local>,
    pub dataset: String,
    pub rule_count: usize,
    pub numeric_fields: Vec<String>,
    pub contamination: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub record_id: RecordId,
    pub status: RecordStatus,
    pub violations: Vec<Violation>,
    pub anomaly: AnomalyFlag,
}

impl ReportEntry {
    pub fn is_clean(&self) -> bool {
        self.status == RecordStatus::Clean
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub meta: ReportMeta,
    pub entries: Vec<ReportEntry>,
}

/// Aggregate counts for the summary header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub flagged: usize,
    pub clean: usize,
    pub outliers: usize,
    pub with_violations: usize,
    pub violations: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_rule: BTreeMap<String, usize>,
}

impl ComplianceReport {
    pub fn flagged(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.is_clean())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut s = ReportSummary {
            total: self.entries.len(),
            ..ReportSummary::default()
        };
        for entry in &self.entries {
            match entry.status {
                RecordStatus::Clean => s.clean += 1,
                RecordStatus::Flagged => s.flagged += 1,
            }
            if entry.anomaly.is_outlier {
                s.outliers += 1;
            }
            if !entry.violations.is_empty() {
                s.with_violations += 1;
            }
            for v in &entry.violations {
                s.violations += 1;
                *s.by_severity.entry(v.severity).or_default() += 1;
                *s.by_rule.entry(v.rule_id.clone()).or_default() += 1;
            }
        }
        s
    }
}

/// Merge per-record outputs into a report.
///
/// Both maps must hold exactly the ids of `records`; anything else means an
/// upstream stage broke its contract and is reported as an internal error.
pub fn build(
    records: &[Record],
    mut violations: BTreeMap<RecordId, Vec<Violation>>,
    mut anomalies: BTreeMap<RecordId, AnomalyFlag>,
    meta: ReportMeta,
) -> Result<ComplianceReport, AppError> {
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let record_violations = violations.remove(&record.id).ok_or_else(|| {
            AppError::Internal(format!("No validation result for record `{}`.", record.id))
        })?;
        let anomaly = anomalies.remove(&record.id).ok_or_else(|| {
            AppError::Internal(format!("No anomaly flag for record `{}`.", record.id))
        })?;

        let status = if record_violations.is_empty() && !anomaly.is_outlier {
            RecordStatus::Clean
        } else {
            RecordStatus::Flagged
        };

        entries.push(ReportEntry {
            record_id: record.id.clone(),
            status,
            violations: record_violations,
            anomaly,
        });
    }

    if let Some(id) = violations.keys().chain(anomalies.keys()).next() {
        return Err(AppError::Internal(format!(
            "Result for unknown or duplicate record `{id}`."
        )));
    }

    entries.sort_by(|a, b| a.record_id.cmp(&b.record_id));

    Ok(ComplianceReport { meta, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ViolationKind;

    pub(crate) fn meta() -> ReportMeta {
        ReportMeta {
            generated_at: Local::now(),
            dataset: "test.csv".to_string(),
            rule_count: 1,
            numeric_fields: vec!["age".to_string()],
            contamination: 0.1,
            threshold: 0.6,
        }
    }

    fn flag(id: &str, is_outlier: bool) -> (RecordId, AnomalyFlag) {
        (
            RecordId::new(id),
            AnomalyFlag {
                record_id: RecordId::new(id),
                score: if is_outlier { 0.8 } else { 0.4 },
                is_outlier,
            },
        )
    }

    fn range_violation(id: &str) -> Violation {
        Violation {
            record_id: RecordId::new(id),
            rule_id: "AGE".to_string(),
            field: "age".to_string(),
            kind: ViolationKind::Range,
            severity: Severity::High,
            observed: Some("150".to_string()),
            message: "age must be within [18, 100].".to_string(),
        }
    }

    #[test]
    fn one_entry_per_record_sorted_by_id() {
        let records = vec![Record::new("S3"), Record::new("S1"), Record::new("S2")];
        let violations = BTreeMap::from([
            (RecordId::new("S1"), vec![range_violation("S1")]),
            (RecordId::new("S2"), vec![]),
            (RecordId::new("S3"), vec![]),
        ]);
        let anomalies = BTreeMap::from([flag("S1", false), flag("S2", true), flag("S3", false)]);

        let report = build(&records, violations, anomalies, meta()).unwrap();
        let ids: Vec<&str> = report.entries.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3"]);

        let statuses: Vec<RecordStatus> = report.entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![RecordStatus::Flagged, RecordStatus::Flagged, RecordStatus::Clean]
        );

        let s = report.summary();
        assert_eq!((s.total, s.flagged, s.clean, s.outliers), (3, 2, 1, 1));
        assert_eq!(s.by_severity.get(&Severity::High), Some(&1));
        assert_eq!(s.by_rule.get("AGE"), Some(&1));
    }

    #[test]
    fn missing_anomaly_flag_is_internal_error() {
        let records = vec![Record::new("S1")];
        let violations = BTreeMap::from([(RecordId::new("S1"), vec![])]);
        let err = build(&records, violations, BTreeMap::new(), meta()).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn stray_results_are_internal_error() {
        let records = vec![Record::new("S1")];
        let violations = BTreeMap::from([(RecordId::new("S1"), vec![]), (RecordId::new("S9"), vec![])]);
        let anomalies = BTreeMap::from([flag("S1", false)]);
        assert!(build(&records, violations, anomalies, meta()).is_err());
    }
}
