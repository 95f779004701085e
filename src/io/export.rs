//! Report exports (findings CSV, JSON report).
//!
//! Exports are staged: each is written to a temporary sibling file, and only
//! once every export of a run is staged are they renamed into place. A failed
//! write or rename leaves none of the run's exports behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::report::ComplianceReport;

/// One row of the findings CSV.
#[derive(Debug, Serialize)]
struct FindingRow<'a> {
    finding_type: &'static str,
    record_id: &'a str,
    rule_id: &'a str,
    severity: &'static str,
    field: &'a str,
    kind: &'static str,
    observed: &'a str,
    message: &'a str,
    anomaly_score: String,
}

/// Write one row per violation plus one row per outlier record.
pub fn write_findings_csv(path: &Path, report: &ComplianceReport) -> Result<(), AppError> {
    commit_all(vec![stage_findings_csv(path, report)?])
}

pub fn stage_findings_csv(path: &Path, report: &ComplianceReport) -> Result<StagedFile, AppError> {
    stage(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        for entry in &report.entries {
            let score = format!("{:.6}", entry.anomaly.score);
            for v in &entry.violations {
                writer
                    .serialize(FindingRow {
                        finding_type: "RULE",
                        record_id: entry.record_id.as_str(),
                        rule_id: &v.rule_id,
                        severity: v.severity.label(),
                        field: &v.field,
                        kind: v.kind.as_str(),
                        observed: v.observed.as_deref().unwrap_or(""),
                        message: &v.message,
                        anomaly_score: score.clone(),
                    })
                    .map_err(|e| AppError::io(format!("Failed to write findings row: {e}")))?;
            }
            if entry.anomaly.is_outlier {
                writer
                    .serialize(FindingRow {
                        finding_type: "ANOMALY",
                        record_id: entry.record_id.as_str(),
                        rule_id: "OUTLIER",
                        severity: "",
                        field: "",
                        kind: "outlier",
                        observed: "",
                        message: "Record flagged by the outlier estimator.",
                        anomaly_score: score.clone(),
                    })
                    .map_err(|e| AppError::io(format!("Failed to write findings row: {e}")))?;
            }
        }
        writer
            .flush()
            .map_err(|e| AppError::io(format!("Failed to flush findings CSV: {e}")))
    })
}

/// Write the full report (metadata, summary, every entry) as pretty JSON.
pub fn write_report_json(path: &Path, report: &ComplianceReport) -> Result<(), AppError> {
    commit_all(vec![stage_report_json(path, report)?])
}

pub fn stage_report_json(path: &Path, report: &ComplianceReport) -> Result<StagedFile, AppError> {
    #[derive(Serialize)]
    struct Document<'a> {
        tool: &'static str,
        summary: crate::report::ReportSummary,
        #[serde(flatten)]
        report: &'a ComplianceReport,
    }

    stage(path, |file| {
        let mut writer = BufWriter::new(file);
        let doc = Document {
            tool: "edcv",
            summary: report.summary(),
            report,
        };
        serde_json::to_writer_pretty(&mut writer, &doc)
            .map_err(|e| AppError::io(format!("Failed to write report JSON: {e}")))?;
        writer
            .flush()
            .map_err(|e| AppError::io(format!("Failed to flush report JSON: {e}")))
    })
}

/// An export written to its temporary sibling but not yet at its target.
///
/// Dropping an uncommitted file removes the temporary.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Write `path`'s temporary sibling with `write`.
pub fn stage<F>(path: &Path, write: F) -> Result<StagedFile, AppError>
where
    F: FnOnce(File) -> Result<(), AppError>,
{
    let tmp = temp_path(path);
    let file = File::create(&tmp)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", tmp.display())))?;

    let staged = StagedFile {
        tmp,
        target: path.to_path_buf(),
        committed: false,
    };
    write(file)?;
    Ok(staged)
}

/// Move every staged file into place. If any rename fails, files already
/// moved by this call are removed again and the remaining temporaries dropped.
pub fn commit_all(staged: Vec<StagedFile>) -> Result<(), AppError> {
    let mut placed: Vec<PathBuf> = Vec::with_capacity(staged.len());

    for mut file in staged {
        if let Err(e) = fs::rename(&file.tmp, &file.target) {
            for path in &placed {
                let _ = fs::remove_file(path);
            }
            return Err(AppError::io(format!(
                "Failed to move export into '{}': {e}",
                file.target.display()
            )));
        }
        file.committed = true;
        placed.push(file.target.clone());
    }

    Ok(())
}

pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), AppError>
where
    F: FnOnce(File) -> Result<(), AppError>,
{
    commit_all(vec![stage(path, write)?])
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{AnomalyFlag, Record, RecordId, Severity, Violation, ViolationKind};
    use crate::report::{ReportMeta, build};

    fn sample_report() -> ComplianceReport {
        let records = vec![Record::new("A"), Record::new("B")];
        let violations = BTreeMap::from([
            (
                RecordId::new("A"),
                vec![Violation {
                    record_id: RecordId::new("A"),
                    rule_id: "EDC_AGE_001".to_string(),
                    field: "age".to_string(),
                    kind: ViolationKind::Range,
                    severity: Severity::High,
                    observed: Some("150".to_string()),
                    message: "age must be within [18, 100], inclusive.".to_string(),
                }],
            ),
            (RecordId::new("B"), vec![]),
        ]);
        let anomalies = BTreeMap::from([
            (
                RecordId::new("A"),
                AnomalyFlag { record_id: RecordId::new("A"), score: 0.4, is_outlier: false },
            ),
            (
                RecordId::new("B"),
                AnomalyFlag { record_id: RecordId::new("B"), score: 0.8, is_outlier: true },
            ),
        ]);
        let meta = ReportMeta {
            generated_at: chrono::Local::now(),
            dataset: "mem".to_string(),
            rule_count: 1,
            numeric_fields: vec!["age".to_string()],
            contamination: 0.1,
            threshold: 0.5,
        };
        build(&records, violations, anomalies, meta).unwrap()
    }

    #[test]
    fn findings_csv_has_rule_and_anomaly_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.csv");
        write_findings_csv(&path, &sample_report()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "RULE");
        assert_eq!(&rows[0][7], "age must be within [18, 100], inclusive.");
        assert_eq!(&rows[1][0], "ANOMALY");
        assert_eq!(&rows[1][1], "B");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn json_report_carries_summary_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report_json(&path, &sample_report()).unwrap();

        let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["tool"], "edcv");
        assert_eq!(doc["summary"]["total"], 2);
        assert_eq!(doc["entries"][1]["anomaly"]["is_outlier"], true);
        assert_eq!(doc["entries"][0]["violations"][0]["kind"], "range");
    }

    #[test]
    fn failed_commit_rolls_back_earlier_exports() {
        let dir = tempfile::tempdir().unwrap();
        let findings = dir.path().join("findings.csv");
        // A non-empty directory cannot be replaced by a file.
        let blocked = dir.path().join("report.json");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), "x").unwrap();

        let report = sample_report();
        let staged = vec![
            stage_findings_csv(&findings, &report).unwrap(),
            stage_report_json(&blocked, &report).unwrap(),
        ];
        assert!(matches!(commit_all(staged), Err(AppError::Io(_))));

        assert!(!findings.exists());
        assert!(!temp_path(&findings).exists());
        assert!(!temp_path(&blocked).exists());
        assert!(blocked.join("keep").exists());
    }

    #[test]
    fn dropped_stage_removes_temporary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.csv");
        let staged = stage_findings_csv(&path, &sample_report()).unwrap();
        assert!(temp_path(&path).exists());
        assert_eq!(staged.target(), path.as_path());
        drop(staged);
        assert!(!temp_path(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let err = write_atomically(&path, |_| Err(AppError::io("disk full"))).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(!path.exists());
        assert!(!temp_path(&path).exists());
    }
}
