//! Formatted terminal output for a compliance report.
//!
//! Formatting lives in one place so the pipeline stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::Severity;
use crate::report::{ComplianceReport, ReportEntry};
use crate::rules::{RuleKind, RuleSet};

/// Full text report: summary header, record table, then violation details.
pub fn format_report(report: &ComplianceReport, show_all: bool) -> String {
    let mut out = format_summary(report);
    out.push('\n');

    let rows: Vec<&ReportEntry> = if show_all {
        report.entries.iter().collect()
    } else {
        report.flagged().collect()
    };

    if rows.is_empty() {
        out.push_str("All data passed validation.\n");
        return out;
    }

    out.push_str(if show_all { "Records:\n" } else { "Flagged records:\n" });
    out.push_str(&format_table(&rows));

    let details: Vec<&ReportEntry> = rows.iter().copied().filter(|e| !e.violations.is_empty()).collect();
    if !details.is_empty() {
        out.push_str("\nViolations:\n");
        for entry in details {
            out.push_str(&format!("{}\n", entry.record_id));
            for v in &entry.violations {
                out.push_str(&format!(
                    "  [{:<4}] {:<16} {:<14} {}{}\n",
                    v.severity.label(),
                    truncate(&v.rule_id, 16),
                    v.kind.as_str(),
                    v.message,
                    v.observed
                        .as_deref()
                        .map(|o| format!(" (observed: {o})"))
                        .unwrap_or_default(),
                ));
            }
        }
    }

    out
}

/// Summary header with totals and per-severity / per-rule counts.
pub fn format_summary(report: &ComplianceReport) -> String {
    let s = report.summary();
    let meta = &report.meta;
    let mut out = String::new();

    out.push_str("=== EDC Compliance Validation Report ===\n");
    out.push_str(&format!("Generated: {}\n", meta.generated_at.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Dataset: {}\n", meta.dataset));
    out.push_str(&format!(
        "Rules: {} | Outlier fields: {} | contamination={:.3} threshold={:.4}\n",
        meta.rule_count,
        meta.numeric_fields.join(", "),
        meta.contamination,
        meta.threshold,
    ));
    out.push_str(&format!("Total records: {}\n", s.total));
    out.push_str(&format!(
        "Flagged records: {} ({} with violations, {} outliers)\n",
        s.flagged, s.with_violations, s.outliers
    ));
    out.push_str(&format!("Clean records: {}\n", s.clean));

    if s.violations > 0 {
        let parts: Vec<String> = Severity::ALL
            .iter()
            .filter_map(|sev| s.by_severity.get(sev).map(|n| format!("{sev}={n}")))
            .collect();
        out.push_str(&format!("Violations: {} ({})\n", s.violations, parts.join(" ")));
        for (rule, n) in &s.by_rule {
            out.push_str(&format!("  {rule:<24} {n:>6}\n"));
        }
    }

    out
}

fn format_table(rows: &[&ReportEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<20} {:<8} {:>8} {:<8} {:>10} {:<6}\n",
            "record_id", "status", "score", "outlier", "violations", "worst"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!("{:-<20} {:-<8} {:-<8} {:-<8} {:-<10} {:-<6}\n", "", "", "", "", "", "").trim_end(),
    );
    out.push('\n');

    for e in rows {
        out.push_str(
            format!(
                "{:<20} {:<8} {:>8.4} {:<8} {:>10} {:<6}\n",
                truncate(e.record_id.as_str(), 20),
                e.status.label(),
                e.anomaly.score,
                if e.anomaly.is_outlier { "yes" } else { "no" },
                e.violations.len(),
                e.max_severity().map(|s| s.label()).unwrap_or("-"),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Rule listing for `edcv rules`.
pub fn format_rules(rules: &RuleSet) -> String {
    let mut out = String::new();
    out.push_str(&format!("Rules: {}\n", rules.len()));
    out.push_str(
        format!(
            "{:<16} {:<16} {:<14} {:<5} {}\n",
            "id", "field", "kind", "sev", "check"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<16} {:-<14} {:-<5} {:-<24}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for rule in rules.iter() {
        let check = match &rule.kind {
            RuleKind::Required => "present".to_string(),
            RuleKind::Range(b) => b.describe(),
            RuleKind::Pattern(re) => format!("/{}/", re.as_str()),
            RuleKind::AllowedValues { values, case_sensitive } => format!(
                "{{{}}}{}",
                values.join(", "),
                if *case_sensitive { "" } else { " (any case)" }
            ),
            RuleKind::CrossField { reference, relation } => {
                format!("{} {} {reference}", rule.field, relation.symbol())
            }
        };
        let check = if rule.allow_missing {
            format!("{check} [optional]")
        } else {
            check
        };
        out.push_str(
            format!(
                "{:<16} {:<16} {:<14} {:<5} {}\n",
                truncate(&rule.id, 16),
                truncate(&rule.field, 16),
                rule.kind.tag(),
                rule.severity.label(),
                check,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
