//! Shared validation pipeline.
//!
//! rules -> ingest -> validate -> score -> report
//!
//! The run either produces a complete report or fails as a whole; no stage
//! writes output before every stage has succeeded.

use std::path::Path;

use chrono::Local;

use crate::domain::RunConfig;
use crate::error::AppError;
use crate::io::ingest::Dataset;
use crate::outlier::ScorerConfig;
use crate::report::{ComplianceReport, ReportMeta};
use crate::rules::RuleSet;

/// All computed outputs of a single `edcv validate` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: Dataset,
    pub rules: RuleSet,
    pub report: ComplianceReport,
}

/// Resolve the effective rule set: a rules file when given, else the built-in
/// clinical rules.
pub fn load_rules(path: Option<&Path>) -> Result<RuleSet, AppError> {
    match path {
        Some(path) => {
            let rules = RuleSet::load_file(path)?;
            tracing::info!(path = %path.display(), rules = rules.len(), "rules loaded");
            Ok(rules)
        }
        None => {
            let rules = RuleSet::default_clinical()?;
            tracing::info!(rules = rules.len(), "using built-in clinical rules");
            Ok(rules)
        }
    }
}

/// Execute the full validation pipeline for a CSV or Dataset-JSON file.
pub fn run_validation(config: &RunConfig) -> Result<RunOutput, AppError> {
    let rules = load_rules(config.rules_path.as_deref())?;
    let scorer = ScorerConfig::from_run(config);
    scorer.check()?;

    let dataset = crate::io::load_dataset(&config.dataset_path, &config.id_column, config.item_group.as_deref())?;
    tracing::info!(
        path = %config.dataset_path.display(),
        records = dataset.records.len(),
        columns = dataset.columns.len(),
        "dataset ingested"
    );

    let name = config.dataset_path.display().to_string();
    run_with_dataset(dataset, rules, &scorer, &name)
}

/// Run validate/score/report over an already-loaded dataset.
pub fn run_with_dataset(
    dataset: Dataset,
    rules: RuleSet,
    scorer: &ScorerConfig,
    dataset_name: &str,
) -> Result<RunOutput, AppError> {
    for field in &scorer.numeric_fields {
        if !dataset.columns.iter().any(|c| c == field) {
            tracing::warn!(field = %field, "numeric field not present in dataset; scored as a constant");
        }
    }

    let violations = crate::validate::validate(&dataset.records, &rules);
    let violation_count: usize = violations.values().map(Vec::len).sum();
    tracing::info!(violations = violation_count, "validation finished");

    // Cells that failed a rule are already findings; keep them out of scoring.
    let masked = crate::outlier::masked_cells(&violations);
    let scored = crate::outlier::score(&dataset.records, scorer, &masked)?;
    let outliers = scored.flags.values().filter(|f| f.is_outlier).count();
    tracing::info!(outliers, threshold = scored.threshold, "outlier scoring finished");

    let meta = ReportMeta {
        generated_at: Local::now(),
        dataset: dataset_name.to_string(),
        rule_count: rules.len(),
        numeric_fields: scorer.numeric_fields.clone(),
        contamination: scorer.contamination,
        threshold: scored.threshold,
    };
    let report = crate::report::build(&dataset.records, violations, scored.flags, meta)?;
    tracing::debug!(entries = report.entries.len(), "report built");

    Ok(RunOutput {
        dataset,
        rules,
        report,
    })
}
