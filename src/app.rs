//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - runs the validation pipeline
//! - writes optional exports, then prints the report
//! - lists rules and generates mock datasets

use std::io::Write;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Command, RulesArgs, SampleArgs, ValidateArgs};
use crate::domain::{LogFormat, RunConfig, SampleConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `edcv` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Validate(args) => handle_validate(args),
        Command::Rules(args) => handle_rules(args),
        Command::Sample(args) => handle_sample(args),
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "edc_validator=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // A second init (tests, embedding) is harmless.
    let _ = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
}

fn handle_validate(args: ValidateArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args);
    let text = validate_and_export(&config)?;
    println!("{text}");
    Ok(())
}

/// Run the pipeline, place every requested export, and return the rendered
/// report. On error no export is left at its target.
pub fn validate_and_export(config: &RunConfig) -> Result<String, AppError> {
    let run = pipeline::run_validation(config)?;
    let text = crate::report::format_report(&run.report, config.show_all);

    let mut staged = Vec::new();
    if let Some(path) = &config.export_findings {
        staged.push(crate::io::export::stage_findings_csv(path, &run.report)?);
    }
    if let Some(path) = &config.export_json {
        staged.push(crate::io::export::stage_report_json(path, &run.report)?);
    }
    let targets: Vec<_> = staged.iter().map(|s| s.target().to_path_buf()).collect();
    crate::io::export::commit_all(staged)?;

    for path in &targets {
        tracing::info!(path = %path.display(), "export written");
    }
    Ok(text)
}

fn handle_rules(args: RulesArgs) -> Result<(), AppError> {
    let rules = pipeline::load_rules(args.rules.path.as_deref())?;

    if let Some(path) = &args.write {
        let json = rules.to_json()?;
        crate::io::export::write_atomically(path, |mut file| {
            file.write_all(json.as_bytes())
                .map_err(|e| AppError::io(format!("Failed to write rules: {e}")))
        })?;
        tracing::info!(path = %path.display(), "rules written");
    }

    println!("{}", crate::report::format_rules(&rules));
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let config = sample_config_from_args(&args);
    let rows = crate::data::write_mock_csv(&args.out, &config)?;
    tracing::info!(path = %args.out.display(), rows, seed = config.seed, "mock dataset written");
    println!("Wrote {rows} records to {}", args.out.display());
    Ok(())
}

pub fn run_config_from_args(args: &ValidateArgs) -> RunConfig {
    RunConfig {
        dataset_path: args.dataset.clone(),
        rules_path: args.rules.path.clone(),
        id_column: args.id_column.clone(),
        item_group: args.item_group.clone(),
        numeric_fields: args
            .numeric_fields
            .iter()
            .map(|f| f.trim().to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .collect(),
        contamination: args.contamination,
        min_records: args.min_records,
        n_trees: args.trees,
        max_samples: args.max_samples,
        seed: args.seed,
        show_all: args.all,
        export_findings: args.export_findings.clone(),
        export_json: args.export_json.clone(),
    }
}

pub fn sample_config_from_args(args: &SampleArgs) -> SampleConfig {
    SampleConfig {
        count: args.count,
        seed: args.seed,
        rule_break_prob: args.rule_break_prob,
        outlier_prob: args.outlier_prob,
        outlier_k: args.outlier_k,
        ..SampleConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    #[test]
    fn numeric_fields_are_normalized() {
        let cli = Cli::try_parse_from([
            "edcv",
            "validate",
            "d.csv",
            "--numeric-fields",
            " Age ,,Treatment_Dose",
        ])
        .unwrap();
        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        let config = run_config_from_args(&args);
        assert_eq!(config.numeric_fields, vec!["age", "treatment_dose"]);
        assert_eq!(config.n_trees, 100);
    }

    #[test]
    fn sample_then_validate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("mock.csv");
        let findings = dir.path().join("findings.csv");

        let sample = Cli::try_parse_from([
            "edcv",
            "sample",
            "--out",
            data.to_str().unwrap(),
            "-n",
            "60",
            "--rule-break-prob",
            "0.2",
        ])
        .unwrap();
        let Command::Sample(args) = sample.command else {
            panic!("expected sample");
        };
        handle_sample(args).unwrap();

        let validate = Cli::try_parse_from([
            "edcv",
            "validate",
            data.to_str().unwrap(),
            "--export-findings",
            findings.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Validate(args) = validate.command else {
            panic!("expected validate");
        };
        let run = pipeline::run_validation(&run_config_from_args(&args)).unwrap();
        assert_eq!(run.report.entries.len(), 60);
        assert!(run.report.flagged().count() > 0);

        handle_validate(args).unwrap();
        assert!(findings.exists());
    }

    #[test]
    fn failed_json_export_leaves_no_findings_and_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("mock.csv");
        let findings = dir.path().join("findings.csv");
        let json = dir.path().join("no_such_dir").join("report.json");
        crate::data::write_mock_csv(&data, &SampleConfig { count: 30, ..SampleConfig::default() }).unwrap();

        let cli = Cli::try_parse_from([
            "edcv",
            "validate",
            data.to_str().unwrap(),
            "--export-findings",
            findings.to_str().unwrap(),
            "--export-json",
            json.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };

        let err = validate_and_export(&run_config_from_args(&args)).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(!findings.exists());

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("mock.csv")]);
    }
}
