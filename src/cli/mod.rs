//! Command-line parsing for the EDC record validator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! validation and scoring code; `app` turns these structs into configs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::LogFormat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "edcv",
    version,
    about = "EDC clinical record validator with outlier scoring"
)]
pub struct Cli {
    /// Log output format on stderr (filter with RUST_LOG).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a CSV or Dataset-JSON export, score outliers, print the compliance report.
    Validate(ValidateArgs),
    /// Print (and optionally write) the effective rule set.
    Rules(RulesArgs),
    /// Write a synthetic clinical dataset with injected problems.
    Sample(SampleArgs),
}

/// Options for `edcv validate`.
#[derive(Debug, Parser, Clone)]
pub struct ValidateArgs {
    /// CSV or Dataset-JSON (`.json`) file to validate.
    #[arg(value_name = "FILE")]
    pub dataset: PathBuf,

    #[command(flatten)]
    pub rules: RulesSource,

    /// Column holding the record (subject) id.
    #[arg(long, default_value = "subject_id")]
    pub id_column: String,

    /// Dataset-JSON item group to validate (OID or dataset name).
    #[arg(long)]
    pub item_group: Option<String>,

    /// Comma-separated numeric fields fed to the outlier estimator.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "age,systolic_bp,treatment_dose"
    )]
    pub numeric_fields: Vec<String>,

    /// Expected share of outliers, in (0, 0.5].
    #[arg(long, default_value_t = 0.1)]
    pub contamination: f64,

    /// Minimum batch size for outlier scoring.
    #[arg(long, default_value_t = 3)]
    pub min_records: usize,

    /// Number of isolation trees.
    #[arg(long, default_value_t = 100)]
    pub trees: usize,

    /// Sub-sample size per tree.
    #[arg(long, default_value_t = 256)]
    pub max_samples: usize,

    /// Random seed for the estimator.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// List every record, not only flagged ones.
    #[arg(long)]
    pub all: bool,

    /// Export findings (one row per violation / outlier) to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_findings: Option<PathBuf>,

    /// Export the full report to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

/// Where rules come from.
#[derive(Debug, Args, Clone)]
pub struct RulesSource {
    /// JSON rules file (defaults to the built-in clinical rules).
    #[arg(long = "rules", value_name = "JSON", env = "EDCV_RULES")]
    pub path: Option<PathBuf>,
}

/// Options for `edcv rules`.
#[derive(Debug, Parser, Clone)]
pub struct RulesArgs {
    #[command(flatten)]
    pub rules: RulesSource,

    /// Write the effective rules (explicit ids and messages) to a JSON file.
    #[arg(long, value_name = "JSON")]
    pub write: Option<PathBuf>,
}

/// Options for `edcv sample`.
#[derive(Debug, Parser, Clone)]
pub struct SampleArgs {
    /// Output CSV path.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Number of subjects to generate.
    #[arg(short = 'n', long, default_value_t = 200)]
    pub count: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Probability that a subject carries one rule break.
    #[arg(long, default_value_t = 0.05)]
    pub rule_break_prob: f64,

    /// Probability that a subject carries a dose outlier.
    #[arg(long, default_value_t = 0.03)]
    pub outlier_prob: f64,

    /// Dose multiplier for injected outliers.
    #[arg(long, default_value_t = 8.0)]
    pub outlier_k: f64,
}
