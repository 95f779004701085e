//! Synthetic clinical-trial dataset generation.
//!
//! Produces plausible subjects (demographics, vitals, dosing, visit and
//! treatment dates) and injects a controlled share of rule breaks and dose
//! outliers so the full pipeline has something to find. The generator is
//! driven by one seeded `StdRng`: the same config always yields the same rows.

use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Record, SampleConfig};
use crate::error::AppError;

/// Column order of generated CSV files.
pub const MOCK_COLUMNS: [&str; 9] = [
    "subject_id",
    "site_id",
    "sex",
    "age",
    "systolic_bp",
    "treatment_dose",
    "visit_date",
    "start_date",
    "end_date",
];

const SITES: usize = 5;

/// Kinds of deliberate data-quality problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleBreak {
    AgeOutOfRange,
    MissingBp,
    InvertedDates,
    UnknownSex,
    NonIsoVisitDate,
}

const RULE_BREAKS: [RuleBreak; 5] = [
    RuleBreak::AgeOutOfRange,
    RuleBreak::MissingBp,
    RuleBreak::InvertedDates,
    RuleBreak::UnknownSex,
    RuleBreak::NonIsoVisitDate,
];

pub fn generate_mock(config: &SampleConfig) -> Result<Vec<Record>, AppError> {
    check_config(config)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let age_dist = normal(52.0, 12.0)?;
    let bp_dist = normal(128.0, 12.0)?;
    let dose_dist = normal(50.0, 8.0)?;

    let mut records = Vec::with_capacity(config.count);
    for i in 0..config.count {
        let age = age_dist.sample(&mut rng).clamp(18.0, 90.0).round();
        let bp = bp_dist.sample(&mut rng).clamp(95.0, 175.0).round();
        let mut dose = (dose_dist.sample(&mut rng).max(5.0) * 10.0).round() / 10.0;

        let visit = config.start_date + Duration::days(rng.gen_range(0..365));
        let start = visit + Duration::days(rng.gen_range(0..14));
        let mut end = start + Duration::days(rng.gen_range(7..90));

        let sex = if rng.gen_bool(0.5) { "F" } else { "M" };
        let site = format!("SITE-{:02}", rng.gen_range(1..=SITES));

        let mut record = Record::new(format!("SUBJ-{:04}", i + 1))
            .with("site_id", &site)
            .with("sex", sex)
            .with("age", &fmt_num(age))
            .with("systolic_bp", &fmt_num(bp))
            .with("visit_date", &visit.format("%Y-%m-%d").to_string())
            .with("start_date", &start.format("%Y-%m-%d").to_string());

        if rng.gen_bool(config.outlier_prob) {
            dose = (dose * config.outlier_k * 10.0).round() / 10.0;
        }
        record.set("treatment_dose", &fmt_num(dose));

        if rng.gen_bool(config.rule_break_prob) {
            let kind = *RULE_BREAKS.choose(&mut rng).unwrap_or(&RuleBreak::AgeOutOfRange);
            match kind {
                RuleBreak::AgeOutOfRange => {
                    let bad_age = if rng.gen_bool(0.5) {
                        rng.gen_range(101..=130)
                    } else {
                        rng.gen_range(10..=17)
                    };
                    record.set("age", &bad_age.to_string());
                }
                RuleBreak::MissingBp => record.set("systolic_bp", ""),
                RuleBreak::InvertedDates => end = start - Duration::days(rng.gen_range(1..30)),
                RuleBreak::UnknownSex => record.set("sex", "X"),
                RuleBreak::NonIsoVisitDate => record.set("visit_date", &visit.format("%d/%m/%Y").to_string()),
            }
        }
        record.set("end_date", &end.format("%Y-%m-%d").to_string());

        records.push(record);
    }

    Ok(records)
}

/// Generate a mock dataset and write it as CSV. Returns the row count.
pub fn write_mock_csv(path: &Path, config: &SampleConfig) -> Result<usize, AppError> {
    let records = generate_mock(config)?;

    crate::io::export::write_atomically(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(MOCK_COLUMNS)
            .map_err(|e| AppError::io(format!("Failed to write mock CSV header: {e}")))?;
        for r in &records {
            let row = MOCK_COLUMNS.iter().map(|col| match *col {
                "subject_id" => r.id.as_str(),
                _ => r.get(col).map(|c| c.raw.as_str()).unwrap_or(""),
            });
            writer
                .write_record(row)
                .map_err(|e| AppError::io(format!("Failed to write mock CSV row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::io(format!("Failed to flush mock CSV: {e}")))
    })?;

    Ok(records.len())
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            count: 200,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            rule_break_prob: 0.05,
            outlier_prob: 0.03,
            outlier_k: 8.0,
        }
    }
}

fn check_config(config: &SampleConfig) -> Result<(), AppError> {
    if config.count == 0 {
        return Err(AppError::config("Sample count must be > 0."));
    }
    for (name, p) in [("rule_break_prob", config.rule_break_prob), ("outlier_prob", config.outlier_prob)] {
        if !(p.is_finite() && (0.0..=1.0).contains(&p)) {
            return Err(AppError::config(format!("{name} must be within [0, 1], got {p}.")));
        }
    }
    if !(config.outlier_k.is_finite() && config.outlier_k > 1.0) {
        return Err(AppError::config("outlier_k must be finite and > 1."));
    }
    Ok(())
}

fn normal(mean: f64, sd: f64) -> Result<Normal<f64>, AppError> {
    Normal::new(mean, sd).map_err(|e| AppError::Internal(format!("Noise distribution error: {e}")))
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 { format!("{v:.0}") } else { format!("{v:.1}") }
}
