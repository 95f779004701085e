//! Outlier scorer.
//!
//! Builds the numeric submatrix of a batch and hands it to an
//! `OutlierEstimator`. The estimator is fitted on the full batch and then
//! scores the same rows; the outlier threshold is the `(1 - contamination)`
//! quantile of those scores.
//!
//! Cells that already failed a rule are masked before scoring: a masked,
//! absent or non-numeric cell takes its column median. The estimator then
//! ranks records on what the rules did not catch, and an out-of-range value
//! cannot crowd a genuine outlier out of the flagged share.
//!
//! The scorer never retries: a fit failure aborts the run.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;

use crate::domain::{AnomalyFlag, Record, RecordId, RunConfig, Violation};
use crate::error::AppError;
use crate::math::quantile;

pub mod forest;

pub use forest::{IsolationForest, IsolationForestParams};

/// A fit/score capability over a numeric matrix (rows = records).
///
/// Higher scores mean more anomalous.
pub trait OutlierEstimator {
    fn fit(&mut self, x: &DMatrix<f64>) -> Result<(), AppError>;
    fn score_samples(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    pub numeric_fields: Vec<String>,
    /// Expected share of outliers, in `(0, 0.5]`.
    pub contamination: f64,
    /// Smaller batches fail with `InsufficientData`.
    pub min_records: usize,
    pub forest: IsolationForestParams,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            numeric_fields: crate::rules::defaults::DEFAULT_NUMERIC_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            contamination: 0.1,
            min_records: 3,
            forest: IsolationForestParams::default(),
        }
    }
}

impl ScorerConfig {
    pub fn from_run(config: &RunConfig) -> Self {
        Self {
            numeric_fields: config.numeric_fields.clone(),
            contamination: config.contamination,
            min_records: config.min_records,
            forest: IsolationForestParams {
                n_trees: config.n_trees,
                max_samples: config.max_samples,
                seed: config.seed,
            },
        }
    }

    pub fn check(&self) -> Result<(), AppError> {
        if self.numeric_fields.is_empty() {
            return Err(AppError::config("At least one numeric field is required for outlier scoring."));
        }
        if !(self.contamination.is_finite() && self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(AppError::config(format!(
                "Contamination must be in (0, 0.5], got {}.",
                self.contamination
            )));
        }
        if self.min_records < 2 {
            return Err(AppError::config("min_records must be >= 2."));
        }
        Ok(())
    }
}

/// Per-record flags plus the threshold that produced them.
#[derive(Debug, Clone)]
pub struct ScoreOutput {
    pub flags: BTreeMap<RecordId, AnomalyFlag>,
    pub threshold: f64,
}

/// Per-record fields excluded from the feature matrix.
pub type MaskedCells = BTreeMap<RecordId, BTreeSet<String>>;

/// Mask every field a violation was reported on.
pub fn masked_cells(violations: &BTreeMap<RecordId, Vec<Violation>>) -> MaskedCells {
    violations
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(id, v)| (id.clone(), v.iter().map(|v| v.field.clone()).collect()))
        .collect()
}

/// Score a batch with the default isolation forest.
pub fn score(records: &[Record], config: &ScorerConfig, masked: &MaskedCells) -> Result<ScoreOutput, AppError> {
    let mut estimator = IsolationForest::new(config.forest);
    score_with(records, config, masked, &mut estimator)
}

/// Score a batch with any estimator.
pub fn score_with<E: OutlierEstimator>(
    records: &[Record],
    config: &ScorerConfig,
    masked: &MaskedCells,
    estimator: &mut E,
) -> Result<ScoreOutput, AppError> {
    config.check()?;
    if records.len() < config.min_records {
        return Err(AppError::InsufficientData {
            records: records.len(),
            minimum: config.min_records,
        });
    }

    let x = numeric_matrix(records, &config.numeric_fields, masked);
    estimator.fit(&x)?;
    let scores = estimator.score_samples(&x)?;
    if scores.len() != records.len() {
        return Err(AppError::Estimator(format!(
            "Estimator returned {} score(s) for {} record(s).",
            scores.len(),
            records.len()
        )));
    }

    let threshold = quantile(&scores, 1.0 - config.contamination)
        .ok_or_else(|| AppError::Estimator("Estimator produced non-finite scores.".to_string()))?;

    let flags = records
        .iter()
        .zip(scores)
        .map(|(record, score)| {
            let flag = AnomalyFlag {
                record_id: record.id.clone(),
                score,
                is_outlier: score > threshold,
            };
            (record.id.clone(), flag)
        })
        .collect();

    Ok(ScoreOutput { flags, threshold })
}

/// Rows follow `records`, columns follow `fields`. Masked, absent or
/// non-numeric cells take the median of the column's usable values (0.0 when
/// the column has none).
pub fn numeric_matrix(records: &[Record], fields: &[String], masked: &MaskedCells) -> DMatrix<f64> {
    let usable = |record: &Record, field: &str| {
        let is_masked = masked.get(&record.id).is_some_and(|m| m.contains(field));
        if is_masked { None } else { record.get(field).and_then(|c| c.as_number()) }
    };

    let medians: Vec<f64> = fields
        .iter()
        .map(|field| {
            let values: Vec<f64> = records.iter().filter_map(|r| usable(r, field)).collect();
            quantile(&values, 0.5).unwrap_or(0.0)
        })
        .collect();

    DMatrix::from_fn(records.len(), fields.len(), |row, col| {
        usable(&records[row], &fields[col]).unwrap_or(medians[col])
    })
}
