//! Isolation forest.
//!
//! Each tree recursively splits a random sub-sample on a random feature at a
//! random threshold until points are isolated or the depth limit
//! `ceil(log2(sample_size))` is hit. Anomalies isolate quickly, so their mean
//! path length is short:
//!
//! ```text
//! score(x) = 2 ^ ( -E[h(x)] / c(sample_size) )
//! ```
//!
//! Scores lie in `(0, 1]`; values near 1 are anomalous, values well below 0.5
//! are normal. All randomness comes from one `StdRng` seeded from the params,
//! so a fit is fully reproducible.

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::AppError;
use crate::math::average_path_length;
use crate::outlier::OutlierEstimator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationForestParams {
    pub n_trees: usize,
    /// Sub-sample size per tree (capped at the number of rows).
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    params: IsolationForestParams,
    trees: Vec<Node>,
    sample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    pub fn new(params: IsolationForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            sample_size: 0,
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn path_length(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| {
                let mut node = tree;
                let mut depth = 0.0;
                loop {
                    match node {
                        Node::Leaf { size } => break depth + average_path_length(*size),
                        Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => {
                            node = if x[(row, *feature)] < *threshold { &**left } else { &**right };
                            depth += 1.0;
                        }
                    }
                }
            })
            .sum();
        total / self.trees.len() as f64
    }
}

impl OutlierEstimator for IsolationForest {
    fn fit(&mut self, x: &DMatrix<f64>) -> Result<(), AppError> {
        let (n, d) = x.shape();
        if self.params.n_trees == 0 || self.params.max_samples < 2 {
            return Err(AppError::Estimator(
                "Isolation forest needs n_trees >= 1 and max_samples >= 2.".to_string(),
            ));
        }
        if n < 2 || d == 0 {
            return Err(AppError::Estimator(format!(
                "Cannot fit isolation forest on a {n}x{d} matrix."
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Estimator("Numeric matrix contains non-finite values.".to_string()));
        }

        let sample_size = self.params.max_samples.min(n);
        let depth_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let trees = (0..self.params.n_trees)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                build_node(x, rows, 0, depth_limit, &mut rng)
            })
            .collect();

        self.trees = trees;
        self.sample_size = sample_size;
        self.n_features = d;
        tracing::debug!(
            trees = self.params.n_trees,
            sample_size,
            depth_limit,
            "isolation forest fitted"
        );
        Ok(())
    }

    fn score_samples(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        if !self.is_fitted() {
            return Err(AppError::Estimator("Isolation forest used before fit.".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(AppError::Estimator(format!(
                "Expected {} feature column(s), got {}.",
                self.n_features,
                x.ncols()
            )));
        }

        let c = average_path_length(self.sample_size);
        let scores = (0..x.nrows())
            .into_par_iter()
            .map(|row| 2f64.powf(-self.path_length(x, row) / c))
            .collect();
        Ok(scores)
    }
}

fn build_node(x: &DMatrix<f64>, rows: Vec<usize>, depth: usize, depth_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= depth_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only features that still vary within this node can split it.
    let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = x[(r, feature)];
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    let Some(&(feature, lo, hi)) = candidates.choose(rng) else {
        return Node::Leaf { size: rows.len() };
    };

    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| x[(r, feature)] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(x, left, depth + 1, depth_limit, rng)),
        right: Box::new(build_node(x, right, depth + 1, depth_limit, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> DMatrix<f64> {
        // 20 points around (50, 120) plus one far away at the end.
        let mut data = Vec::new();
        for i in 0..20 {
            data.push(50.0 + (i % 5) as f64);
            data.push(120.0 + (i % 7) as f64);
        }
        data.push(5000.0);
        data.push(300.0);
        DMatrix::from_row_slice(21, 2, &data)
    }

    #[test]
    fn far_point_scores_highest() {
        let x = cluster_with_outlier();
        let mut forest = IsolationForest::new(IsolationForestParams::default());
        forest.fit(&x).unwrap();
        let scores = forest.score_samples(&x).unwrap();

        let (argmax, max) = scores
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &s)| if s > acc.1 { (i, s) } else { acc });
        assert_eq!(argmax, 20);
        assert!(max > 0.6, "outlier score {max}");
        assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn same_seed_same_scores() {
        let x = cluster_with_outlier();
        let params = IsolationForestParams {
            n_trees: 25,
            max_samples: 16,
            seed: 7,
        };
        let mut a = IsolationForest::new(params);
        let mut b = IsolationForest::new(params);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();
        assert_eq!(a.score_samples(&x).unwrap(), b.score_samples(&x).unwrap());
    }

    #[test]
    fn constant_columns_do_not_panic() {
        let x = DMatrix::from_element(5, 2, 1.0);
        let mut forest = IsolationForest::new(IsolationForestParams::default());
        forest.fit(&x).unwrap();
        let scores = forest.score_samples(&x).unwrap();
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn rejects_bad_input() {
        let mut forest = IsolationForest::new(IsolationForestParams::default());
        assert!(forest.score_samples(&DMatrix::zeros(3, 1)).is_err());
        assert!(forest.fit(&DMatrix::zeros(1, 2)).is_err());
        assert!(forest.fit(&DMatrix::from_element(3, 1, f64::NAN)).is_err());

        forest.fit(&DMatrix::zeros(3, 2)).unwrap();
        assert!(forest.score_samples(&DMatrix::zeros(3, 1)).is_err());
    }
}
