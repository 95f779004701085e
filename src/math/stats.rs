//! Order statistics and isolation-tree normalisation.

/// Euler–Mascheroni constant.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
///
/// ```text
/// c(n) = 2 H(n-1) - 2 (n-1) / n,   H(i) ≈ ln(i) + γ
/// c(2) = 1, c(n <= 1) = 0
/// ```
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Quantile `q ∈ [0, 1]` with linear interpolation between order statistics.
///
/// Returns `None` for an empty slice or any non-finite value.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !q.is_finite() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
