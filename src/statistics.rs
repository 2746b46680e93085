//! Bootstrap statistics for multi-trial runs.
//!
//! Trial counts are typically too small for parametric assumptions, so
//! confidence intervals are computed by resampling with replacement.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Number of bootstrap resamples.
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 10_000;

/// Result of a bootstrap confidence interval computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
    pub confidence_level: f64,
    pub resamples: usize,
}

/// Computes a bootstrap confidence interval over the given scores using the
/// percentile method. `confidence_level` should be in (0, 1), e.g. 0.95.
///
/// With fewer than 2 data points, the interval degenerates to the sample
/// mean with zero resamples.
pub fn bootstrap_ci(scores: &[f64], confidence_level: f64) -> ConfidenceInterval {
    bootstrap_ci_with_seed(scores, confidence_level, None)
}

/// Like [`bootstrap_ci`] but accepts a seed for reproducibility.
pub fn bootstrap_ci_with_seed(
    scores: &[f64],
    confidence_level: f64,
    seed: Option<u64>,
) -> ConfidenceInterval {
    let n = scores.len();
    if n < 2 {
        let m = mean(scores);
        return ConfidenceInterval {
            lower: m,
            upper: m,
            mean: m,
            confidence_level,
            resamples: 0,
        };
    }

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };

    let iters = DEFAULT_BOOTSTRAP_ITERATIONS;
    let mut boot_means = Vec::with_capacity(iters);
    let mut sample = vec![0.0; n];

    for _ in 0..iters {
        for slot in sample.iter_mut() {
            *slot = scores[rng.random_range(0..n)];
        }
        boot_means.push(mean(&sample));
    }

    boot_means.sort_by(|a, b| a.total_cmp(b));

    // Percentile method.
    let alpha = 1.0 - confidence_level;
    let lo_idx = ((alpha / 2.0) * iters as f64).floor() as usize;
    let hi_idx = (((1.0 - alpha / 2.0) * iters as f64).floor() as usize).min(iters - 1);

    ConfidenceInterval {
        lower: boot_means[lo_idx],
        upper: boot_means[hi_idx],
        mean: mean(scores),
        confidence_level,
        resamples: iters,
    }
}

/// Returns true if the confidence interval does not contain zero, indicating
/// statistical significance at the interval's confidence level.
pub fn is_significant(ci: &ConfidenceInterval) -> bool {
    ci.lower > 0.0 || ci.upper < 0.0
}

/// Computes Hake's normalized gain (1998):
///
/// ```text
/// g = (post - pre) / (1 - pre)
/// ```
///
/// This controls for ceiling effects: a gain from 0.9 to 0.95 is harder than
/// one from 0.1 to 0.15. Returns 0 when `pre` is already at the ceiling or
/// nothing changed, and 1.0 when `post` reaches the maximum.
pub fn normalized_gain(pre: f64, post: f64) -> f64 {
    if pre >= 1.0 {
        return 0.0;
    }
    if post >= 1.0 {
        return 1.0;
    }
    if (post - pre).abs() < 1e-12 {
        return 0.0;
    }
    (post - pre) / (1.0 - pre)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_ci_degenerate_for_small_samples() {
        let ci = bootstrap_ci(&[0.8], 0.95);
        assert_eq!(ci.lower, 0.8);
        assert_eq!(ci.upper, 0.8);
        assert_eq!(ci.mean, 0.8);
        assert_eq!(ci.resamples, 0);

        let empty = bootstrap_ci(&[], 0.95);
        assert_eq!(empty.mean, 0.0);
    }

    #[test]
    fn test_bootstrap_ci_brackets_mean() {
        let scores = [0.2, 0.4, 0.6, 0.8, 1.0];
        let ci = bootstrap_ci_with_seed(&scores, 0.95, Some(42));

        assert!(ci.lower <= ci.mean);
        assert!(ci.upper >= ci.mean);
        assert!((ci.mean - 0.6).abs() < 1e-9);
        assert_eq!(ci.resamples, DEFAULT_BOOTSTRAP_ITERATIONS);
    }

    #[test]
    fn test_bootstrap_ci_seeded_is_reproducible() {
        let scores = [0.1, 0.5, 0.9, 0.7];
        let a = bootstrap_ci_with_seed(&scores, 0.95, Some(7));
        let b = bootstrap_ci_with_seed(&scores, 0.95, Some(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bootstrap_ci_constant_samples() {
        let scores = [0.5, 0.5, 0.5];
        let ci = bootstrap_ci_with_seed(&scores, 0.95, Some(1));
        assert_eq!(ci.lower, 0.5);
        assert_eq!(ci.upper, 0.5);
    }

    #[test]
    fn test_is_significant() {
        let positive = ConfidenceInterval {
            lower: 0.1,
            upper: 0.5,
            mean: 0.3,
            confidence_level: 0.95,
            resamples: 100,
        };
        assert!(is_significant(&positive));

        let spanning = ConfidenceInterval {
            lower: -0.1,
            upper: 0.2,
            ..positive
        };
        assert!(!is_significant(&spanning));

        let negative = ConfidenceInterval {
            lower: -0.5,
            upper: -0.1,
            ..positive
        };
        assert!(is_significant(&negative));
    }

    #[test]
    fn test_normalized_gain() {
        assert!((normalized_gain(0.5, 0.75) - 0.5).abs() < 1e-9);
        assert_eq!(normalized_gain(1.0, 0.5), 0.0);
        assert_eq!(normalized_gain(0.3, 1.0), 1.0);
        assert_eq!(normalized_gain(0.4, 0.4), 0.0);
        assert!(normalized_gain(0.5, 0.25) < 0.0);
    }
}
