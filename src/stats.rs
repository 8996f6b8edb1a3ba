//! Summary statistics over sampled edge lengths and node ages.

use crate::error::{Result, SplitError};

/// Summary of one split's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStatistics {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample variance (n - 1 denominator).
    pub variance: f64,
    pub sd: f64,
    pub range: (f64, f64),
    /// Shortest interval holding 95% of the samples.
    pub hpd95: (f64, f64),
    /// 5% and 95% quantiles.
    pub quant_5_95: (f64, f64),
}

/// Summarizes `values`.
///
/// # Errors
/// [`SplitError::InsufficientData`] for fewer than two values or any
/// non-finite value.
pub fn summarize(values: &[f64]) -> Result<SummaryStatistics> {
    if values.len() < 2 {
        return Err(SplitError::InsufficientData(format!(
            "need at least 2 values, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SplitError::InsufficientData(
            "non-finite value in sample".to_string(),
        ));
    }

    let n = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

    Ok(SummaryStatistics {
        n,
        mean,
        median: quantile(&sorted, 0.5),
        variance,
        sd: variance.sqrt(),
        range: (sorted[0], sorted[n - 1]),
        hpd95: empirical_hpd(&sorted, 0.95),
        quant_5_95: (quantile(&sorted, 0.05), quantile(&sorted, 0.95)),
    })
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn empirical_hpd(sorted: &[f64], conf: f64) -> (f64, f64) {
    let n = sorted.len();
    let width = ((conf * n as f64).ceil() as usize).clamp(1, n);
    (0..=n - width)
        .map(|i| (sorted[i], sorted[i + width - 1]))
        .min_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
        .unwrap_or((sorted[0], sorted[n - 1]))
}
