//! Time-domain HRV statistics over an RR interval series.
//!
//! [`compute`] is a pure function: the same series and configuration always
//! produce the same [`HrvMetrics`]. Series shorter than
//! [`MetricsConfig::min_samples`] produce the all-zero record instead of an
//! error, so callers never branch on absence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::MetricsConfig;

/// Fixed-shape HRV result. All fields are zero for insufficient data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvMetrics {
    /// Population standard deviation of the cleaned intervals (ms).
    pub sdnn: f64,
    /// Root mean square of successive differences (ms).
    pub rmssd: f64,
    /// Share of successive differences above 50 ms (%).
    pub pnn50: f64,
    /// Variation range, max - min (ms).
    pub mxdmn: f64,
    /// Share of intervals falling in the modal 50 ms bin (%).
    pub amo50: f64,
    /// Centre of the modal bin (ms).
    pub mode_ms: f64,
    /// Intervals left after outlier removal.
    pub samples_used: usize,
}

impl HrvMetrics {
    /// False for the zeroed "not enough data" record.
    pub fn is_valid(&self) -> bool {
        self.samples_used > 0
    }

    /// Baevsky stress index, `AMo50 / (2 * Mo * MxDMn)` with Mo and MxDMn in
    /// seconds. Zero when either is zero.
    pub fn stress_index(&self) -> f64 {
        let mode_s = self.mode_ms / 1000.0;
        let range_s = self.mxdmn / 1000.0;
        if mode_s <= 0.0 || range_s <= 0.0 {
            return 0.0;
        }
        self.amo50 / (2.0 * mode_s * range_s)
    }
}

/// Computes HRV statistics over `rr` (milliseconds, temporal order).
pub fn compute(rr: &[f64], config: &MetricsConfig) -> HrvMetrics {
    if rr.len() < config.min_samples.max(2) {
        return HrvMetrics::default();
    }

    let cleaned = remove_outliers(rr, config);
    let n = cleaned.len();
    let count = n as f64;

    let mean = cleaned.iter().sum::<f64>() / count;
    let variance = cleaned.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    let diffs: Vec<f64> = cleaned.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let nn50 = diffs
        .iter()
        .filter(|d| d.abs() > config.nn50_threshold_ms)
        .count();
    let pnn50 = 100.0 * nn50 as f64 / (n - 1) as f64;

    let (min, max) = cleaned
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let (mode_ms, mode_count) = modal_bin(&cleaned, config.histogram_bin_ms);

    HrvMetrics {
        sdnn: variance.sqrt(),
        rmssd,
        pnn50,
        mxdmn: max - min,
        amo50: 100.0 * mode_count as f64 / count,
        mode_ms,
        samples_used: n,
    }
}

/// `60000 / mean(rr)`, or zero for an empty series.
pub fn average_bpm(rr: &[f64]) -> f64 {
    if rr.is_empty() {
        return 0.0;
    }
    let mean = rr.iter().sum::<f64>() / rr.len() as f64;
    if mean > 0.0 {
        60_000.0 / mean
    } else {
        0.0
    }
}

/// Tukey fence on integer-index quartiles. Falls back to the untouched series
/// when too few values survive.
fn remove_outliers(rr: &[f64], config: &MetricsConfig) -> Vec<f64> {
    let n = rr.len();
    let mut sorted = rr.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = sorted[n / 4];
    let q3 = sorted[(3 * n / 4).min(n - 1)];
    let iqr = q3 - q1;
    let lower = q1 - config.iqr_multiplier * iqr;
    let upper = q3 + config.iqr_multiplier * iqr;

    let kept: Vec<f64> = rr
        .iter()
        .copied()
        .filter(|v| (lower..=upper).contains(v))
        .collect();

    if kept.len() < config.min_clean_samples.max(2) {
        tracing::debug!(kept = kept.len(), total = n, "outlier filter too aggressive, using raw series");
        rr.to_vec()
    } else {
        kept
    }
}

/// Most populated histogram bin as (centre, count); ties go to the shorter bin.
fn modal_bin(values: &[f64], width: f64) -> (f64, usize) {
    let mut bins: BTreeMap<i64, usize> = BTreeMap::new();
    for value in values {
        *bins.entry((value / width).round() as i64).or_default() += 1;
    }

    bins.into_iter()
        .fold((0.0, 0), |(best_centre, best_count), (bin, count)| {
            if count > best_count {
                (bin as f64 * width, count)
            } else {
                (best_centre, best_count)
            }
        })
}
