//! Heap growth analysis
//!
//! Ordinary least-squares fit of heap-used (MB) against time over the analysis
//! window. The slope gives the growth rate, R² gives the confidence. A leak needs
//! an increasing trend, a rate at or above the configured threshold and R² > 0.5,
//! so noisy-but-flat memory is not flagged.

use super::ProcessMemorySample;
use crate::resources::bytes_to_mb;
use serde::{Deserialize, Serialize};

/// Growth rates (MB/min) below this magnitude count as stable
pub const STABLE_RATE_MB_PER_MIN: f64 = 0.1;
/// Minimum fit quality for a leak verdict
pub const MIN_LEAK_R_SQUARED: f64 = 0.5;
/// Fewer in-window samples than this yields an empty analysis
pub const MIN_SAMPLES: usize = 3;

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthAnalysis {
    pub is_leaking: bool,
    pub growth_rate_mb_per_minute: f64,
    pub average_used_mb: f64,
    pub peak_used_mb: f64,
    pub trend_direction: TrendDirection,
    /// R² of the fit, clamped to [0, 1]
    pub confidence_score: f64,
    pub window_minutes: u64,
    pub sample_count: usize,
}

impl GrowthAnalysis {
    pub fn empty(window_minutes: u64, sample_count: usize) -> Self {
        Self {
            is_leaking: false,
            growth_rate_mb_per_minute: 0.0,
            average_used_mb: 0.0,
            peak_used_mb: 0.0,
            trend_direction: TrendDirection::Stable,
            confidence_score: 0.0,
            window_minutes,
            sample_count,
        }
    }
}

/// Slope and R² of a least-squares line through `(x, y)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Fit `y = slope * x + intercept`.
///
/// Returns `None` for fewer than two points or when all `x` are equal. When all
/// `y` are equal the fit is exact but explains no variance; R² is reported as 0.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let r_squared = if syy == 0.0 {
        0.0
    } else {
        let ss_res: f64 = points
            .iter()
            .map(|(x, y)| {
                let predicted = slope * x + intercept;
                (y - predicted).powi(2)
            })
            .sum();
        1.0 - ss_res / syy
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

pub fn classify_trend(rate_mb_per_minute: f64) -> TrendDirection {
    if rate_mb_per_minute.abs() < STABLE_RATE_MB_PER_MIN {
        TrendDirection::Stable
    } else if rate_mb_per_minute > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

/// Analyze samples whose timestamp falls within `window_minutes` of `now_ms`
pub fn analyze_samples<'a, I>(
    samples: I,
    now_ms: i64,
    window_minutes: u64,
    leak_threshold_mb_per_min: f64,
) -> GrowthAnalysis
where
    I: IntoIterator<Item = &'a ProcessMemorySample>,
{
    let cutoff = now_ms.saturating_sub((window_minutes as i64).saturating_mul(60_000));
    let window: Vec<&ProcessMemorySample> = samples
        .into_iter()
        .filter(|s| s.timestamp >= cutoff && s.timestamp <= now_ms)
        .collect();

    if window.len() < MIN_SAMPLES {
        return GrowthAnalysis::empty(window_minutes, window.len());
    }

    // Normalize timestamps to the earliest sample to keep the sums small
    let origin = window.iter().map(|s| s.timestamp).min().unwrap_or(now_ms);
    let points: Vec<(f64, f64)> = window
        .iter()
        .map(|s| ((s.timestamp - origin) as f64, bytes_to_mb(s.heap_used)))
        .collect();

    let average_used_mb = points.iter().map(|(_, y)| y).sum::<f64>() / points.len() as f64;
    let peak_used_mb = points.iter().map(|(_, y)| *y).fold(f64::MIN, f64::max);

    let Some(fit) = linear_regression(&points) else {
        // All samples share a timestamp; no trend can be derived
        return GrowthAnalysis {
            average_used_mb,
            peak_used_mb,
            ..GrowthAnalysis::empty(window_minutes, window.len())
        };
    };

    let growth_rate = fit.slope * MS_PER_MINUTE;
    let trend_direction = classify_trend(growth_rate);
    let is_leaking = trend_direction == TrendDirection::Increasing
        && growth_rate >= leak_threshold_mb_per_min
        && fit.r_squared > MIN_LEAK_R_SQUARED;

    GrowthAnalysis {
        is_leaking,
        growth_rate_mb_per_minute: growth_rate,
        average_used_mb,
        peak_used_mb,
        trend_direction,
        confidence_score: fit.r_squared.clamp(0.0, 1.0),
        window_minutes,
        sample_count: window.len(),
    }
}
