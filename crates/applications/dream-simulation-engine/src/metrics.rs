//! Latency percentiles, episode metrics and history summaries

use serde::{Deserialize, Serialize};

use crate::env::FailureRepairEnv;
use crate::types::{MetricsSnapshot, TickRecord};

/// Percentile `q` (0..=100) of `values` with linear interpolation between
/// closest ranks. Returns NaN for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, q)
}

/// [`percentile`] on data that is already sorted ascending
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Per-episode metrics for the failure/repair environment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub throughput: f64,
    pub drop_rate: f64,
    pub processed: u64,
    pub dropped: u64,
    pub fault_avoidance_rate: f64,
    /// Mean down-interval length in ticks, 0 when the server never recovered from a failure
    pub mttr: f64,
}

impl EpisodeMetrics {
    pub fn from_env(env: &FailureRepairEnv) -> Self {
        let steps = env.steps().max(1) as f64;
        let throughput = env.processed() as f64 / steps;
        let drop_rate = env.dropped() as f64 / steps;

        EpisodeMetrics {
            throughput,
            drop_rate,
            processed: env.processed(),
            dropped: env.dropped(),
            fault_avoidance_rate: 1.0 - drop_rate,
            mttr: mean_time_to_recovery(env.downtime_log()),
        }
    }
}

/// Mean of completed downtime durations, 0 when there are none
pub fn mean_time_to_recovery(downtimes: &[u64]) -> f64 {
    if downtimes.is_empty() {
        return 0.0;
    }
    downtimes.iter().sum::<u64>() as f64 / downtimes.len() as f64
}

/// Mean, median, min and max of one history column (NaN entries skipped)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnSummary {
    /// Summarize a column. All-NaN or empty columns summarize to NaN.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let mut data: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if data.is_empty() {
            return ColumnSummary {
                mean: f64::NAN,
                median: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        data.sort_by(f64::total_cmp);

        ColumnSummary {
            mean: data.iter().sum::<f64>() / data.len() as f64,
            median: percentile_sorted(&data, 50.0),
            min: data[0],
            max: data[data.len() - 1],
        }
    }
}

/// Summary of a fluid-server run history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub lat_p50: ColumnSummary,
    pub lat_p95: ColumnSummary,
    pub lat_p99: ColumnSummary,
    pub rho_tau_est: ColumnSummary,
    pub idle_budget: ColumnSummary,
    pub dream_cpu_secs: ColumnSummary,
    pub reward: ColumnSummary,
    /// Mean length of p95-latency incidents, see [`mttr_proxy`]
    pub mttr_proxy: f64,
}

pub fn summarize(history: &[TickRecord<MetricsSnapshot>]) -> HistorySummary {
    let column = |f: fn(&TickRecord<MetricsSnapshot>) -> f64| ColumnSummary::of(history.iter().map(f));
    let p95: Vec<f64> = history.iter().map(|r| r.metrics.lat_p95).collect();

    HistorySummary {
        lat_p50: column(|r| r.metrics.lat_p50),
        lat_p95: column(|r| r.metrics.lat_p95),
        lat_p99: column(|r| r.metrics.lat_p99),
        rho_tau_est: column(|r| r.metrics.rho_tau_est),
        idle_budget: column(|r| r.metrics.idle_budget),
        dream_cpu_secs: column(|r| r.metrics.dream_cpu_secs),
        reward: column(|r| r.reward),
        mttr_proxy: mttr_proxy(&p95),
    }
}

/// Recovery-time proxy over a p95 latency series.
///
/// Ticks above 1.5× the median (NaN ignored) form incidents; the result is the
/// mean incident length in ticks, or 0 when nothing crosses the threshold.
pub fn mttr_proxy(lat_p95: &[f64]) -> f64 {
    let median = ColumnSummary::of(lat_p95.iter().copied()).median;
    if median.is_nan() {
        return 0.0;
    }
    let threshold = median * 1.5;

    let mut incidents = Vec::new();
    let mut run = 0usize;
    for &lat in lat_p95 {
        if lat > threshold {
            run += 1;
        } else if run > 0 {
            incidents.push(run);
            run = 0;
        }
    }
    if run > 0 {
        incidents.push(run);
    }

    if incidents.is_empty() {
        0.0
    } else {
        incidents.iter().sum::<usize>() as f64 / incidents.len() as f64
    }
}
