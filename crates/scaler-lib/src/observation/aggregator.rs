//! Window metrics aggregation
//!
//! Reduces a reconstructed timeline plus a CPU sample into one
//! [`WindowMetrics`] record per service per window.

use crate::models::WindowMetrics;
use crate::timeline::Timeline;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Aggregates timelines over a fixed trailing window
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    window: Duration,
}

impl WindowAggregator {
    /// `window` must be positive; configuration validation guarantees it.
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn aggregate(
        &self,
        service: &str,
        timeline: &Timeline,
        cpu_utilization: Option<f64>,
        window_end: DateTime<Utc>,
    ) -> WindowMetrics {
        let window_secs = self.window.as_secs_f64();

        let latencies: Vec<f64> = timeline
            .completed()
            .filter_map(|i| i.latency_seconds())
            .collect();
        let completed_count = latencies.len();
        let active_count = timeline.active().count();
        let total_arrived = timeline.len();
        let error_count = timeline
            .completed()
            .filter(|i| i.status.map(|s| s >= 500).unwrap_or(false))
            .count();

        let mean_latency_seconds = mean(&latencies);

        let window_start = chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|d| window_end.checked_sub_signed(d))
            .unwrap_or(window_end);

        WindowMetrics {
            service: service.to_string(),
            window_start,
            window_end,
            completed_count,
            active_count,
            total_arrived,
            error_count,
            mean_latency_seconds,
            arrival_rate: per_second(total_arrived, window_secs),
            throughput: per_second(completed_count, window_secs),
            cpu_utilization,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn per_second(count: usize, window_secs: f64) -> f64 {
    if window_secs > 0.0 {
        count as f64 / window_secs
    } else {
        0.0
    }
}
