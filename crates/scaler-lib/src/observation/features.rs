//! Observation building
//!
//! Derives raw features from window metrics and normalizes them against the
//! per-service bounds. Every normalized feature except `n_instances` lies in
//! `[0, 1]`; `n_instances` is deliberately left unclamped because the
//! policy was trained on the raw ratio.

use crate::config::ServiceScalingConfig;
use crate::error::{Result, ScalerError};
use crate::models::{Observation, WindowMetrics};

/// Raw, unnormalized features
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFeatures {
    /// Completed requests per second
    pub workload: f64,
    pub utilization: f64,
    pub pressure: f64,
    pub queue_length_dominant: f64,
}

/// Builds observations for one service
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    config: ServiceScalingConfig,
}

impl ObservationBuilder {
    pub fn new(config: ServiceScalingConfig) -> Self {
        Self { config }
    }

    /// Fails with `DataUnavailable` when the window has no CPU sample.
    pub fn raw_features(&self, metrics: &WindowMetrics) -> Result<RawFeatures> {
        let utilization = metrics.cpu_utilization.ok_or_else(|| {
            ScalerError::data_unavailable("metrics", &metrics.service, "no utilization sample")
        })?;

        let latency = metrics.mean_latency_seconds;
        let demand = self.config.demand();

        Ok(RawFeatures {
            workload: metrics.throughput,
            utilization,
            pressure: latency / self.config.response_time_threshold(),
            queue_length_dominant: ((latency - demand) / demand).max(0.0),
        })
    }

    pub fn build(&self, metrics: &WindowMetrics, current_replicas: u32) -> Result<Observation> {
        let raw = self.raw_features(metrics)?;

        Ok(Observation {
            norm_instances: current_replicas as f64 / self.config.max_replicas() as f64,
            norm_workload: normalize(raw.workload, self.config.max_workload()),
            utilization: raw.utilization,
            norm_pressure: normalize(raw.pressure, self.config.pressure_clip()),
            norm_queue_length_dominant: normalize(
                raw.queue_length_dominant,
                self.config.queue_clip(),
            ),
        })
    }
}

/// Clamp into `[0, bound]` and scale to `[0, 1]`; NaN maps to 0
pub fn normalize(value: f64, bound: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, bound) / bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawServiceConfig;
    use chrono::Utc;

    fn config(threshold: f64, demand: f64, pressure_clip: f64) -> ServiceScalingConfig {
        let mut raw = RawServiceConfig::new("svc");
        raw.response_time_threshold_secs = threshold;
        raw.demand_secs = demand;
        raw.pressure_clip = pressure_clip;
        raw.queue_clip = 2.0;
        raw.max_workload = 4.0;
        raw.max_replicas = 5;
        ServiceScalingConfig::try_from(raw).unwrap()
    }

    fn metrics(mean_latency: f64, throughput: f64, cpu: Option<f64>) -> WindowMetrics {
        WindowMetrics {
            service: "svc".to_string(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            completed_count: 0,
            active_count: 0,
            total_arrived: 0,
            error_count: 0,
            mean_latency_seconds: mean_latency,
            arrival_rate: throughput,
            throughput,
            cpu_utilization: cpu,
        }
    }

    #[test]
    fn test_instances_ratio() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let obs = builder.build(&metrics(0.0, 0.0, Some(0.2)), 3).unwrap();
        assert!((obs.norm_instances - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_instances_not_clamped() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let obs = builder.build(&metrics(0.0, 0.0, Some(0.2)), 7).unwrap();
        assert!((obs.norm_instances - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_pressure_normalization() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let m = metrics(3.0, 0.0, Some(0.2));
        let raw = builder.raw_features(&m).unwrap();
        assert!((raw.pressure - 2.0).abs() < 1e-9);
        let obs = builder.build(&m, 1).unwrap();
        assert!((obs.norm_pressure - 0.667).abs() < 1e-3);
    }

    #[test]
    fn test_queue_length_zero_below_demand() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        for latency in [0.0, 0.3, 0.99, 1.0] {
            let raw = builder.raw_features(&metrics(latency, 0.0, Some(0.1))).unwrap();
            assert_eq!(raw.queue_length_dominant, 0.0, "latency {}", latency);
        }
        let raw = builder.raw_features(&metrics(2.5, 0.0, Some(0.1))).unwrap();
        assert!((raw.queue_length_dominant - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_utilization_passed_through() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let obs = builder.build(&metrics(0.5, 1.0, Some(0.73)), 1).unwrap();
        assert_eq!(obs.utilization, 0.73);
    }

    #[test]
    fn test_unknown_utilization_is_data_unavailable() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let err = builder.build(&metrics(0.5, 1.0, None), 1).unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }

    #[test]
    fn test_bounded_features_stay_in_unit_range() {
        let builder = ObservationBuilder::new(config(0.25, 0.1, 2.0));
        let inputs = [
            0.0,
            1e-12,
            0.05,
            0.5,
            3.0,
            1e6,
            f64::MAX,
            f64::INFINITY,
            -4.0,
            f64::NAN,
        ];
        for latency in inputs {
            for throughput in inputs {
                let obs = builder
                    .build(&metrics(latency, throughput, Some(0.5)), 2)
                    .unwrap();
                for value in [
                    obs.norm_workload,
                    obs.norm_pressure,
                    obs.norm_queue_length_dominant,
                ] {
                    assert!(
                        (0.0..=1.0).contains(&value),
                        "latency {} throughput {} gave {}",
                        latency,
                        throughput,
                        value
                    );
                }
            }
        }
    }

    #[test]
    fn test_normalize_edges() {
        assert_eq!(normalize(-1.0, 2.0), 0.0);
        assert_eq!(normalize(4.0, 2.0), 1.0);
        assert_eq!(normalize(1.0, 2.0), 0.5);
        assert_eq!(normalize(f64::NAN, 2.0), 0.0);
    }

    #[test]
    fn test_observation_wire_names() {
        let builder = ObservationBuilder::new(config(1.5, 1.0, 3.0));
        let obs = builder.build(&metrics(3.0, 2.0, Some(0.5)), 3).unwrap();
        let json = serde_json::to_value(obs).unwrap();
        for key in [
            "n_instances",
            "workload",
            "utilization",
            "pressure",
            "queue_length_dominant",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
