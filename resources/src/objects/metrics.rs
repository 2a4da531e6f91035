use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Serialize, Deserialize, Hash, Clone, Copy, Eq, PartialEq, Display)]
pub enum Resource {
    CPU,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
/// Metrics of containers in a pod, fetched from the orchestrator's metrics
/// API by the built-in resource scalers (CPU/memory).
pub struct PodMetrics {
    pub name: String,
    pub timestamp: NaiveDateTime,
    /// Duration in seconds over which the metrics were gathered.
    pub window: u32,
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContainerMetrics {
    pub name: String,
    pub usage: HashMap<Resource, i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
/// An overall summary of PodMetrics, reduced to a single value per pod.
pub struct PodMetric {
    pub timestamp: NaiveDateTime,
    pub window: u32,
    pub value: i64,
}

/// A mapping from pod names to metrics.
pub type PodMetricsInfo = HashMap<String, PodMetric>;

/// The currency every Scaler sample and the Fallback Engine's synthetic
/// values are expressed in: milli-units, matching the orchestrator's
/// decimal-SI quantity format (§4.5).
pub const MILLI_SCALE: i64 = 1000;

/// One named-metric sample as returned by `Scaler::get_metrics_and_activity`
/// and as served by the Metric Adapter Service (§4.1, §4.7).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub metric_name: String,
    /// Milli-units (§4.5).
    pub value: i64,
    pub timestamp: NaiveDateTime,
}

impl MetricSample {
    pub fn new(metric_name: impl Into<String>, value: i64, timestamp: NaiveDateTime) -> Self {
        Self {
            metric_name: metric_name.into(),
            value,
            timestamp,
        }
    }
}
