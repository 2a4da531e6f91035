use std::collections::HashMap;

use async_trait::async_trait;
use resources::objects::metrics::MetricSample;
use tokio_util::sync::CancellationToken;

use crate::{credential::ResolvedAuth, error::ScalerError};

/// Per-call context a Scaler needs: its own resolved trigger metadata,
/// whatever credentials its authentication reference resolved to, and a
/// cancellation token tied to the Reconciler's 60s reconcile deadline or the
/// Metric Adapter Service's request lifetime (§5).
pub struct ScalerContext<'a> {
    pub trigger_name: &'a str,
    pub metadata: &'a HashMap<String, String>,
    pub auth: Option<&'a ResolvedAuth>,
    pub cancel: &'a CancellationToken,
}

/// One external metric source (§4.1). Implementations are constructed by a
/// `Factory` (see `registry`) from a trigger's type tag and resolved
/// metadata/authentication, and are otherwise stateless between calls —
/// any polling cadence or connection pooling lives behind the
/// implementation's own fields, never in the trait.
#[async_trait]
pub trait Scaler: Send + Sync {
    /// Metric names this trigger exposes, in the order the Scalers Cache
    /// should request them. Most triggers expose exactly one.
    fn metric_names(&self) -> Vec<String>;

    /// The target quantity this trigger's metric is evaluated against,
    /// in plain (non-milli) units (§4.1 `GetMetricSpecForScaling`). Pure,
    /// no I/O — used both to render the child autoscaler's metric target
    /// and, via the Fallback Engine, to compute a synthetic sample.
    fn target_value(&self) -> i64;

    /// Whether the source currently has work pending — drives the Scaling
    /// Executor's 0-to-minReplicas activation decision (§4.4).
    async fn is_active(&self, ctx: &ScalerContext<'_>) -> Result<bool, ScalerError>;

    /// Current value for one of `metric_names()`.
    async fn get_metrics(
        &self,
        metric_name: &str,
        ctx: &ScalerContext<'_>,
    ) -> Result<MetricSample, ScalerError>;

    /// Releases any held resources (connections, subscriptions). No-op by
    /// default since most built-in scalers are stateless HTTP clients.
    fn close(&self) {}
}
