use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::RwLock;
use resources::objects::{
    metrics::MetricSample,
    scaling_intent::{FallbackPolicy, MetricType, Trigger},
};
use scalers::{Scaler, ScalerContext, ScalerError};
use tokio_util::sync::CancellationToken;

use crate::{fallback, naming};

pub struct ScalerEntry {
    pub index: usize,
    pub trigger: Trigger,
    pub scaler: Box<dyn Scaler>,
}

impl ScalerEntry {
    fn external_name(&self) -> String {
        naming::external_metric_name(self.index, &self.trigger)
    }

    fn metric_type(&self) -> MetricType {
        self.trigger.metric_type.unwrap_or(MetricType::AverageValue)
    }
}

/// One trigger's metric spec as it should appear on the rendered child
/// autoscaler (§4.2 `getMetricSpecForScaling`): its canonical external
/// name, the configured target in plain (non-milli) units, and the
/// metric-type to render the target as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMetricSpec {
    pub metric_name: String,
    pub target: i64,
    pub metric_type: MetricType,
}

/// Outcome of fanning out `GetMetricsAndActivity` over every trigger in one
/// Intent (§4.1/§4.2): per-metric samples where the Scaler (or the Fallback
/// Engine standing in for it) succeeded, and per-trigger errors where
/// neither could, so the caller can update each trigger's `MetricHealth`
/// independently rather than failing the whole reconcile on one bad
/// trigger.
#[derive(Default)]
pub struct ScalersCacheState {
    pub samples: HashMap<String, MetricSample>,
    pub active: bool,
    pub errors: Vec<(String, ScalerError)>,
    /// Metric names currently served from a Fallback Engine synthetic
    /// sample rather than a live Scaler read (§4.5 step 3: sets the
    /// Intent's Fallback condition to true).
    pub fell_back: Vec<String>,
}

/// One Intent's live Scaler set plus the last-known-good sample map a
/// pre-warming ticker keeps fresh for `useCachedMetrics` triggers (§4.2),
/// and the per-trigger consecutive-failure counters the Fallback Engine
/// needs (§4.5) — kept here rather than only in Intent status because the
/// Metric Adapter Service calls into this cache directly, off the
/// reconcile cycle, and must see the same failure history the Reconciler
/// does.
pub struct ScalersCache {
    entries: Vec<ScalerEntry>,
    fallback_policy: Option<FallbackPolicy>,
    last_sample: RwLock<HashMap<String, MetricSample>>,
    failures: RwLock<HashMap<String, u32>>,
    poll_interval: Duration,
    prewarm_cancel: CancellationToken,
}

impl ScalersCache {
    pub fn new(entries: Vec<ScalerEntry>) -> Self {
        Self::with_fallback(entries, None)
    }

    pub fn with_fallback(entries: Vec<ScalerEntry>, fallback_policy: Option<FallbackPolicy>) -> Self {
        Self::with_fallback_and_poll_interval(entries, fallback_policy, Duration::from_secs(30))
    }

    /// `poll_interval` is the Intent's `pollingIntervalSeconds`: the
    /// freshness window `get_metrics` accepts a `useCachedMetrics` trigger's
    /// pre-warmed sample within, and the period `spawn_prewarm` ticks at.
    pub fn with_fallback_and_poll_interval(
        entries: Vec<ScalerEntry>,
        fallback_policy: Option<FallbackPolicy>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            entries,
            fallback_policy,
            last_sample: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            poll_interval,
            prewarm_cancel: CancellationToken::new(),
        }
    }

    /// Whether any trigger asked for `useCachedMetrics` (§4.2) — the signal
    /// `CacheManager` uses to decide whether this cache's identity needs a
    /// `spawn_prewarm` ticker at all.
    pub fn needs_prewarm(&self) -> bool {
        self.entries.iter().any(|e| e.trigger.use_cached_metrics)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metric specs for every live trigger, in trigger order (§4.2
    /// `getMetricSpecForScaling`), consumed by the renderer instead of
    /// hardcoded per-metric-type defaults.
    pub fn metric_specs(&self) -> Vec<RenderedMetricSpec> {
        self.entries
            .iter()
            .map(|entry| RenderedMetricSpec {
                metric_name: entry.external_name(),
                target: entry.scaler.target_value(),
                metric_type: entry.metric_type(),
            })
            .collect()
    }

    /// Looks up the Scaler contributing `metric_name` and calls it; on
    /// failure, defers to the Fallback Engine rather than propagating the
    /// error directly (§4.2 `getMetrics`, §4.5). Returns the sample plus
    /// whether it was synthesized.
    pub async fn get_metrics(
        &self,
        metric_name: &str,
        current_replicas: u32,
        cancel: &CancellationToken,
    ) -> Result<(MetricSample, bool), ScalerError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.external_name() == metric_name)
            .ok_or_else(|| ScalerError::UnknownType(metric_name.to_string()))?;

        // §4.2: a `useCachedMetrics` trigger returns the last pre-warmed
        // sample instead of issuing a live Scaler call, as long as
        // `spawn_prewarm` refreshed it within the polling interval.
        if entry.trigger.use_cached_metrics {
            if let Some(sample) = self.fresh_cached_sample(metric_name) {
                return Ok((sample, false));
            }
        }

        let ctx = ScalerContext {
            trigger_name: entry
                .trigger
                .name
                .as_deref()
                .unwrap_or(entry.trigger.type_.as_str()),
            metadata: &entry.trigger.metadata,
            auth: None,
            cancel,
        };

        match entry.scaler.get_metrics(metric_name, &ctx).await {
            Ok(sample) => {
                self.failures.write().insert(metric_name.to_string(), 0);
                self.last_sample
                    .write()
                    .insert(metric_name.to_string(), sample.clone());
                Ok((sample, false))
            }
            Err(error) => {
                let policy = match &self.fallback_policy {
                    Some(policy) => policy,
                    None => return Err(error),
                };
                let consecutive_failures = {
                    let mut failures = self.failures.write();
                    let count = failures.entry(metric_name.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                match fallback::synthesize(
                    policy,
                    entry.metric_type(),
                    consecutive_failures,
                    current_replicas,
                    entry.scaler.target_value(),
                    metric_name,
                    Utc::now().naive_utc(),
                ) {
                    Some(sample) => {
                        self.last_sample
                            .write()
                            .insert(metric_name.to_string(), sample.clone());
                        Ok((sample, true))
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// Fans out across every trigger's Scaler concurrently, matching the
    /// teacher's `ReplicaCalculator` style of fetching every pod's metrics up
    /// front rather than serially — generalized here from sequential
    /// `.await`s to a `join_all` over one future per trigger, since triggers
    /// are independent of each other.
    pub async fn get_state(
        &self,
        current_replicas: u32,
        cancel: &CancellationToken,
    ) -> ScalersCacheState {
        let calls = self.entries.iter().map(|entry| async move {
            let name = entry.external_name();
            let ctx = ScalerContext {
                trigger_name: entry
                    .trigger
                    .name
                    .as_deref()
                    .unwrap_or(entry.trigger.type_.as_str()),
                metadata: &entry.trigger.metadata,
                auth: None,
                cancel,
            };
            let active = entry.scaler.is_active(&ctx).await;
            let metrics = self.get_metrics(&name, current_replicas, cancel).await;
            (name, active, metrics)
        });

        let results = join_all(calls).await;

        let mut state = ScalersCacheState::default();
        for (name, active, metrics) in results {
            match active {
                Ok(true) => state.active = true,
                Ok(false) => {}
                Err(e) => state.errors.push((name.clone(), e)),
            }
            match metrics {
                Ok((sample, fell_back)) => {
                    if fell_back {
                        state.fell_back.push(name.clone());
                    }
                    state.samples.insert(name, sample);
                }
                Err(e) => state.errors.push((name, e)),
            }
        }

        state
    }

    pub fn cached_sample(&self, metric_name: &str) -> Option<MetricSample> {
        self.last_sample.read().get(metric_name).cloned()
    }

    fn fresh_cached_sample(&self, metric_name: &str) -> Option<MetricSample> {
        let sample = self.cached_sample(metric_name)?;
        let age_seconds = (Utc::now().naive_utc() - sample.timestamp).num_seconds();
        if age_seconds >= 0 && (age_seconds as u64) < self.poll_interval.as_secs() {
            Some(sample)
        } else {
            None
        }
    }

    /// Releases every live Scaler (§4.2 `close`, §8: "first cache's
    /// Scalers all had `Close` invoked exactly once"). Idempotent since
    /// `Scaler::close` itself is required to be. Also stops this cache's
    /// `spawn_prewarm` ticker, if one is running, so an evicted cache's
    /// background task doesn't keep the Arc alive forever.
    pub fn close(&self) {
        self.prewarm_cancel.cancel();
        for entry in &self.entries {
            entry.scaler.close();
        }
    }

    /// Spawns the background ticker that keeps `cached_sample` fresh for
    /// triggers marked `useCachedMetrics`, polling at this cache's configured
    /// interval regardless of whether a reconcile or adapter request is in
    /// flight. `CacheManager` spawns this once per built cache that
    /// `needs_prewarm`, and `close` cancels it.
    pub fn spawn_prewarm(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let cancel = self.prewarm_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let inner_cancel = CancellationToken::new();
                        self.get_state(0, &inner_cancel).await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use resources::objects::scaling_intent::{FallbackBehavior, MetricType};

    use super::*;

    struct AlwaysFailScaler {
        target: i64,
    }

    #[async_trait::async_trait]
    impl Scaler for AlwaysFailScaler {
        fn metric_names(&self) -> Vec<String> {
            vec!["unused".to_string()]
        }

        fn target_value(&self) -> i64 {
            self.target
        }

        async fn is_active(&self, _ctx: &ScalerContext<'_>) -> Result<bool, ScalerError> {
            Ok(false)
        }

        async fn get_metrics(
            &self,
            _metric_name: &str,
            _ctx: &ScalerContext<'_>,
        ) -> Result<MetricSample, ScalerError> {
            Err(ScalerError::Transient {
                type_: "test".to_string(),
                source: anyhow::anyhow!("boom"),
            })
        }
    }

    fn trigger(name: &str) -> Trigger {
        Trigger {
            type_: "metrics-api".to_string(),
            metadata: Default::default(),
            authentication_ref: None,
            metric_type: Some(MetricType::AverageValue),
            name: Some(name.to_string()),
            use_cached_metrics: false,
        }
    }

    struct CountingScaler {
        target: i64,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Scaler for CountingScaler {
        fn metric_names(&self) -> Vec<String> {
            vec!["unused".to_string()]
        }

        fn target_value(&self) -> i64 {
            self.target
        }

        async fn is_active(&self, _ctx: &ScalerContext<'_>) -> Result<bool, ScalerError> {
            Ok(true)
        }

        async fn get_metrics(
            &self,
            metric_name: &str,
            _ctx: &ScalerContext<'_>,
        ) -> Result<MetricSample, ScalerError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(MetricSample::new(metric_name, 42, Utc::now().naive_utc()))
        }
    }

    #[tokio::test]
    async fn propagates_error_when_no_fallback_configured() {
        let cache = ScalersCache::new(vec![ScalerEntry {
            index: 0,
            trigger: trigger("queue"),
            scaler: Box::new(AlwaysFailScaler { target: 10 }),
        }]);
        let cancel = CancellationToken::new();
        let name = naming::external_metric_name(0, &trigger("queue"));
        assert!(cache.get_metrics(&name, 4, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn synthesizes_once_threshold_crossed() {
        let policy = FallbackPolicy {
            failure_threshold: 2,
            replicas: 10,
            behavior: FallbackBehavior::CurrentReplicasIfHigher,
        };
        let cache = ScalersCache::with_fallback(
            vec![ScalerEntry {
                index: 0,
                trigger: trigger("queue"),
                scaler: Box::new(AlwaysFailScaler { target: 10 }),
            }],
            Some(policy),
        );
        let cancel = CancellationToken::new();
        let name = naming::external_metric_name(0, &trigger("queue"));

        assert!(cache.get_metrics(&name, 4, &cancel).await.is_err());
        let (sample, fell_back) = cache.get_metrics(&name, 4, &cancel).await.unwrap();
        assert!(fell_back);
        assert_eq!(sample.value, 100_000);
    }

    fn cached_trigger(name: &str) -> Trigger {
        Trigger {
            use_cached_metrics: true,
            ..trigger(name)
        }
    }

    #[tokio::test]
    async fn a_trigger_without_use_cached_metrics_always_calls_the_live_scaler() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cache = ScalersCache::new(vec![ScalerEntry {
            index: 0,
            trigger: trigger("queue"),
            scaler: Box::new(CountingScaler {
                target: 10,
                calls: calls.clone(),
            }),
        }]);
        let cancel = CancellationToken::new();
        let name = naming::external_metric_name(0, &trigger("queue"));

        cache.get_metrics(&name, 4, &cancel).await.unwrap();
        cache.get_metrics(&name, 4, &cancel).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    /// §4.2: once a sample has been pre-warmed, a `useCachedMetrics` trigger
    /// is served from it instead of hitting the Scaler again.
    #[tokio::test]
    async fn use_cached_metrics_reuses_a_fresh_prewarmed_sample() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cache = ScalersCache::with_fallback_and_poll_interval(
            vec![ScalerEntry {
                index: 0,
                trigger: cached_trigger("queue"),
                scaler: Box::new(CountingScaler {
                    target: 10,
                    calls: calls.clone(),
                }),
            }],
            None,
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let name = naming::external_metric_name(0, &cached_trigger("queue"));

        cache.get_metrics(&name, 4, &cancel).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // the cached sample from the first call is still fresh, so this
        // second call is served from it rather than the live scaler.
        cache.get_metrics(&name, 4, &cancel).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn use_cached_metrics_falls_back_to_a_live_call_once_the_sample_is_stale() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cache = ScalersCache::with_fallback_and_poll_interval(
            vec![ScalerEntry {
                index: 0,
                trigger: cached_trigger("queue"),
                scaler: Box::new(CountingScaler {
                    target: 10,
                    calls: calls.clone(),
                }),
            }],
            None,
            Duration::from_secs(30),
        );
        let name = naming::external_metric_name(0, &cached_trigger("queue"));

        // seed a stale sample directly, as if spawn_prewarm ran a while ago.
        cache.last_sample.write().insert(
            name.clone(),
            MetricSample::new(&name, 7, Utc::now().naive_utc() - chrono::Duration::seconds(31)),
        );

        let cancel = CancellationToken::new();
        cache.get_metrics(&name, 4, &cancel).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn needs_prewarm_reflects_whether_any_trigger_opted_in() {
        let plain = ScalersCache::new(vec![ScalerEntry {
            index: 0,
            trigger: trigger("queue"),
            scaler: Box::new(AlwaysFailScaler { target: 1 }),
        }]);
        assert!(!plain.needs_prewarm());

        let cached = ScalersCache::new(vec![ScalerEntry {
            index: 0,
            trigger: cached_trigger("queue"),
            scaler: Box::new(AlwaysFailScaler { target: 1 }),
        }]);
        assert!(cached.needs_prewarm());
    }
}
