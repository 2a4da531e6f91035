use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use autoscaling_core::{
    executor::{self, ExecutorDecision, ExecutorInputs},
    naming, render, status, CacheManager, ScalersCache,
};
use chrono::Local;
use futures_delay_queue::{delay_queue, DelayQueue};
use futures_intrusive::{buffer::GrowingHeapBuf, channel::shared::GenericReceiver};
use parking_lot::RawMutex;
use resources::{
    informer::{EventHandler, Informer, ResyncHandler, Store},
    objects::{
        child_autoscaler::ChildAutoscaler,
        metrics::MILLI_SCALE,
        object_reference::ScaleTargetKind,
        replica_set::ReplicaSet,
        scaling_intent::{ConditionStatus, ConditionType, ScalingIntent},
        Object,
    },
};
use scalers::ScalerRegistry;
use tokio::{
    select,
    sync::mpsc::{self, Receiver, Sender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use controllers::{
    cache_builder,
    orchestrator_client::{create_lister_watcher, OrchestratorClient},
};

/// How long a reconcile is allowed to take before its Scaler calls are
/// cancelled (§5).
const RECONCILE_DEADLINE: Duration = Duration::from_secs(60);
const SYNC_PERIOD: u64 = 15;

#[derive(Debug)]
struct ResyncNotification;

/// Drives the Intent informer and its reconcile work queue, the same shape
/// as the teacher's `PodAutoscaler`: one informer per watched kind, a
/// `futures_delay_queue`-backed retry queue, and a `select!` loop
/// multiplexing "new event" against "scheduled reconcile" against "resync".
pub struct IntentReconciler {
    rx: Receiver<String>,
    resync_rx: Receiver<ResyncNotification>,
    intent_informer: Option<JoinHandle<Result<()>>>,
    intent_store: Store<ScalingIntent>,
    child_store: Store<ChildAutoscaler>,

    cache_manager: Arc<CacheManager>,
    registry: Arc<ScalerRegistry>,
    client: Arc<OrchestratorClient>,

    work_queue: DelayQueue<String, GrowingHeapBuf<String>>,
    work_queue_rx: GenericReceiver<RawMutex, String, GrowingHeapBuf<String>>,
    in_queue: HashSet<String>,
}

impl IntentReconciler {
    pub fn new(config: &resources::config::ClusterConfig) -> Self {
        let (tx, rx) = mpsc::channel::<String>(64);
        let (resync_tx, resync_rx) = mpsc::channel::<ResyncNotification>(16);

        let intent_informer = Self::create_intent_informer(config, tx, resync_tx);
        let intent_store = intent_informer.get_store();
        let child_informer = Self::create_child_informer(config);
        let child_store = child_informer.get_store();

        let intent_informer = tokio::spawn(async move { intent_informer.run().await });
        tokio::spawn(async move { child_informer.run().await });

        let (work_queue, work_queue_rx) = delay_queue::<String>();

        Self {
            rx,
            resync_rx,
            intent_informer: Some(intent_informer),
            intent_store,
            child_store,
            cache_manager: Arc::new(CacheManager::new()),
            registry: Arc::new(ScalerRegistry::new()),
            client: Arc::new(OrchestratorClient::new(config)),
            work_queue,
            work_queue_rx,
            in_queue: HashSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("scaling intent reconciler started");
        loop {
            select! {
                Some(key) = self.rx.recv() => {
                    self.enqueue_now(key);
                }
                Some(_) = self.resync_rx.recv() => {
                    self.handle_resync().await;
                }
                Some(key) = self.work_queue_rx.receive() => {
                    self.in_queue.remove(&key);
                    let object = self.intent_store.read().await.get(&key).cloned();
                    match object {
                        Some(intent) => {
                            match self.reconcile(&intent).await {
                                Ok(_) => tracing::info!(intent = %key, "reconciled"),
                                Err(e) => tracing::error!(intent = %key, error = %e, "reconcile failed"),
                            }
                            self.enqueue_after(&key, Duration::from_secs(SYNC_PERIOD));
                        }
                        None => {
                            tracing::info!(intent = %key, "intent deleted");
                            self.cache_manager.invalidate(&key);
                        }
                    }
                }
                else => break,
            }
        }

        if let Some(handle) = self.intent_informer.take() {
            handle.await??;
        }
        Ok(())
    }

    async fn reconcile(&self, intent: &ScalingIntent) -> Result<()> {
        let key = intent.key();

        if intent.metadata.deletion_timestamp.is_some() {
            self.cache_manager.invalidate(&key);
            if intent.has_finalizer() {
                self.remove_finalizer(intent).await?;
            }
            return Ok(());
        }
        if !intent.has_finalizer() {
            self.add_finalizer(intent).await?;
        }

        autoscaling_core::validate::validate_intent(&intent.metadata.name, &intent.spec)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let registry = &self.registry;
        let cache = match self
            .cache_manager
            .get_or_build(&key, || async move { cache_builder::build_cache(registry, intent) })
            .await
        {
            Ok(cache) => cache,
            Err(e) => {
                // §4.3/§7 CachePartial: construction failed mid-way, so the
                // cache entry is never published; report Ready=False and
                // wait for the next tick rather than reconciling against a
                // partial Scaler set.
                tracing::warn!(intent = %key, error = %e, "scalers cache construction failed");
                return self.report_cache_error(intent, &e.to_string()).await;
            }
        };

        if ScaleTargetKind::from_kind_str(&intent.spec.scale_target_ref.kind) == ScaleTargetKind::JobTemplate {
            return self.reconcile_job_template(intent, &cache).await;
        }

        let target_path = format!(
            "{}s/{}",
            intent.spec.scale_target_ref.kind.to_lowercase(),
            intent.spec.scale_target_ref.name
        );
        let target: ReplicaSet = self.client.get(&target_path).await?;
        let current_replicas = target.spec.replicas;

        let cancel = CancellationToken::new();
        let state = tokio::time::timeout(
            RECONCILE_DEADLINE,
            cache.get_state(current_replicas, &cancel),
        )
        .await
        .context("reconcile deadline exceeded")?;

        let child_name = naming::child_autoscaler_name(intent);
        let child_key = format!("{}/{}", intent.metadata.namespace, child_name);
        let existing_child = self.child_store.read().await.get(&child_key).cloned();

        // §4.6 step 8 / §8 scenario 2: if the rendered name no longer
        // matches what was last written to status, the old child can't be
        // renamed in place and must be deleted before the new one exists.
        if let Some(previous_name) = intent.status.as_ref().and_then(|s| s.hpa_name.as_deref()) {
            if previous_name != child_name {
                let old_path = format!("childautoscalers/{}/{}", intent.metadata.namespace, previous_name);
                self.client.delete(&old_path).await?;
            }
        }

        let executor_inputs = ExecutorInputs {
            is_active: state.active,
            current_replicas,
            min_replica_count: intent.spec.min_replica_count,
            max_replica_count: intent.spec.max_replica_count,
            idle_replica_count: intent.spec.idle_replica_count,
            paused: intent
                .metadata
                .annotations
                .get("scaling-intent/paused")
                .map(|v| v != "false"),
            paused_replica_count_annotation: intent
                .metadata
                .annotations
                .get("scaling-intent/paused-replicas")
                .and_then(|v| v.parse().ok()),
            cooldown_period_seconds: intent.spec.cooldown_period_seconds,
            last_active_time: intent.status.as_ref().and_then(|s| s.last_active_time),
            now: Local::now().naive_utc(),
        };
        let decision = executor::decide(&executor_inputs);

        // §4.4: pin-to-zero, idle-pin and release-from-zero all bypass the
        // child HPA — it cannot itself cross the zero boundary (§1
        // Non-goals: replica arithmetic is delegated to it, not owned
        // here) — so this writes the target's replica count directly
        // rather than relying on the rendered child's min/max band.
        if let Some(target_replicas) = decision.direct_scale_to {
            if target_replicas != current_replicas {
                self.client
                    .patch(
                        &target_path,
                        &serde_json::json!({ "spec": { "replicas": target_replicas } }),
                    )
                    .await?;
            }
        } else if decision.state != executor::ExecutorState::PausedPinned {
            // §4.4 `PausedPinned → Steady`: restore the saved original
            // replica count, one time, when the pause annotation is
            // removed and the Intent opted into restoring it.
            let original = intent.status.as_ref().and_then(|s| s.original_replica_count);
            if let (Some(original), true) = (
                original,
                intent.spec.advanced.restore_to_original_replica_count,
            ) {
                if original != current_replicas {
                    self.client
                        .patch(
                            &target_path,
                            &serde_json::json!({ "spec": { "replicas": original } }),
                        )
                        .await?;
                }
            }
        }

        let metric_specs = cache.metric_specs();
        let desired_child = render::render(intent, &decision, &metric_specs);
        let needs_write = match &existing_child {
            Some(existing) => render::needs_patch(existing, &desired_child),
            None => true,
        };
        if needs_write {
            let path = format!(
                "childautoscalers/{}/{}",
                desired_child.metadata.namespace, desired_child.metadata.name
            );
            self.client.put(&path, &desired_child).await?;
        }

        let external_metric_names: Vec<String> = intent
            .spec
            .triggers
            .iter()
            .enumerate()
            .map(|(i, trigger)| naming::external_metric_name(i, trigger))
            .collect();

        let new_status = status::apply_tick(
            intent.status.clone().unwrap_or_default(),
            &decision,
            state.active,
            child_name,
            external_metric_names,
            &state.errors,
            &state.fell_back,
            Local::now().naive_utc(),
        );
        let status_path = format!(
            "scalingintents/{}/{}/status",
            intent.metadata.namespace, intent.metadata.name
        );
        self.client.patch(&status_path, &new_status).await?;

        Ok(())
    }

    /// Job-template scale targets never get a rendered child autoscaler
    /// (§4.4): the executor instead computes how many new job instances to
    /// create from the aggregate queue length and per-pod target, then the
    /// Reconciler issues that creation directly.
    async fn reconcile_job_template(&self, intent: &ScalingIntent, cache: &ScalersCache) -> Result<()> {
        let cancel = CancellationToken::new();
        let state = tokio::time::timeout(RECONCILE_DEADLINE, cache.get_state(0, &cancel))
            .await
            .context("reconcile deadline exceeded")?;

        let queue_length: i64 = state.samples.values().map(|s| s.value).sum();
        let target_per_pod: i64 = cache
            .metric_specs()
            .iter()
            .map(|spec| spec.target * MILLI_SCALE)
            .sum();
        let job_count = executor::decide_job_count(queue_length, target_per_pod, intent.spec.max_replica_count);

        if job_count > 0 {
            let path = format!(
                "jobtemplates/{}/{}/instances",
                intent.metadata.namespace, intent.spec.scale_target_ref.name
            );
            self.client.instantiate_jobs(&path, job_count).await?;
        }

        let external_metric_names: Vec<String> = intent
            .spec
            .triggers
            .iter()
            .enumerate()
            .map(|(i, trigger)| naming::external_metric_name(i, trigger))
            .collect();

        let decision = ExecutorDecision {
            state: if job_count > 0 {
                executor::ExecutorState::Active
            } else {
                executor::ExecutorState::Zero
            },
            effective_min_replicas: 0,
            effective_max_replicas: intent.spec.max_replica_count,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: None,
            paused_replica_count: None,
        };

        let previous_hpa_name = intent
            .status
            .as_ref()
            .and_then(|s| s.hpa_name.clone())
            .unwrap_or_default();
        let new_status = status::apply_tick(
            intent.status.clone().unwrap_or_default(),
            &decision,
            job_count > 0,
            previous_hpa_name,
            external_metric_names,
            &state.errors,
            &state.fell_back,
            Local::now().naive_utc(),
        );
        let status_path = format!(
            "scalingintents/{}/{}/status",
            intent.metadata.namespace, intent.metadata.name
        );
        self.client.patch(&status_path, &new_status).await?;

        Ok(())
    }

    /// §7 CachePartial: sets `Ready=False` with the construction error as
    /// the reason, via the same single-PATCH status write every other
    /// reconcile path uses (§4.6 step 9).
    async fn report_cache_error(&self, intent: &ScalingIntent, reason: &str) -> Result<()> {
        let mut status = intent.status.clone().unwrap_or_default();
        status.set_condition(ConditionType::Ready, ConditionStatus::False, reason, Local::now().naive_utc());
        let status_path = format!(
            "scalingintents/{}/{}/status",
            intent.metadata.namespace, intent.metadata.name
        );
        self.client.patch(&status_path, &status).await
    }

    /// §4.6 step 3: installs `ScalingIntent::FINALIZER` so the Reconciler
    /// is guaranteed a chance to clear the Cache Manager entry before the
    /// object is actually removed.
    async fn add_finalizer(&self, intent: &ScalingIntent) -> Result<()> {
        let mut finalizers = intent.metadata.finalizers.clone();
        finalizers.push(ScalingIntent::FINALIZER.to_string());
        self.patch_finalizers(intent, finalizers).await
    }

    /// §4.6 step 2: removes the finalizer once the Cache Manager entry has
    /// been cleared, letting the delete proceed.
    async fn remove_finalizer(&self, intent: &ScalingIntent) -> Result<()> {
        let finalizers: Vec<String> = intent
            .metadata
            .finalizers
            .iter()
            .filter(|f| f.as_str() != ScalingIntent::FINALIZER)
            .cloned()
            .collect();
        self.patch_finalizers(intent, finalizers).await
    }

    async fn patch_finalizers(&self, intent: &ScalingIntent, finalizers: Vec<String>) -> Result<()> {
        let path = format!(
            "scalingintents/{}/{}",
            intent.metadata.namespace, intent.metadata.name
        );
        self.client
            .patch(&path, &serde_json::json!({ "metadata": { "finalizers": finalizers } }))
            .await
    }

    fn enqueue_now(&mut self, key: String) {
        self.in_queue.insert(key.clone());
        self.work_queue.insert_at(key, std::time::Instant::now());
    }

    fn enqueue_after(&mut self, key: &str, delay: Duration) {
        if !self.in_queue.contains(key) {
            self.work_queue.insert(key.to_string(), delay);
        }
    }

    async fn handle_resync(&mut self) {
        let store = self.intent_store.read().await;
        for intent in store.values() {
            let key = intent.key();
            if !self.in_queue.contains(&key) {
                self.in_queue.insert(key.clone());
                self.work_queue.insert_at(key, std::time::Instant::now());
            }
        }
    }

    fn create_intent_informer(
        config: &resources::config::ClusterConfig,
        tx: Sender<String>,
        resync_tx: Sender<ResyncNotification>,
    ) -> Informer<ScalingIntent> {
        let lw = create_lister_watcher(config, "scalingintents");
        let tx_add = tx;
        let tx_update = tx_add.clone();
        let eh = EventHandler::<ScalingIntent> {
            add_cls: Box::new(move |new| {
                let tx_add = tx_add.clone();
                Box::pin(async move {
                    tx_add.send(new.key()).await?;
                    Ok(())
                })
            }),
            update_cls: Box::new(move |(old, new)| {
                let tx_update = tx_update.clone();
                Box::pin(async move {
                    if old.spec != new.spec {
                        tx_update.send(new.key()).await?;
                    }
                    Ok(())
                })
            }),
            delete_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
        };
        let rh = ResyncHandler(Box::new(move |()| {
            let resync_tx = resync_tx.clone();
            Box::pin(async move {
                resync_tx.send(ResyncNotification).await?;
                Ok(())
            })
        }));
        Informer::new(lw, eh, rh)
    }

    fn create_child_informer(config: &resources::config::ClusterConfig) -> Informer<ChildAutoscaler> {
        let lw = create_lister_watcher(config, "childautoscalers");
        let eh = EventHandler::<ChildAutoscaler> {
            add_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
            update_cls: Box::new(move |(_, _)| Box::pin(async move { Ok(()) })),
            delete_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
        };
        let rh = ResyncHandler(Box::new(move |()| Box::pin(async move { Ok(()) })));
        Informer::new(lw, eh, rh)
    }
}
