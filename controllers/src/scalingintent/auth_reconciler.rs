use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Result;
use futures_delay_queue::{delay_queue, DelayQueue};
use futures_intrusive::{buffer::GrowingHeapBuf, channel::shared::GenericReceiver};
use parking_lot::RawMutex;
use resources::{
    config::ClusterConfig,
    informer::{EventHandler, Informer, ResyncHandler, Store},
    objects::{scaling_intent::ScalingIntent, trigger_auth::TriggerAuthentication, Object},
};
use tokio::{
    select,
    sync::mpsc::{self, Receiver, Sender},
    task::JoinHandle,
};

use controllers::orchestrator_client::{create_lister_watcher, OrchestratorClient};

const SYNC_PERIOD: u64 = 30;

#[derive(Debug)]
struct ResyncNotification;

/// Keeps `TriggerAuthentication::FINALIZER` installed on an Authentication
/// Object for exactly as long as some Intent still references it, mirroring
/// the teacher's own finalizer-management reconcilers: one informer per
/// watched kind plus a retry work queue, just scoped to a single field
/// instead of a whole child resource.
pub struct AuthReconciler {
    rx: Receiver<String>,
    resync_rx: Receiver<ResyncNotification>,
    auth_informer: Option<JoinHandle<Result<()>>>,
    auth_store: Store<TriggerAuthentication>,
    intent_store: Store<ScalingIntent>,
    client: Arc<OrchestratorClient>,

    work_queue: DelayQueue<String, GrowingHeapBuf<String>>,
    work_queue_rx: GenericReceiver<RawMutex, String, GrowingHeapBuf<String>>,
    in_queue: HashSet<String>,
}

impl AuthReconciler {
    pub fn new(config: &ClusterConfig) -> Self {
        let (tx, rx) = mpsc::channel::<String>(64);
        let (resync_tx, resync_rx) = mpsc::channel::<ResyncNotification>(16);

        let auth_informer = Self::create_auth_informer(config, tx.clone(), resync_tx.clone());
        let auth_store = auth_informer.get_store();
        let intent_informer = Self::create_intent_informer(config, resync_tx);
        let intent_store = intent_informer.get_store();

        let auth_informer = tokio::spawn(async move { auth_informer.run().await });
        tokio::spawn(async move { intent_informer.run().await });

        let (work_queue, work_queue_rx) = delay_queue::<String>();

        Self {
            rx,
            resync_rx,
            auth_informer: Some(auth_informer),
            auth_store,
            intent_store,
            client: Arc::new(OrchestratorClient::new(config)),
            work_queue,
            work_queue_rx,
            in_queue: HashSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("authentication reconciler started");
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
                    let object = self.auth_store.read().await.get(&key).cloned();
                    if let Some(auth) = object {
                        match self.reconcile(&auth).await {
                            Ok(_) => tracing::info!(auth = %key, "reconciled"),
                            Err(e) => tracing::error!(auth = %key, error = %e, "reconcile failed"),
                        }
                        self.enqueue_after(&key, Duration::from_secs(SYNC_PERIOD));
                    }
                }
                else => break,
            }
        }

        if let Some(handle) = self.auth_informer.take() {
            handle.await??;
        }
        Ok(())
    }

    async fn reconcile(&self, auth: &TriggerAuthentication) -> Result<()> {
        let referenced = self.is_referenced(auth).await;
        let has_finalizer = auth.has_finalizer();

        if referenced && !has_finalizer {
            let mut finalizers = auth.metadata.finalizers.clone();
            finalizers.push(TriggerAuthentication::FINALIZER.to_string());
            self.patch_finalizers(auth, finalizers).await?;
        } else if !referenced && has_finalizer {
            let finalizers: Vec<String> = auth
                .metadata
                .finalizers
                .iter()
                .filter(|f| f.as_str() != TriggerAuthentication::FINALIZER)
                .cloned()
                .collect();
            self.patch_finalizers(auth, finalizers).await?;
        }
        Ok(())
    }

    /// True if any known Intent's `authenticationRef` resolves to this
    /// object: a namespaced reference must match the Intent's own
    /// namespace, a cluster-scoped one matches regardless (§3).
    async fn is_referenced(&self, auth: &TriggerAuthentication) -> bool {
        let store = self.intent_store.read().await;
        store.values().any(|intent| {
            intent.spec.triggers.iter().any(|trigger| match &trigger.authentication_ref {
                Some(auth_ref) if auth_ref.name == auth.metadata.name => {
                    auth_ref.cluster_scoped == auth.is_cluster_scoped()
                        && (auth.is_cluster_scoped() || intent.metadata.namespace == auth.metadata.namespace)
                }
                _ => false,
            })
        })
    }

    async fn patch_finalizers(&self, auth: &TriggerAuthentication, finalizers: Vec<String>) -> Result<()> {
        let path = format!(
            "triggerauthentications/{}/{}",
            auth.metadata.namespace, auth.metadata.name
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
        let store = self.auth_store.read().await;
        for auth in store.values() {
            let key = auth.key();
            if !self.in_queue.contains(&key) {
                self.in_queue.insert(key.clone());
                self.work_queue.insert_at(key, std::time::Instant::now());
            }
        }
    }

    fn create_auth_informer(
        config: &ClusterConfig,
        tx: Sender<String>,
        resync_tx: Sender<ResyncNotification>,
    ) -> Informer<TriggerAuthentication> {
        let lw = create_lister_watcher(config, "triggerauthentications");
        let tx_add = tx;
        let tx_update = tx_add.clone();
        let eh = EventHandler::<TriggerAuthentication> {
            add_cls: Box::new(move |new| {
                let tx_add = tx_add.clone();
                Box::pin(async move {
                    tx_add.send(new.key()).await?;
                    Ok(())
                })
            }),
            update_cls: Box::new(move |(_, new)| {
                let tx_update = tx_update.clone();
                Box::pin(async move {
                    tx_update.send(new.key()).await?;
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

    /// Read-only: Intent churn only ever changes which auth objects are
    /// referenced, so any add/update/delete just triggers a full recheck of
    /// every known Authentication Object rather than chasing references
    /// through individual events.
    fn create_intent_informer(
        config: &ClusterConfig,
        resync_tx: Sender<ResyncNotification>,
    ) -> Informer<ScalingIntent> {
        let lw = create_lister_watcher(config, "scalingintents");
        let tx_add = resync_tx;
        let tx_update = tx_add.clone();
        let tx_delete = tx_add.clone();
        let eh = EventHandler::<ScalingIntent> {
            add_cls: Box::new(move |_| {
                let tx_add = tx_add.clone();
                Box::pin(async move {
                    tx_add.send(ResyncNotification).await?;
                    Ok(())
                })
            }),
            update_cls: Box::new(move |(_, _)| {
                let tx_update = tx_update.clone();
                Box::pin(async move {
                    tx_update.send(ResyncNotification).await?;
                    Ok(())
                })
            }),
            delete_cls: Box::new(move |_| {
                let tx_delete = tx_delete.clone();
                Box::pin(async move {
                    tx_delete.send(ResyncNotification).await?;
                    Ok(())
                })
            }),
        };
        let rh = ResyncHandler(Box::new(move |()| Box::pin(async move { Ok(()) })));
        Informer::new(lw, eh, rh)
    }
}
