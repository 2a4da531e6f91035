use resources::{
    config::ClusterConfig,
    informer::{EventHandler, Informer, ResyncHandler, Store},
    objects::{child_autoscaler::ChildAutoscaler, scaling_intent::ScalingIntent, Object},
};
use scalers::ScalerRegistry;
use serde::de::DeserializeOwned;

use autoscaling_core::CacheManager;
use controllers::orchestrator_client::create_lister_watcher;

/// Everything one request needs: read-only snapshots of Intents and Child
/// Autoscalers kept warm by their own informers, and the same Cache
/// Manager/registry shape the Reconciler uses, so an Intent this service
/// hasn't seen reconciled yet still gets a Scalers Cache built on first
/// request (§4.7 step 3).
pub struct AppState {
    pub intent_store: Store<ScalingIntent>,
    pub child_store: Store<ChildAutoscaler>,
    pub cache_manager: CacheManager,
    pub registry: ScalerRegistry,
}

impl AppState {
    pub fn new(config: &ClusterConfig) -> Self {
        let intent_informer = Self::create_passive_informer::<ScalingIntent>(config, "scalingintents");
        let intent_store = intent_informer.get_store();
        tokio::spawn(async move {
            if let Err(e) = intent_informer.run().await {
                tracing::error!(error = %e, "scaling intent informer stopped");
            }
        });

        let child_informer = Self::create_passive_informer::<ChildAutoscaler>(config, "childautoscalers");
        let child_store = child_informer.get_store();
        tokio::spawn(async move {
            if let Err(e) = child_informer.run().await {
                tracing::error!(error = %e, "child autoscaler informer stopped");
            }
        });

        Self {
            intent_store,
            child_store,
            cache_manager: CacheManager::new(),
            registry: ScalerRegistry::new(),
        }
    }

    /// This service never writes anything back to the orchestrator API, so
    /// every event handler is a no-op: the reflector's store is all it
    /// actually consumes.
    fn create_passive_informer<T>(config: &ClusterConfig, path: &str) -> Informer<T>
    where
        T: Object + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let lw = create_lister_watcher(config, path);
        let eh = EventHandler::<T> {
            add_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
            update_cls: Box::new(move |(_, _)| Box::pin(async move { Ok(()) })),
            delete_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
        };
        let rh = ResyncHandler(Box::new(move |()| Box::pin(async move { Ok(()) })));
        Informer::new(lw, eh, rh)
    }
}
