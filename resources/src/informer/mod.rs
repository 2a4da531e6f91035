use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio::{
    net::TcpStream,
    sync::{mpsc, RwLock},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::objects::Object;

mod reflector;

use reflector::{Reflector, ReflectorNotification};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A read-mostly snapshot of one resource kind, keyed by `Object::key()`.
/// Shared between the Informer's background reflector task and whichever
/// component reads it (the Reconciler, the Scaling Executor, the resource
/// scalers).
pub type Store<T> = Arc<RwLock<HashMap<String, T>>>;

pub type CLS<ARG, RES> = Box<dyn Fn(ARG) -> BoxFuture<'static, Result<RES>> + Send + Sync>;

/// Closures that list the current state and open a watch stream for one
/// resource kind against the orchestrator's API. Supplied per-kind by the
/// caller (see `controllers::orchestrator_client`), following the teacher's
/// `create_lister_watcher` helper.
pub struct ListerWatcher<T> {
    pub lister: CLS<(), Vec<T>>,
    pub watcher: CLS<(), WsStream>,
}

/// Closures invoked as the reflector observes adds, updates and deletes.
/// Boxed rather than a trait object over a handler struct so call sites can
/// build one inline from channel senders, matching
/// `horizontal.rs::create_hpa_informer`.
pub struct EventHandler<T> {
    pub add_cls: CLS<T, ()>,
    pub update_cls: CLS<(T, T), ()>,
    pub delete_cls: CLS<T, ()>,
}

/// Invoked once per full list-and-watch-reconnect cycle, letting callers
/// re-enqueue everything currently in the store (used by the Reconciler to
/// pick up Intents it may have dropped on a watch disconnect).
pub struct ResyncHandler(pub CLS<(), ()>);

#[derive(Debug, Clone)]
pub enum Event<T> {
    Add(T),
    Update(T, T),
    Delete(T),
}

pub struct Informer<T: Object> {
    reflector: Arc<Reflector<T>>,
    eh: EventHandler<T>,
    rh: ResyncHandler,
    store: Store<T>,
}

impl<T: Object + Clone + Send + Sync + 'static> Informer<T> {
    pub fn new(lw: ListerWatcher<T>, eh: EventHandler<T>, rh: ResyncHandler) -> Self {
        let store: Store<T> = Arc::new(RwLock::new(HashMap::new()));
        let reflector = Reflector {
            lw,
            store: store.clone(),
        };
        Self {
            reflector: Arc::new(reflector),
            eh,
            rh,
            store,
        }
    }

    pub fn get_store(&self) -> Store<T> {
        self.store.clone()
    }

    pub async fn run(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<ReflectorNotification<T>>(16);
        let r = self.reflector.clone();
        let reflector_handle = tokio::spawn(async move { r.run(tx).await });

        tracing::info!("informer started");
        while let Some(n) = rx.recv().await {
            let result = match n {
                ReflectorNotification::Add(new) => (self.eh.add_cls)(new).await,
                ReflectorNotification::Update(old, new) => (self.eh.update_cls)((old, new)).await,
                ReflectorNotification::Delete(old) => (self.eh.delete_cls)(old).await,
                ReflectorNotification::Resync => (self.rh.0)(()).await,
            };
            result.with_context(|| "event handler error")?;
        }

        reflector_handle.await?
    }
}
