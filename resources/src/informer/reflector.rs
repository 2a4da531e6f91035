use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::tungstenite::Message;

use super::{ListerWatcher, Store};
use crate::objects::Object;

/// Wire event carried over the watch websocket stream, mirroring the
/// add/modify/delete trio the orchestrator's API emits for any watched
/// collection.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

pub enum ReflectorNotification<T> {
    Add(T),
    Update(T, T),
    Delete(T),
    Resync,
}

pub struct Reflector<T> {
    pub lw: ListerWatcher<T>,
    pub store: Store<T>,
}

impl<T> Reflector<T>
where
    T: Object + Clone + Send + Sync + 'static,
{
    /// Lists once to seed the store, then watches forever, reconnecting and
    /// re-listing on every disconnect. Each full list-and-watch cycle fires
    /// one `ReflectorNotification::Resync` after the seed completes, so
    /// callers can reconcile anything the watch stream dropped.
    pub async fn run(&self, tx: Sender<ReflectorNotification<T>>) -> Result<()> {
        loop {
            if let Err(e) = self.run_once(&tx).await {
                tracing::warn!(error = %e, "watch stream ended, relisting");
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    async fn run_once(&self, tx: &Sender<ReflectorNotification<T>>) -> Result<()> {
        let items = (self.lw.lister)(()).await.context("list failed")?;
        {
            let mut store = self.store.write().await;
            store.clear();
            for item in items {
                store.insert(item.key(), item);
            }
        }
        if tx.send(ReflectorNotification::Resync).await.is_err() {
            return Ok(());
        }

        let ws = (self.lw.watcher)(()).await.context("watch failed")?;
        let (_, mut read) = ws.split();
        while let Some(msg) = read.next().await {
            let msg = msg.context("watch stream error")?;
            let Message::Text(text) = msg else { continue };
            let event: WatchEvent<T> = serde_json::from_str(&text).context("decode watch event")?;
            let notification = match event {
                WatchEvent::Added(new) => {
                    self.store.write().await.insert(new.key(), new.clone());
                    ReflectorNotification::Add(new)
                }
                WatchEvent::Modified(new) => {
                    let old = self.store.write().await.insert(new.key(), new.clone());
                    match old {
                        Some(old) => ReflectorNotification::Update(old, new),
                        None => ReflectorNotification::Add(new),
                    }
                }
                WatchEvent::Deleted(old) => {
                    self.store.write().await.remove(&old.key());
                    ReflectorNotification::Delete(old)
                }
            };
            if tx.send(notification).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
