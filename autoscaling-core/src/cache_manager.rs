use std::{collections::HashMap, future::Future, sync::Arc};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::scalers_cache::ScalersCache;

/// Owns every Intent's `ScalersCache`, keyed by `namespace/name` (§4.3). A
/// single `parking_lot::Mutex` guards only the "is someone already building
/// this key's cache" check-or-insert step; the cache map itself is a
/// `dashmap::DashMap` so lookups of an already-built cache never contend
/// with that mutex at all.
pub struct CacheManager {
    caches: DashMap<String, Arc<ScalersCache>>,
    building: Mutex<HashMap<String, Arc<Notify>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
            building: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ScalersCache>> {
        self.caches.get(key).map(|entry| entry.clone())
    }

    /// Returns the existing cache for `key`, or builds one via `build` if
    /// none exists yet. Concurrent callers racing to build the same key
    /// block on the first builder's `Notify` rather than each constructing
    /// (and leaking) their own Scaler set.
    ///
    /// A failed build is never published (§4.3: "partial caches are never
    /// exposed") — the error is handed back to the caller, which is
    /// responsible for surfacing it (`Ready=False` on the Reconciler path,
    /// an empty metric list on the Metric Adapter path). A waiter whose
    /// first builder failed falls through to building the cache itself
    /// rather than waiting forever on a cache that will never arrive.
    pub async fn get_or_build<F, Fut, E>(&self, key: &str, build: F) -> Result<Arc<ScalersCache>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ScalersCache, E>>,
    {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }

        let wait_on = {
            let mut building = self.building.lock();
            if let Some(existing) = self.get(key) {
                return Ok(existing);
            }
            if let Some(notify) = building.get(key) {
                Some(notify.clone())
            } else {
                building.insert(key.to_string(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = wait_on {
            notify.notified().await;
            if let Some(existing) = self.get(key) {
                return Ok(existing);
            }
            return build().await.map(Arc::new);
        }

        match build().await {
            Ok(cache) => {
                let cache = Arc::new(cache);
                if cache.needs_prewarm() {
                    cache.clone().spawn_prewarm();
                }
                self.caches.insert(key.to_string(), cache.clone());
                if let Some(notify) = self.building.lock().remove(key) {
                    notify.notify_waiters();
                }
                Ok(cache)
            }
            Err(e) => {
                if let Some(notify) = self.building.lock().remove(key) {
                    notify.notify_waiters();
                }
                Err(e)
            }
        }
    }

    /// Drops a key's cache, forcing the next `get_or_build` to reconstruct
    /// it — used when an Intent's trigger list or authentication changes
    /// generation (§4.3: "rebuild on generation change"). Closes every
    /// Scaler in the evicted cache before dropping it (§4.2 `close`, §8:
    /// the evicted cache's Scalers must each have `Close` invoked exactly
    /// once).
    pub fn invalidate(&self, key: &str) {
        if let Some((_, cache)) = self.caches.remove(key) {
            cache.close();
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use resources::objects::{metrics::MetricSample, scaling_intent::Trigger};
    use scalers::{Scaler, ScalerContext, ScalerError};

    use super::*;
    use crate::{error::CoreError, scalers_cache::ScalerEntry};

    struct CountsCloses(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Scaler for CountsCloses {
        fn metric_names(&self) -> Vec<String> {
            vec!["m".to_string()]
        }

        fn target_value(&self) -> i64 {
            1
        }

        async fn is_active(&self, _ctx: &ScalerContext<'_>) -> Result<bool, ScalerError> {
            Ok(false)
        }

        async fn get_metrics(
            &self,
            _metric_name: &str,
            _ctx: &ScalerContext<'_>,
        ) -> Result<MetricSample, ScalerError> {
            Ok(MetricSample::new("m", 0, chrono::Utc::now().naive_utc()))
        }

        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn trigger() -> Trigger {
        Trigger {
            type_: "metrics-api".to_string(),
            metadata: Default::default(),
            authentication_ref: None,
            metric_type: None,
            name: Some("queue".to_string()),
            use_cached_metrics: false,
        }
    }

    /// §8: `get; clear; get` yields two distinct cache identities, and the
    /// first cache's Scalers each had `Close` invoked exactly once.
    #[tokio::test]
    async fn clear_then_get_closes_the_old_scalers_and_builds_a_fresh_identity() {
        let manager = CacheManager::new();
        let closes = Arc::new(AtomicUsize::new(0));

        let first: Arc<ScalersCache> = manager
            .get_or_build("default/web", || {
                let closes = closes.clone();
                async move {
                    Ok::<_, CoreError>(ScalersCache::new(vec![ScalerEntry {
                        index: 0,
                        trigger: trigger(),
                        scaler: Box::new(CountsCloses(closes)),
                    }]))
                }
            })
            .await
            .unwrap();

        manager.invalidate("default/web");
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let second = manager
            .get_or_build("default/web", || {
                let closes = closes.clone();
                async move {
                    Ok::<_, CoreError>(ScalersCache::new(vec![ScalerEntry {
                        index: 0,
                        trigger: trigger(),
                        scaler: Box::new(CountsCloses(closes)),
                    }]))
                }
            })
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn builds_once_and_reuses_for_the_same_key() {
        let manager = CacheManager::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            manager
                .get_or_build("default/web", || async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, CoreError>(ScalersCache::new(Vec::<ScalerEntry>::new()))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_rebuild() {
        let manager = CacheManager::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let build = |calls: Arc<std::sync::atomic::AtomicUsize>| async move {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, CoreError>(ScalersCache::new(Vec::<ScalerEntry>::new()))
        };

        manager.get_or_build("default/web", || build(calls.clone())).await.unwrap();
        manager.invalidate("default/web");
        manager.get_or_build("default/web", || build(calls.clone())).await.unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    /// §4.3: "partial caches are never exposed" — a failed build must not
    /// leave anything behind for the next caller to see as a (non-existent)
    /// successful cache.
    #[tokio::test]
    async fn failed_build_is_never_published() {
        let manager = CacheManager::new();
        let result = manager
            .get_or_build("default/web", || async {
                Err::<ScalersCache, CoreError>(CoreError::CachePartial("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(manager.get("default/web").is_none());
    }
}
