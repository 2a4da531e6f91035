use anyhow::{anyhow, Error, Result};
use reqwest::Url;
use resources::{
    config::ClusterConfig,
    informer::{ListerWatcher, WsStream},
    objects::Object,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio_tungstenite::connect_async;

/// Builds the list/watch closure pair an `Informer<T>` needs against one
/// collection path, generalized from the teacher's
/// `podautoscaler::utils::create_lister_watcher` to any `Object` type rather
/// than being copy-pasted per resource kind.
pub fn create_lister_watcher<T>(config: &ClusterConfig, path: &str) -> ListerWatcher<T>
where
    T: Object + DeserializeOwned + Send + Sync + 'static,
{
    let list_url = format!("{}/apis/v1/{}", config.api_server_url, path);
    let watch_url = format!("{}/apis/v1/watch/{}", config.api_server_watch_url, path);
    ListerWatcher {
        lister: Box::new(move |_| {
            let list_url = list_url.clone();
            Box::pin(async move {
                let items = reqwest::get(list_url).await?.json::<Vec<T>>().await?;
                Ok::<Vec<T>, Error>(items)
            })
        }),
        watcher: Box::new(move |_| {
            let watch_url = watch_url.clone();
            Box::pin(async move {
                let url = Url::parse(&watch_url)?;
                let (stream, _) = connect_async(url).await?;
                Ok::<WsStream, Error>(stream)
            })
        }),
    }
}

/// Thin REST client for the handful of calls the Reconciler and Auth
/// Reconciler make outside their informer-fed stores: fetching a named
/// object once and PATCHing one back. Generalized from the teacher's
/// `get_scale_target`/`post_update` pair.
pub struct OrchestratorClient {
    client: reqwest::Client,
    base_url: String,
}

impl OrchestratorClient {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_server_url.clone(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/apis/v1/{}", self.base_url, path))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("GET {} failed: {}", path, response.status()));
        }
        Ok(response.json::<T>().await?)
    }

    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .patch(format!("{}/apis/v1/{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("PATCH {} failed: {}", path, response.status()));
        }
        Ok(())
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/apis/v1/{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("PUT {} failed: {}", path, response.status()));
        }
        Ok(())
    }

    /// §4.6 step 8: issued when the child autoscaler's desired name no
    /// longer matches the stored one (`advanced.horizontalPodAutoscalerConfig.name`
    /// changed), so the old object is removed before the new one is
    /// created under its new name.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/apis/v1/{}", self.base_url, path))
            .send()
            .await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("DELETE {} failed: {}", path, response.status()));
        }
        Ok(())
    }

    /// Creates `count` new job instances against a job-template scale
    /// target (§4.4). Job templates never receive a rendered child
    /// autoscaler, so this is the only write the Reconciler issues for
    /// them.
    pub async fn instantiate_jobs(&self, path: &str, count: u32) -> Result<()> {
        #[derive(Serialize)]
        struct JobInstantiation {
            count: u32,
        }
        let response = self
            .client
            .post(format!("{}/apis/v1/{}", self.base_url, path))
            .json(&JobInstantiation { count })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("POST {} failed: {}", path, response.status()));
        }
        Ok(())
    }
}
