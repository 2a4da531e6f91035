#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Extension, Router};
use config::{Config, Environment, File};
use resources::config::ClusterConfig;

mod handler;
mod state;

use state::AppState;

lazy_static! {
    pub static ref CONFIG: ClusterConfig = Config::builder()
        .add_source(File::with_name("/etc/keda-core/controller-manager.yaml").required(false))
        .add_source(Environment::default())
        .build()
        .unwrap_or_default()
        .try_deserialize::<ClusterConfig>()
        .unwrap_or_default();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let state = Arc::new(AppState::new(&CONFIG));

    let app = Router::new()
        .route(
            "/apis/external.metrics.k8s.io/v1beta1/namespaces/:namespace/:metric_name",
            get(handler::list_external_metric),
        )
        .layer(Extension(state));

    let addr = "0.0.0.0:8090".parse()?;
    tracing::info!(%addr, "metric adapter service listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
