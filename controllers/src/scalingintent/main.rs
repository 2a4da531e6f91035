#[macro_use]
extern crate lazy_static;

use anyhow::Result;
use config::{Config, Environment, File};
use resources::config::ClusterConfig;

mod auth_reconciler;
mod reconciler;

use auth_reconciler::AuthReconciler;
use reconciler::IntentReconciler;

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

    let mut intent_reconciler = IntentReconciler::new(&CONFIG);
    let mut auth_reconciler = AuthReconciler::new(&CONFIG);

    tokio::try_join!(intent_reconciler.run(), auth_reconciler.run())?;
    Ok(())
}
