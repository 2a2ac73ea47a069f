use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dstate_app::{health, App};
use dstate_common::{config, Config, MemoryMultiStore, ModuleRegistry};
use dstate_consensus::{InstrumentedApp, LifecycleMetrics};
use dstate_upgrade::UpgradeRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => config::load_from_file(&path).map_err(|e| anyhow!("config {path}: {e}"))?,
        None => Config::default(),
    };

    // module and upgrade wiring is supplied by the chain integration; the
    // bare binary boots an empty shell
    let registry = Arc::new(UpgradeRegistry::new());
    let modules = ModuleRegistry::new();
    let store = Box::new(MemoryMultiStore::new());

    let app = App::load(&cfg, registry, modules, store)?;
    let metrics = Arc::new(LifecycleMetrics::new());
    let _app = InstrumentedApp::new(app, Arc::clone(&metrics));

    let health_var = cfg
        .health_env_var
        .clone()
        .unwrap_or_else(|| "DSTATE_HEALTH_CONFIG".to_string());
    let _monitor = health::maybe_start(&health_var);

    info!("state machine ready, waiting for consensus engine");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
