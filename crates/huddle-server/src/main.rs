//! Huddle Server - Cluster Bootstrap Daemon

use huddle_core::DiscoveryConfig;
use huddle_server::api;
use huddle_server::cluster::{ChannelMembership, Membership};
use huddle_server::discovery::{DiscoveryController, Shutdown, Start};
use huddle_server::observability;
use huddle_server::store::{EtcdStore, KvStore};
use kameo::prelude::*;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    info!("Starting huddle server...");

    let config = Arc::new(DiscoveryConfig::from_env());
    config.validate()?;
    info!(
        node = %config.node_address,
        etcd_path = %config.etcd_path,
        endpoints = ?config.etcd_endpoints,
        "Configuration loaded"
    );

    let metrics_state = observability::metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("failed to initialize metrics: {e}"))?;

    // Connect to etcd
    info!("Connecting to etcd...");
    let store: Arc<dyn KvStore> = Arc::new(EtcdStore::connect(&config.etcd_endpoints).await?);
    info!("Connected to etcd");

    // The membership facade; the embedding gossip layer feeds it events.
    let cluster: Arc<dyn Membership> =
        Arc::new(ChannelMembership::new(config.node_address.clone()));

    // Start the bootstrap state machine
    let (controller, phase_rx) = DiscoveryController::new(config.clone(), store.clone(), cluster);
    let discovery = DiscoveryController::spawn(controller);
    discovery
        .tell(Start)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start discovery: {e:?}"))?;

    // Create shared state and the API router
    let state = api::AppState {
        node: config.node_address.clone(),
        store,
        phase_rx,
        metrics_state: Some(metrics_state),
    };
    let app = api::create_router(state);

    info!(bind = %config.bind_addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = discovery.tell(Shutdown).send().await;
    discovery.stop_gracefully().await.ok();
    info!("huddle server stopped");

    Ok(())
}
