pub mod broker;
pub mod client_handler;
pub mod controller_handler;
pub mod supervisor;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use garden_core::config::GardenConfig;
use tokio::sync::watch;
use tracing::info;

pub use broker::Broker;

pub fn build_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/ws/client", get(ws::client_ws_handler))
        .route("/ws/controller", get(ws::controller_ws_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(broker)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ready"
}

/// Build the broker, bind its listener and run until `shutdown` resolves.
pub async fn serve(config: GardenConfig, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = config.server.bind.parse()?;
    let broker = Arc::new(Broker::new(Arc::new(config)));
    if broker.config.storage.postgres_dsn.is_some() {
        broker.db.ensure_schema().await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_handle = tokio::spawn(supervisor::run(broker.clone(), shutdown_rx));

    let app = build_router(broker);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "garden-broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let _ = shutdown_tx.send(true);
    supervisor_handle.await?;
    Ok(())
}
