//! Supervisor (spec §4.7) — periodically sweeps every pending-correlation
//! table for expired entries and, when configured, evicts controllers that
//! have gone quiet past a staleness threshold.
//!
//! Modeled on the teacher's scheduler loop: `tokio::select!` between a
//! sleep and a `watch::Receiver<bool>` shutdown signal, with the interval
//! read fresh from config on each tick rather than captured once.

use std::sync::Arc;
use std::time::Duration;

use garden_core::channel::CloseReason;
use garden_core::protocol::envelope;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::broker::Broker;

pub async fn run(broker: Arc<Broker>, mut shutdown_rx: watch::Receiver<bool>) {
    let interval = Duration::from_millis(broker.config.supervisor.sweep_interval_ms);
    info!(?interval, "supervisor sweep loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                sweep_once(&broker).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("supervisor shutting down");
                    break;
                }
            }
        }
    }
}

async fn sweep_once(broker: &Broker) {
    let expired = broker.pending.irrigation.sweep_expired().await;
    for ctx in &expired {
        notify_timeout(broker, ctx).await;
    }

    let expired_moisture = broker.pending.moisture.sweep_expired().await;
    for (_, ctx) in expired_moisture {
        notify_timeout(broker, &ctx).await;
    }
    let expired_assignment = broker.pending.hardware_assignment.sweep_expired().await;
    for (_, ctx) in expired_assignment {
        notify_timeout(broker, &ctx).await;
    }
    let expired_update = broker.pending.update.sweep_expired().await;
    for (_, ctx) in expired_update {
        notify_timeout(broker, &ctx).await;
    }
    let expired_deletion = broker.pending.deletion.sweep_expired().await;
    for (_, ctx) in expired_deletion {
        notify_timeout(broker, &ctx).await;
    }

    if broker.config.supervisor.stale_controller_eviction_enabled {
        let threshold = Duration::from_millis(broker.config.supervisor.stale_controller_threshold_ms);
        let stale = broker.registry.stale_controllers(threshold).await;
        for (garden_id, channel) in stale {
            warn!(garden_id, "evicting stale controller");
            channel.close(CloseReason::StaleController);
            broker.registry.unbind_controller(channel.id()).await;
        }
    }
}

async fn notify_timeout(broker: &Broker, ctx: &garden_core::pending::PendingContext) {
    if let Some(channel) = broker.registry.channel_by_email(&ctx.email).await {
        channel.send(envelope("REQUEST_TIMEOUT", json!({ "context": ctx.snapshot })));
    }
}
