//! Background task that keeps the tool catalog warm by periodically
//! re-enumerating every registered server's tools.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::core::gateway::HubGateway;

/// Spawns the refresh loop and returns its join handle. Call `.abort()` on
/// the handle during shutdown; an aborted iteration never blocks on
/// in-flight downstream requests since each one has its own timeout.
pub fn spawn_refresh_loop(gateway: Arc<HubGateway>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            info!("running scheduled catalog refresh");
            gateway.refresh_all().await;
        }
    })
}
