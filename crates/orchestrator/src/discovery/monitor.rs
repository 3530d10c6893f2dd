use crate::store::core::StoreContext;
use log::{debug, error, info};
use shared::center::{CenterApi, CenterError};
use shared::models::node::display_name;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Keeps the node directory in sync with the center.
pub struct DirectoryMonitor {
    store_context: Arc<StoreContext>,
    center: Arc<dyn CenterApi>,
    refresh_interval: Duration,
}

impl DirectoryMonitor {
    pub fn new(
        store_context: Arc<StoreContext>,
        center: Arc<dyn CenterApi>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            store_context,
            center,
            refresh_interval,
        }
    }

    /// Fetches the node set once and replaces the directory with it.
    ///
    /// On failure the directory keeps its previous contents. The loading phase
    /// ends either way.
    pub async fn refresh(&self) -> Result<usize, CenterError> {
        let directory_store = &self.store_context.directory_store;
        match self.center.fetch_nodes().await {
            Ok(nodes) => {
                let node_count = nodes.len();
                let changes = directory_store.replace(nodes).await;
                for name in &changes.added {
                    info!("Discovered new node: {}", display_name(name));
                }
                for name in &changes.removed {
                    info!("Node removed: {}", display_name(name));
                }
                for name in &changes.updated {
                    info!("Node updated: {}", display_name(name));
                }
                debug!("Synced {node_count} nodes from speedtest center");
                Ok(node_count)
            }
            Err(e) => {
                directory_store.mark_loaded().await;
                Err(e)
            }
        }
    }

    /// Refreshes on every tick until `cancellation_token` is cancelled.
    ///
    /// The first refresh is immediate while the directory has never been
    /// loaded, otherwise it comes one interval after start.
    pub async fn run(self, cancellation_token: CancellationToken) {
        let start = if self.store_context.directory_store.is_loading().await {
            Instant::now()
        } else {
            Instant::now() + self.refresh_interval
        };
        let mut interval = interval_at(start, self.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!("Error syncing nodes from speedtest center: {e}");
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Directory monitor shutting down");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> MonitorHandle {
        let handle = tokio::spawn(self.run(cancellation_token.clone()));
        MonitorHandle {
            cancellation_token,
            handle,
        }
    }
}

pub struct MonitorHandle {
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the monitor and waits for its loop to exit.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.handle.await {
            error!("Directory monitor task failed: {e}");
        }
    }
}
