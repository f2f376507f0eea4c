//! Sync scheduling - manual, on-reconnect and periodic modes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use fragments_common::{Error, Result};

use crate::coordinator::SyncReport;

/// When the scheduler triggers a resync on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SyncMode {
    /// Only on explicit requests.
    Manual,
    /// Whenever connectivity comes back.
    OnReconnect,
    /// On reconnect and at a fixed interval while online.
    Periodic { interval_secs: u64 },
}

impl SyncMode {
    fn resyncs_on_reconnect(&self) -> bool {
        !matches!(self, SyncMode::Manual)
    }

    fn period(&self) -> Option<Duration> {
        match self {
            SyncMode::Periodic { interval_secs } => Some(Duration::from_secs((*interval_secs).max(1))),
            _ => None,
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::OnReconnect
    }
}

/// Sync request types.
#[derive(Debug)]
pub enum SyncRequest {
    /// Push every pending record.
    Resync,
    /// Stop the scheduler.
    Shutdown,
}

type Reply = oneshot::Sender<Result<SyncReport>>;

/// Request side of the scheduler.
#[derive(Clone)]
pub struct SyncScheduler {
    mode: SyncMode,
    request_tx: mpsc::Sender<(SyncRequest, Reply)>,
}

impl SyncScheduler {
    /// Create a scheduler watching `connectivity` for reconnects.
    pub fn new(mode: SyncMode, connectivity: watch::Receiver<bool>) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);

        let scheduler = Self { mode, request_tx };
        let handle = SyncSchedulerHandle {
            mode,
            request_rx,
            connectivity,
        };

        (scheduler, handle)
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Request a resync and wait for its report.
    pub async fn request_sync(&self) -> Result<SyncReport> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Resync, response_tx))
            .await
            .map_err(|_| Error::Sync("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Sync("Failed to receive sync result".to_string()))?
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) {
        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Run loop of the scheduler.
pub struct SyncSchedulerHandle {
    mode: SyncMode,
    request_rx: mpsc::Receiver<(SyncRequest, Reply)>,
    connectivity: watch::Receiver<bool>,
}

impl SyncSchedulerHandle {
    /// Run until shutdown or until every `SyncScheduler` is dropped.
    ///
    /// This should be spawned in a tokio task. `sync_fn` performs one
    /// resync pass.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncReport>> + Send,
    {
        let mut periodic = self.mode.period().map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut watching = self.mode.resyncs_on_reconnect();
        // Ignore the state at startup; only transitions count.
        self.connectivity.borrow_and_update();

        info!("Sync scheduler started ({:?})", self.mode);

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some((SyncRequest::Resync, response_tx)) => {
                            debug!("Processing sync request");
                            let _ = response_tx.send(sync_fn().await);
                        }
                        Some((SyncRequest::Shutdown, _)) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }

                changed = self.connectivity.changed(), if watching => {
                    if changed.is_err() {
                        debug!("Connectivity source closed");
                        watching = false;
                        continue;
                    }
                    if *self.connectivity.borrow_and_update() {
                        info!("Back online, resyncing");
                        Self::log_result(sync_fn().await);
                    }
                }

                _ = Self::wait_for_periodic(&mut periodic) => {
                    if *self.connectivity.borrow() {
                        debug!("Triggering periodic sync");
                        Self::log_result(sync_fn().await);
                    }
                }
            }
        }
    }

    fn log_result(result: Result<SyncReport>) {
        match result {
            Ok(report) => info!(
                "Background sync completed: {} synced, {} failed",
                report.synced, report.failed
            ),
            Err(e) => error!("Background sync failed: {}", e),
        }
    }

    async fn wait_for_periodic(periodic: &mut Option<Interval>) {
        match periodic {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
