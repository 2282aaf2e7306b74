//! Shutdown lifecycle
//!
//! The proxy runs through `Running -> ShuttingDown -> Terminated`. Entering
//! `ShuttingDown` closes the cache store, waits a bounded time for fills
//! still in flight, aborts the ones that overrun and then removes every
//! cached file. `Terminated` is only published after the sweep, and the
//! process joins the lifecycle task before it exits, so no cached file
//! outlives the process.
//!
//! - [`signals`] - OS signal handling and the shutdown broadcast

pub mod signals;

use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::cache::{CacheStats, CacheStore};
use crate::constants::shutdown;

pub use signals::{SignalHandler, create_shutdown_channel, wait_for_shutdown_signal};

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Serving requests
    Running,
    /// Sweep in progress; new fills are refused
    ShuttingDown,
    /// Sweep finished; the process may exit
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What the shutdown sweep did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    /// Cached files removed
    pub removed: usize,
    /// Cached files that could not be removed
    pub failed: usize,
    /// Fills aborted because they outlasted the drain timeout
    pub abandoned_fills: usize,
    /// Cache statistics at the start of the sweep
    pub stats: CacheStats,
}

/// Drives shutdown and the cleanup sweep
pub struct LifecycleManager {
    store: CacheStore,
    fill_drain_timeout: Duration,
    state_tx: watch::Sender<LifecycleState>,
}

impl LifecycleManager {
    /// Create a manager in the `Running` state
    pub fn new(store: CacheStore, fill_drain_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Running);
        Self {
            store,
            fill_drain_timeout,
            state_tx,
        }
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Run the sweep once the shutdown broadcast arrives
    ///
    /// Join the returned handle before exiting the process.
    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<ShutdownReport> {
        tokio::spawn(async move {
            wait_for_shutdown_signal(shutdown_rx).await;
            self.shutdown().await
        })
    }

    /// Move to `ShuttingDown`, sweep the cache, move to `Terminated`
    ///
    /// Only the first call sweeps; later calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let previous = self.state_tx.send_replace(LifecycleState::ShuttingDown);
        if previous != LifecycleState::Running {
            self.state_tx.send_replace(previous);
            warn!("Shutdown requested while already {}", previous);
            return ShutdownReport::default();
        }

        info!("Shutting down, cleaning up cached files");
        let mut report = ShutdownReport::default();

        let pending = self.store.close().await;
        if !pending.is_empty() {
            info!("Waiting for {} in-flight fills", pending.len());
            if tokio::time::timeout(self.fill_drain_timeout, join_all(pending))
                .await
                .is_err()
            {
                let stragglers = self.store.abort_in_flight().await;
                report.abandoned_fills = stragglers.len();
                warn!(
                    "{} fills still running after {:?}, aborting them",
                    report.abandoned_fills, self.fill_drain_timeout
                );
                // Resolves once each aborted task is dropped and its file removed
                if tokio::time::timeout(shutdown::ABORT_GRACE, join_all(stragglers))
                    .await
                    .is_err()
                {
                    warn!(
                        "Aborted fills did not wind down within {:?}",
                        shutdown::ABORT_GRACE
                    );
                }
            }
        }

        report.stats = self.store.stats().await;

        for entry in self.store.drain_entries().await {
            match entry.remove_file().await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to remove {}: {}", entry.local_path.display(), e);
                }
            }
        }

        info!(
            "Removed {} cached files ({} failed). Cache statistics: {}",
            report.removed, report.failed, report.stats
        );

        self.state_tx.send_replace(LifecycleState::Terminated);
        report
    }
}
