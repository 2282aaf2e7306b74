//! Signal handling for graceful shutdown
//!
//! Interrupt, terminate, hangup and quit all mean the same thing here:
//! broadcast shutdown so the listener stops and the cache sweep runs.

use std::io;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Signal handler for graceful shutdown coordination
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<()>,
}

#[cfg(unix)]
struct UnixSignals {
    terminate: signal::unix::Signal,
    hangup: signal::unix::Signal,
    quit: signal::unix::Signal,
}

#[cfg(unix)]
impl UnixSignals {
    fn install() -> io::Result<Self> {
        use signal::unix::{SignalKind, signal as unix_signal};

        Ok(Self {
            terminate: unix_signal(SignalKind::terminate())?,
            hangup: unix_signal(SignalKind::hangup())?,
            quit: unix_signal(SignalKind::quit())?,
        })
    }
}

impl SignalHandler {
    /// Create a new signal handler with the given shutdown broadcaster
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Install signal handlers and start the watcher task
    ///
    /// The handlers are registered before this returns, so a signal that
    /// arrives right after startup is not lost.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a unix signal handler cannot be registered
    pub fn setup(&self) -> io::Result<JoinHandle<()>> {
        let shutdown_tx = self.shutdown_tx.clone();

        #[cfg(unix)]
        let mut unix_signals = UnixSignals::install()?;

        Ok(tokio::spawn(async move {
            #[cfg(unix)]
            let received = tokio::select! {
                result = signal::ctrl_c() => match result {
                    Ok(()) => "SIGINT",
                    Err(e) => {
                        error!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                },
                _ = unix_signals.terminate.recv() => "SIGTERM",
                _ = unix_signals.hangup.recv() => "SIGHUP",
                _ = unix_signals.quit.recv() => "SIGQUIT",
            };

            #[cfg(not(unix))]
            let received = match signal::ctrl_c().await {
                Ok(()) => "Ctrl+C",
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
            };

            info!("Received {}, initiating shutdown", received);

            // Broadcast shutdown signal to all listeners
            let _ = shutdown_tx.send(());
        }))
    }
}

/// Create a shutdown signal broadcaster
///
/// Subscribe every component before anything can send, otherwise a
/// receiver created later misses the broadcast.
pub fn create_shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}

/// Wait for the shutdown broadcast
///
/// Also returns once every sender is gone.
pub async fn wait_for_shutdown_signal(mut shutdown_rx: broadcast::Receiver<()>) {
    let _ = shutdown_rx.recv().await;
}
