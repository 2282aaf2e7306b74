//! Proxy server wiring
//!
//! [`ProxyServer`] owns the one [`CacheStore`] of the process and hands it
//! to both the request handler and the lifecycle manager. `serve` returns
//! only after the shutdown sweep has finished.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::app::cache::CacheStore;
use crate::app::client::OriginFetcher;
use crate::app::lifecycle::{
    LifecycleManager, LifecycleState, ShutdownReport, SignalHandler, create_shutdown_channel,
    wait_for_shutdown_signal,
};
use crate::app::proxy::{ProxyHandler, build_router};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// The caching proxy, ready to bind and serve
pub struct ProxyServer {
    config: AppConfig,
    store: CacheStore,
    handler: ProxyHandler,
    lifecycle: LifecycleManager,
    shutdown_tx: broadcast::Sender<()>,
    // Subscribed up front so a shutdown sent before `serve` is not lost
    server_rx: broadcast::Receiver<()>,
    lifecycle_rx: broadcast::Receiver<()>,
}

impl ProxyServer {
    /// Validate the configuration and build every component
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the cache
    /// directory cannot be created or the origin client cannot be built.
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let origin = config.origin_url()?;
        let cache_config = config.cache_config();
        let store = CacheStore::new(&cache_config).await?;

        let fetcher = OriginFetcher::new(
            origin,
            store.cache_dir().to_path_buf(),
            &config.client_config(),
        )?;
        let handler = ProxyHandler::new(store.clone(), Arc::new(fetcher));
        let lifecycle = LifecycleManager::new(store.clone(), cache_config.fill_drain_timeout);

        let (shutdown_tx, server_rx) = create_shutdown_channel();
        let lifecycle_rx = shutdown_tx.subscribe();

        Ok(Self {
            config,
            store,
            handler,
            lifecycle,
            shutdown_tx,
            server_rx,
            lifecycle_rx,
        })
    }

    /// Shared cache store
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Sender that triggers the same shutdown as a termination signal
    pub fn shutdown_trigger(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Watch lifecycle transitions; keeps working after `serve` returns
    pub fn lifecycle_state(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Bind the configured address
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` if the address cannot be bound
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::server(format!("failed to bind {}: {}", addr, e)))
    }

    /// Install signal handlers, bind and serve until shutdown
    pub async fn run(self) -> Result<ShutdownReport> {
        let signal_task = SignalHandler::new(self.shutdown_tx.clone()).setup()?;
        let listener = self.bind().await?;

        let result = self.serve(listener).await;
        signal_task.abort();
        result
    }

    /// Serve on `listener` until a shutdown is broadcast
    ///
    /// Returns once the cache sweep has completed. The listener gets a
    /// bounded grace period to finish open connections afterwards.
    pub async fn serve(self, listener: TcpListener) -> Result<ShutdownReport> {
        let local_addr = listener.local_addr()?;
        info!(
            "Caching requests to port {}. Cache misses will pull from {}",
            local_addr.port(),
            self.config.origin.base_url
        );
        debug!("Listening on {}", local_addr);

        let lifecycle_task = self.lifecycle.spawn(self.lifecycle_rx);

        let router = build_router(self.handler);
        let server_rx = self.server_rx;
        let shutdown_tx = self.shutdown_tx.clone();
        let mut server_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(wait_for_shutdown_signal(server_rx))
                .await;
            if let Err(e) = &result {
                error!("Server failed: {}", e);
            }
            // However the listener stopped, the cache still gets swept
            let _ = shutdown_tx.send(());
            result
        });

        let report = lifecycle_task
            .await
            .map_err(|e| AppError::server(format!("shutdown sweep failed: {}", e)))?;

        let drain = self.config.shutdown.server_drain_timeout;
        match tokio::time::timeout(drain, &mut server_task).await {
            Ok(Ok(Ok(()))) => debug!("Listener stopped"),
            Ok(Ok(Err(e))) => return Err(AppError::server(format!("server failed: {}", e))),
            Ok(Err(e)) => warn!("Server task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Open connections still active after {:?}, closing them",
                    drain
                );
                server_task.abort();
            }
        }

        info!("Shutdown complete");
        Ok(report)
    }
}
