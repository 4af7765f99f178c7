//! The gateway accept loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use trellis_config::GatewaySection;
use trellis_engine::{AccessOracle, RoomRegistry};

use crate::error::{GatewayError, GatewayResult};
use crate::session;

/// The WebSocket gateway: accepts connections and spawns one session
/// task per socket.
pub struct Gateway {
    registry: Arc<RoomRegistry>,
    oracle: Arc<dyn AccessOracle>,
    config: GatewaySection,
    shutdown_tx: broadcast::Sender<()>,
    active_connections: Arc<AtomicUsize>,
}

impl Gateway {
    /// Build a gateway over the given registry and oracle.
    #[must_use]
    pub fn new(
        registry: Arc<RoomRegistry>,
        oracle: Arc<dyn AccessOracle>,
        config: GatewaySection,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registry,
            oracle,
            config,
            shutdown_tx,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal every session and the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Run the accept loop until [`Gateway::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Bind`] when the listen address is
    /// unavailable. Per-connection failures are logged, not returned.
    pub async fn serve(&self) -> GatewayResult<()> {
        let listener =
            TcpListener::bind(&self.config.bind)
                .await
                .map_err(|source| GatewayError::Bind {
                    addr: self.config.bind.clone(),
                    source,
                })?;
        info!(addr = %self.config.bind, "gateway listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("gateway accept loop stopping");
                    break;
                },
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let counter = Arc::clone(&self.active_connections);
                            counter.fetch_add(1, Ordering::Relaxed);
                            let ctx = session::SessionCtx {
                                registry: Arc::clone(&self.registry),
                                oracle: Arc::clone(&self.oracle),
                                config: self.config.clone(),
                                shutdown_rx: self.shutdown_tx.subscribe(),
                            };
                            tokio::spawn(async move {
                                session::run(stream, peer, ctx).await;
                                counter.fetch_sub(1, Ordering::Relaxed);
                            });
                        },
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                        },
                    }
                },
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("bind", &self.config.bind)
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}
