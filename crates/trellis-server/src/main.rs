//! Trellis server: wires config, storage, the room engine, and the
//! WebSocket gateway, then runs until a shutdown signal and finalizes
//! every room before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use trellis_config::Config;
use trellis_engine::{RoomRegistry, StoreAccessOracle};
use trellis_gateway::Gateway;
use trellis_store::{DurableStore, MemoryWarmCache, SurrealStore};

/// Real-time collaboration backbone for flow editors.
#[derive(Debug, Parser)]
#[command(name = "trellis-server", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, env = "TRELLIS_CONFIG", default_value = "trellis.toml")]
    config: PathBuf,

    /// Override the listen address.
    #[arg(long, env = "TRELLIS_BIND")]
    bind: Option<String>,

    /// Override the durable store path (empty string for in-memory).
    #[arg(long, env = "TRELLIS_STORE_PATH")]
    store_path: Option<String>,
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = trellis_config::load(Some(&args.config)).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(path) = args.store_path {
        config.store.path = path;
    }
    init_tracing(&config);
    info!(config = %args.config.display(), "trellis starting");

    let store: Arc<dyn DurableStore> = if config.store.path.is_empty() {
        warn!("store path empty: using an in-memory store, data will not survive restarts");
        Arc::new(SurrealStore::connect_memory().await.context("connecting store")?)
    } else {
        Arc::new(
            SurrealStore::connect_embedded(&config.store.path)
                .await
                .context("connecting store")?,
        )
    };
    let cache = Arc::new(MemoryWarmCache::new(
        config.cache.room_ttl(),
        config.cache.cursor_ttl(),
    ));
    let oracle = Arc::new(StoreAccessOracle::new(Arc::clone(&store)));

    let registry = RoomRegistry::new(
        store,
        cache,
        Arc::clone(&oracle) as _,
        config.engine.clone(),
    );
    let gateway = Arc::new(Gateway::new(
        Arc::clone(&registry),
        oracle,
        config.gateway.clone(),
    ));

    let mut serve = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.serve().await })
    };

    tokio::select! {
        result = &mut serve => {
            result.context("gateway task panicked")?.context("gateway failed")?;
            return Ok(());
        },
        () = shutdown_signal() => {
            info!("shutdown signal received");
        },
    }

    // Stop accepting and close sessions, then drain every room within
    // the finalization deadline.
    gateway.shutdown();
    tokio::time::timeout(config.engine.finalization_deadline(), registry.finalize_all())
        .await
        .unwrap_or_else(|_| {
            warn!("finalization deadline exceeded, exiting with rooms degraded");
        });

    let _ = serve.await;
    info!("trellis stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            },
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
