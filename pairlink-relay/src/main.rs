//! Pairlink relay server.
//!
//! Holds sealed pairing messages in short-lived slots until the other
//! device picks them up. Slot contents are opaque to the relay.

mod cleanup;
mod config;
mod error;
mod handlers;
mod rate_limit;
mod server;
mod storage;

use anyhow::Context;
use clap::Parser;
use config::RelayConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pairlink-relay", about = "Pairlink pairing relay server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Slot database path override
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Seconds an unread message is kept
    #[arg(long)]
    slot_ttl: Option<u64>,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    fn resolve_config(&self) -> anyhow::Result<RelayConfig> {
        let mut cfg = if self.config.exists() {
            RelayConfig::load(&self.config)
                .with_context(|| format!("Loading {}", self.config.display()))?
        } else {
            tracing::info!("No config file at {}, using defaults", self.config.display());
            RelayConfig::default()
        };

        if let Some(listen) = &self.listen {
            cfg.listen_addr = listen.clone();
        }
        if let Some(database) = &self.database {
            cfg.storage_path = database.clone();
        }
        if let Some(ttl) = self.slot_ttl {
            cfg.slot_ttl_secs = ttl;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Cli::parse().resolve_config()?;

    if let Some(parent) = cfg.storage_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating {}", parent.display()))?;
    }
    let storage = storage::RelayStorage::open(&cfg.storage_path)
        .with_context(|| format!("Opening {}", cfg.storage_path.display()))?;

    let state = server::AppState::new(storage, &cfg);
    cleanup::spawn_cleanup_task(
        state.storage.clone(),
        state.limiter.clone(),
        Duration::from_secs(cfg.cleanup_interval_secs),
    );
    let app = server::build_router(state, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Binding {}", cfg.listen_addr))?;
    tracing::info!(
        "Relay listening on {} (slot ttl {}s, {} req/min per slot)",
        cfg.listen_addr,
        cfg.slot_ttl_secs,
        cfg.rate_limit_per_minute
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
        })
        .await?;

    Ok(())
}
