use anyhow::Context;
use clap::Parser;
use oxikv::{server, Config, SyncPolicy};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// In-memory key-value store speaking RESP, persisted to an append-only file
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "OXIKV_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "OXIKV_BIND")]
    bind: Option<String>,

    /// Path of the append-only file
    #[arg(long, env = "OXIKV_AOF_PATH")]
    aof_path: Option<PathBuf>,

    /// AOF sync policy: always, everysec or no
    #[arg(long, env = "OXIKV_APPENDFSYNC")]
    appendfsync: Option<SyncPolicy>,

    /// Run without persistence
    #[arg(long, env = "OXIKV_NO_AOF")]
    no_aof: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "OXIKV_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(path) = self.aof_path {
            config.aof.path = path;
        }
        if let Some(policy) = self.appendfsync {
            config.aof.sync_policy = policy;
        }
        if self.no_aof {
            config.aof.enabled = false;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("oxikv starting...");

    server::serve(&config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C, shutdown needs a kill: {}", e);
        std::future::pending::<()>().await;
    }
}
