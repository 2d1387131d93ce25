//! Append-Only File (AOF) persistence module
//!
//! Provides durability by logging every mutating command to disk.
//! Records are the RESP encoding of the command array exactly as the client
//! sent it, written back to back, so replay reuses the wire decoder.

mod writer;
mod reader;
mod replay;
mod flusher;

pub use writer::AofWriter;
pub use reader::AofReader;
pub use replay::{replay, tail_path, truncate_to, ReplayStats};

use crate::protocol::{RespError, RespValue};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// AOF sync policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Sync after every write (safest, slowest)
    Always,
    /// Sync from a background task once per flush interval (balanced)
    #[default]
    #[serde(rename = "everysec")]
    EverySecond,
    /// Let the OS decide when to sync (fastest, least safe)
    No,
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncPolicy::Always),
            "everysec" => Ok(SyncPolicy::EverySecond),
            "no" => Ok(SyncPolicy::No),
            other => Err(format!(
                "unknown sync policy '{}'. valid options: always, everysec, no",
                other
            )),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::Always => write!(f, "always"),
            SyncPolicy::EverySecond => write!(f, "everysec"),
            SyncPolicy::No => write!(f, "no"),
        }
    }
}

/// AOF configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AofConfig {
    /// Path to the AOF file
    pub path: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
    /// Whether to enable AOF
    pub enabled: bool,
    /// Background sync period for `SyncPolicy::EverySecond`, in milliseconds
    pub flush_interval_ms: u64,
}

impl AofConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

impl Default for AofConfig {
    fn default() -> Self {
        AofConfig {
            path: PathBuf::from("oxikv.aof"),
            sync_policy: SyncPolicy::default(),
            enabled: true,
            flush_interval_ms: 1000,
        }
    }
}

/// AOF errors
#[derive(Debug, Error)]
pub enum AofError {
    #[error("AOF IO error: {0}")]
    Io(#[from] io::Error),

    /// A record that is not valid RESP, with more data possibly behind it
    #[error("corrupt AOF record at offset {offset}: {source}")]
    Corrupt {
        offset: u64,
        #[source]
        source: RespError,
    },

    /// The file ends partway through a record
    #[error("truncated AOF record at offset {offset}")]
    Truncated { offset: u64 },

    #[error("AOF is closed")]
    Closed,
}

/// An open append-only log with its background sync task
pub struct Aof {
    writer: Arc<AofWriter>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Aof {
    /// Open the log for appending
    ///
    /// With `SyncPolicy::EverySecond` this spawns the flush task, so it must
    /// run inside a tokio runtime.
    pub fn open(config: &AofConfig) -> Result<Self, AofError> {
        let writer = Arc::new(AofWriter::new(&config.path, config.sync_policy)?);
        let shutdown = CancellationToken::new();

        let flusher = match config.sync_policy {
            SyncPolicy::EverySecond => Some(flusher::spawn(
                Arc::clone(&writer),
                config.flush_interval(),
                shutdown.clone(),
            )),
            SyncPolicy::Always | SyncPolicy::No => None,
        };

        info!(
            "AOF open at {:?} (sync policy: {})",
            config.path, config.sync_policy
        );

        Ok(Aof {
            writer,
            shutdown,
            flusher: Mutex::new(flusher),
        })
    }

    /// Append one command record
    pub fn append(&self, value: &RespValue) -> Result<(), AofError> {
        self.writer.append(value)
    }

    /// Stop the flush task, let it run its final sync, then close the file
    pub async fn shutdown(&self) -> Result<(), AofError> {
        self.shutdown.cancel();

        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                warn!("AOF flush task ended abnormally: {}", e);
            }
        }

        self.writer.close()
    }
}
