//! Background AOF sync task
//!
//! Bounds the durability window of `SyncPolicy::EverySecond` to one flush
//! interval. Cancelling the token stops the task after one final sync.

use super::{AofError, AofWriter};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub(super) fn spawn(
    writer: Arc<AofWriter>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = sync(&writer).await {
                        warn!("Periodic AOF sync failed: {}", e);
                    }
                }
            }
        }

        match sync(&writer).await {
            Ok(()) => debug!("Final AOF sync complete"),
            Err(e) => error!("Final AOF sync failed: {}", e),
        }
    })
}

/// fsync off the async worker threads
async fn sync(writer: &Arc<AofWriter>) -> Result<(), AofError> {
    let writer = Arc::clone(writer);
    tokio::task::spawn_blocking(move || writer.sync())
        .await
        .map_err(|e| AofError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}
