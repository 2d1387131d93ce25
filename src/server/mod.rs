//! Server module
//!
//! Handles TCP connections and manages the accept loop.
//! This module is responsible for accepting connections and delegating
//! command processing to the dispatcher.

mod connection;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

pub use connection::Connection;

/// How long shutdown waits for connections to finish their current reply
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the server described by `config` until `shutdown` resolves
///
/// Replays the AOF before binding, so no client can observe the store
/// before recovery has finished.
pub async fn serve(config: &Config, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::with_aof(&config.aof)
        .await
        .with_context(|| format!("failed to load AOF from {:?}", config.aof.path))?;

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    run(listener, Arc::new(dispatcher), shutdown).await
}

/// Accept connections on `listener` until `shutdown` resolves
///
/// Spawns one task per connection. On shutdown, stops accepting, tells every
/// connection to stop reading, waits for them to finish (aborting any still
/// stuck after `DRAIN_TIMEOUT`), then closes the AOF after a final sync. No
/// write can be acknowledged after the log is closed.
pub async fn run(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    info!("oxikv RESP server listening on {}", listener.local_addr()?);

    tokio::pin!(shutdown);

    let closing = CancellationToken::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }

            result = listener.accept() => {
                let (socket, addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // e.g. out of file descriptors; the listener itself is still fine
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("New RESP connection from {}", addr);

                let dispatcher = Arc::clone(&dispatcher);
                connections.spawn(
                    handle_connection(socket, dispatcher, closing.clone())
                        .instrument(info_span!("connection", peer = %addr)),
                );
            }

            // reap finished connections so the set does not grow
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    closing.cancel();
    let open = connections.len();
    if open > 0 {
        info!("Waiting for {} connections to close", open);
    }
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("{} connections did not close in time, aborting them", connections.len());
        connections.shutdown().await;
    }

    dispatcher
        .shutdown()
        .await
        .context("failed to close AOF")?;
    info!("AOF closed, server stopped");

    Ok(())
}

/// Serve one client until it disconnects, sends malformed bytes or the
/// server shuts down
pub async fn handle_connection(
    socket: TcpStream,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let mut connection = Connection::new(socket);

    if let Err(e) = connection.handle(&dispatcher, &shutdown).await {
        error!("Connection error: {}", e);
    }

    info!("Connection closed");
}
