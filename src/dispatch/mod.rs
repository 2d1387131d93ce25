//! Command dispatcher
//!
//! Routes incoming commands to the appropriate handler and appends
//! successful writes to the AOF.
//! This module provides loose coupling between the server and command implementations.

use crate::aof::{self, Aof, AofConfig, AofError};
use crate::commands::{wrong_arity, CommandRegistry};
use crate::protocol::RespValue;
use crate::store::Store;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A well-framed value that cannot be a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("expected array")]
    NotAnArray,

    #[error("empty command array")]
    Empty,

    #[error("command name must be a bulk string")]
    InvalidName,
}

/// Command dispatcher
///
/// Receives RESP commands, validates them, and routes to appropriate handlers.
/// Shared across connections behind an `Arc`; the store does its own locking.
pub struct Dispatcher {
    /// Command registry
    registry: CommandRegistry,

    /// The key spaces commands run against
    store: Arc<Store>,

    /// Log of successful writes, if persistence is on
    aof: Option<Aof>,
}

impl Dispatcher {
    /// Create a dispatcher without persistence
    pub fn new(store: Arc<Store>) -> Self {
        Dispatcher {
            registry: CommandRegistry::new(),
            store,
            aof: None,
        }
    }

    /// Create a dispatcher with AOF support
    ///
    /// Replays the existing log into a fresh store, repairs a truncated
    /// tail, then opens the log for appending. Nothing has been served yet
    /// when this returns, so the store already reflects every durable record.
    pub async fn with_aof(config: &AofConfig) -> Result<Self, AofError> {
        let mut dispatcher = Dispatcher::new(Arc::new(Store::new()));
        if !config.enabled {
            info!("AOF disabled, starting with an empty store");
            return Ok(dispatcher);
        }

        let mut skipped = 0u64;
        let stats = aof::replay(&config.path, |record| {
            if !dispatcher.replay(&record) {
                skipped += 1;
            }
        })
        .await?;

        if stats.truncated {
            aof::truncate_to(&config.path, stats.valid_len)?;
        }
        if skipped > 0 {
            warn!("{} AOF records could not be applied", skipped);
        }

        let store_stats = dispatcher.store.stats();
        info!(
            "Store ready: {} string keys, {} hash keys ({} fields)",
            store_stats.string_keys, store_stats.hash_keys, store_stats.hash_fields
        );

        dispatcher.aof = Some(Aof::open(config)?);
        Ok(dispatcher)
    }

    /// Dispatch a live command
    ///
    /// Takes a RESP value (expected to be an array), extracts the command name
    /// and arguments, then routes to the appropriate handler. Unknown commands
    /// and bad arguments come back as `RespValue::Error`. A successful write
    /// is appended to the AOF before this returns.
    pub fn dispatch(&self, request: &RespValue) -> Result<RespValue, RequestError> {
        let (response, is_write) = self.execute(request)?;

        if is_write && !response.is_error() {
            if let Some(aof) = &self.aof {
                // The store already changed and the client will see it;
                // keep serving and flag the durability gap.
                if let Err(e) = aof.append(request) {
                    error!("Failed to write to AOF, record is not durable: {}", e);
                }
            }
        }

        Ok(response)
    }

    /// Apply a record read back from the AOF, without logging it again
    ///
    /// Returns false if the record was not a valid command.
    pub fn replay(&self, record: &RespValue) -> bool {
        match self.execute(record) {
            Ok((response, _)) if !response.is_error() => true,
            Ok((response, _)) => {
                warn!("AOF record rejected: {}", response_text(&response));
                false
            }
            Err(e) => {
                warn!("AOF record is not a command: {}", e);
                false
            }
        }
    }

    /// Look up and run a command, reporting whether it is a write
    fn execute(&self, request: &RespValue) -> Result<(RespValue, bool), RequestError> {
        // Commands should be arrays
        let args = match request.as_array() {
            Some([]) => return Err(RequestError::Empty),
            Some(arr) => arr,
            None => return Err(RequestError::NotAnArray),
        };

        // First element is the command name
        let cmd_name = args[0]
            .as_bulk_string()
            .and_then(|name| std::str::from_utf8(name).ok())
            .ok_or(RequestError::InvalidName)?;

        debug!("Dispatching command: {}", cmd_name);

        // Look up the command
        let command = match self.registry.get(cmd_name) {
            Some(cmd) => cmd,
            None => {
                warn!("Unknown command: {}", cmd_name);
                let response = RespValue::error(format!("ERR unknown command '{}'", cmd_name));
                return Ok((response, false));
            }
        };

        // Extract arguments (everything after the command name)
        let cmd_args = &args[1..];

        // Validate argument count
        if !command.accepts(cmd_args.len()) {
            return Ok((wrong_arity(command.name()), false));
        }

        // Execute the command
        let response = command.execute(&self.store, cmd_args);
        Ok((response, command.is_write()))
    }

    /// The store commands run against
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Close the AOF after a final sync. Later writes are not logged.
    pub async fn shutdown(&self) -> Result<(), AofError> {
        match &self.aof {
            Some(aof) => aof.shutdown().await,
            None => Ok(()),
        }
    }
}

fn response_text(response: &RespValue) -> &str {
    match response {
        RespValue::Error(msg) => msg,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::SyncPolicy;
    use bytes::Bytes;
    use std::fs;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> AofConfig {
        let path: PathBuf =
            std::env::temp_dir().join(format!("oxikv-dispatch-{}-{}.aof", name, std::process::id()));
        let _ = fs::remove_file(&path);
        AofConfig {
            path,
            sync_policy: SyncPolicy::Always,
            ..AofConfig::default()
        }
    }

    fn dispatch(dispatcher: &Dispatcher, parts: &[&'static str]) -> RespValue {
        dispatcher
            .dispatch(&RespValue::command(parts.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_dispatch_set_get() {
        let dispatcher = Dispatcher::new(Arc::new(Store::new()));

        let result = dispatch(&dispatcher, &["SET", "mykey", "myvalue"]);
        assert_eq!(result, RespValue::simple_string("OK"));

        let result = dispatch(&dispatcher, &["get", "mykey"]);
        assert_eq!(result, RespValue::bulk_string(Bytes::from("myvalue")));
    }

    #[test]
    fn test_dispatch_overwrite_and_miss() {
        let dispatcher = Dispatcher::new(Arc::new(Store::new()));

        assert_eq!(dispatch(&dispatcher, &["GET", "missing"]), RespValue::Null);

        dispatch(&dispatcher, &["SET", "k", "a"]);
        dispatch(&dispatcher, &["SET", "k", "b"]);
        assert_eq!(dispatch(&dispatcher, &["GET", "k"]), RespValue::bulk_string("b"));

        dispatch(&dispatcher, &["HSET", "h", "f", "v"]);
        assert_eq!(dispatch(&dispatcher, &["HGET", "h", "f"]), RespValue::bulk_string("v"));
        assert_eq!(dispatch(&dispatcher, &["HGET", "h", "other"]), RespValue::Null);
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let dispatcher = Dispatcher::new(Arc::new(Store::new()));

        let result = dispatch(&dispatcher, &["FOO", "k", "v"]);
        assert_eq!(result, RespValue::error("ERR unknown command 'FOO'"));
        assert_eq!(dispatcher.store().snapshot(), Default::default());
    }

    #[test]
    fn test_dispatch_invalid_args() {
        let dispatcher = Dispatcher::new(Arc::new(Store::new()));

        let cases: &[&[&'static str]] = &[
            &["SET", "k"],
            &["SET", "k", "v", "extra"],
            &["GET"],
            &["GET", "a", "b"],
            &["HSET", "h", "f"],
            &["HSET", "h", "f", "v", "g"],
            &["HGET", "h"],
            &["HGET", "h", "f", "g"],
        ];

        for parts in cases {
            let result = dispatch(&dispatcher, parts);
            assert!(result.is_error(), "{:?} should fail", parts);
        }
        assert_eq!(dispatcher.store().snapshot(), Default::default());
    }

    #[test]
    fn test_dispatch_rejects_non_commands() {
        let dispatcher = Dispatcher::new(Arc::new(Store::new()));

        assert_eq!(
            dispatcher.dispatch(&RespValue::bulk_string("SET")),
            Err(RequestError::NotAnArray)
        );
        assert_eq!(
            dispatcher.dispatch(&RespValue::array(vec![])),
            Err(RequestError::Empty)
        );
        assert_eq!(
            dispatcher.dispatch(&RespValue::array(vec![RespValue::integer(1)])),
            Err(RequestError::InvalidName)
        );
    }

    #[tokio::test]
    async fn test_only_successful_writes_are_logged() {
        let config = temp_config("logged");
        let dispatcher = Dispatcher::with_aof(&config).await.unwrap();

        dispatch(&dispatcher, &["SET", "k", "v"]);
        dispatch(&dispatcher, &["GET", "k"]);
        dispatch(&dispatcher, &["SET", "k"]);
        dispatch(&dispatcher, &["FOO"]);
        dispatch(&dispatcher, &["hset", "h", "f", "v"]);
        dispatcher.shutdown().await.unwrap();

        let contents = fs::read(&config.path).unwrap();
        assert_eq!(
            contents,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*4\r\n$4\r\nhset\r\n$1\r\nh\r\n$1\r\nf\r\n$1\r\nv\r\n"
        );

        fs::remove_file(&config.path).unwrap();
    }

    #[tokio::test]
    async fn test_restart_replays_log() {
        let config = temp_config("restart");

        let first = Dispatcher::with_aof(&config).await.unwrap();
        dispatch(&first, &["SET", "k", "v"]);
        dispatch(&first, &["HSET", "h", "f", "v"]);
        first.shutdown().await.unwrap();

        let live = Dispatcher::new(Arc::new(Store::new()));
        dispatch(&live, &["SET", "k", "v"]);
        dispatch(&live, &["HSET", "h", "f", "v"]);

        let second = Dispatcher::with_aof(&config).await.unwrap();
        assert_eq!(dispatch(&second, &["GET", "k"]), RespValue::bulk_string("v"));
        assert_eq!(dispatch(&second, &["HGET", "h", "f"]), RespValue::bulk_string("v"));
        assert_eq!(second.store().snapshot(), live.store().snapshot());
        second.shutdown().await.unwrap();

        let third = Dispatcher::with_aof(&config).await.unwrap();
        assert_eq!(third.store().snapshot(), second.store().snapshot());
        third.shutdown().await.unwrap();

        // replay does not append the records a second time
        let contents = fs::read(&config.path).unwrap();
        assert_eq!(contents.len(), 27 + 35);

        fs::remove_file(&config.path).unwrap();
    }

    #[tokio::test]
    async fn test_startup_repairs_truncated_tail() {
        let config = temp_config("repair");
        let good = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n";
        let mut data = good.to_vec();
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nx");
        fs::write(&config.path, &data).unwrap();

        let dispatcher = Dispatcher::with_aof(&config).await.unwrap();
        assert_eq!(dispatch(&dispatcher, &["GET", "k"]), RespValue::bulk_string("v"));
        assert_eq!(dispatch(&dispatcher, &["GET", "x"]), RespValue::Null);

        dispatch(&dispatcher, &["SET", "y", "1"]);
        dispatcher.shutdown().await.unwrap();

        let mut expected = good.to_vec();
        expected.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\ny\r\n$1\r\n1\r\n");
        assert_eq!(fs::read(&config.path).unwrap(), expected);

        let saved = aof::tail_path(&config.path, good.len() as u64);
        assert_eq!(fs::read(&saved).unwrap(), b"*3\r\n$3\r\nSET\r\n$1\r\nx");

        fs::remove_file(&config.path).unwrap();
        fs::remove_file(&saved).unwrap();
    }

    #[tokio::test]
    async fn test_startup_keeps_log_with_damaged_length() {
        let config = temp_config("damaged");
        let mut data = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$900\r\n1\r\n".to_vec();
        for key in ["b", "c", "d"] {
            let record = format!("*3\r\n$3\r\nSET\r\n$1\r\n{}\r\n$1\r\n1\r\n", key);
            data.extend_from_slice(record.as_bytes());
        }
        fs::write(&config.path, &data).unwrap();

        let result = Dispatcher::with_aof(&config).await;
        assert!(matches!(result, Err(AofError::Corrupt { offset: 0, .. })));
        assert_eq!(fs::read(&config.path).unwrap(), data);
        assert!(!aof::tail_path(&config.path, 0).exists());

        fs::remove_file(&config.path).unwrap();
    }

    #[tokio::test]
    async fn test_startup_fails_on_corrupt_log() {
        let config = temp_config("corrupt");
        fs::write(&config.path, b"*1\r\n$4\r\nPING\r\n%oops\r\n*1\r\n$4\r\nPING\r\n").unwrap();

        let result = Dispatcher::with_aof(&config).await;
        assert!(matches!(result, Err(AofError::Corrupt { offset: 14, .. })));

        fs::remove_file(&config.path).unwrap();
    }

    #[tokio::test]
    async fn test_disabled_aof_writes_nothing() {
        let config = AofConfig {
            enabled: false,
            ..temp_config("disabled")
        };

        let dispatcher = Dispatcher::with_aof(&config).await.unwrap();
        dispatch(&dispatcher, &["SET", "k", "v"]);
        dispatcher.shutdown().await.unwrap();

        assert!(dispatcher.aof.is_none());
        assert!(!config.path.exists());
    }
}
