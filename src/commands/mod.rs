//! Command execution module
//!
//! Provides a unified interface for all commands through the Command trait.
//! Each command group is implemented in a separate file for high cohesion.

mod registry;

// Command implementations
mod connection;
mod string;
mod hash;

pub use registry::CommandRegistry;

use crate::protocol::RespValue;
use crate::store::Store;
use bytes::Bytes;

/// Command execution trait
///
/// All commands implement this trait with a single execute method.
/// This provides loose coupling between command implementations and the dispatcher.
pub trait Command: Send + Sync {
    /// Execute the command against the store
    ///
    /// Arguments:
    /// - store: the shared key spaces
    /// - args: command arguments (excluding the command name itself). The
    ///   count is checked again here with `accepts`, so a direct call with the
    ///   wrong number of arguments gets an error reply
    ///
    /// Returns:
    /// - RespValue representing the response to send to the client. Failures
    ///   are `RespValue::Error`, never a panic.
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue;

    /// Get the command name (uppercase)
    fn name(&self) -> &'static str;

    /// Get the minimum number of arguments required
    fn min_args(&self) -> usize {
        0
    }

    /// Get the maximum number of arguments (None = unlimited)
    fn max_args(&self) -> Option<usize> {
        None
    }

    /// Whether `argc` arguments fall within `min_args..=max_args`
    fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args() && self.max_args().map_or(true, |max| argc <= max)
    }

    /// Whether a successful execution changes the store and must be
    /// appended to the AOF
    fn is_write(&self) -> bool {
        false
    }
}

/// Helper function to extract bulk string from RespValue
pub(crate) fn extract_bulk_string(value: &RespValue) -> Result<&Bytes, &'static str> {
    value.as_bulk_string().ok_or("arguments must be bulk strings")
}

/// Reply sent when a command gets the wrong number of arguments
pub(crate) fn wrong_arity(name: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}
