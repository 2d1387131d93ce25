//! oxikv - A minimal in-memory key-value store with an append-only log
//!
//! oxikv is designed with strong cohesion and loose coupling principles:
//! - Each module has a single, well-defined responsibility
//! - Modules communicate through clear, minimal interfaces
//! - No circular dependencies between modules

pub mod protocol;
pub mod store;
pub mod commands;
pub mod dispatch;
pub mod server;
pub mod aof;
pub mod config;

/// Re-export commonly used types
pub use store::Store;
pub use protocol::{RespValue, RespError};
pub use commands::{Command, CommandRegistry};
pub use dispatch::{Dispatcher, RequestError};
pub use aof::{Aof, AofConfig, AofError, SyncPolicy};
pub use config::Config;
