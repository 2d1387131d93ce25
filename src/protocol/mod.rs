//! RESP2 protocol implementation
//!
//! This module handles parsing and encoding of Redis Serialization Protocol (RESP2).
//! It knows nothing about commands or storage.

mod types;
mod resp;
mod reader;

pub use types::{RespValue, RespError};
pub use resp::{RespParser, RespEncoder};
pub use reader::RespReader;
