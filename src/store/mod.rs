//! In-memory storage module
//!
//! Provides the string and hash key spaces commands operate on.
//! This module is independent of protocol and command handling (loose coupling).

mod memory;

pub use memory::{Snapshot, Store, StoreStats};
