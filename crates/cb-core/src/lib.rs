//! # cb-core
//!
//! Core crate for the cb-feed collector, providing:
//!
//! - **Types** (`types`): exchange and query enums, quote and bar records, symbol codec
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `FeedError` via thiserror
//! - **Record store** (`record_store`): day-partitioned or flat CSV storage
//! - **Round cache** (`round_cache`): shared symbol → series accumulator with blob flush/reload
//! - **Universe** (`universe`): symbol lists from parameter tables
//! - **Time utilities** (`time_util`): local and exchange timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod record_store;
pub mod round_cache;
pub mod time_util;
pub mod types;
pub mod universe;

// Re-export types at crate root for convenience.
pub use types::*;
