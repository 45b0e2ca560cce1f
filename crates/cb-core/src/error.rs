//! Typed error definitions for the cb-feed system.
//!
//! Provides [`FeedError`] for domain-specific failures that callers (and tests)
//! need to tell apart. All variants implement `std::error::Error` via
//! `thiserror`, so they travel inside `anyhow::Result` and can be recovered
//! with `downcast_ref::<FeedError>()`.

use thiserror::Error;

/// Domain-specific errors for the cb-feed system.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The provider answered, but not with usable data (missing `data`
    /// object, non-zero return code, unknown security).
    #[error("provider error: {0}")]
    Provider(String),

    /// Malformed provider payload or persisted row.
    #[error("parse error: {0}")]
    Parse(String),

    /// A query that must return rows returned none (minute bars during a
    /// session).
    #[error("empty result for {0}")]
    EmptyResult(String),

    /// A cache key already holds a series of the other kind.
    #[error("cache key {key} holds {existing} records, refusing {incoming}")]
    MixedSeries {
        key: String,
        existing: &'static str,
        incoming: &'static str,
    },

    /// Record store layout or encoding error.
    #[error("store error: {0}")]
    Store(String),

    /// Cache blob or worker frame (de)serialization error.
    #[error("codec error: {0}")]
    Codec(String),

    /// A shard worker died, panicked, or broke the worker protocol.
    #[error("worker error: {0}")]
    Worker(String),
}
