//! # cb-md
//!
//! Market data collection for convertible bonds and their underlyings.
//!
//! ## Architecture
//!
//! ```text
//! WorkerPool ──► Executor (thread | process) ──► ShardTask per shard
//!                                                  └─► collector per symbol
//!                                                        ├─► FetchAdapter (eastmoney)
//!                                                        ├─► RecordStore
//!                                                        └─► CacheSink (RoundCache | pipe proxy)
//! ```
//!
//! ## Modules
//!
//! - [`eastmoney`]: snapshot, K-line and trends adapters
//! - [`collector`]: per-symbol collectors
//! - [`pool`]: partitioning, executors, round loop, reports
//! - [`protocol`]: parent/child worker framing and the cache proxy
//! - [`registry`]: builds collectors and stores from a job config
//! - [`batch`]: one-call batch drivers
//! - [`json_util`]: JSON parsing helpers

pub mod batch;
pub mod collector;
pub mod eastmoney;
pub mod json_util;
pub mod pool;
pub mod protocol;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use cb_core::config::QueryConfig;
use cb_core::types::{Adjust, BarRecord, Granularity, QuoteRecord};

/// Parameters of a historical bar request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarQuery {
    pub granularity: Granularity,
    /// `YYYYMMDD` or `YYYY-MM-DD`.
    pub start: String,
    pub end: String,
    pub adjust: Adjust,
}

impl BarQuery {
    /// Latest session at 1-minute granularity.
    pub fn minute() -> Self {
        Self {
            granularity: Granularity::Min1,
            start: String::new(),
            end: String::new(),
            adjust: Adjust::None,
        }
    }
}

impl From<&QueryConfig> for BarQuery {
    fn from(q: &QueryConfig) -> Self {
        Self { granularity: q.granularity, start: q.start.clone(), end: q.end.clone(), adjust: q.adjust }
    }
}

/// A provider of point-in-time quote snapshots.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord>;
}

/// A provider of historical bars over a date window.
#[async_trait]
pub trait BarSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_bars(&self, symbol: &str, query: &BarQuery) -> Result<Vec<BarRecord>>;
}

/// A provider of the current session's 1-minute bars. An empty session is
/// [`FeedError::EmptyResult`](cb_core::error::FeedError::EmptyResult).
#[async_trait]
pub trait MinuteSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_minute(&self, symbol: &str) -> Result<Vec<BarRecord>>;
}
