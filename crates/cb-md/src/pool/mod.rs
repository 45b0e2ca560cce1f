//! Round-based worker pool.
//!
//! A run is `rounds` sequential rounds over the same symbol list. Each round:
//!
//! ```text
//! partition(symbols, workers) ──► Executor::run_round ──► join all shards
//!                                                     └─► on_round callback
//! ```
//!
//! Per-symbol failures never leave a shard: [`SymbolJob`] implementations get
//! the isolation loop for free and report failures in [`ShardReport`]. A
//! shard-level error (task error, panic, dead child) fails the round and the
//! run.

pub mod partition;
pub mod process;
pub mod progress;
pub mod thread;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::round_cache::{CacheSink, RoundCache};
use cb_core::time_util::now_local;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tracing::info;

pub use self::partition::partition;
pub use self::process::{ProcessExecutor, ShardCommand};
pub use self::progress::ShardProgress;
pub use self::thread::ThreadExecutor;

// ---------------------------------------------------------------------------
// Shards and reports
// ---------------------------------------------------------------------------

/// A contiguous slice of the symbol list assigned to one worker for one round.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct Shard {
    pub round: usize,
    pub index: usize,
    /// Position of `symbols[0]` in the full list.
    pub offset: usize,
    pub symbols: Vec<String>,
}

/// One symbol that failed inside a shard.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct SymbolFailure {
    /// Position in the full list.
    pub index: usize,
    pub symbol: String,
    pub error: String,
}

/// Outcome of one shard.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct ShardReport {
    pub index: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<SymbolFailure>,
    pub elapsed_ms: u64,
}

impl ShardReport {
    pub fn empty(shard: &Shard) -> Self {
        Self { index: shard.index, attempted: 0, succeeded: 0, failures: Vec::new(), elapsed_ms: 0 }
    }
}

/// Outcome of one round; shard reports are sorted by shard index.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: usize,
    pub started_at: String,
    pub finished_at: String,
    pub shards: Vec<ShardReport>,
}

impl RoundReport {
    pub fn succeeded(&self) -> usize {
        self.shards.iter().map(|s| s.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.shards.iter().map(|s| s.failures.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SymbolFailure> {
        self.shards.iter().flat_map(|s| s.failures.iter())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub rounds: Vec<RoundReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.rounds.iter().map(RoundReport::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.rounds.iter().map(RoundReport::failed).sum()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Work executed for one shard.
#[async_trait]
pub trait ShardTask: Send + Sync {
    fn name(&self) -> &str;
    /// Process every symbol of `shard`. `Err` is a shard-level failure.
    async fn run_shard(&self, shard: &Shard, sink: &dyn CacheSink) -> Result<ShardReport>;
}

/// Work executed for one symbol. Every `SymbolJob` is a [`ShardTask`] that
/// walks its shard left to right and records per-symbol errors instead of
/// propagating them.
#[async_trait]
pub trait SymbolJob: Send + Sync {
    fn name(&self) -> &str;
    /// Collect one symbol. The returned note goes on the progress line.
    async fn collect(&self, symbol: &str, sink: &dyn CacheSink) -> Result<String>;
}

#[async_trait]
impl<J: SymbolJob> ShardTask for J {
    fn name(&self) -> &str {
        SymbolJob::name(self)
    }

    async fn run_shard(&self, shard: &Shard, sink: &dyn CacheSink) -> Result<ShardReport> {
        let started = Instant::now();
        let mut report = ShardReport::empty(shard);
        let mut progress = ShardProgress::new(SymbolJob::name(self), shard.round, shard.index);

        for (i, symbol) in shard.symbols.iter().enumerate() {
            let index = shard.offset + i;
            report.attempted += 1;
            match self.collect(symbol, sink).await {
                Ok(note) => {
                    report.succeeded += 1;
                    progress.tick(index, symbol, &note);
                }
                Err(e) => {
                    progress.fail(index, symbol, &e);
                    report.failures.push(SymbolFailure { index, symbol: symbol.clone(), error: format!("{e:#}") });
                }
            }
        }
        progress.finish();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Runs all shards of one round and joins them.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;
    /// Dispatch every shard, wait for all of them, return their reports in
    /// any order.
    async fn run_round(&self, shards: Vec<Shard>, cache: &Arc<RoundCache>) -> Result<Vec<ShardReport>>;
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Partitions, dispatches and joins rounds over a shared [`RoundCache`].
pub struct WorkerPool {
    workers: usize,
    rounds: usize,
    round_interval: Duration,
    executor: Box<dyn Executor>,
    cache: Arc<RoundCache>,
}

impl WorkerPool {
    pub fn new(workers: usize, rounds: usize, executor: Box<dyn Executor>) -> Self {
        Self { workers, rounds, round_interval: Duration::ZERO, executor, cache: Arc::new(RoundCache::new()) }
    }

    /// Share an existing cache instead of a fresh one.
    pub fn with_cache(mut self, cache: Arc<RoundCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Pause between rounds.
    pub fn with_round_interval(mut self, interval: Duration) -> Self {
        self.round_interval = interval;
        self
    }

    pub fn cache(&self) -> &Arc<RoundCache> {
        &self.cache
    }

    /// Run all rounds with no callback.
    pub async fn run(&self, symbols: &[String]) -> Result<RunReport> {
        self.run_with(symbols, |_, _| Ok(())).await
    }

    /// Run all rounds, calling `on_round` after each fully joined round.
    pub async fn run_with<F>(&self, symbols: &[String], mut on_round: F) -> Result<RunReport>
    where
        F: FnMut(&RoundReport, &RoundCache) -> Result<()>,
    {
        if self.workers == 0 || self.rounds == 0 {
            return Err(FeedError::Config(format!(
                "workers ({}) and rounds ({}) must be >= 1",
                self.workers, self.rounds
            ))
            .into());
        }

        let mut run = RunReport::default();
        for round in 0..self.rounds {
            if round > 0 && !self.round_interval.is_zero() {
                tokio::time::sleep(self.round_interval).await;
            }
            let started_at = now_local(true, true);
            info!(
                "[pool] round {}/{} start @ {} ({} symbols, {} workers, {})",
                round + 1,
                self.rounds,
                started_at,
                symbols.len(),
                self.workers,
                self.executor.name()
            );

            let shards = partition(symbols, self.workers, round);
            let mut reports = self
                .executor
                .run_round(shards, &self.cache)
                .await
                .with_context(|| format!("round {} failed", round + 1))?;
            reports.sort_by_key(|r| r.index);

            let report = RoundReport { round, started_at, finished_at: now_local(true, true), shards: reports };
            info!(
                "[pool] round {}/{} end @ {} ({} ok, {} failed)",
                round + 1,
                self.rounds,
                report.finished_at,
                report.succeeded(),
                report.failed()
            );
            on_round(&report, self.cache.as_ref()).with_context(|| format!("round {} callback failed", round + 1))?;
            run.rounds.push(report);
        }
        Ok(run)
    }
}
