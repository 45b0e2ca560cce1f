//! One-call batch drivers.
//!
//! A driver wires a collector, its store and a [`WorkerPool`] together, runs
//! every round and hands back a [`BatchHandle`] for inspection or export.
//! When a cache prefix is set, each round ends by flushing the cache to
//! `{db_root}/{prefix}{tag}.rkyv`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cb_core::config::{CollectMode, JobConfig};
use cb_core::record_store::{FileEncoding, Layout, RecordStore};
use cb_core::round_cache::RoundCache;
use cb_core::time_util::today;
use tracing::info;

use crate::BarQuery;
use crate::collector::{KlineCollector, MinuteCollector, SnapCollector};
use crate::eastmoney::{EastmoneyConfig, KlineClient, SnapshotClient, TrendsClient};
use crate::pool::{Executor, ProcessExecutor, RunReport, ShardCommand, ShardTask, ThreadExecutor, WorkerPool};
use crate::registry::{create_store, create_task, resolve_symbols};

/// Execution backend with whatever it needs to start workers.
#[derive(Debug, Clone)]
pub enum ExecBackend {
    Thread,
    /// Each shard runs `command`, which must serve the same task.
    Process(ShardCommand),
}

/// Pool and cache settings of one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub workers: usize,
    pub rounds: usize,
    pub backend: ExecBackend,
    /// Flush the cache after every round when set.
    pub cache_prefix: Option<String>,
    pub tag: String,
    pub clear_on_flush: bool,
    pub round_interval: Duration,
}

impl BatchOptions {
    /// Thread backend, no flush, tagged with today's date.
    pub fn new(workers: usize, rounds: usize) -> Self {
        Self {
            workers,
            rounds,
            backend: ExecBackend::Thread,
            cache_prefix: None,
            tag: today(),
            clear_on_flush: false,
            round_interval: Duration::ZERO,
        }
    }

    pub fn with_backend(mut self, backend: ExecBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_flush(mut self, prefix: impl Into<String>, tag: impl Into<String>) -> Self {
        self.cache_prefix = Some(prefix.into());
        self.tag = tag.into();
        self
    }

    pub fn from_job(job: &JobConfig, backend: ExecBackend) -> Self {
        Self {
            workers: job.workers,
            rounds: job.rounds,
            backend,
            cache_prefix: job.cache_prefix.clone(),
            tag: job.effective_tag(),
            clear_on_flush: job.clear_on_flush,
            round_interval: Duration::from_millis(job.round_interval_ms),
        }
    }
}

/// What a finished batch leaves behind.
pub struct BatchHandle {
    pub store: RecordStore,
    pub cache: Arc<RoundCache>,
    pub report: RunReport,
}

impl BatchHandle {
    /// Write every cached series to its day partition.
    pub fn export_cache(&self) -> Result<usize> {
        self.cache.export_to_store(&self.store)
    }
}

/// Run `task` over `symbols` with `opts`, flushing after each round when a
/// cache prefix is set.
pub async fn run_batch(
    task: Arc<dyn ShardTask>,
    store: RecordStore,
    symbols: &[String],
    opts: BatchOptions,
) -> Result<BatchHandle> {
    let executor: Box<dyn Executor> = match opts.backend {
        ExecBackend::Thread => Box::new(ThreadExecutor::new(task.clone())),
        ExecBackend::Process(command) => Box::new(ProcessExecutor::new(command)),
    };
    let pool = WorkerPool::new(opts.workers, opts.rounds, executor).with_round_interval(opts.round_interval);

    info!("[batch] {} over {} symbols -> {}", task.name(), symbols.len(), store.root().display());
    let flush_dir = store.root().to_path_buf();
    let report = pool
        .run_with(symbols, |_, cache| {
            if let Some(prefix) = &opts.cache_prefix {
                cache.flush(&flush_dir, prefix, &opts.tag)?;
                if opts.clear_on_flush {
                    cache.clear();
                }
            }
            Ok(())
        })
        .await?;
    info!("[batch] {} done: {} ok, {} failed", task.name(), report.succeeded(), report.failed());

    Ok(BatchHandle { store, cache: pool.cache().clone(), report })
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// Intraday trends for prefixed symbols, saved and cached, cache flushed to
/// `{prefix}{tag}` after every round.
pub async fn ak_minute_save(
    symbols: &[String],
    db_dir: impl Into<PathBuf>,
    prefix: &str,
    tag: &str,
    opts: BatchOptions,
    em: &EastmoneyConfig,
) -> Result<BatchHandle> {
    let store = RecordStore::new(db_dir, Layout::DayPartitioned, FileEncoding::Utf8);
    let task = MinuteCollector::new(TrendsClient::new(em)?, store.clone(), CollectMode::SaveAndCache);
    run_batch(Arc::new(task), store, symbols, opts.with_flush(prefix, tag)).await
}

/// 1-minute K-lines for bare symbols, saved and cached, cache flushed to
/// `{prefix}{tag}` after every round.
pub async fn ef_minute_save(
    symbols: &[String],
    db_dir: impl Into<PathBuf>,
    prefix: &str,
    tag: &str,
    opts: BatchOptions,
    em: &EastmoneyConfig,
) -> Result<BatchHandle> {
    let store = RecordStore::new(db_dir, Layout::DayPartitioned, FileEncoding::Gbk);
    let task = MinuteCollector::new(KlineClient::new(em)?, store.clone(), CollectMode::SaveAndCache);
    run_batch(Arc::new(task), store, symbols, opts.with_flush(prefix, tag)).await
}

/// Daily or periodic K-lines over `query`, one flat file per symbol.
pub async fn ef_kline_save(
    symbols: &[String],
    db_dir: impl Into<PathBuf>,
    query: BarQuery,
    opts: BatchOptions,
    em: &EastmoneyConfig,
) -> Result<BatchHandle> {
    let store = RecordStore::new(db_dir, Layout::Flat, FileEncoding::Gbk);
    let task = KlineCollector::new(KlineClient::new(em)?, store.clone(), query);
    run_batch(Arc::new(task), store, symbols, opts).await
}

/// Snapshots for prefixed symbols, appended per round. `mode` picks file,
/// cache or both.
pub async fn dc_snap_save(
    symbols: &[String],
    db_dir: impl Into<PathBuf>,
    mode: CollectMode,
    opts: BatchOptions,
    em: &EastmoneyConfig,
) -> Result<BatchHandle> {
    let store = RecordStore::new(db_dir, Layout::DayPartitioned, FileEncoding::Gbk);
    let task = SnapCollector::new(SnapshotClient::new(em)?, store.clone(), mode);
    run_batch(Arc::new(task), store, symbols, opts).await
}

/// Run one configured job end to end, exporting the cache when asked.
///
/// `backend` is the runnable form of `job.backend`; a process backend needs
/// the worker command, which only the caller knows.
pub async fn run_job(job: &JobConfig, backend: ExecBackend) -> Result<BatchHandle> {
    let symbols = resolve_symbols(job)?;
    let handle = run_batch(create_task(job)?, create_store(job), &symbols, BatchOptions::from_job(job, backend)).await?;
    if job.export_cache {
        handle.export_cache()?;
    }
    Ok(handle)
}
