//! Registry: builds stores, symbol lists and shard tasks from a job config.

use std::sync::Arc;

use anyhow::Result;
use cb_core::config::{JobConfig, Provider};
use cb_core::record_store::{FileEncoding, Layout, RecordStore};
use cb_core::types::SymbolStyle;
use cb_core::universe::load_universe;
use tracing::info;

use crate::BarQuery;
use crate::collector::{KlineCollector, MinuteCollector, SnapCollector};
use crate::eastmoney::{EastmoneyConfig, KlineClient, SnapshotClient, TrendsClient};
use crate::pool::ShardTask;

/// Symbol form each provider expects.
pub fn native_style(provider: Provider) -> SymbolStyle {
    match provider {
        Provider::DcSnap | Provider::AkMinute => SymbolStyle::Prefix,
        Provider::EfMinute | Provider::EfKline => SymbolStyle::Bare,
    }
}

/// Record store for a job's provider.
///
/// | provider    | layout         | encoding |
/// |-------------|----------------|----------|
/// | `dc_snap`   | day-partitioned | GBK     |
/// | `ef_minute` | day-partitioned | GBK     |
/// | `ak_minute` | day-partitioned | UTF-8   |
/// | `ef_kline`  | flat           | GBK      |
pub fn create_store(job: &JobConfig) -> RecordStore {
    let (layout, encoding) = match job.provider {
        Provider::DcSnap | Provider::EfMinute => (Layout::DayPartitioned, FileEncoding::Gbk),
        Provider::AkMinute => (Layout::DayPartitioned, FileEncoding::Utf8),
        Provider::EfKline => (Layout::Flat, FileEncoding::Gbk),
    };
    RecordStore::new(&job.db_root, layout, encoding)
}

/// Explicit symbols followed by the universe table, if any.
pub fn resolve_symbols(job: &JobConfig) -> Result<Vec<String>> {
    let mut symbols = job.symbols.clone();
    if let Some(universe) = &job.universe {
        let loaded = load_universe(universe, native_style(job.provider))?;
        info!("[registry] {} symbols from {}", loaded.len(), universe.path.display());
        symbols.extend(loaded);
    }
    Ok(symbols)
}

/// Build the per-shard task for `job`.
pub fn create_task(job: &JobConfig) -> Result<Arc<dyn ShardTask>> {
    let cfg = EastmoneyConfig::from_job(job);
    let store = create_store(job);
    let task: Arc<dyn ShardTask> = match job.provider {
        Provider::DcSnap => Arc::new(SnapCollector::new(SnapshotClient::new(&cfg)?, store, job.mode)),
        Provider::EfMinute => Arc::new(MinuteCollector::new(KlineClient::new(&cfg)?, store, job.mode)),
        Provider::AkMinute => Arc::new(MinuteCollector::new(TrendsClient::new(&cfg)?, store, job.mode)),
        Provider::EfKline => {
            Arc::new(KlineCollector::new(KlineClient::new(&cfg)?, store, BarQuery::from(&job.query)))
        }
    };
    Ok(task)
}
