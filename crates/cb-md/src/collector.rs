//! Per-symbol collectors.
//!
//! Each collector is a [`SymbolJob`]: it fetches one symbol from its source,
//! writes to its [`RecordStore`] and/or the cache sink according to its
//! [`CollectMode`], and returns a short note for the progress line.

use anyhow::Result;
use async_trait::async_trait;
use cb_core::config::CollectMode;
use cb_core::error::FeedError;
use cb_core::record_store::{RecordStore, WriteMode};
use cb_core::round_cache::{CacheSink, CacheUpdate};
use cb_core::types::strip_exchange;

use crate::pool::SymbolJob;
use crate::{BarQuery, BarSource, MinuteSource, QuoteSource};

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One quote per symbol per round. Day files are append-only.
pub struct SnapCollector<S> {
    source: S,
    store: RecordStore,
    mode: CollectMode,
}

impl<S: QuoteSource> SnapCollector<S> {
    pub fn new(source: S, store: RecordStore, mode: CollectMode) -> Self {
        Self { source, store, mode }
    }
}

#[async_trait]
impl<S: QuoteSource> SymbolJob for SnapCollector<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn collect(&self, symbol: &str, sink: &dyn CacheSink) -> Result<String> {
        let quote = self.source.fetch_quote(symbol).await?;
        let note = format!("{} @ local {}", quote.timeindex, quote.localtime);
        if self.mode.caches() {
            sink.put(&quote.code, CacheUpdate::AppendQuote(quote.clone()))?;
        }
        if self.mode.saves() {
            self.store.save(symbol, std::slice::from_ref(&quote), WriteMode::Append)?;
        }
        Ok(note)
    }
}

// ---------------------------------------------------------------------------
// Minute bars
// ---------------------------------------------------------------------------

/// The current session's minute bars. Each fetch returns the whole day so
/// the day file and the cache entry are both replaced.
pub struct MinuteCollector<S> {
    source: S,
    store: RecordStore,
    mode: CollectMode,
}

impl<S: MinuteSource> MinuteCollector<S> {
    pub fn new(source: S, store: RecordStore, mode: CollectMode) -> Self {
        Self { source, store, mode }
    }
}

#[async_trait]
impl<S: MinuteSource> SymbolJob for MinuteCollector<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn collect(&self, symbol: &str, sink: &dyn CacheSink) -> Result<String> {
        let bars = self.source.fetch_minute(symbol).await?;
        let latest = match bars.last() {
            Some(bar) => bar.timeindex.clone(),
            None => return Err(FeedError::EmptyResult(symbol.to_string()).into()),
        };
        if self.mode.saves() {
            self.store.save(symbol, &bars, WriteMode::Overwrite)?;
        }
        if self.mode.caches() {
            sink.put(strip_exchange(symbol), CacheUpdate::ReplaceBars(bars))?;
        }
        Ok(latest)
    }
}

// ---------------------------------------------------------------------------
// Daily and periodic K-lines
// ---------------------------------------------------------------------------

/// Full history over the query window, one flat file per symbol.
pub struct KlineCollector<S> {
    source: S,
    store: RecordStore,
    query: BarQuery,
}

impl<S: BarSource> KlineCollector<S> {
    pub fn new(source: S, store: RecordStore, query: BarQuery) -> Self {
        Self { source, store, query }
    }
}

#[async_trait]
impl<S: BarSource> SymbolJob for KlineCollector<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn collect(&self, symbol: &str, _sink: &dyn CacheSink) -> Result<String> {
        let label = self.query.granularity.label();
        let bars = self.source.fetch_bars(symbol, &self.query).await?;
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(f), Some(l)) => (f.timeindex.clone(), l.timeindex.clone()),
            // No history in the window; only an empty intraday session is a failure.
            _ if self.query.granularity.is_intraday() => {
                return Err(FeedError::EmptyResult(symbol.to_string()).into());
            }
            _ => return Ok(format!("0 {label} bars")),
        };
        self.store.save_flat(symbol, &bars, WriteMode::Overwrite)?;
        Ok(format!("{} {} bars {}..{}", bars.len(), label, first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::record_store::{FileEncoding, Layout};
    use cb_core::round_cache::{CacheEntry, RoundCache};
    use cb_core::types::{BarRecord, Granularity, QuoteRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeQuotes {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for FakeQuotes {
        fn name(&self) -> &str {
            "fake_snap"
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(QuoteRecord {
                code: strip_exchange(symbol).to_string(),
                name: "华锋转债".into(),
                timeindex: format!("2022-09-01 09:30:0{n}"),
                localtime: format!("09:30:0{n}.000000"),
                last: 120.5 + n as f64,
                ..Default::default()
            })
        }
    }

    struct FakeBars {
        rows: usize,
    }

    fn bars(rows: usize) -> Vec<BarRecord> {
        (0..rows)
            .map(|i| BarRecord {
                code: "128106".into(),
                timeindex: format!("2022-09-01 09:{:02}:00", 31 + i),
                close: 100.0 + i as f64,
                ..Default::default()
            })
            .collect()
    }

    #[async_trait]
    impl MinuteSource for FakeBars {
        fn name(&self) -> &str {
            "fake_minute"
        }

        async fn fetch_minute(&self, _symbol: &str) -> Result<Vec<BarRecord>> {
            Ok(bars(self.rows))
        }
    }

    #[async_trait]
    impl BarSource for FakeBars {
        fn name(&self) -> &str {
            "fake_kline"
        }

        async fn fetch_bars(&self, _symbol: &str, _query: &BarQuery) -> Result<Vec<BarRecord>> {
            Ok(bars(self.rows))
        }
    }

    fn store(dir: &tempfile::TempDir, layout: Layout) -> RecordStore {
        RecordStore::new(dir.path(), layout, FileEncoding::Gbk)
    }

    #[tokio::test]
    async fn snapshots_append_to_file_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let job = SnapCollector::new(
            FakeQuotes { calls: AtomicUsize::new(0) },
            store(&dir, Layout::DayPartitioned),
            CollectMode::SaveAndCache,
        );
        let cache = RoundCache::new();

        let note = job.collect("sz128106", &cache).await.unwrap();
        assert_eq!(note, "2022-09-01 09:30:00 @ local 09:30:00.000000");
        job.collect("sz128106", &cache).await.unwrap();

        let saved: Vec<QuoteRecord> = job.store.load("2022-09-01", "sz128106").unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].name, "华锋转债");
        match cache.get("128106").unwrap() {
            CacheEntry::Quotes(q) => assert_eq!(q.iter().map(|r| r.last).collect::<Vec<_>>(), vec![120.5, 121.5]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_mode_writes_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = SnapCollector::new(
            FakeQuotes { calls: AtomicUsize::new(0) },
            store(&dir, Layout::DayPartitioned),
            CollectMode::Cache,
        );
        let cache = RoundCache::new();
        job.collect("sz128106", &cache).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!dir.path().join("2022-09-01").exists());
    }

    #[tokio::test]
    async fn minute_bars_replace_and_report_latest() {
        let dir = tempfile::tempdir().unwrap();
        let job = MinuteCollector::new(FakeBars { rows: 3 }, store(&dir, Layout::DayPartitioned), CollectMode::SaveAndCache);
        let cache = RoundCache::new();

        assert_eq!(job.collect("sz128106", &cache).await.unwrap(), "2022-09-01 09:33:00");
        job.collect("sz128106", &cache).await.unwrap();

        let saved: Vec<BarRecord> = job.store.load("2022-09-01", "sz128106").unwrap();
        assert_eq!(saved.len(), 3);
        match cache.get("128106").unwrap() {
            CacheEntry::Bars(b) => assert_eq!(b.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_minute_result_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let job = MinuteCollector::new(FakeBars { rows: 0 }, store(&dir, Layout::DayPartitioned), CollectMode::SaveAndCache);
        let cache = RoundCache::new();
        let err = job.collect("sz128106", &cache).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::EmptyResult(_))));
        assert!(cache.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn klines_go_to_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let query = BarQuery { granularity: Granularity::Day, ..BarQuery::minute() };
        let job = KlineCollector::new(FakeBars { rows: 2 }, store(&dir, Layout::Flat), query);

        let note = job.collect("128106", &RoundCache::new()).await.unwrap();
        assert_eq!(note, "2 1D bars 2022-09-01 09:31:00..2022-09-01 09:32:00");
        let saved: Vec<BarRecord> = job.store.load_flat("128106").unwrap();
        assert_eq!(saved[1].close, 101.0);
    }

    #[tokio::test]
    async fn empty_daily_window_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let query = BarQuery { granularity: Granularity::Day, ..BarQuery::minute() };
        let job = KlineCollector::new(FakeBars { rows: 0 }, store(&dir, Layout::Flat), query);

        assert_eq!(job.collect("128106", &RoundCache::new()).await.unwrap(), "0 1D bars");
        assert!(!job.store.flat_path("128106").exists());
    }

    #[tokio::test]
    async fn empty_intraday_kline_fails() {
        let dir = tempfile::tempdir().unwrap();
        let query = BarQuery { granularity: Granularity::Min5, ..BarQuery::minute() };
        let job = KlineCollector::new(FakeBars { rows: 0 }, store(&dir, Layout::Flat), query);

        let err = job.collect("128106", &RoundCache::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::EmptyResult(_))));
    }
}
