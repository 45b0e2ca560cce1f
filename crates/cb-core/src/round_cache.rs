//! In-memory accumulator shared by all shards of a pool run.
//!
//! Keys are bare symbol codes. A key holds either a bar series, replaced on
//! every put (minute endpoints return the whole session each call), or a
//! quote series, appended one snapshot per put. A key never changes kind.
//!
//! The whole map can be flushed to a single rkyv blob and reloaded later,
//! independent of any pool run:
//!
//! ```text
//! {dir}/{prefix}{tag}.rkyv
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap;
use anyhow::{Context, Result};
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tracing::info;

use crate::error::FeedError;
use crate::record_store::{RecordStore, WriteMode};
use crate::types::{BarRecord, QuoteRecord};

/// File extension of cache blobs.
pub const BLOB_EXT: &str = "rkyv";

// ---------------------------------------------------------------------------
// Entries and updates
// ---------------------------------------------------------------------------

/// One put against the cache.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub enum CacheUpdate {
    /// Replace the key's bar series.
    ReplaceBars(Vec<BarRecord>),
    /// Append one snapshot to the key's quote series.
    AppendQuote(QuoteRecord),
}

impl CacheUpdate {
    fn kind(&self) -> &'static str {
        match self {
            Self::ReplaceBars(_) => "bars",
            Self::AppendQuote(_) => "quotes",
        }
    }
}

/// The series held under one key.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub enum CacheEntry {
    Bars(Vec<BarRecord>),
    Quotes(Vec<QuoteRecord>),
}

impl CacheEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bars(_) => "bars",
            Self::Quotes(_) => "quotes",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bars(v) => v.len(),
            Self::Quotes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an update in place, refusing a change of kind.
    fn apply(&mut self, key: &str, update: CacheUpdate) -> Result<(), FeedError> {
        match (self, update) {
            (Self::Bars(bars), CacheUpdate::ReplaceBars(new)) => *bars = new,
            (Self::Quotes(quotes), CacheUpdate::AppendQuote(q)) => quotes.push(q),
            (entry, update) => {
                return Err(FeedError::MixedSeries {
                    key: key.to_string(),
                    existing: entry.kind(),
                    incoming: update.kind(),
                });
            }
        }
        Ok(())
    }
}

impl From<CacheUpdate> for CacheEntry {
    fn from(update: CacheUpdate) -> Self {
        match update {
            CacheUpdate::ReplaceBars(bars) => Self::Bars(bars),
            CacheUpdate::AppendQuote(q) => Self::Quotes(vec![q]),
        }
    }
}

/// Point-in-time copy of the cache, ordered by key.
pub type CacheSnapshot = BTreeMap<String, CacheEntry>;

/// Destination of collector output that should be cached.
///
/// Implemented by [`RoundCache`] for in-process shards and by the worker
/// pipe proxy for child-process shards.
pub trait CacheSink: Send + Sync {
    fn put(&self, key: &str, update: CacheUpdate) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Blob format
// ---------------------------------------------------------------------------

#[derive(Archive, RkyvSerialize, RkyvDeserialize)]
struct BlobEntry {
    key: String,
    entry: CacheEntry,
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize)]
struct CacheBlob {
    entries: Vec<BlobEntry>,
}

/// Path of the blob for `prefix` and `tag` under `dir`.
pub fn blob_path(dir: &Path, prefix: &str, tag: &str) -> PathBuf {
    dir.join(format!("{prefix}{tag}.{BLOB_EXT}"))
}

// ---------------------------------------------------------------------------
// RoundCache
// ---------------------------------------------------------------------------

/// Mutex-guarded symbol → series map. Each put is atomic per key.
#[derive(Debug, Default)]
pub struct RoundCache {
    inner: Mutex<AHashMap<String, CacheEntry>>,
}

impl RoundCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<String, CacheEntry>> {
        // A panicking shard cannot leave an entry half-written, so a
        // poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one update.
    pub fn put(&self, key: &str, update: CacheUpdate) -> Result<(), FeedError> {
        let mut map = self.lock();
        match map.get_mut(key) {
            Some(entry) => entry.apply(key, update),
            None => {
                map.insert(key.to_string(), update.into());
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy the whole map under the lock.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Serialize a snapshot to `{dir}/{prefix}{tag}.rkyv`. Puts that land
    /// while the blob is being written are not included.
    pub fn flush(&self, dir: &Path, prefix: &str, tag: &str) -> Result<PathBuf> {
        let snapshot = self.snapshot();
        let keys = snapshot.len();
        let blob = CacheBlob {
            entries: snapshot.into_iter().map(|(key, entry)| BlobEntry { key, entry }).collect(),
        };
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&blob)
            .map_err(|e| FeedError::Codec(format!("cache blob encode: {e}")))?;

        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = blob_path(dir, prefix, tag);
        let tmp = path.with_extension(format!("{BLOB_EXT}.tmp"));
        fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming to {}", path.display()))?;
        info!("[cache] flushed {} keys ({} bytes) -> {}", keys, bytes.len(), path.display());
        Ok(path)
    }

    /// Read a blob written by [`flush`](Self::flush).
    pub fn reload(dir: &Path, prefix: &str, tag: &str) -> Result<CacheSnapshot> {
        let path = blob_path(dir, prefix, tag);
        let raw = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(raw.len());
        aligned.extend_from_slice(&raw);
        let blob = rkyv::from_bytes::<CacheBlob, rkyv::rancor::Error>(&aligned)
            .map_err(|e| FeedError::Codec(format!("cache blob {}: {e}", path.display())))?;
        Ok(blob.entries.into_iter().map(|e| (e.key, e.entry)).collect())
    }

    /// Write every cached series to its day partition, overwriting the day
    /// file. Returns the number of files written.
    pub fn export_to_store(&self, store: &RecordStore) -> Result<usize> {
        let mut written = 0;
        for (key, entry) in self.snapshot() {
            if entry.is_empty() {
                continue;
            }
            match &entry {
                CacheEntry::Bars(bars) => store.save(&key, bars, WriteMode::Overwrite)?,
                CacheEntry::Quotes(quotes) => store.save(&key, quotes, WriteMode::Overwrite)?,
            };
            written += 1;
        }
        info!("[cache] exported {} series to {}", written, store.root().display());
        Ok(written)
    }
}

impl CacheSink for RoundCache {
    fn put(&self, key: &str, update: CacheUpdate) -> Result<()> {
        RoundCache::put(self, key, update)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::{FileEncoding, Layout};
    use crate::types::BookLevel;

    fn quote(ts: &str, last: f64) -> QuoteRecord {
        QuoteRecord { code: "128106".into(), timeindex: ts.into(), last, ..Default::default() }
    }

    fn bar(ts: &str, close: f64) -> BarRecord {
        BarRecord { code: "113050".into(), timeindex: ts.into(), close, ..Default::default() }
    }

    #[test]
    fn replace_and_append_semantics() {
        let cache = RoundCache::new();
        cache.put("113050", CacheUpdate::ReplaceBars(vec![bar("2022-09-01 09:31:00", 1.0)])).unwrap();
        cache
            .put("113050", CacheUpdate::ReplaceBars(vec![bar("2022-09-01 09:31:00", 1.0), bar("2022-09-01 09:32:00", 2.0)]))
            .unwrap();
        cache.put("128106", CacheUpdate::AppendQuote(quote("2022-09-01 09:30:03", 1.0))).unwrap();
        cache.put("128106", CacheUpdate::AppendQuote(quote("2022-09-01 09:30:06", 2.0))).unwrap();

        assert_eq!(cache.len(), 2);
        match cache.get("113050").unwrap() {
            CacheEntry::Bars(b) => assert_eq!(b.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match cache.get("128106").unwrap() {
            CacheEntry::Quotes(q) => assert_eq!(q.iter().map(|q| q.last).collect::<Vec<_>>(), vec![1.0, 2.0]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mixed_kinds_rejected() {
        let cache = RoundCache::new();
        cache.put("k", CacheUpdate::AppendQuote(quote("2022-09-01 09:30:03", 1.0))).unwrap();
        let err = cache.put("k", CacheUpdate::ReplaceBars(vec![])).unwrap_err();
        assert!(matches!(err, FeedError::MixedSeries { existing: "quotes", incoming: "bars", .. }));
        assert_eq!(cache.get("k").unwrap().len(), 1);
    }

    #[test]
    fn flush_reload_keeps_nan() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoundCache::new();
        cache.put("128106", CacheUpdate::AppendQuote(quote("2022-09-01 09:30:03", 1.5))).unwrap();
        cache.put("113050", CacheUpdate::ReplaceBars(vec![bar("2022-09-01 09:31:00", 2.5)])).unwrap();

        let path = cache.flush(dir.path(), "snap_", "2022-09-01").unwrap();
        assert_eq!(path, dir.path().join("snap_2022-09-01.rkyv"));

        let snap = RoundCache::reload(dir.path(), "snap_", "2022-09-01").unwrap();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["113050", "128106"]);
        match &snap["128106"] {
            CacheEntry::Quotes(q) => {
                assert_eq!(q[0].last, 1.5);
                assert!(q[0].preclose.is_nan());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn full_quote(ts: &str, last: f64) -> QuoteRecord {
        let level = |i: usize| BookLevel { price: last + i as f64 * 0.01, volume: 10 * i as i64 };
        QuoteRecord {
            code: "128106".into(),
            name: "华统转债".into(),
            timeindex: ts.into(),
            localtime: "09:30:03.120000".into(),
            preclose: 118.0,
            open: 118.1,
            high: 118.5,
            low: 117.9,
            last,
            avgp: 118.21,
            volume: 1200,
            amount: 141.85,
            bids: std::array::from_fn(|i| level(i + 1)),
            asks: std::array::from_fn(|i| level(i + 6)),
        }
    }

    fn full_bar(ts: &str, close: f64) -> BarRecord {
        BarRecord {
            name: "南银转债".into(),
            code: "113050".into(),
            timeindex: ts.into(),
            preclose: 120.0,
            open: 120.2,
            close,
            high: 121.0,
            low: 119.8,
            volume: 3400,
            amount: 41.07,
            amp: 1.0,
            rtn: 0.5,
            rtn_v: 0.6,
            turnover: 0.12,
            avgp: 120.4,
        }
    }

    #[test]
    fn flush_reload_equals_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoundCache::new();
        for (i, ts) in ["2022-09-01 09:30:03", "2022-09-01 09:30:06"].into_iter().enumerate() {
            cache.put("128106", CacheUpdate::AppendQuote(full_quote(ts, 118.2 + i as f64))).unwrap();
        }
        let bars = vec![full_bar("2022-09-01 09:31:00", 120.5), full_bar("2022-09-01 09:32:00", 120.7)];
        cache.put("113050", CacheUpdate::ReplaceBars(bars)).unwrap();

        cache.flush(dir.path(), "cb", "2022-09-01").unwrap();
        assert_eq!(RoundCache::reload(dir.path(), "cb", "2022-09-01").unwrap(), cache.snapshot());
    }

    #[test]
    fn reload_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RoundCache::reload(dir.path(), "x_", "nope").is_err());
    }

    #[test]
    fn export_writes_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path(), Layout::DayPartitioned, FileEncoding::Gbk);
        let cache = RoundCache::new();
        for ts in ["2022-09-01 09:30:03", "2022-09-01 09:30:06", "2022-09-01 09:30:09"] {
            cache.put("128106", CacheUpdate::AppendQuote(quote(ts, 1.0))).unwrap();
        }
        assert_eq!(cache.export_to_store(&store).unwrap(), 1);
        let rows: Vec<QuoteRecord> = store.load("2022-09-01", "128106").unwrap();
        assert_eq!(rows.len(), 3);
    }
}
