//! Configuration parsing for the collector.
//!
//! A single JSON file drives a run. The top-level structure carries logging
//! metadata and a `jobs` array; each job is one pool run against one provider.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "cb_feed", "log_path": "/tmp/log" },
//!   "jobs": [{
//!     "provider": "dc_snap",
//!     "db_root": "./DCsnap",
//!     "workers": 4,
//!     "rounds": 240,
//!     "backend": "process",
//!     "mode": "cache",
//!     "cache_prefix": "snap_",
//!     "round_interval_ms": 3000,
//!     "universe": { "path": "./jsl.csv", "column": "代码", "kind": "bond" }
//!   }]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::FeedError;
use crate::types::{Adjust, Granularity, SymbolStyle};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub meta: ModuleMeta,

    /// Jobs run one after another by the runner.
    pub jobs: Vec<JobConfig>,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

impl ModuleMeta {
    pub fn module_name(&self) -> String {
        self.module_name.clone().unwrap_or_else(|| "cb_feed".to_string())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Data provider behind a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Eastmoney snapshot quotes, appended per tick.
    DcSnap,
    /// Eastmoney K-line endpoint at 1-minute granularity.
    EfMinute,
    /// Eastmoney K-line endpoint at daily or longer granularity.
    EfKline,
    /// Eastmoney intraday trends endpoint.
    AkMinute,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DcSnap => "dc_snap",
            Self::EfMinute => "ef_minute",
            Self::EfKline => "ef_kline",
            Self::AkMinute => "ak_minute",
        }
    }
}

/// Where shards execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Tasks on the tokio runtime, shared memory.
    #[default]
    Thread,
    /// One child process per shard.
    Process,
}

/// What a collector does with fetched records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    #[default]
    Save,
    Cache,
    SaveAndCache,
}

impl CollectMode {
    pub fn saves(self) -> bool {
        matches!(self, Self::Save | Self::SaveAndCache)
    }

    pub fn caches(self) -> bool {
        matches!(self, Self::Cache | Self::SaveAndCache)
    }
}

/// Security kind of a universe column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityKind {
    #[default]
    Bond,
    Equity,
}

/// Symbols read from a parameter table (jisilu-style export).
#[derive(Debug, Clone, Deserialize)]
pub struct UniverseConfig {
    pub path: PathBuf,
    /// Header of the column holding bare codes.
    pub column: String,
    #[serde(default)]
    pub kind: SecurityKind,
    /// Output qualification; defaults to the provider's native form.
    pub style: Option<SymbolStyle>,
    /// Table encoding; `gbk` unless stated.
    #[serde(default = "default_universe_encoding")]
    pub encoding: String,
}

fn default_universe_encoding() -> String {
    "gbk".to_string()
}

/// Historical query window.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default)]
    pub adjust: Adjust,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            start: default_start(),
            end: default_end(),
            adjust: Adjust::default(),
        }
    }
}

fn default_start() -> String {
    "20200101".to_string()
}

fn default_end() -> String {
    "20500101".to_string()
}

/// A single pool run.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub provider: Provider,

    /// Root directory of the record store and cache blobs.
    pub db_root: PathBuf,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_rounds")]
    pub rounds: usize,

    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub mode: CollectMode,

    /// File-name prefix of cache blobs; flush is skipped when unset.
    pub cache_prefix: Option<String>,

    /// Cache blob tag; defaults to today's date.
    pub tag: Option<String>,

    /// Clear the cache after each flush.
    #[serde(default)]
    pub clear_on_flush: bool,

    /// Export cached series to day partitions when the run ends.
    #[serde(default)]
    pub export_cache: bool,

    /// Pause between rounds, in milliseconds.
    #[serde(default)]
    pub round_interval_ms: u64,

    /// Explicit symbol list.
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Symbols from a parameter table, appended after `symbols`.
    pub universe: Option<UniverseConfig>,

    #[serde(default)]
    pub query: QueryConfig,

    /// Override the provider host (tests point this at a mock server).
    pub base_url: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_rounds() -> usize {
    1
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl JobConfig {
    /// Reject settings no pool run can honor.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.workers == 0 {
            return Err(FeedError::Config(format!("{}: workers must be >= 1", self.provider.as_str())));
        }
        if self.rounds == 0 {
            return Err(FeedError::Config(format!("{}: rounds must be >= 1", self.provider.as_str())));
        }
        if self.symbols.is_empty() && self.universe.is_none() {
            return Err(FeedError::Config(format!(
                "{}: neither symbols nor universe given",
                self.provider.as_str()
            )));
        }
        if self.mode.caches() && self.provider == Provider::EfKline {
            return Err(FeedError::Config("ef_kline does not support cache modes".into()));
        }
        if self.export_cache && !self.mode.caches() {
            return Err(FeedError::Config("export_cache requires a cache mode".into()));
        }
        Ok(())
    }

    /// Cache blob tag for this run.
    pub fn effective_tag(&self) -> String {
        self.tag.clone().unwrap_or_else(crate::time_util::today)
    }
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: AppConfig =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    for job in &config.jobs {
        job.validate()?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{ "jobs": [{ "provider": "ef_minute", "db_root": "/tmp/x", "symbols": ["128106"] }] }"#,
        )
        .unwrap();
        let job = &cfg.jobs[0];
        assert_eq!(job.workers, 4);
        assert_eq!(job.rounds, 1);
        assert_eq!(job.backend, Backend::Thread);
        assert_eq!(job.mode, CollectMode::Save);
        assert_eq!(job.query.granularity, Granularity::Day);
        assert_eq!(job.timeout_ms, 5_000);
        assert_eq!(cfg.meta.module_name(), "cb_feed");
        job.validate().unwrap();
    }

    #[test]
    fn full_job_parses() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
              "meta": { "module_name": "snap", "log_path": "/tmp/log" },
              "jobs": [{
                "provider": "dc_snap", "db_root": "./DC", "workers": 2, "rounds": 3,
                "backend": "process", "mode": "save_and_cache", "cache_prefix": "snap_",
                "tag": "2022-09-01", "round_interval_ms": 3000,
                "universe": { "path": "jsl.csv", "column": "code", "kind": "equity", "style": "suffix" },
                "query": { "granularity": "1m", "adjust": "forward" }
              }]
            }"#,
        )
        .unwrap();
        let job = &cfg.jobs[0];
        assert_eq!(job.backend, Backend::Process);
        assert!(job.mode.saves() && job.mode.caches());
        assert_eq!(job.effective_tag(), "2022-09-01");
        let u = job.universe.as_ref().unwrap();
        assert_eq!(u.kind, SecurityKind::Equity);
        assert_eq!(u.style, Some(SymbolStyle::Suffix));
        assert_eq!(u.encoding, "gbk");
        assert_eq!(job.query.adjust, Adjust::Forward);
        job.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_jobs() {
        let parse = |s: &str| -> JobConfig { serde_json::from_str(s).unwrap() };
        let zero = parse(r#"{ "provider": "dc_snap", "db_root": ".", "workers": 0, "symbols": ["a"] }"#);
        assert!(matches!(zero.validate(), Err(FeedError::Config(_))));
        let empty = parse(r#"{ "provider": "dc_snap", "db_root": "." }"#);
        assert!(empty.validate().is_err());
        let kline_cache = parse(r#"{ "provider": "ef_kline", "db_root": ".", "mode": "cache", "symbols": ["a"] }"#);
        assert!(kline_cache.validate().is_err());
    }
}
