//! Eastmoney fetch adapters.
//!
//! Three endpoint families, one adapter each:
//! - [`SnapshotClient`]: `/api/qt/stock/get`, five-level quote snapshot
//! - [`KlineClient`]: `/api/qt/stock/kline/get`, minute to monthly bars
//! - [`TrendsClient`]: `/api/qt/stock/trends2/get`, today's 1-minute trend
//!
//! Every response wraps its payload in a `data` object; `data: null` means
//! the provider does not know the security.

pub mod config;
pub mod kline;
pub mod snapshot;
pub mod trends;

use anyhow::{Context, Result};
use cb_core::error::FeedError;
use serde_json::Value;

pub use self::config::EastmoneyConfig;
pub use self::kline::KlineClient;
pub use self::snapshot::SnapshotClient;
pub use self::trends::TrendsClient;

/// Thin HTTP wrapper shared by the adapters.
#[derive(Debug, Clone)]
pub(crate) struct EmHttp {
    http: reqwest::Client,
    host: String,
}

impl EmHttp {
    pub(crate) fn new(host: &str, cfg: &EastmoneyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, host: host.trim_end_matches('/').to_string() })
    }

    /// GET `{host}{path}?{params}` and return the `data` object.
    pub(crate) async fn get_data(&self, path: &str, params: &[(&str, String)], symbol: &str) -> Result<Value> {
        let url = format!("{}{}", self.host, path);
        let mut body: Value = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match body.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(FeedError::Provider(format!("{path}: no data for {symbol}")).into()),
        }
    }
}
