//! Historical K-lines (`/api/qt/stock/kline/get`).
//!
//! Takes bare codes (`128106`, `600036`); the exchange is inferred. Each row
//! of `data.klines` is
//!
//! ```text
//! date,open,close,high,low,volume,amount,amplitude,pct,change,turnover
//! ```
//!
//! The payload carries no per-row previous close: the first row uses
//! `data.preKPrice`, later rows the close of the row before.

use anyhow::Result;
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::types::{BarRecord, Granularity, compact_day, rescale_amount, resolve, secid};
use serde_json::Value;

use super::{EastmoneyConfig, EmHttp};
use crate::json_util::{cell_f64, cell_i64, f64_or_nan, str_field, string_rows, with_seconds};
use crate::{BarQuery, BarSource, MinuteSource};

const PATH: &str = "/api/qt/stock/kline/get";

const FIELDS1: &str = "f1,f2,f3,f4,f5,f6";
const FIELDS2: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61";

/// 1-minute queries ignore the window and return the latest session.
const MINUTE_BEG: &str = "19000101";
const MINUTE_END: &str = "20500101";

const ROW_FIELDS: usize = 11;

/// K-line adapter (`ef_kline`, `ef_minute`).
#[derive(Debug, Clone)]
pub struct KlineClient {
    http: EmHttp,
}

impl KlineClient {
    pub fn new(cfg: &EastmoneyConfig) -> Result<Self> {
        Ok(Self { http: EmHttp::new(cfg.history_host(), cfg)? })
    }
}

#[async_trait]
impl BarSource for KlineClient {
    fn name(&self) -> &str {
        "ef_kline"
    }

    async fn fetch_bars(&self, symbol: &str, query: &BarQuery) -> Result<Vec<BarRecord>> {
        let (exchange, code) = resolve(symbol);
        let (beg, end) = if query.granularity == Granularity::Min1 {
            (MINUTE_BEG.to_string(), MINUTE_END.to_string())
        } else {
            (compact_day(&query.start)?, compact_day(&query.end)?)
        };
        let params = [
            ("fields1", FIELDS1.to_string()),
            ("fields2", FIELDS2.to_string()),
            ("rtntype", "6".to_string()),
            ("secid", secid(exchange, code)),
            ("klt", query.granularity.klt().to_string()),
            ("fqt", query.adjust.fqt().to_string()),
            ("beg", beg),
            ("end", end),
        ];
        let data = self.http.get_data(PATH, &params, symbol).await?;
        let bars = parse_klines(&data, query.granularity)?;
        if bars.is_empty() && query.granularity.is_intraday() {
            return Err(FeedError::EmptyResult(symbol.to_string()).into());
        }
        Ok(bars)
    }
}

#[async_trait]
impl MinuteSource for KlineClient {
    fn name(&self) -> &str {
        "ef_minute"
    }

    async fn fetch_minute(&self, symbol: &str) -> Result<Vec<BarRecord>> {
        self.fetch_bars(symbol, &BarQuery::minute()).await
    }
}

/// Build bars from a K-line `data` object.
pub fn parse_klines(data: &Value, granularity: Granularity) -> Result<Vec<BarRecord>> {
    let name = str_field(data, "name");
    let code = str_field(data, "code");
    let mut preclose = f64_or_nan(data, "preKPrice");

    let rows = string_rows(data, "klines")?;
    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let f: Vec<&str> = row.split(',').collect();
        if f.len() < ROW_FIELDS {
            return Err(FeedError::Parse(format!("kline row for {code} has {} fields: {row}", f.len())).into());
        }
        let close = cell_f64(f[2]);
        let timeindex = if granularity.is_intraday() { with_seconds(f[0]) } else { f[0].to_string() };
        bars.push(BarRecord {
            name: name.clone(),
            code: code.clone(),
            timeindex,
            preclose,
            open: cell_f64(f[1]),
            close,
            high: cell_f64(f[3]),
            low: cell_f64(f[4]),
            volume: cell_i64(f[5]),
            amount: rescale_amount(cell_f64(f[6])),
            amp: cell_f64(f[7]),
            rtn: cell_f64(f[8]),
            rtn_v: cell_f64(f[9]),
            turnover: cell_f64(f[10]),
            avgp: f64::NAN,
        });
        preclose = close;
    }
    Ok(bars)
}
