//! Intraday 1-minute trends (`/api/qt/stock/trends2/get`).
//!
//! Takes prefixed symbols (`sz128106`). Rows of `data.trends` are
//!
//! ```text
//! time,open,close,high,low,volume,amount,avg
//! ```
//!
//! where `avg` is the running session average price. Every row shares the
//! session's `data.preClose`.

use anyhow::Result;
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::types::{BarRecord, rescale_amount, resolve, secid};
use serde_json::Value;

use super::{EastmoneyConfig, EmHttp};
use crate::MinuteSource;
use crate::json_util::{cell_f64, cell_i64, f64_or_nan, str_field, string_rows, with_seconds};

const PATH: &str = "/api/qt/stock/trends2/get";

const FIELDS1: &str = "f1,f2,f3,f4,f5,f6,f7,f8,f9,f10,f11,f12,f13";
const FIELDS2: &str = "f51,f52,f53,f54,f55,f56,f57,f58";
const UT: &str = "fa5fd1943c7b386f172d6893dbfba10b";

const ROW_FIELDS: usize = 8;

/// Trends adapter (`ak_minute`).
#[derive(Debug, Clone)]
pub struct TrendsClient {
    http: EmHttp,
}

impl TrendsClient {
    pub fn new(cfg: &EastmoneyConfig) -> Result<Self> {
        Ok(Self { http: EmHttp::new(cfg.history_host(), cfg)? })
    }
}

#[async_trait]
impl MinuteSource for TrendsClient {
    fn name(&self) -> &str {
        "ak_minute"
    }

    async fn fetch_minute(&self, symbol: &str) -> Result<Vec<BarRecord>> {
        let (exchange, code) = resolve(symbol);
        let params = [
            ("fields1", FIELDS1.to_string()),
            ("fields2", FIELDS2.to_string()),
            ("ut", UT.to_string()),
            ("ndays", "1".to_string()),
            ("iscr", "0".to_string()),
            ("iscca", "0".to_string()),
            ("secid", secid(exchange, code)),
        ];
        let data = self.http.get_data(PATH, &params, symbol).await?;
        let bars = parse_trends(&data)?;
        if bars.is_empty() {
            return Err(FeedError::EmptyResult(symbol.to_string()).into());
        }
        Ok(bars)
    }
}

/// Build 1-minute bars from a trends `data` object.
pub fn parse_trends(data: &Value) -> Result<Vec<BarRecord>> {
    let name = str_field(data, "name");
    let code = str_field(data, "code");
    let preclose = f64_or_nan(data, "preClose");

    string_rows(data, "trends")?
        .into_iter()
        .map(|row| {
            let f: Vec<&str> = row.split(',').collect();
            if f.len() < ROW_FIELDS {
                let msg = format!("trends row for {code} has {} fields: {row}", f.len());
                return Err(anyhow::Error::from(FeedError::Parse(msg)));
            }
            Ok(BarRecord {
                name: name.clone(),
                code: code.clone(),
                timeindex: with_seconds(f[0]),
                preclose,
                open: cell_f64(f[1]),
                close: cell_f64(f[2]),
                high: cell_f64(f[3]),
                low: cell_f64(f[4]),
                volume: cell_i64(f[5]),
                amount: rescale_amount(cell_f64(f[6])),
                avgp: cell_f64(f[7]),
                ..Default::default()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn payload(rows: &[&str]) -> String {
        json!({ "rc": 0, "data": { "code": "128106", "name": "华统转债", "preClose": 130.0, "trends": rows } })
            .to_string()
    }

    #[tokio::test]
    async fn fetch_parses_rows() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("secid".into(), "0.128106".into()),
                Matcher::UrlEncoded("ndays".into(), "1".into()),
            ]))
            .with_body(payload(&[
                "2022-09-01 09:30,130.1,130.1,130.1,130.1,10,13010.0,130.1",
                "2022-09-01 09:31,130.1,130.6,130.8,130.0,25,32650.0,130.45",
            ]))
            .create_async()
            .await;
        let client = TrendsClient::new(&EastmoneyConfig::with_base_url(server.url())).unwrap();
        let bars = client.fetch_minute("sz128106").await.unwrap();
        m.assert_async().await;

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].timeindex, "2022-09-01 09:31:00");
        assert!(bars.iter().all(|b| b.preclose == 130.0));
        assert_eq!(bars[1].avgp, 130.45);
        assert_eq!(bars[0].amount, 1.3);
        assert!(bars[0].amp.is_nan());
    }

    #[tokio::test]
    async fn empty_session_raises() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", PATH).match_query(Matcher::Any).with_body(payload(&[])).create_async().await;
        let client = TrendsClient::new(&EastmoneyConfig::with_base_url(server.url())).unwrap();
        let err = client.fetch_minute("sz128106").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::EmptyResult(_))));
    }
}
