//! Five-level quote snapshot (`/api/qt/stock/get`).
//!
//! Input symbols are exchange-prefixed (`sz128106`, `sh600036`); bare codes
//! fall back to exchange inference. Field codes of the `data` object:
//!
//! | field | meaning      | field     | meaning           |
//! |-------|--------------|-----------|-------------------|
//! | f57   | code         | f43       | last              |
//! | f58   | name         | f71       | average price     |
//! | f86   | epoch secs   | f47       | volume (lots)     |
//! | f60   | prev close   | f48       | amount (yuan)     |
//! | f46   | open         | f31..f40  | ask5..ask1 p/v    |
//! | f44   | high         | f19..f12  | bid1..bid5 p/v    |
//! | f45   | low          |           |                   |

use anyhow::Result;
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::time_util::{exchange_time, now_ms, now_stamp};
use cb_core::types::{BOOK_DEPTH, BookLevel, QuoteRecord, rescale_amount, resolve, secid};
use serde_json::Value;

use super::{EastmoneyConfig, EmHttp};
use crate::QuoteSource;
use crate::json_util::{f64_or_nan, i64_or_zero, str_field};

const PATH: &str = "/api/qt/stock/get";

const FIELDS: &str = "f57,f58,f86,f530,f60,f43,f44,f45,f46,f47,f48,f71,f169,f170,f171,f50,f49,f161,f191,f192";

/// (price, volume) field codes for ask1..ask5.
const ASK_FIELDS: [(&str, &str); BOOK_DEPTH] =
    [("f39", "f40"), ("f37", "f38"), ("f35", "f36"), ("f33", "f34"), ("f31", "f32")];

/// (price, volume) field codes for bid1..bid5.
const BID_FIELDS: [(&str, &str); BOOK_DEPTH] =
    [("f19", "f20"), ("f17", "f18"), ("f15", "f16"), ("f13", "f14"), ("f11", "f12")];

/// Snapshot adapter (`dc_snap`).
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    http: EmHttp,
}

impl SnapshotClient {
    pub fn new(cfg: &EastmoneyConfig) -> Result<Self> {
        Ok(Self { http: EmHttp::new(cfg.quote_host(), cfg)? })
    }
}

#[async_trait]
impl QuoteSource for SnapshotClient {
    fn name(&self) -> &str {
        "dc_snap"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord> {
        let (exchange, code) = resolve(symbol);
        let params = [
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fields", FIELDS.to_string()),
            ("secid", secid(exchange, code)),
            ("_", now_ms().to_string()),
        ];
        let data = self.http.get_data(PATH, &params, symbol).await?;
        Ok(parse_snapshot(&data, now_stamp())?)
    }
}

fn book(data: &Value, fields: [(&str, &str); BOOK_DEPTH]) -> [BookLevel; BOOK_DEPTH] {
    fields.map(|(p, v)| BookLevel { price: f64_or_nan(data, p), volume: i64_or_zero(data, v) })
}

/// Build a [`QuoteRecord`] from a snapshot `data` object.
pub fn parse_snapshot(data: &Value, localtime: String) -> Result<QuoteRecord, FeedError> {
    let epoch = data
        .get("f86")
        .and_then(Value::as_i64)
        .ok_or_else(|| FeedError::Parse(format!("snapshot without f86 timestamp: {}", str_field(data, "f57"))))?;
    let timeindex =
        exchange_time(epoch).ok_or_else(|| FeedError::Parse(format!("snapshot timestamp out of range: {epoch}")))?;

    Ok(QuoteRecord {
        code: str_field(data, "f57"),
        name: str_field(data, "f58"),
        timeindex,
        localtime,
        preclose: f64_or_nan(data, "f60"),
        open: f64_or_nan(data, "f46"),
        high: f64_or_nan(data, "f44"),
        low: f64_or_nan(data, "f45"),
        last: f64_or_nan(data, "f43"),
        avgp: f64_or_nan(data, "f71"),
        volume: i64_or_zero(data, "f47"),
        amount: rescale_amount(f64_or_nan(data, "f48")),
        bids: book(data, BID_FIELDS),
        asks: book(data, ASK_FIELDS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "f57": "128106", "f58": "华统转债", "f86": 1_661_995_803,
            "f60": 130.0, "f46": 130.5, "f44": 131.2, "f45": 129.8, "f43": 130.9, "f71": 130.61,
            "f47": 52_340, "f48": 1_234_567.89,
            "f31": 131.5, "f32": 50, "f33": 131.4, "f34": 40, "f35": 131.3, "f36": 30,
            "f37": 131.2, "f38": 20, "f39": 131.0, "f40": 10,
            "f19": 130.9, "f20": 11, "f17": 130.8, "f18": 21, "f15": 130.7, "f16": 31,
            "f13": "-", "f14": "-", "f11": 130.5, "f12": 51
        })
    }

    #[test]
    fn parses_book_and_rescales_amount() {
        let q = parse_snapshot(&sample(), "2022-09-01 09:30:04".into()).unwrap();
        assert_eq!(q.code, "128106");
        assert_eq!(q.timeindex, "2022-09-01 09:30:03");
        assert_eq!(q.amount, 123.46);
        assert_eq!(q.volume, 52_340);
        assert_eq!(q.asks[0], BookLevel { price: 131.0, volume: 10 });
        assert_eq!(q.asks[4], BookLevel { price: 131.5, volume: 50 });
        assert_eq!(q.bids[0], BookLevel { price: 130.9, volume: 11 });
        assert!(q.bids[3].price.is_nan());
        assert_eq!(q.bids[3].volume, 0);
    }

    #[test]
    fn missing_timestamp_is_parse_error() {
        let mut data = sample();
        data["f86"] = json!("-");
        assert!(matches!(parse_snapshot(&data, String::new()), Err(FeedError::Parse(_))));
    }

    #[tokio::test]
    async fn fetch_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("secid".into(), "0.128106".into()),
                Matcher::UrlEncoded("fltt".into(), "2".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(json!({ "rc": 0, "data": sample() }).to_string())
            .create_async()
            .await;

        let client = SnapshotClient::new(&EastmoneyConfig::with_base_url(server.url())).unwrap();
        let q = client.fetch_quote("sz128106").await.unwrap();
        assert_eq!(q.name, "华统转债");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn null_data_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"rc":0,"data":null}"#)
            .create_async()
            .await;
        let client = SnapshotClient::new(&EastmoneyConfig::with_base_url(server.url())).unwrap();
        let err = client.fetch_quote("sh999999").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::Provider(_))));
    }
}
