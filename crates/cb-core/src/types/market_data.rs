//! Market data records: the common schema every provider is normalized into.
//!
//! Both record kinds derive `rkyv::Archive` so they can cross the worker pipe
//! and be written into cache blobs unchanged. JSON is not used for that path
//! because it cannot carry NaN, and NaN is the "provider had no value"
//! marker for every float field.
//!
//! # Timestamp convention
//!
//! `timeindex` is exchange time (UTC+08:00) rendered as `YYYY-MM-DD` for daily
//! and longer bars, `YYYY-MM-DD HH:MM:SS` otherwise. The first ten characters
//! are always the trading day, which is what the record store partitions on.

use csv::StringRecord;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

use crate::error::FeedError;

/// Number of book levels carried by a snapshot.
pub const BOOK_DEPTH: usize = 5;

/// Divide a provider amount (yuan) by 10,000 and round to two decimals,
/// half-to-even.
pub fn rescale_amount(raw: f64) -> f64 {
    (raw / 10_000.0 * 100.0).round_ties_even() / 100.0
}

// ---------------------------------------------------------------------------
// CSV mapping
// ---------------------------------------------------------------------------

/// Fixed-column CSV mapping used by the record store.
///
/// NaN floats are written as empty cells and empty cells read back as NaN.
pub trait CsvRow: Sized {
    fn header() -> Vec<&'static str>;
    fn to_row(&self) -> Vec<String>;
    fn from_row(row: &StringRecord) -> Result<Self, FeedError>;
    /// Exchange timestamp of the record; its first ten characters name the
    /// day partition.
    fn timeindex(&self) -> &str;
}

/// Trading day (`YYYY-MM-DD`) of a record.
pub fn record_day<R: CsvRow>(record: &R) -> Result<&str, FeedError> {
    record
        .timeindex()
        .get(..10)
        .ok_or_else(|| FeedError::Parse(format!("timeindex too short: {:?}", record.timeindex())))
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}

fn cell<'a>(row: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, FeedError> {
    row.get(idx).ok_or_else(|| FeedError::Parse(format!("missing column {name}")))
}

fn parse_f64(row: &StringRecord, idx: usize, name: &str) -> Result<f64, FeedError> {
    let s = cell(row, idx, name)?.trim();
    if s.is_empty() {
        return Ok(f64::NAN);
    }
    s.parse().map_err(|_| FeedError::Parse(format!("column {name}: bad float {s:?}")))
}

fn parse_i64(row: &StringRecord, idx: usize, name: &str) -> Result<i64, FeedError> {
    let s = cell(row, idx, name)?.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<i64>()
        .or_else(|_| s.parse::<f64>().map(|f| f as i64))
        .map_err(|_| FeedError::Parse(format!("column {name}: bad integer {s:?}")))
}

// ---------------------------------------------------------------------------
// Snapshot quote
// ---------------------------------------------------------------------------

/// One side of one order book level.
#[derive(Debug, Clone, Copy, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct BookLevel {
    pub price: f64,
    pub volume: i64,
}

impl Default for BookLevel {
    fn default() -> Self {
        Self { price: f64::NAN, volume: 0 }
    }
}

/// A snapshot quote, one per fetch call.
///
/// `bids[0]` / `asks[0]` are level 1 (best bid / best ask).
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct QuoteRecord {
    pub code: String,
    pub name: String,
    pub timeindex: String,
    /// Host-local capture time.
    pub localtime: String,
    pub preclose: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub last: f64,
    pub avgp: f64,
    pub volume: i64,
    /// Turnover in units of 10,000 yuan.
    pub amount: f64,
    pub bids: [BookLevel; BOOK_DEPTH],
    pub asks: [BookLevel; BOOK_DEPTH],
}

impl Default for QuoteRecord {
    fn default() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            timeindex: String::new(),
            localtime: String::new(),
            preclose: f64::NAN,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            last: f64::NAN,
            avgp: f64::NAN,
            volume: 0,
            amount: f64::NAN,
            bids: [BookLevel::default(); BOOK_DEPTH],
            asks: [BookLevel::default(); BOOK_DEPTH],
        }
    }
}

const QUOTE_HEADER: [&str; 32] = [
    "code", "name", "timeindex", "localtime", "preclose", "open", "high", "low", "last", "avgp",
    "volume", "amount", "ask5p", "ask5v", "ask4p", "ask4v", "ask3p", "ask3v", "ask2p", "ask2v",
    "ask1p", "ask1v", "bid1p", "bid1v", "bid2p", "bid2v", "bid3p", "bid3v", "bid4p", "bid4v",
    "bid5p", "bid5v",
];

/// Column of the first book cell.
const QUOTE_BOOK_START: usize = 12;

impl CsvRow for QuoteRecord {
    fn header() -> Vec<&'static str> {
        QUOTE_HEADER.to_vec()
    }

    fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(QUOTE_HEADER.len());
        row.push(self.code.clone());
        row.push(self.name.clone());
        row.push(self.timeindex.clone());
        row.push(self.localtime.clone());
        for v in [self.preclose, self.open, self.high, self.low, self.last, self.avgp] {
            row.push(fmt_f64(v));
        }
        row.push(self.volume.to_string());
        row.push(fmt_f64(self.amount));
        // asks deepest first, then bids best first
        for lvl in self.asks.iter().rev().chain(self.bids.iter()) {
            row.push(fmt_f64(lvl.price));
            row.push(lvl.volume.to_string());
        }
        row
    }

    fn from_row(row: &StringRecord) -> Result<Self, FeedError> {
        let h = &QUOTE_HEADER;
        let f = |i: usize| parse_f64(row, i, h[i]);
        let mut rec = Self {
            code: cell(row, 0, h[0])?.to_string(),
            name: cell(row, 1, h[1])?.to_string(),
            timeindex: cell(row, 2, h[2])?.to_string(),
            localtime: cell(row, 3, h[3])?.to_string(),
            preclose: f(4)?,
            open: f(5)?,
            high: f(6)?,
            low: f(7)?,
            last: f(8)?,
            avgp: f(9)?,
            volume: parse_i64(row, 10, h[10])?,
            amount: f(11)?,
            ..Default::default()
        };
        for k in 0..BOOK_DEPTH {
            // ask(5-k) sits at pair k, bid(k+1) at pair BOOK_DEPTH + k
            let ask_col = QUOTE_BOOK_START + 2 * k;
            rec.asks[BOOK_DEPTH - 1 - k] = BookLevel {
                price: f(ask_col)?,
                volume: parse_i64(row, ask_col + 1, h[ask_col + 1])?,
            };
            let bid_col = QUOTE_BOOK_START + 2 * (BOOK_DEPTH + k);
            rec.bids[k] = BookLevel {
                price: f(bid_col)?,
                volume: parse_i64(row, bid_col + 1, h[bid_col + 1])?,
            };
        }
        Ok(rec)
    }

    fn timeindex(&self) -> &str {
        &self.timeindex
    }
}

// ---------------------------------------------------------------------------
// Historical bar
// ---------------------------------------------------------------------------

/// A historical bar (minute, daily, weekly or monthly).
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct BarRecord {
    pub name: String,
    pub code: String,
    pub timeindex: String,
    pub preclose: f64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    /// Turnover in units of 10,000 yuan.
    pub amount: f64,
    /// Amplitude, percent.
    pub amp: f64,
    /// Return, percent.
    pub rtn: f64,
    /// Return, price change.
    pub rtn_v: f64,
    pub turnover: f64,
    /// Session average price; only intraday trends carry it.
    pub avgp: f64,
}

impl Default for BarRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            code: String::new(),
            timeindex: String::new(),
            preclose: f64::NAN,
            open: f64::NAN,
            close: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            volume: 0,
            amount: f64::NAN,
            amp: f64::NAN,
            rtn: f64::NAN,
            rtn_v: f64::NAN,
            turnover: f64::NAN,
            avgp: f64::NAN,
        }
    }
}

const BAR_HEADER: [&str; 15] = [
    "name", "code", "timeindex", "preclose", "open", "close", "high", "low", "volume", "amount",
    "amp", "rtn", "rtn_v", "turnover", "avgp",
];

impl CsvRow for BarRecord {
    fn header() -> Vec<&'static str> {
        BAR_HEADER.to_vec()
    }

    fn to_row(&self) -> Vec<String> {
        let mut row = vec![self.name.clone(), self.code.clone(), self.timeindex.clone()];
        for v in [self.preclose, self.open, self.close, self.high, self.low] {
            row.push(fmt_f64(v));
        }
        row.push(self.volume.to_string());
        for v in [self.amount, self.amp, self.rtn, self.rtn_v, self.turnover, self.avgp] {
            row.push(fmt_f64(v));
        }
        row
    }

    fn from_row(row: &StringRecord) -> Result<Self, FeedError> {
        let h = &BAR_HEADER;
        let f = |i: usize| parse_f64(row, i, h[i]);
        Ok(Self {
            name: cell(row, 0, h[0])?.to_string(),
            code: cell(row, 1, h[1])?.to_string(),
            timeindex: cell(row, 2, h[2])?.to_string(),
            preclose: f(3)?,
            open: f(4)?,
            close: f(5)?,
            high: f(6)?,
            low: f(7)?,
            volume: parse_i64(row, 8, h[8])?,
            amount: f(9)?,
            amp: f(10)?,
            rtn: f(11)?,
            rtn_v: f(12)?,
            turnover: f(13)?,
            avgp: f(14)?,
        })
    }

    fn timeindex(&self) -> &str {
        &self.timeindex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_rescale() {
        assert_eq!(rescale_amount(1_234_567.89), 123.46);
        assert_eq!(rescale_amount(0.0), 0.0);
        assert!(rescale_amount(f64::NAN).is_nan());
    }

    #[test]
    fn quote_book_column_order() {
        let mut q = QuoteRecord { code: "128106".into(), timeindex: "2022-09-01 09:30:03".into(), ..Default::default() };
        q.asks[0] = BookLevel { price: 101.0, volume: 10 };
        q.asks[4] = BookLevel { price: 105.0, volume: 50 };
        q.bids[0] = BookLevel { price: 100.0, volume: 1 };
        let row = q.to_row();
        assert_eq!(row.len(), QUOTE_HEADER.len());
        let at = |name: &str| &row[QUOTE_HEADER.iter().position(|h| *h == name).unwrap()];
        assert_eq!(at("ask1p"), "101");
        assert_eq!(at("ask5v"), "50");
        assert_eq!(at("bid1v"), "1");
        assert_eq!(at("bid2p"), "");

        let back = QuoteRecord::from_row(&StringRecord::from(row)).unwrap();
        assert_eq!(back.asks[4].price, 105.0);
        assert_eq!(back.bids[0].volume, 1);
        assert!(back.bids[1].price.is_nan());
        assert!(back.preclose.is_nan());
    }

    #[test]
    fn bar_row_keeps_nan_cells_empty() {
        let b = BarRecord { timeindex: "2022-09-01".into(), close: 120.5, volume: 3, ..Default::default() };
        let row = b.to_row();
        assert_eq!(row[5], "120.5");
        assert_eq!(row[14], "");
        let back = BarRecord::from_row(&StringRecord::from(row)).unwrap();
        assert_eq!(back.close, 120.5);
        assert!(back.avgp.is_nan());
        assert_eq!(record_day(&back).unwrap(), "2022-09-01");
    }

    #[test]
    fn short_row_is_parse_error() {
        let row = StringRecord::from(vec!["a", "b"]);
        assert!(matches!(BarRecord::from_row(&row), Err(FeedError::Parse(_))));
    }
}
