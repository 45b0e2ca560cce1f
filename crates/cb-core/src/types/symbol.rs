//! Symbol and day-string normalization.
//!
//! Providers disagree on how a security is named: some want the bare code
//! (`128106`), some the exchange-prefixed form (`sz128106`), and exported
//! parameter tables use the suffixed form (`128106.SZ`). This module converts
//! between the three and infers the listing exchange from the code itself.

use serde::Deserialize;

use super::enums::Exchange;
use crate::error::FeedError;

/// How a symbol is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymbolStyle {
    /// `sz128106`
    #[default]
    Prefix,
    /// `128106.SZ`
    Suffix,
    /// `128106`
    Bare,
}

/// Listing exchange of a convertible bond.
///
/// Shanghai bonds start with `11`, Shenzhen bonds with `12`; anything else is
/// not a convertible bond code.
pub fn bond_exchange(code: &str) -> Result<Exchange, FeedError> {
    match code.get(..2) {
        Some("11") => Ok(Exchange::Sh),
        Some("12") => Ok(Exchange::Sz),
        _ => Err(FeedError::Parse(format!("cannot determine exchange for bond {code}"))),
    }
}

/// Listing exchange of an A-share equity: `6xxxxx` is Shanghai, everything
/// else Shenzhen.
pub fn equity_exchange(code: &str) -> Exchange {
    if code.starts_with('6') { Exchange::Sh } else { Exchange::Sz }
}

/// Best-effort exchange for a bare code that may be a bond or an equity.
pub fn infer_exchange(code: &str) -> Exchange {
    bond_exchange(code).unwrap_or_else(|_| equity_exchange(code))
}

/// Write `code` in the requested style.
pub fn qualify(code: &str, exchange: Exchange, style: SymbolStyle) -> String {
    match style {
        SymbolStyle::Prefix => format!("{}{code}", exchange.prefix()),
        SymbolStyle::Suffix => format!("{code}.{}", exchange.suffix()),
        SymbolStyle::Bare => code.to_string(),
    }
}

/// Qualify a convertible bond code (fails for non-bond codes).
pub fn qualify_bond(code: &str, style: SymbolStyle) -> Result<String, FeedError> {
    Ok(qualify(code, bond_exchange(code)?, style))
}

/// Qualify an equity code.
pub fn qualify_equity(code: &str, style: SymbolStyle) -> String {
    qualify(code, equity_exchange(code), style)
}

/// Split a prefixed (`sz128106`) or suffixed (`128106.SZ`) symbol into its
/// exchange and bare code. Returns `None` for bare symbols.
pub fn split_qualified(symbol: &str) -> Option<(Exchange, &str)> {
    if let Some((code, suffix)) = symbol.rsplit_once('.') {
        return Exchange::from_prefix(suffix).map(|ex| (ex, code));
    }
    let (head, code) = (symbol.get(..2)?, symbol.get(2..)?);
    let ex = Exchange::from_prefix(head)?;
    if code.is_empty() { None } else { Some((ex, code)) }
}

/// Strip any exchange qualification, leaving the bare code. Bare input is
/// returned unchanged.
pub fn strip_exchange(symbol: &str) -> &str {
    split_qualified(symbol).map(|(_, code)| code).unwrap_or(symbol)
}

/// Resolve the exchange and bare code of any symbol form, inferring the
/// exchange for bare codes.
pub fn resolve(symbol: &str) -> (Exchange, &str) {
    split_qualified(symbol).unwrap_or_else(|| (infer_exchange(symbol), symbol))
}

/// Eastmoney security id: `{market_code}.{code}`.
pub fn secid(exchange: Exchange, code: &str) -> String {
    format!("{}.{code}", exchange.market_code())
}

/// Normalize a day string to `YYYY-MM-DD`. Accepts `YYYYMMDD` and strings that
/// are already dashed.
pub fn formal_day(day: &str) -> Result<String, FeedError> {
    if day.contains('-') {
        return Ok(day.to_string());
    }
    if day.len() != 8 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FeedError::Parse(format!("bad day string: {day:?}")));
    }
    Ok(format!("{}-{}-{}", &day[..4], &day[4..6], &day[6..8]))
}

/// Normalize a day string to the undashed `YYYYMMDD` form providers expect.
pub fn compact_day(day: &str) -> Result<String, FeedError> {
    Ok(formal_day(day)?.replace('-', ""))
}
