//! Enumerations shared by the adapters, the store and the config.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Exchanges
// ---------------------------------------------------------------------------

/// Mainland exchanges on which convertible bonds and their underlyings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    /// Shanghai Stock Exchange.
    Sh,
    /// Shenzhen Stock Exchange.
    Sz,
}

impl Exchange {
    /// Lowercase prefix form: `sh` / `sz`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Sz => "sz",
        }
    }

    /// Uppercase suffix form: `SH` / `SZ`.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Sh => "SH",
            Self::Sz => "SZ",
        }
    }

    /// Eastmoney market-type code used in `secid` (`1` Shanghai, `0` Shenzhen).
    pub fn market_code(self) -> u8 {
        match self {
            Self::Sh => 1,
            Self::Sz => 0,
        }
    }

    /// Parse a two-letter prefix, case-insensitive.
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sh" => Some(Self::Sh),
            "sz" => Some(Self::Sz),
            _ => None,
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

// ---------------------------------------------------------------------------
// Bar granularity
// ---------------------------------------------------------------------------

/// Time bucket of a historical bar.
///
/// The discriminants are the provider's `klt` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u16)]
pub enum Granularity {
    #[serde(rename = "1m")]
    Min1 = 1,
    #[serde(rename = "5m")]
    Min5 = 5,
    #[serde(rename = "15m")]
    Min15 = 15,
    #[serde(rename = "30m")]
    Min30 = 30,
    #[serde(rename = "60m")]
    Min60 = 60,
    #[default]
    #[serde(rename = "1d")]
    Day = 101,
    #[serde(rename = "1w")]
    Week = 102,
    #[serde(rename = "1M")]
    Month = 103,
}

impl Granularity {
    /// Provider `klt` code.
    pub fn klt(self) -> u16 {
        self as u16
    }

    /// Intraday granularities carry a time of day in their timestamps.
    pub fn is_intraday(self) -> bool {
        self.klt() < 100
    }

    /// Short label used for store directory names (`1T`, `5T`, `1H`, `1D`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Self::Min1 => "1T",
            Self::Min5 => "5T",
            Self::Min15 => "15T",
            Self::Min30 => "30T",
            Self::Min60 => "1H",
            Self::Day => "1D",
            Self::Week => "1W",
            Self::Month => "1M",
        }
    }
}

// ---------------------------------------------------------------------------
// Price adjustment
// ---------------------------------------------------------------------------

/// Corporate-action price adjustment mode. Discriminants are the provider's
/// `fqt` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Adjust {
    #[default]
    None = 0,
    Forward = 1,
    Backward = 2,
}

impl Adjust {
    /// Provider `fqt` code.
    pub fn fqt(self) -> u8 {
        self as u8
    }
}
