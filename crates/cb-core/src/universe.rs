//! Symbol universe from a parameter table.
//!
//! Bond screeners export one row per convertible bond with the bond code and
//! the underlying equity code in separate columns. The loader picks one
//! column, strips any exchange qualification, and re-qualifies each code in
//! the style the provider wants.

use std::fs;

use ahash::AHashSet;
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{SecurityKind, UniverseConfig};
use crate::error::FeedError;
use crate::record_store::FileEncoding;
use crate::types::{SymbolStyle, qualify_bond, qualify_equity, strip_exchange};

/// Read the configured column and return qualified, de-duplicated symbols in
/// table order. `native` is used when the config names no style.
pub fn load_universe(cfg: &UniverseConfig, native: SymbolStyle) -> Result<Vec<String>> {
    let raw = fs::read(&cfg.path).with_context(|| format!("reading {}", cfg.path.display()))?;
    let text = FileEncoding::from_label(&cfg.encoding)?.decode(&raw)?;
    parse_universe(&text, &cfg.column, cfg.kind, cfg.style.unwrap_or(native))
}

fn parse_universe(text: &str, column: &str, kind: SecurityKind, style: SymbolStyle) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let idx = rdr
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| FeedError::Config(format!("universe column {column:?} not found")))?;

    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row?;
        let code = strip_exchange(row.get(idx).unwrap_or("").trim());
        if code.is_empty() || !seen.insert(code.to_string()) {
            continue;
        }
        let symbol = match kind {
            SecurityKind::Bond => match qualify_bond(code, style) {
                Ok(s) => s,
                Err(e) => {
                    warn!("[universe] row {}: {}", line + 1, e);
                    continue;
                }
            },
            SecurityKind::Equity => qualify_equity(code, style),
        };
        out.push(symbol);
    }
    info!("[universe] {} symbols from column {:?}", out.len(), column);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "代码,转债名称,正股代码\n\
                         128106,华统转债,002840\n\
                         113050.SH,南银转债,601009\n\
                         128106,华统转债,002840\n\
                         999999,坏代码,600000\n";

    #[test]
    fn bond_column_prefixed() {
        let syms = parse_universe(TABLE, "代码", SecurityKind::Bond, SymbolStyle::Prefix).unwrap();
        assert_eq!(syms, vec!["sz128106", "sh113050"]);
    }

    #[test]
    fn equity_column_bare_and_suffix() {
        let bare = parse_universe(TABLE, "正股代码", SecurityKind::Equity, SymbolStyle::Bare).unwrap();
        assert_eq!(bare, vec!["002840", "601009", "600000"]);
        let suffixed = parse_universe(TABLE, "正股代码", SecurityKind::Equity, SymbolStyle::Suffix).unwrap();
        assert_eq!(suffixed[1], "601009.SH");
    }

    #[test]
    fn gbk_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jsl.csv");
        fs::write(&path, FileEncoding::Gbk.encode(TABLE).unwrap()).unwrap();
        let cfg = UniverseConfig {
            path,
            column: "代码".into(),
            kind: SecurityKind::Bond,
            style: None,
            encoding: "gbk".into(),
        };
        assert_eq!(load_universe(&cfg, SymbolStyle::Bare).unwrap(), vec!["128106", "113050"]);
    }

    #[test]
    fn missing_column() {
        assert!(parse_universe(TABLE, "nope", SecurityKind::Bond, SymbolStyle::Bare).is_err());
    }
}
