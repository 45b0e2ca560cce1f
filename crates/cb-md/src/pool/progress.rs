//! Per-shard progress line.
//!
//! Each successful symbol overwrites a single stderr line (`\r`); a failure
//! breaks the line, prints the error and a marker naming the symbol's index.
//! The same events go to `tracing` so file logs keep them.

use std::io::Write;

use tracing::{debug, warn};

/// Progress writer for one shard.
pub struct ShardProgress {
    label: String,
    ticked: bool,
}

impl ShardProgress {
    pub fn new(task: &str, round: usize, shard: usize) -> Self {
        Self { label: format!("{task} r{round}#{shard}"), ticked: false }
    }

    pub fn tick(&mut self, index: usize, symbol: &str, note: &str) {
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r[{}] No.{:3} {} {}", self.label, index, symbol, note);
        let _ = err.flush();
        self.ticked = true;
        debug!("[{}] No.{} {} {}", self.label, index, symbol, note);
    }

    pub fn fail(&mut self, index: usize, symbol: &str, error: &anyhow::Error) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\n {error:#}");
        let _ = writeln!(err, "\tError of No.{index} {symbol}.");
        self.ticked = false;
        warn!("[{}] No.{} {} failed: {:#}", self.label, index, symbol, error);
    }

    /// Terminate the overwriting line.
    pub fn finish(&mut self) {
        if self.ticked {
            let _ = writeln!(std::io::stderr());
            self.ticked = false;
        }
    }
}
