//! Symbol-keyed CSV storage.
//!
//! Two layouts:
//!
//! ```text
//! DayPartitioned:  {root}/{YYYY-MM-DD}/{symbol}.csv
//! Flat:            {root}/{symbol}.csv
//! ```
//!
//! The day partition of a write is taken from the first record of the batch.
//! Rows are produced by [`CsvRow`]; the whole file is transcoded through the
//! store's [`FileEncoding`] on the way in and out.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, GBK, UTF_8};
use tracing::debug;

use crate::error::FeedError;
use crate::types::{CsvRow, formal_day, record_day};

/// Directory layout of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    DayPartitioned,
    Flat,
}

/// On-disk text encoding, fixed per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Utf8,
    Gbk,
}

impl FileEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Gbk => GBK,
        }
    }

    /// Parse a config label (`utf8`, `utf-8`, `gbk`).
    pub fn from_label(label: &str) -> Result<Self, FeedError> {
        match label.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "gbk" => Ok(Self::Gbk),
            other => Err(FeedError::Config(format!("unknown encoding {other:?}"))),
        }
    }

    /// Encode text for disk. Characters GBK cannot represent are an error.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, FeedError> {
        let (bytes, _, had_errors) = self.encoding().encode(text);
        if had_errors {
            return Err(FeedError::Store(format!("text not representable in {self:?}")));
        }
        Ok(bytes.into_owned())
    }

    /// Decode bytes read from disk.
    pub fn decode(self, bytes: &[u8]) -> Result<String, FeedError> {
        let (text, _, had_errors) = self.encoding().decode(bytes);
        if had_errors {
            return Err(FeedError::Store(format!("malformed {self:?} input")));
        }
        Ok(text.into_owned())
    }
}

/// Append rows to an existing file, or replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create with header if missing, otherwise append rows only.
    Append,
    /// Rewrite the file with header and rows.
    Overwrite,
}

/// A CSV record store rooted at one directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
    layout: Layout,
    encoding: FileEncoding,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>, layout: Layout, encoding: FileEncoding) -> Self {
        Self { root: root.into(), layout, encoding }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn encoding(&self) -> FileEncoding {
        self.encoding
    }

    /// `{root}/{day}/{symbol}.csv`, day normalized to `YYYY-MM-DD`.
    pub fn day_path(&self, day: &str, symbol: &str) -> Result<PathBuf, FeedError> {
        Ok(self.root.join(formal_day(day)?).join(format!("{symbol}.csv")))
    }

    /// `{root}/{symbol}.csv`
    pub fn flat_path(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("{symbol}.csv"))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write a batch for `symbol` under the store's layout. Returns the file
    /// written. An empty batch has no day and is rejected.
    pub fn save<R: CsvRow>(&self, symbol: &str, records: &[R], mode: WriteMode) -> Result<PathBuf> {
        match self.layout {
            Layout::Flat => self.save_flat(symbol, records, mode),
            Layout::DayPartitioned => {
                let first = records
                    .first()
                    .ok_or_else(|| FeedError::Store(format!("empty batch for {symbol}")))?;
                let path = self.day_path(record_day(first)?, symbol)?;
                self.write_file(&path, records, mode)?;
                Ok(path)
            }
        }
    }

    /// Write a batch to the flat layout regardless of the store's layout.
    pub fn save_flat<R: CsvRow>(&self, symbol: &str, records: &[R], mode: WriteMode) -> Result<PathBuf> {
        if records.is_empty() {
            return Err(FeedError::Store(format!("empty batch for {symbol}")).into());
        }
        let path = self.flat_path(symbol);
        self.write_file(&path, records, mode)?;
        Ok(path)
    }

    fn write_file<R: CsvRow>(&self, path: &Path, records: &[R], mode: WriteMode) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let with_header = mode == WriteMode::Overwrite || !path.exists();

        let mut wtr = csv::Writer::from_writer(vec![]);
        if with_header {
            wtr.write_record(R::header())?;
        }
        for r in records {
            wtr.write_record(r.to_row())?;
        }
        let data = wtr.into_inner().context("failed to flush CSV writer")?;
        let text = String::from_utf8(data).context("CSV output is not valid UTF-8")?;
        let bytes = self.encoding.encode(&text)?;

        let mut file = match mode {
            WriteMode::Append => OpenOptions::new().create(true).append(true).open(path),
            WriteMode::Overwrite => OpenOptions::new().create(true).write(true).truncate(true).open(path),
        }
        .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(&bytes).with_context(|| format!("writing {}", path.display()))?;
        debug!("[store] {} rows -> {}", records.len(), path.display());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read one day file.
    pub fn load<R: CsvRow>(&self, day: &str, symbol: &str) -> Result<Vec<R>> {
        self.read_file(&self.day_path(day, symbol)?)
    }

    /// Read several day files and concatenate them in the order given.
    pub fn load_range<R: CsvRow, S: AsRef<str>>(&self, days: &[S], symbol: &str) -> Result<Vec<R>> {
        let mut out = Vec::new();
        for day in days {
            out.extend(self.load::<R>(day.as_ref(), symbol)?);
        }
        Ok(out)
    }

    /// Read a flat-layout file.
    pub fn load_flat<R: CsvRow>(&self, symbol: &str) -> Result<Vec<R>> {
        self.read_file(&self.flat_path(symbol))
    }

    fn read_file<R: CsvRow>(&self, path: &Path) -> Result<Vec<R>> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let text = self.encoding.decode(&bytes)?;
        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let mut out = Vec::new();
        for row in rdr.records() {
            let row = row.with_context(|| format!("reading {}", path.display()))?;
            out.push(R::from_row(&row)?);
        }
        Ok(out)
    }
}
