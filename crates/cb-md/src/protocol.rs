//! Parent/child worker protocol for the process backend.
//!
//! Both directions use the same framing over the child's stdio pipes:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ len: u32 LE  │ rkyv-serialized payload      │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! - parent → child (stdin): exactly one [`Shard`]
//! - child → parent (stdout): any number of [`WorkerFrame::Put`], then one
//!   [`WorkerFrame::Done`]
//!
//! The child's cache writes go through [`ProxySink`]; the parent applies them
//! to the shared [`RoundCache`] as they arrive ([`drain_worker`]).

use std::io::Write;
use std::sync::Mutex;

use anyhow::Result;
use cb_core::error::FeedError;
use cb_core::round_cache::{CacheSink, CacheUpdate, RoundCache};
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::pool::{Shard, ShardReport, ShardTask};

/// Upper bound on one payload; larger length prefixes mean a corrupt stream.
pub const MAX_FRAME_LEN: usize = 256 << 20;

/// Message from a child worker.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
pub enum WorkerFrame {
    Put { key: String, update: CacheUpdate },
    Done(ShardReport),
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

fn with_len(payload: rkyv::util::AlignedVec) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Copy payload into an aligned buffer and decode with rkyv.
macro_rules! decode_rkyv {
    ($T:ty, $payload:expr) => {{
        let mut a = rkyv::util::AlignedVec::<16>::with_capacity($payload.len());
        a.extend_from_slice($payload);
        rkyv::from_bytes::<$T, rkyv::rancor::Error>(&a)
            .map_err(|e| FeedError::Codec(format!("decode {}: {e}", stringify!($T))))
    }};
}

/// Length-prefixed frame carrying a shard.
pub fn encode_shard(shard: &Shard) -> Result<Vec<u8>, FeedError> {
    rkyv::to_bytes::<rkyv::rancor::Error>(shard)
        .map(with_len)
        .map_err(|e| FeedError::Codec(format!("encode shard: {e}")))
}

/// Length-prefixed frame carrying a worker message.
pub fn encode_worker_frame(frame: &WorkerFrame) -> Result<Vec<u8>, FeedError> {
    rkyv::to_bytes::<rkyv::rancor::Error>(frame)
        .map(with_len)
        .map_err(|e| FeedError::Codec(format!("encode worker frame: {e}")))
}

pub fn decode_shard(payload: &[u8]) -> Result<Shard, FeedError> {
    decode_rkyv!(Shard, payload)
}

pub fn decode_worker_frame(payload: &[u8]) -> Result<WorkerFrame, FeedError> {
    decode_rkyv!(WorkerFrame, payload)
}

/// Read one payload. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match reader.read_u32_le().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(FeedError::Codec(format!("frame length {len} exceeds limit")).into());
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

// ---------------------------------------------------------------------------
// Child side
// ---------------------------------------------------------------------------

/// Cache sink that forwards every put to the parent over a pipe.
pub struct ProxySink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ProxySink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn send(&self, frame: &WorkerFrame) -> Result<()> {
        let bytes = encode_worker_frame(frame)?;
        let mut out = self.out.lock().map_err(|_| FeedError::Worker("proxy sink poisoned".into()))?;
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }

    /// Send the final shard report.
    pub fn done(&self, report: &ShardReport) -> Result<()> {
        self.send(&WorkerFrame::Done(report.clone()))
    }
}

impl<W: Write + Send> CacheSink for ProxySink<W> {
    fn put(&self, key: &str, update: CacheUpdate) -> Result<()> {
        self.send(&WorkerFrame::Put { key: key.to_string(), update })
    }
}

/// Child entry point: read one shard from `input`, run it with a proxy sink
/// on `output`, finish with the report.
pub async fn serve_shard<R, W>(task: &dyn ShardTask, mut input: R, output: W) -> Result<ShardReport>
where
    R: AsyncRead + Unpin,
    W: Write + Send,
{
    let payload = read_frame(&mut input)
        .await?
        .ok_or_else(|| FeedError::Worker("no shard received on stdin".into()))?;
    let shard = decode_shard(&payload)?;
    debug!("[worker] {} shard {} ({} symbols)", task.name(), shard.index, shard.symbols.len());

    let sink = ProxySink::new(output);
    let report = task.run_shard(&shard, &sink).await?;
    sink.done(&report)?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Parent side
// ---------------------------------------------------------------------------

/// Apply a child's puts to `cache` until its report arrives.
///
/// A put the cache rejects (a key changing series kind) is logged and
/// dropped; the child has already moved on. A stream that ends without a
/// report is a worker failure.
pub async fn drain_worker<R: AsyncRead + Unpin>(mut reader: R, cache: &RoundCache, shard: usize) -> Result<ShardReport> {
    let mut puts = 0usize;
    while let Some(payload) = read_frame(&mut reader).await? {
        match decode_worker_frame(&payload)? {
            WorkerFrame::Put { key, update } => {
                if let Err(e) = cache.put(&key, update) {
                    warn!("[pool] shard {} dropped put: {}", shard, e);
                }
                puts += 1;
            }
            WorkerFrame::Done(report) => {
                debug!("[pool] shard {} reported after {} puts", shard, puts);
                return Ok(report);
            }
        }
    }
    Err(FeedError::Worker(format!("shard {shard} closed its pipe without a report")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{SymbolJob, partition};
    use async_trait::async_trait;
    use cb_core::round_cache::CacheEntry;
    use cb_core::types::QuoteRecord;

    struct EchoJob;

    #[async_trait]
    impl SymbolJob for EchoJob {
        fn name(&self) -> &str {
            "echo"
        }

        async fn collect(&self, symbol: &str, sink: &dyn CacheSink) -> Result<String> {
            if symbol == "bad" {
                anyhow::bail!("unknown security");
            }
            let q = QuoteRecord { code: symbol.into(), last: f64::NAN, ..Default::default() };
            sink.put(symbol, CacheUpdate::AppendQuote(q))?;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn child_output_drains_into_parent_cache() {
        let syms: Vec<String> = ["128106", "bad", "113050"].iter().map(|s| s.to_string()).collect();
        let shard = partition(&syms, 1, 0).remove(0);
        let input = encode_shard(&shard).unwrap();

        let mut piped = Vec::new();
        let child_report = serve_shard(&EchoJob, &input[..], &mut piped).await.unwrap();
        assert_eq!(child_report.succeeded, 2);

        let cache = RoundCache::new();
        let report = drain_worker(&piped[..], &cache, 0).await.unwrap();
        assert_eq!(report, child_report);
        assert_eq!(report.failures[0].symbol, "bad");
        assert_eq!(cache.len(), 2);
        match cache.get("113050").unwrap() {
            CacheEntry::Quotes(q) => assert!(q[0].last.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_stream_is_worker_error() {
        let put = WorkerFrame::Put { key: "k".into(), update: CacheUpdate::ReplaceBars(vec![]) };
        let bytes = encode_worker_frame(&put).unwrap();
        let err = drain_worker(&bytes[..], &RoundCache::new(), 3).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::Worker(_))));
    }

    #[tokio::test]
    async fn oversized_length_rejected() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(read_frame(&mut &bytes[..]).await.is_err());
    }

    #[tokio::test]
    async fn empty_input_is_worker_error() {
        let mut out = Vec::new();
        let err = serve_shard(&EchoJob, &b""[..], &mut out).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FeedError>(), Some(FeedError::Worker(_))));
    }
}
