//! Process-backed executor: one child process per shard.
//!
//! The child is any program that speaks [`crate::protocol`] on its stdio,
//! normally `cb-runner shard <config> --job <i>`. stderr is inherited so the
//! child's logs and progress line land on the parent's terminal.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::round_cache::RoundCache;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Executor, Shard, ShardReport};
use crate::protocol::{drain_worker, encode_shard};

/// Program and arguments that start one shard worker.
#[derive(Debug, Clone)]
pub struct ShardCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ShardCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// The current executable with `args`.
    pub fn current_exe(args: Vec<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe().context("locating current executable")?, args))
    }
}

/// Runs each shard in a child process and drains its cache writes into the
/// parent's cache. Children are joined in dispatch order.
pub struct ProcessExecutor {
    command: ShardCommand,
}

impl ProcessExecutor {
    pub fn new(command: ShardCommand) -> Self {
        Self { command }
    }

    async fn spawn(&self, shard: &Shard, cache: &Arc<RoundCache>) -> Result<(Child, JoinHandle<Result<ShardReport>>)> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker {}", self.command.program.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FeedError::Worker(format!("shard {}: no stdout pipe", shard.index)))?;
        let cache = cache.clone();
        let index = shard.index;
        let reader = tokio::spawn(async move { drain_worker(stdout, &cache, index).await });

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| FeedError::Worker(format!("shard {}: no stdin pipe", shard.index)))?;
        stdin.write_all(&encode_shard(shard)?).await?;
        stdin.shutdown().await?;
        drop(stdin);

        debug!("[pool] shard {} -> pid {:?}", shard.index, child.id());
        Ok((child, reader))
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    async fn run_round(&self, shards: Vec<Shard>, cache: &Arc<RoundCache>) -> Result<Vec<ShardReport>> {
        let mut running = Vec::with_capacity(shards.len());
        for shard in &shards {
            running.push((shard.index, self.spawn(shard, cache).await?));
        }

        let mut reports = Vec::with_capacity(running.len());
        let mut first_err: Option<anyhow::Error> = None;
        for (index, (mut child, reader)) in running {
            match join_child(index, &mut child, reader).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("[pool] shard {} failed: {:#}", index, e);
                    let _ = child.kill().await;
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

/// Wait for the reader to see the report, then for the child to exit cleanly.
async fn join_child(index: usize, child: &mut Child, reader: JoinHandle<Result<ShardReport>>) -> Result<ShardReport> {
    let report = reader.await.map_err(|e| FeedError::Worker(format!("shard {index} reader aborted: {e}")))??;
    let status = child.wait().await?;
    if !status.success() {
        return Err(FeedError::Worker(format!("shard {index} exited with {status}")).into());
    }
    Ok(report)
}
