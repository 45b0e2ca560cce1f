//! Thread-backed executor: one tokio task per shard, shared memory.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cb_core::error::FeedError;
use cb_core::round_cache::RoundCache;
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::{Executor, Shard, ShardReport, ShardTask};

/// Runs shards as tasks on the multi-thread runtime. The cache is handed to
/// each task by `Arc`; join is in completion order.
pub struct ThreadExecutor {
    task: Arc<dyn ShardTask>,
}

impl ThreadExecutor {
    pub fn new(task: Arc<dyn ShardTask>) -> Self {
        Self { task }
    }
}

#[async_trait]
impl Executor for ThreadExecutor {
    fn name(&self) -> &str {
        "thread"
    }

    async fn run_round(&self, shards: Vec<Shard>, cache: &Arc<RoundCache>) -> Result<Vec<ShardReport>> {
        let mut set = JoinSet::new();
        for shard in shards {
            let task = self.task.clone();
            let cache = cache.clone();
            set.spawn(async move {
                let index = shard.index;
                (index, task.run_shard(&shard, cache.as_ref()).await)
            });
        }

        // Every shard is joined even after a failure; the first error wins.
        let mut reports = Vec::new();
        let mut first_err: Option<anyhow::Error> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(report))) => {
                    debug!("[pool] shard {} joined ({} ok, {} failed)", index, report.succeeded, report.failures.len());
                    reports.push(report);
                }
                Ok((index, Err(e))) => {
                    error!("[pool] shard {} failed: {:#}", index, e);
                    first_err.get_or_insert(e.context(format!("shard {index}")));
                }
                Err(join_err) => {
                    error!("[pool] shard task aborted: {}", join_err);
                    first_err.get_or_insert(FeedError::Worker(format!("shard task aborted: {join_err}")).into());
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}
