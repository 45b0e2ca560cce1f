//! # cb-runner
//!
//! Main entry point of the convertible-bond feed.
//!
//! Loads a JSON configuration file and runs each configured job in order.
//! The hidden `shard` subcommand is the worker side of the process backend:
//! it reads one shard on stdin and streams cache writes and its report on
//! stdout, so it never logs to stdout.
//!
//! # Usage
//!
//! ```bash
//! cb-runner run config.json --log-level info
//! cb-runner reload ./DCsnap snap_ 2022-09-01
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cb_core::config::{Backend, JobConfig, load_config};
use cb_core::error::FeedError;
use cb_core::round_cache::RoundCache;
use cb_md::batch::{ExecBackend, run_job};
use cb_md::pool::ShardCommand;
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// Convertible-bond market data runner.
#[derive(Parser)]
#[command(name = "cb-runner", about = "Convertible-bond market data runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every job of a config file.
    Run {
        /// Configuration file path (JSON).
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error).
        #[arg(short, long, default_value = "info")]
        log_level: String,

        /// Optional log directory for file output; overrides `meta.log_path`.
        #[arg(long)]
        log_dir: Option<String>,
    },

    /// Serve one shard of a job over stdio (process backend worker).
    #[command(hide = true)]
    Shard {
        config: PathBuf,

        #[arg(long)]
        job: usize,

        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Print the contents of a flushed cache blob.
    Reload {
        dir: PathBuf,
        prefix: String,
        tag: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Run { config, log_level, log_dir } => run(&config, &log_level, log_dir).await,
        Command::Shard { config, job, log_level } => shard(&config, job, &log_level).await,
        Command::Reload { dir, prefix, tag } => reload(&dir, &prefix, &tag),
    }
}

async fn run(config_path: &Path, log_level: &str, log_dir: Option<String>) -> Result<()> {
    // 1. Load configuration
    let config = load_config(config_path)?;

    // 2. Initialize logging
    let log_dir = log_dir.or_else(|| config.meta.log_path.clone());
    cb_core::logging::init_logging(log_level, log_dir.as_deref(), &config.meta.module_name());
    info!("cb-runner starting, config={}, {} job(s)", config_path.display(), config.jobs.len());

    // 3. Run jobs in order; a failed job does not stop the next one
    let mut failed = 0;
    for (idx, job) in config.jobs.iter().enumerate() {
        let backend = match job.backend {
            Backend::Thread => ExecBackend::Thread,
            Backend::Process => ExecBackend::Process(shard_command(config_path, idx, log_level)?),
        };
        info!("job[{idx}]: {} -> {} ({:?} backend)", job.provider.as_str(), job.db_root.display(), job.backend);
        match run_job(job, backend).await {
            Ok(handle) => info!(
                "job[{idx}]: done, {} ok, {} failed, {} cached keys",
                handle.report.succeeded(),
                handle.report.failed(),
                handle.cache.len()
            ),
            Err(e) => {
                error!("job[{idx}]: {} failed: {e:#}", job.provider.as_str());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) failed", config.jobs.len());
    }
    info!("all {} job(s) finished", config.jobs.len());
    Ok(())
}

fn shard_command(config_path: &Path, job: usize, log_level: &str) -> Result<ShardCommand> {
    let config = config_path
        .canonicalize()
        .with_context(|| format!("resolving {}", config_path.display()))?;
    ShardCommand::current_exe(vec![
        "shard".to_string(),
        config.display().to_string(),
        "--job".to_string(),
        job.to_string(),
        "--log-level".to_string(),
        log_level.to_string(),
    ])
}

async fn shard(config_path: &Path, job_idx: usize, log_level: &str) -> Result<()> {
    // Console layer is stderr-only; stdout carries the protocol.
    cb_core::logging::init_logging(log_level, None, "cb-shard");

    let config = load_config(config_path)?;
    let job: &JobConfig = config
        .jobs
        .get(job_idx)
        .ok_or_else(|| FeedError::Config(format!("job index {job_idx} out of range")))?;
    let task = cb_md::registry::create_task(job)?;
    let report = cb_md::protocol::serve_shard(task.as_ref(), tokio::io::stdin(), std::io::stdout()).await?;
    info!("[worker] shard {} done: {} ok, {} failed", report.index, report.succeeded, report.failures.len());
    Ok(())
}

fn reload(dir: &Path, prefix: &str, tag: &str) -> Result<()> {
    let snapshot = RoundCache::reload(dir, prefix, tag)?;
    for (key, entry) in &snapshot {
        println!("{key}\t{}\t{}", entry.kind(), entry.len());
    }
    println!("{} keys", snapshot.len());
    Ok(())
}
