//! Eastmoney-specific configuration extraction.
//!
//! Resolves the host for each endpoint family from the generic
//! [`JobConfig`]. A `base_url` override replaces every host at once, which is
//! how tests point all adapters at one mock server.

use std::time::Duration;

use cb_core::config::JobConfig;

/// Real-time quote host.
pub const PUSH2_HOST: &str = "http://push2.eastmoney.com";
/// Historical K-line and trends host.
pub const PUSH2HIS_HOST: &str = "http://push2his.eastmoney.com";

/// Parsed Eastmoney configuration.
#[derive(Debug, Clone)]
pub struct EastmoneyConfig {
    /// Overrides both hosts when set.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for EastmoneyConfig {
    fn default() -> Self {
        Self { base_url: None, timeout: Duration::from_secs(5) }
    }
}

impl EastmoneyConfig {
    pub fn from_job(job: &JobConfig) -> Self {
        Self { base_url: job.base_url.clone(), timeout: Duration::from_millis(job.timeout_ms) }
    }

    /// Point every endpoint at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: Some(base_url.into()), ..Default::default() }
    }

    pub fn quote_host(&self) -> &str {
        self.base_url.as_deref().unwrap_or(PUSH2_HOST)
    }

    pub fn history_host(&self) -> &str {
        self.base_url.as_deref().unwrap_or(PUSH2HIS_HOST)
    }
}
