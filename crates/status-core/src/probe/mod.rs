//! Single-attempt availability probes.
//!
//! A probe never fails: every outcome, including timeouts and transport
//! errors, is folded into a [`CheckResult`] whose `code` is what gets
//! persisted and compared between runs.

mod http;
mod ssh;

pub use http::{check_api, validate_body};
pub use ssh::check_ssh;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::target::{HostTarget, Target, UrlTarget};

pub const CODE_OK: i64 = 200;
/// Transport or connection failure other than a timeout.
pub const CODE_ERROR: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// HTTP status, `200` for a reachable SSH port, the timeout in
    /// milliseconds for timeouts, or [`CODE_ERROR`].
    pub code: i64,
    /// Free-form diagnostic, never compared.
    pub message: String,
}

impl CheckResult {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(CODE_OK, message)
    }

    pub fn timeout(timeout_ms: i64) -> Self {
        Self::new(timeout_ms, "Timeout")
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// Executes one check against one target.
///
/// Object-safe and `Send + Sync` so the orchestrator can hold it behind an
/// `Arc<dyn Prober>` and tests can substitute scripted results.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn check_api(&self, target: &UrlTarget) -> CheckResult;

    async fn check_ssh(&self, target: &HostTarget) -> CheckResult;

    async fn probe(&self, target: &Target) -> CheckResult {
        match target {
            Target::Url(t) => self.check_api(t).await,
            Target::Host(t) => self.check_ssh(t).await,
        }
    }
}

/// Prober backed by a real HTTP client and TCP sockets.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    client: Client,
    timeout: Duration,
}

impl NetworkProber {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn from_config(config: &crate::config::MonitorConfig, client: Client) -> Self {
        Self::new(client, config.default_timeout)
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn check_api(&self, target: &UrlTarget) -> CheckResult {
        check_api(&self.client, target, self.timeout).await
    }

    async fn check_ssh(&self, target: &HostTarget) -> CheckResult {
        check_ssh(&target.host, target.port, self.timeout).await
    }
}

pub(crate) fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
