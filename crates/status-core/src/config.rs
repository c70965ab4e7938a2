use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When a process-level channel (email, Pushover) fires for a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Every transition, recoveries included.
    #[default]
    OnChange,
    /// Only transitions into a failing code.
    OnFailure,
}

impl NotifyPolicy {
    pub fn applies(self, success: bool) -> bool {
        match self {
            Self::OnChange => true,
            Self::OnFailure => !success,
        }
    }
}

impl fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnChange => write!(f, "on_change"),
            Self::OnFailure => write!(f, "on_failure"),
        }
    }
}

/// Process-wide settings for one monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory holding one `<target>.txt` state file per target.
    pub status_dir: PathBuf,
    /// Substituted for `{client}` in notification templates.
    pub client_name: String,
    /// Timeout applied to each HTTP probe and SSH connect (default: 5000ms).
    pub default_timeout: Duration,
    pub email_policy: NotifyPolicy,
    pub pushover_policy: NotifyPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_dir: PathBuf::from("/tmp/status_files/"),
            client_name: "status-monitor".to_string(),
            default_timeout: Duration::from_millis(5000),
            email_policy: NotifyPolicy::OnChange,
            pushover_policy: NotifyPolicy::OnChange,
        }
    }
}

impl MonitorConfig {
    pub fn with_status_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.status_dir = dir.into();
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_email_policy(mut self, policy: NotifyPolicy) -> Self {
        self.email_policy = policy;
        self
    }

    pub fn with_pushover_policy(mut self, policy: NotifyPolicy) -> Self {
        self.pushover_policy = policy;
        self
    }

    pub fn timeout_ms(&self) -> i64 {
        i64::try_from(self.default_timeout.as_millis()).unwrap_or(i64::MAX)
    }
}
