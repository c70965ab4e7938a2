use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// An HTTP endpoint probed with a GET request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTarget {
    pub name: String,
    pub url: String,
    /// Require the 200 response body to parse as JSON.
    #[serde(default)]
    pub check_json: bool,
    /// Enable `ok_text` / `error_text` matching on the 200 response body.
    #[serde(default)]
    pub check_text: bool,
    #[serde(default)]
    pub ok_text: String,
    #[serde(default)]
    pub error_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_config: Option<String>,
}

impl UrlTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            check_json: false,
            check_text: false,
            ok_text: String::new(),
            error_text: String::new(),
            ok_webhook: None,
            error_webhook: None,
            email_config: None,
        }
    }

    pub fn with_json_check(mut self, enabled: bool) -> Self {
        self.check_json = enabled;
        self
    }

    pub fn with_text_check(mut self, ok_text: impl Into<String>, error_text: impl Into<String>) -> Self {
        self.check_text = true;
        self.ok_text = ok_text.into();
        self.error_text = error_text.into();
        self
    }

    pub fn with_ok_webhook(mut self, name: impl Into<String>) -> Self {
        self.ok_webhook = Some(name.into());
        self
    }

    pub fn with_error_webhook(mut self, name: impl Into<String>) -> Self {
        self.error_webhook = Some(name.into());
        self
    }
}

/// A host whose SSH port is probed for TCP reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTarget {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_config: Option<String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl HostTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            ok_webhook: None,
            error_webhook: None,
            email_config: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Url(UrlTarget),
    Host(HostTarget),
}

impl Target {
    /// Identity used for state persistence: the name of a URL target, the
    /// host of an SSH target.
    pub fn id(&self) -> &str {
        match self {
            Self::Url(t) => &t.name,
            Self::Host(t) => &t.host,
        }
    }

    pub fn ok_webhook(&self) -> Option<&str> {
        match self {
            Self::Url(t) => t.ok_webhook.as_deref(),
            Self::Host(t) => t.ok_webhook.as_deref(),
        }
    }

    pub fn error_webhook(&self) -> Option<&str> {
        match self {
            Self::Url(t) => t.error_webhook.as_deref(),
            Self::Host(t) => t.error_webhook.as_deref(),
        }
    }

    pub fn email_config(&self) -> Option<&str> {
        match self {
            Self::Url(t) => t.email_config.as_deref(),
            Self::Host(t) => t.email_config.as_deref(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(t) => write!(f, "{} ({})", t.name, t.url),
            Self::Host(t) => write!(f, "{}:{}", t.host, t.port),
        }
    }
}

impl From<UrlTarget> for Target {
    fn from(t: UrlTarget) -> Self {
        Self::Url(t)
    }
}

impl From<HostTarget> for Target {
    fn from(t: HostTarget) -> Self {
        Self::Host(t)
    }
}

/// Turn a target identity into a flat file stem.
pub fn sanitize_id(id: &str) -> String {
    id.replace([':', '/'], "_")
}
