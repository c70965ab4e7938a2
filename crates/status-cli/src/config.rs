//! YAML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```yaml
//! STATUS_DIR: /var/lib/status-monitor/
//! CLIENT_NAME: acme-prod
//! DEFAULT_TIMEOUT_MS: 3000
//! EMAIL_POLICY: on_failure
//!
//! urls:
//!   - name: billing-api
//!     url: https://billing.example.com/health
//!     checkJson: true
//!     okWebhook: slack-ok
//!     errorWebhook: slack-err
//!
//! hosts:
//!   - host: db1.internal
//!     errorWebhook: slack-err
//!   - bastion.example.com
//!
//! webhooks:
//!   - name: slack-err
//!     url: https://hooks.slack.com/services/T000/B000/XXXX
//!     requestMethod: POST
//!     headers:
//!       Content-Type: application/json
//!     body:
//!       text: ":red_circle: {service} is failing: {code} {message} ({client})"
//!
//! email:
//!   sender_email: monitor@example.com
//!   app_password: secret
//!   recipient_email: ops@example.com
//!   smtp_server: smtp.example.com
//! ```

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use status_core::{
    sanitize_id, EmailChannel, EmailConfig, HostTarget, MonitorConfig, NotificationRouter,
    NotifyPolicy, PushoverChannel, PushoverConfig, Target, UrlTarget, WebhookChannel,
    WebhookDefinition,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Config file {0} is empty")]
    Empty(PathBuf),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "STATUS_DIR", default = "default_status_dir")]
    pub status_dir: PathBuf,

    #[serde(rename = "CLIENT_NAME", default = "default_client_name")]
    pub client_name: String,

    #[serde(rename = "SILENT_MODE", default)]
    pub silent_mode: bool,

    #[serde(rename = "DEFAULT_TIMEOUT_MS", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(rename = "LOG_FORMAT", default = "default_log_format")]
    pub log_format: String,

    #[serde(rename = "EMAIL_POLICY", default)]
    pub email_policy: NotifyPolicy,

    #[serde(rename = "PUSHOVER_POLICY", default)]
    pub pushover_policy: NotifyPolicy,

    #[serde(rename = "PUSHOVER_API_TOKEN", default)]
    pub pushover_api_token: String,

    #[serde(rename = "PUSHOVER_USER_KEY", default)]
    pub pushover_user_key: String,

    #[serde(default)]
    pub urls: Vec<UrlDef>,

    #[serde(default)]
    pub hosts: Vec<HostDef>,

    /// Older name for `hosts`; entries are appended after `hosts`.
    #[serde(rename = "hosts-ssh", default)]
    pub hosts_ssh: Vec<HostDef>,

    #[serde(default)]
    pub webhooks: Vec<WebhookDefinition>,

    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// Named email configs selectable per target with `emailConfigName`.
    #[serde(default)]
    pub emails: Vec<EmailConfig>,
}

fn default_status_dir() -> PathBuf {
    MonitorConfig::default().status_dir
}

fn default_client_name() -> String {
    MonitorConfig::default().client_name
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlDef {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub check_json: bool,
    #[serde(default)]
    pub check_text: bool,
    #[serde(default)]
    pub ok_text: String,
    #[serde(default)]
    pub error_text: String,
    pub ok_webhook: Option<String>,
    pub error_webhook: Option<String>,
    pub email_config_name: Option<String>,
}

/// A host entry is either a bare host string or a mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HostDef {
    Plain(String),
    Detailed(HostEntry),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEntry {
    pub host: String,
    pub port: Option<u16>,
    pub ok_webhook: Option<String>,
    pub error_webhook: Option<String>,
    pub email_config_name: Option<String>,
}

impl UrlDef {
    pub fn to_target(&self) -> Target {
        Target::Url(UrlTarget {
            name: self.name.clone(),
            url: self.url.clone(),
            check_json: self.check_json,
            check_text: self.check_text,
            ok_text: self.ok_text.clone(),
            error_text: self.error_text.clone(),
            ok_webhook: self.ok_webhook.clone(),
            error_webhook: self.error_webhook.clone(),
            email_config: self.email_config_name.clone(),
        })
    }
}

impl HostDef {
    pub fn host(&self) -> &str {
        match self {
            Self::Plain(host) => host,
            Self::Detailed(entry) => &entry.host,
        }
    }

    pub fn to_target(&self) -> Target {
        let target = match self {
            Self::Plain(host) => HostTarget::new(host.clone()),
            Self::Detailed(entry) => {
                let mut t = HostTarget::new(entry.host.clone());
                if let Some(port) = entry.port {
                    t = t.with_port(port);
                }
                t.ok_webhook = entry.ok_webhook.clone();
                t.error_webhook = entry.error_webhook.clone();
                t.email_config = entry.email_config_name.clone();
                t
            }
        };
        Target::Host(target)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ParseFailure::Empty => ConfigError::Empty(path.to_path_buf()),
            ParseFailure::Yaml(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
        })?;

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, ParseFailure> {
        let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(ParseFailure::Yaml)?;
        if value.is_null() {
            return Err(ParseFailure::Empty);
        }
        serde_yaml::from_value(value).map_err(ParseFailure::Yaml)
    }

    fn validate(&self) -> Result<(), String> {
        let mut ids = HashSet::new();

        for (i, u) in self.urls.iter().enumerate() {
            if u.name.trim().is_empty() {
                return Err(format!("URL target at index {} has an empty name", i));
            }
            let parsed = url::Url::parse(&u.url)
                .map_err(|e| format!("Invalid URL for target '{}': {} ({})", u.name, u.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("URL must use http or https for target '{}': {}", u.name, u.url));
            }
            if !ids.insert(sanitize_id(&u.name)) {
                return Err(format!("Duplicate target: {}", u.name));
            }
        }

        for (i, h) in self.all_hosts().enumerate() {
            if h.host().trim().is_empty() {
                return Err(format!("Host entry at index {} is empty", i));
            }
            if !ids.insert(sanitize_id(h.host())) {
                return Err(format!("Duplicate target: {}", h.host()));
            }
        }

        let mut webhook_names = HashSet::new();
        for (i, wh) in self.webhooks.iter().enumerate() {
            if wh.name.is_empty() {
                return Err(format!("Webhook at index {} has an empty name", i));
            }
            if !webhook_names.insert(wh.name.as_str()) {
                return Err(format!("Duplicate webhook name: {}", wh.name));
            }
            url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL for '{}': {} ({})", wh.name, wh.url, e))?;
        }

        if let Some(email) = &self.email {
            validate_email(email, "email")?;
        }
        let mut email_names = HashSet::new();
        for (i, email) in self.emails.iter().enumerate() {
            let name = email
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| format!("Email config at index {} needs a name", i))?;
            if !email_names.insert(name) {
                return Err(format!("Duplicate email config name: {}", name));
            }
            validate_email(email, name)?;
        }

        if self.pushover_api_token.is_empty() != self.pushover_user_key.is_empty() {
            return Err("PUSHOVER_API_TOKEN and PUSHOVER_USER_KEY must be set together".into());
        }

        match self.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid LOG_FORMAT '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }

    fn all_hosts(&self) -> impl Iterator<Item = &HostDef> {
        self.hosts.iter().chain(self.hosts_ssh.iter())
    }

    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_status_dir(self.status_dir.clone())
            .with_client_name(self.client_name.clone())
            .with_timeout_ms(self.default_timeout_ms)
            .with_email_policy(self.email_policy)
            .with_pushover_policy(self.pushover_policy)
    }

    /// URL targets first, then hosts, each in file order.
    pub fn to_targets(&self) -> Vec<Target> {
        self.urls
            .iter()
            .map(UrlDef::to_target)
            .chain(self.all_hosts().map(HostDef::to_target))
            .collect()
    }

    pub fn build_router(&self, client: &Client) -> NotificationRouter {
        let mut router = NotificationRouter::from_config(&self.to_monitor_config());

        for wh in &self.webhooks {
            router = router.with_webhook(
                wh.name.clone(),
                Arc::new(WebhookChannel::new(wh.clone(), client.clone())),
            );
        }
        if let Some(email) = &self.email {
            router = router.with_email(Arc::new(EmailChannel::new(email.clone())));
        }
        for email in &self.emails {
            if let Some(name) = &email.name {
                router = router.with_named_email(name.clone(), Arc::new(EmailChannel::new(email.clone())));
            }
        }
        if !self.pushover_api_token.is_empty() {
            let config = PushoverConfig::new(&self.pushover_api_token, &self.pushover_user_key);
            router = router.with_pushover(Arc::new(PushoverChannel::new(config, client.clone())));
        }
        router
    }

    /// Webhook and email names referenced by targets but never defined.
    pub fn dangling_references(&self) -> Vec<String> {
        let webhooks: HashSet<&str> = self.webhooks.iter().map(|w| w.name.as_str()).collect();
        let emails: HashSet<&str> = self.emails.iter().filter_map(|e| e.name.as_deref()).collect();

        let mut dangling = Vec::new();
        for target in self.to_targets() {
            for name in [target.ok_webhook(), target.error_webhook()].into_iter().flatten() {
                if !webhooks.contains(name) {
                    dangling.push(format!("target '{}' references unknown webhook '{}'", target.id(), name));
                }
            }
            if let Some(name) = target.email_config() {
                if !emails.contains(name) {
                    dangling.push(format!("target '{}' references unknown email config '{}'", target.id(), name));
                }
            }
        }
        dangling
    }
}

enum ParseFailure {
    Empty,
    Yaml(serde_yaml::Error),
}

fn validate_email(email: &EmailConfig, label: &str) -> Result<(), String> {
    if email.sender_email.trim().is_empty() {
        return Err(format!("Email config '{}' is missing sender_email", label));
    }
    if email.recipients().next().is_none() {
        return Err(format!("Email config '{}' is missing recipient_email", label));
    }
    if email.smtp_server.trim().is_empty() {
        return Err(format!("Email config '{}' is missing smtp_server", label));
    }
    Ok(())
}
