//! Notification channels and routing.
//!
//! A status transition becomes a [`Notification`]; the [`NotificationRouter`]
//! picks which configured channels receive it and each
//! [`NotificationChannel`] renders and delivers its own payload.

pub mod email;
pub mod pushover;
pub mod router;
pub mod webhook;

pub use email::{EmailChannel, EmailConfig};
pub use pushover::{PushoverChannel, PushoverConfig};
pub use router::{DispatchOutcome, DispatchRecord, NotificationRouter};
pub use webhook::{RequestMethod, WebhookChannel, WebhookDefinition};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::probe::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webhook,
    Email,
    Pushover,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook => write!(f, "webhook"),
            Self::Email => write!(f, "email"),
            Self::Pushover => write!(f, "pushover"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("Invalid email address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("Failed to build email: {0}")]
    Message(String),
    #[error("SMTP delivery via {server} failed: {reason}")]
    Smtp { server: String, reason: String },
}

/// What a channel did with a notification it accepted without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(String),
}

/// One status transition, ready to be rendered by a channel.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Target identity, substituted for `{service}`.
    pub service: String,
    pub code: i64,
    pub message: String,
    pub client: String,
    pub success: bool,
    pub previous: Option<String>,
}

impl Notification {
    pub fn new(
        service: impl Into<String>,
        result: &CheckResult,
        client: impl Into<String>,
        previous: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service: service.into(),
            code: result.code,
            message: result.message.clone(),
            client: client.into(),
            success: result.is_ok(),
            previous,
        }
    }

    /// Substitute `{code}`, `{message}`, `{client}` and `{service}` in
    /// `template`. Unknown `{...}` sequences are kept verbatim and
    /// substituted values are never re-scanned.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let replacement = tail.find('}').and_then(|end| {
                let value = match &tail[1..end] {
                    "code" => self.code.to_string(),
                    "message" => self.message.clone(),
                    "client" => self.client.clone(),
                    "service" => self.service.clone(),
                    _ => return None,
                };
                Some((value, end + 1))
            });
            match replacement {
                Some((value, consumed)) => {
                    out.push_str(&value);
                    rest = &tail[consumed..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// A delivery endpoint for status transitions.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Configured name, used in logs and run reports.
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<Delivery, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification::new("api", &CheckResult::new(503, "Unexpected status: 503"), "acme", Some("200".into()))
    }

    #[test]
    fn new_copies_result_fields() {
        let n = notification();
        assert_eq!(n.service, "api");
        assert_eq!(n.code, 503);
        assert!(!n.success);
        assert_eq!(n.previous.as_deref(), Some("200"));
    }

    #[test]
    fn render_substitutes_all_placeholders() {
        let n = notification();
        assert_eq!(
            n.render("[{client}] {service} -> {code}: {message}"),
            "[acme] api -> 503: Unexpected status: 503"
        );
    }

    #[test]
    fn render_keeps_unknown_and_unbalanced_braces() {
        let n = notification();
        assert_eq!(n.render("{unknown} {code"), "{unknown} {code");
        assert_eq!(n.render("{{code}}"), "{503}");
        assert_eq!(n.render("no placeholders"), "no placeholders");
    }

    #[test]
    fn render_does_not_rescan_substituted_values() {
        let n = Notification::new("svc", &CheckResult::new(-1, "Error: {client}"), "acme", None);
        assert_eq!(n.render("{message}"), "Error: {client}");
    }

    #[test]
    fn channel_kind_display() {
        assert_eq!(ChannelKind::Webhook.to_string(), "webhook");
        assert_eq!(ChannelKind::Email.to_string(), "email");
        assert_eq!(ChannelKind::Pushover.to_string(), "pushover");
    }
}
