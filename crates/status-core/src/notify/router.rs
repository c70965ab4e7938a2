use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ChannelKind, Delivery, Notification, NotificationChannel};
use crate::config::{MonitorConfig, NotifyPolicy};
use crate::monitor::Transition;
use crate::probe::CheckResult;
use crate::target::Target;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Skipped(String),
    Failed(String),
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub kind: ChannelKind,
    pub channel: String,
    pub outcome: DispatchOutcome,
}

/// Selects channels for a transitioned observation.
///
/// The webhook is chosen by outcome: `okWebhook` for code 200, `errorWebhook`
/// otherwise. Email and Pushover are process-level channels gated by their
/// [`NotifyPolicy`], independent of the webhook choice.
pub struct NotificationRouter {
    webhooks: HashMap<String, Arc<dyn NotificationChannel>>,
    email: Option<Arc<dyn NotificationChannel>>,
    named_emails: HashMap<String, Arc<dyn NotificationChannel>>,
    pushover: Option<Arc<dyn NotificationChannel>>,
    email_policy: NotifyPolicy,
    pushover_policy: NotifyPolicy,
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self {
            webhooks: HashMap::new(),
            email: None,
            named_emails: HashMap::new(),
            pushover: None,
            email_policy: NotifyPolicy::OnChange,
            pushover_policy: NotifyPolicy::OnChange,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new()
            .with_email_policy(config.email_policy)
            .with_pushover_policy(config.pushover_policy)
    }

    pub fn with_webhook(mut self, name: impl Into<String>, channel: Arc<dyn NotificationChannel>) -> Self {
        self.webhooks.insert(name.into(), channel);
        self
    }

    /// Process-level email used by targets without an `emailConfigName`.
    pub fn with_email(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_named_email(mut self, name: impl Into<String>, channel: Arc<dyn NotificationChannel>) -> Self {
        self.named_emails.insert(name.into(), channel);
        self
    }

    pub fn with_pushover(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.pushover = Some(channel);
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

    pub fn has_webhook(&self, name: &str) -> bool {
        self.webhooks.contains_key(name)
    }

    pub fn has_named_email(&self, name: &str) -> bool {
        self.named_emails.contains_key(name)
    }

    fn email_for(&self, target: &Target) -> Option<Arc<dyn NotificationChannel>> {
        match target.email_config() {
            Some(name) => match self.named_emails.get(name) {
                Some(channel) => Some(Arc::clone(channel)),
                None => {
                    warn!(target = %target.id(), email = name, "Email config not defined, using default email");
                    self.email.clone()
                }
            },
            None => self.email.clone(),
        }
    }

    /// Channels that should receive this observation, in dispatch order.
    pub fn route(
        &self,
        target: &Target,
        result: &CheckResult,
        transition: &Transition,
    ) -> Vec<Arc<dyn NotificationChannel>> {
        if !transition.is_changed() {
            return Vec::new();
        }

        let success = result.is_ok();
        let mut selected = Vec::new();

        let webhook_ref = if success {
            target.ok_webhook()
        } else {
            target.error_webhook()
        };
        if let Some(name) = webhook_ref {
            match self.webhooks.get(name) {
                Some(channel) => selected.push(Arc::clone(channel)),
                None => warn!(target = %target.id(), webhook = name, "Webhook not defined, skipping"),
            }
        }

        if self.email_policy.applies(success) {
            if let Some(channel) = self.email_for(target) {
                selected.push(channel);
            }
        }

        if self.pushover_policy.applies(success) {
            if let Some(channel) = &self.pushover {
                selected.push(Arc::clone(channel));
            }
        }

        selected
    }

    /// Route and deliver. Delivery failures are logged and recorded, never
    /// propagated, and one channel failing does not stop the others.
    pub async fn dispatch(
        &self,
        target: &Target,
        result: &CheckResult,
        transition: &Transition,
        client_name: &str,
    ) -> Vec<DispatchRecord> {
        let channels = self.route(target, result, transition);
        if channels.is_empty() {
            return Vec::new();
        }

        let previous = match transition {
            Transition::Transitioned { previous } => previous.clone(),
            Transition::Unchanged => None,
        };
        let notification = Notification::new(target.id(), result, client_name, previous);

        let mut records = Vec::with_capacity(channels.len());
        for channel in channels {
            let outcome = match channel.send(&notification).await {
                Ok(Delivery::Sent) => {
                    info!(target = %target.id(), channel = channel.name(), kind = %channel.kind(), "Notification sent");
                    DispatchOutcome::Sent
                }
                Ok(Delivery::Skipped(reason)) => {
                    warn!(target = %target.id(), channel = channel.name(), %reason, "Notification skipped");
                    DispatchOutcome::Skipped(reason)
                }
                Err(e) => {
                    warn!(target = %target.id(), channel = channel.name(), kind = %channel.kind(), error = %e, "Notification delivery failed");
                    DispatchOutcome::Failed(e.to_string())
                }
            };
            records.push(DispatchRecord {
                kind: channel.kind(),
                channel: channel.name().to_string(),
                outcome,
            });
        }

        debug!(target = %target.id(), count = records.len(), "Dispatch complete");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelError;
    use crate::target::{HostTarget, UrlTarget};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        kind: ChannelKind,
        fail: bool,
        seen: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        fn new(name: &str, kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                kind,
                fail: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &str, kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                kind,
                fail: true,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for Recorder {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, notification: &Notification) -> Result<Delivery, ChannelError> {
            self.seen.lock().unwrap().push(notification.clone());
            if self.fail {
                Err(ChannelError::Status {
                    url: "http://hook".into(),
                    status: 500,
                })
            } else {
                Ok(Delivery::Sent)
            }
        }
    }

    fn url_target() -> Target {
        UrlTarget::new("api", "https://example.com")
            .with_ok_webhook("hooks-ok")
            .with_error_webhook("hooks-err")
            .into()
    }

    fn changed() -> Transition {
        Transition::Transitioned {
            previous: Some("200".into()),
        }
    }

    fn names(channels: &[Arc<dyn NotificationChannel>]) -> Vec<String> {
        channels.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn unchanged_routes_nowhere() {
        let router = NotificationRouter::new()
            .with_webhook("hooks-ok", Recorder::new("hooks-ok", ChannelKind::Webhook))
            .with_email(Recorder::new("email", ChannelKind::Email));
        let routed = router.route(&url_target(), &CheckResult::ok("OK"), &Transition::Unchanged);
        assert!(routed.is_empty());
    }

    #[test]
    fn success_selects_ok_webhook_only() {
        let router = NotificationRouter::new()
            .with_webhook("hooks-ok", Recorder::new("hooks-ok", ChannelKind::Webhook))
            .with_webhook("hooks-err", Recorder::new("hooks-err", ChannelKind::Webhook));
        let routed = router.route(&url_target(), &CheckResult::ok("OK"), &changed());
        assert_eq!(names(&routed), vec!["hooks-ok"]);
    }

    #[test]
    fn failure_selects_error_webhook_only() {
        let router = NotificationRouter::new()
            .with_webhook("hooks-ok", Recorder::new("hooks-ok", ChannelKind::Webhook))
            .with_webhook("hooks-err", Recorder::new("hooks-err", ChannelKind::Webhook));
        let routed = router.route(&url_target(), &CheckResult::new(500, "Unexpected status: 500"), &changed());
        assert_eq!(names(&routed), vec!["hooks-err"]);
    }

    #[test]
    fn unknown_webhook_is_skipped() {
        let router = NotificationRouter::new().with_email(Recorder::new("email", ChannelKind::Email));
        let routed = router.route(&url_target(), &CheckResult::ok("OK"), &changed());
        assert_eq!(names(&routed), vec!["email"]);
    }

    #[test]
    fn on_change_email_fires_for_recoveries_and_failures() {
        let router = NotificationRouter::new().with_email(Recorder::new("email", ChannelKind::Email));
        let host: Target = HostTarget::new("db").into();
        assert_eq!(router.route(&host, &CheckResult::ok("SSH OK"), &changed()).len(), 1);
        assert_eq!(router.route(&host, &CheckResult::timeout(5000), &changed()).len(), 1);
    }

    #[test]
    fn on_failure_email_skips_recoveries() {
        let router = NotificationRouter::new()
            .with_email(Recorder::new("email", ChannelKind::Email))
            .with_email_policy(NotifyPolicy::OnFailure);
        let host: Target = HostTarget::new("db").into();
        assert!(router.route(&host, &CheckResult::ok("SSH OK"), &changed()).is_empty());
        assert_eq!(router.route(&host, &CheckResult::timeout(5000), &changed()).len(), 1);
    }

    #[test]
    fn named_email_overrides_process_email() {
        let router = NotificationRouter::new()
            .with_email(Recorder::new("email", ChannelKind::Email))
            .with_named_email("ops", Recorder::new("ops", ChannelKind::Email));
        let mut host = HostTarget::new("db");
        host.email_config = Some("ops".into());
        let routed = router.route(&host.clone().into(), &CheckResult::timeout(5000), &changed());
        assert_eq!(names(&routed), vec!["ops"]);

        host.email_config = Some("missing".into());
        let routed = router.route(&host.into(), &CheckResult::timeout(5000), &changed());
        assert_eq!(names(&routed), vec!["email"]);
    }

    #[test]
    fn undefined_email_name_without_process_email_sends_nothing() {
        let router = NotificationRouter::new().with_named_email("ops", Recorder::new("ops", ChannelKind::Email));
        let mut host = HostTarget::new("db");
        host.email_config = Some("missing".into());
        assert!(router.route(&host.into(), &CheckResult::timeout(5000), &changed()).is_empty());
    }

    #[test]
    fn webhook_email_and_pushover_are_combined_in_order() {
        let router = NotificationRouter::new()
            .with_webhook("hooks-err", Recorder::new("hooks-err", ChannelKind::Webhook))
            .with_email(Recorder::new("email", ChannelKind::Email))
            .with_pushover(Recorder::new("pushover", ChannelKind::Pushover));
        let routed = router.route(&url_target(), &CheckResult::new(-1, "Error: x"), &changed());
        assert_eq!(names(&routed), vec!["hooks-err", "email", "pushover"]);
    }

    #[test]
    fn first_observation_routes_even_for_failures() {
        let router = NotificationRouter::new()
            .with_webhook("hooks-err", Recorder::new("hooks-err", ChannelKind::Webhook));
        let first = Transition::Transitioned { previous: None };
        let routed = router.route(&url_target(), &CheckResult::new(503, "down"), &first);
        assert_eq!(names(&routed), vec!["hooks-err"]);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let webhook = Recorder::failing("hooks-err", ChannelKind::Webhook);
        let email = Recorder::new("email", ChannelKind::Email);
        let router = NotificationRouter::new()
            .with_webhook("hooks-err", webhook.clone())
            .with_email(email.clone());

        let records = router
            .dispatch(&url_target(), &CheckResult::new(500, "Unexpected status: 500"), &changed(), "acme")
            .await;

        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].outcome, DispatchOutcome::Failed(_)));
        assert_eq!(records[1].outcome, DispatchOutcome::Sent);
        assert_eq!(webhook.count(), 1);
        assert_eq!(email.count(), 1);

        let seen = email.seen.lock().unwrap();
        assert_eq!(seen[0].service, "api");
        assert_eq!(seen[0].client, "acme");
        assert_eq!(seen[0].previous.as_deref(), Some("200"));
    }

    #[tokio::test]
    async fn dispatch_without_change_sends_nothing() {
        let email = Recorder::new("email", ChannelKind::Email);
        let router = NotificationRouter::new().with_email(email.clone());
        let records = router
            .dispatch(&url_target(), &CheckResult::ok("OK"), &Transition::Unchanged, "acme")
            .await;
        assert!(records.is_empty());
        assert_eq!(email.count(), 0);
    }
}
