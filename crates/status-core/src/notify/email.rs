use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChannelError, ChannelKind, Delivery, Notification, NotificationChannel};

const DEFAULT_SUBJECT: &str = "[{client}] {service}: {code} {message}";
const DEFAULT_BODY: &str = "{service} status changed to {code}: {message} (client: {client})";

/// SMTP settings for status emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Only needed when targets refer to this config by `emailConfigName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub sender_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_password: Option<String>,

    /// One address or a comma-separated list.
    pub recipient_email: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_body")]
    pub body: String,

    pub smtp_server: String,

    /// Defaults to 465 with `use_ssl`, 587 otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_port: Option<u16>,

    /// Implicit TLS instead of STARTTLS.
    #[serde(default)]
    pub use_ssl: bool,

    #[serde(default = "default_smtp_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

fn default_smtp_timeout_ms() -> u64 {
    10_000
}

impl EmailConfig {
    pub fn new(
        sender_email: impl Into<String>,
        recipient_email: impl Into<String>,
        smtp_server: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            sender_email: sender_email.into(),
            password: None,
            app_password: None,
            recipient_email: recipient_email.into(),
            subject: default_subject(),
            body: default_body(),
            smtp_server: smtp_server.into(),
            smtp_port: None,
            use_ssl: false,
            timeout_ms: default_smtp_timeout_ms(),
        }
    }

    pub fn port(&self) -> u16 {
        self.smtp_port.unwrap_or(if self.use_ssl { 465 } else { 587 })
    }

    /// `app_password` takes precedence over `password`.
    pub fn secret(&self) -> Option<&str> {
        self.app_password
            .as_deref()
            .or(self.password.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.recipient_email
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ChannelError> {
    address.parse::<Mailbox>().map_err(|e| ChannelError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

pub struct EmailChannel {
    name: String,
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        let name = config.name.clone().unwrap_or_else(|| "email".to_string());
        Self { name, config }
    }

    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    pub fn build_message(&self, notification: &Notification) -> Result<Message, ChannelError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.config.sender_email)?)
            .subject(notification.render(&self.config.subject))
            .header(ContentType::TEXT_PLAIN);
        for recipient in self.config.recipients() {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        builder
            .body(notification.render(&self.config.body))
            .map_err(|e| ChannelError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let server = self.config.smtp_server.as_str();
        let builder = if self.config.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
        }
        .map_err(|e| ChannelError::Smtp {
            server: server.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = builder
            .port(self.config.port())
            .timeout(Some(Duration::from_millis(self.config.timeout_ms)));
        if let Some(secret) = self.config.secret() {
            builder = builder.credentials(Credentials::new(
                self.config.sender_email.clone(),
                secret.to_string(),
            ));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery, ChannelError> {
        let message = self.build_message(notification)?;
        let transport = self.transport()?;

        transport.send(message).await.map_err(|e| ChannelError::Smtp {
            server: format!("{}:{}", self.config.smtp_server, self.config.port()),
            reason: e.to_string(),
        })?;

        debug!(
            email = %self.name,
            server = %self.config.smtp_server,
            recipients = %self.config.recipient_email,
            "Email delivered"
        );
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CheckResult;

    fn notification() -> Notification {
        Notification::new("db.internal", &CheckResult::new(-1, "Port 22 error: refused"), "acme", None)
    }

    #[test]
    fn port_defaults_follow_tls_mode() {
        let mut c = EmailConfig::new("a@example.com", "b@example.com", "smtp.example.com");
        assert_eq!(c.port(), 587);
        c.use_ssl = true;
        assert_eq!(c.port(), 465);
        c.smtp_port = Some(2525);
        assert_eq!(c.port(), 2525);
    }

    #[test]
    fn app_password_wins_over_password() {
        let mut c = EmailConfig::new("a@example.com", "b@example.com", "smtp.example.com");
        assert_eq!(c.secret(), None);
        c.password = Some("plain".into());
        assert_eq!(c.secret(), Some("plain"));
        c.app_password = Some("app".into());
        assert_eq!(c.secret(), Some("app"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let c: EmailConfig = serde_json::from_value(serde_json::json!({
            "sender_email": "monitor@example.com",
            "app_password": "xyz",
            "recipient_email": "ops@example.com, oncall@example.com",
            "smtp_server": "smtp.example.com",
            "use_ssl": true
        }))
        .unwrap();
        assert_eq!(c.subject, DEFAULT_SUBJECT);
        assert_eq!(c.port(), 465);
        assert_eq!(c.recipients().collect::<Vec<_>>(), vec!["ops@example.com", "oncall@example.com"]);
    }

    #[test]
    fn message_renders_subject_and_body() {
        let mut c = EmailConfig::new("monitor@example.com", "ops@example.com", "smtp.example.com");
        c.subject = "{service} -> {code}".into();
        let channel = EmailChannel::new(c);

        let message = channel.build_message(&notification()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: db.internal -> -1"), "{}", raw);
        assert!(raw.contains("db.internal status changed to -1: Port 22 error: refused (client: acme)"), "{}", raw);
        assert!(raw.contains("To: ops@example.com"), "{}", raw);
    }

    #[test]
    fn invalid_sender_is_an_address_error() {
        let channel = EmailChannel::new(EmailConfig::new("not an address", "ops@example.com", "smtp.example.com"));
        let err = channel.build_message(&notification()).unwrap_err();
        assert!(matches!(err, ChannelError::Address { .. }), "{}", err);
    }

    #[test]
    fn channel_name_defaults_to_email() {
        let mut c = EmailConfig::new("a@example.com", "b@example.com", "smtp.example.com");
        assert_eq!(EmailChannel::new(c.clone()).name(), "email");
        c.name = Some("ops-mail".into());
        assert_eq!(EmailChannel::new(c).name(), "ops-mail");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_smtp_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut c = EmailConfig::new("monitor@example.com", "ops@example.com", "localhost");
        c.smtp_port = Some(port);
        c.timeout_ms = 2000;

        let err = EmailChannel::new(c).send(&notification()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Smtp { .. }), "{}", err);
    }
}
