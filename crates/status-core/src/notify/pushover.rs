use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChannelError, ChannelKind, Delivery, Notification, NotificationChannel};

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    PUSHOVER_API_URL.to_string()
}

impl PushoverConfig {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: user.into(),
            api_url: default_api_url(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

pub struct PushoverChannel {
    config: PushoverConfig,
    client: Client,
}

impl PushoverChannel {
    pub fn new(config: PushoverConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn form(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        let title = if notification.success {
            notification.render("{service} ok")
        } else {
            notification.render("{service} error")
        };
        vec![
            ("token", self.config.token.clone()),
            ("user", self.config.user.clone()),
            ("title", title),
            ("message", notification.render("{code} {message} ({client})")),
            ("timestamp", notification.timestamp.timestamp().to_string()),
        ]
    }
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Pushover
    }

    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery, ChannelError> {
        let url = &self.config.api_url;
        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(10))
            .form(&self.form(notification))
            .send()
            .await
            .map_err(|source| ChannelError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(ChannelError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        debug!(service = %notification.service, "Pushover notification sent");
        Ok(Delivery::Sent)
    }
}
