//! Named, templated HTTP webhooks.
//!
//! A webhook is declared once in configuration and referenced by name from
//! targets. Its `body` is a mapping whose string values may contain the
//! `{code}`, `{message}`, `{client}` and `{service}` placeholders; the
//! `Content-Type` header decides whether the rendered body is sent as JSON
//! or as a urlencoded form.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::debug;

use super::{ChannelError, ChannelKind, Delivery, Notification, NotificationChannel};

pub const SIGNATURE_HEADER: &str = "X-Status-Signature-256";
pub const DELIVERY_HEADER: &str = "X-Status-Delivery";

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[serde(alias = "get", alias = "Get")]
    Get,
    #[default]
    #[serde(alias = "post", alias = "Post")]
    Post,
    #[serde(alias = "put", alias = "Put")]
    Put,
}

impl RequestMethod {
    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_method())
    }
}

/// Configuration for a single named webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDefinition {
    pub name: String,
    pub url: String,

    #[serde(default)]
    pub request_method: RequestMethod,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Map<String, Value>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional HMAC-SHA256 signing secret for the `X-Status-Signature-256` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

impl WebhookDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            request_method: RequestMethod::Post,
            headers: BTreeMap::new(),
            body: Map::new(),
            timeout_ms: default_webhook_timeout_ms(),
            secret: None,
        }
    }

    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.request_method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
            .map(|(_, v)| v.as_str())
    }

    /// Encoding selected by the `Content-Type` header. JSON when the header
    /// is absent, `None` for any unsupported media type.
    pub fn encoding(&self) -> Option<BodyEncoding> {
        let Some(content_type) = self.content_type() else {
            return Some(BodyEncoding::Json);
        };
        let media_type = content_type.split(';').next().unwrap_or("").trim();
        if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            Some(BodyEncoding::Json)
        } else if media_type.eq_ignore_ascii_case(FORM_CONTENT_TYPE) {
            Some(BodyEncoding::Form)
        } else {
            None
        }
    }

    /// Copy of `body` with placeholders substituted in string values.
    pub fn render_body(&self, notification: &Notification) -> Map<String, Value> {
        self.body
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => Value::String(notification.render(s)),
                    other => other.clone(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

/// Delivers notifications to one [`WebhookDefinition`].
pub struct WebhookChannel {
    definition: WebhookDefinition,
    client: Client,
}

impl WebhookChannel {
    pub fn new(definition: WebhookDefinition, client: Client) -> Self {
        Self { definition, client }
    }

    pub fn definition(&self) -> &WebhookDefinition {
        &self.definition
    }

    fn header_map(&self) -> Result<HeaderMap, ChannelError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.definition.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ChannelError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ChannelError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery, ChannelError> {
        let def = &self.definition;
        let Some(encoding) = def.encoding() else {
            return Ok(Delivery::Skipped(format!(
                "unsupported Content-Type '{}'",
                def.content_type().unwrap_or_default()
            )));
        };

        let fields = def.render_body(notification);
        let mut headers = self.header_map()?;
        if !headers.contains_key(USER_AGENT) {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_static(concat!("status-monitor/", env!("CARGO_PKG_VERSION"))),
            );
        }

        let mut req = self
            .client
            .request(def.request_method.as_method(), &def.url)
            .timeout(Duration::from_millis(def.timeout_ms))
            .header(DELIVERY_HEADER, notification.id.to_string());

        let signed: Vec<u8> = if def.request_method == RequestMethod::Get {
            let query = form_encode(&fields);
            req = req.query(&form_pairs(&fields));
            query.into_bytes()
        } else {
            let body = match encoding {
                BodyEncoding::Json => serde_json::to_vec(&Value::Object(fields))
                    .map_err(|e| ChannelError::Message(format!("Failed to serialize webhook body: {}", e)))?,
                BodyEncoding::Form => form_encode(&fields).into_bytes(),
            };
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            req = req.body(body.clone());
            body
        };

        if let Some(secret) = def.secret.as_deref() {
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(&signed, secret)));
        }

        let response = req
            .headers(headers)
            .send()
            .await
            .map_err(|source| ChannelError::Request {
                url: def.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status {
                url: def.url.clone(),
                status: status.as_u16(),
            });
        }

        debug!(webhook = %def.name, url = %def.url, %status, "Webhook delivered");
        Ok(Delivery::Sent)
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn form_pairs(fields: &Map<String, Value>) -> Vec<(String, String)> {
    fields.iter().map(|(k, v)| (k.clone(), field_text(v))).collect()
}

fn form_encode(fields: &Map<String, Value>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_pairs(fields))
        .finish()
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
