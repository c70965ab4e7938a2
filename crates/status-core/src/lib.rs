#![forbid(unsafe_code)]

pub mod config;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod target;

pub use config::{MonitorConfig, NotifyPolicy};
pub use monitor::{has_changed, Monitor, RunSummary, StateError, StateStore, TargetReport, Transition};
pub use notify::{
    ChannelError, ChannelKind, Delivery, DispatchOutcome, DispatchRecord, EmailChannel, EmailConfig,
    Notification, NotificationChannel, NotificationRouter, PushoverChannel, PushoverConfig,
    RequestMethod, WebhookChannel, WebhookDefinition,
};
pub use probe::{CheckResult, NetworkProber, Prober};
pub use target::{sanitize_id, HostTarget, Target, UrlTarget};
