//! Transition notifications: webhook and file channels.
//!
//! Dispatches structured alerts through configured channels. Delivery is
//! best-effort: each channel failure is logged as a warning and never blocks
//! or aborts the monitoring loop. There is no retry of a failed alert.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};
use crate::logger::activity::{ActivityLog, timestamp_now};
use crate::monitor::status::{ServiceStatus, Transition};

/// Title carried by every webhook attachment.
pub const ALERT_TITLE: &str = "Service Health Monitor Alert";

// ──────────────────── notification level ────────────────────

/// Severity of an alert. Rendered as the attachment color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Good,
    Critical,
}

impl NotificationLevel {
    /// Webhook attachment color.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Critical => "danger",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ──────────────────── notification events ────────────────────

/// A structured alert about one status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    ServiceDown { url: String, timestamp: String },
    ServiceRecovered { url: String, timestamp: String },
}

impl NotificationEvent {
    /// Build the alert for a transition observed now.
    #[must_use]
    pub fn from_transition(transition: Transition, url: &str) -> Self {
        Self::at(transition, url, timestamp_now())
    }

    /// Build the alert for a transition with an explicit timestamp.
    #[must_use]
    pub fn at(transition: Transition, url: &str, timestamp: String) -> Self {
        let url = url.to_string();
        match transition {
            Transition::WentDown => Self::ServiceDown { url, timestamp },
            Transition::Recovered => Self::ServiceRecovered { url, timestamp },
        }
    }

    #[must_use]
    pub const fn level(&self) -> NotificationLevel {
        match self {
            Self::ServiceDown { .. } => NotificationLevel::Critical,
            Self::ServiceRecovered { .. } => NotificationLevel::Good,
        }
    }

    /// Service status this alert announces.
    #[must_use]
    pub const fn status(&self) -> ServiceStatus {
        match self {
            Self::ServiceDown { .. } => ServiceStatus::Down,
            Self::ServiceRecovered { .. } => ServiceStatus::Up,
        }
    }

    /// Status label shown in the alert.
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        self.status().label()
    }

    /// Free-text body of the alert.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ServiceDown { .. } => "Service is not responding and appears to be down",
            Self::ServiceRecovered { .. } => {
                "Service has recovered and is now responding normally"
            }
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::ServiceDown { url, .. } | Self::ServiceRecovered { url, .. } => url,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::ServiceDown { timestamp, .. } | Self::ServiceRecovered { timestamp, .. } => {
                timestamp
            }
        }
    }

    /// Short human-readable summary line.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("[{}] {} ({})", self.status_label(), self.message(), self.url())
    }
}

// ──────────────────── configuration ────────────────────

/// Top-level notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Master switch for all notifications.
    pub enabled: bool,
    pub webhook: WebhookConfig,
    pub file: FileConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook: WebhookConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl NotificationConfig {
    /// Whether at least one channel would receive alerts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && (self.webhook.url.is_some() || self.file.path.is_some())
    }
}

/// Chat-webhook settings (Slack-compatible attachment payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Destination channel/identity included in the payload.
    pub channel: String,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            channel: "#service-monitor".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Append-only JSONL record of every alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub path: Option<PathBuf>,
}

// ──────────────────── webhook payload ────────────────────

/// Slack-style webhook body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookPayload {
    pub channel: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub text: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl WebhookPayload {
    #[must_use]
    pub fn for_event(channel: &str, event: &NotificationEvent) -> Self {
        let field = |title: &str, value: &str| AttachmentField {
            title: title.to_string(),
            value: value.to_string(),
            short: true,
        };
        Self {
            channel: channel.to_string(),
            attachments: vec![Attachment {
                color: event.level().color().to_string(),
                title: ALERT_TITLE.to_string(),
                text: event.message().to_string(),
                fields: vec![
                    field("Service URL", event.url()),
                    field("Status", event.status_label()),
                    field("Timestamp", event.timestamp()),
                ],
            }],
        }
    }
}

// ──────────────────── JSONL record ────────────────────

/// A single notification record written to the JSONL file.
#[derive(Debug, Serialize)]
struct NotificationRecord<'a> {
    level: NotificationLevel,
    summary: String,
    #[serde(flatten)]
    event: &'a NotificationEvent,
}

// ──────────────────── notification sinks ────────────────────

/// A destination that can deliver alerts.
pub trait NotificationSink: Send {
    fn name(&self) -> &'static str;
    fn send(&self, event: &NotificationEvent) -> Result<()>;
}

// ──── Webhook (HTTP POST) ────

pub struct WebhookSink {
    url: String,
    channel: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: &str, config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| MonitorError::Notification {
                channel: "webhook",
                details: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            url: url.to_string(),
            channel: config.channel.clone(),
            client,
        })
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, event: &NotificationEvent) -> Result<()> {
        let payload = WebhookPayload::for_event(&self.channel, event);
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| MonitorError::Notification {
                channel: "webhook",
                details: e.to_string(),
            })?;
        response
            .error_for_status()
            .map_err(|e| MonitorError::Notification {
                channel: "webhook",
                details: e.to_string(),
            })?;
        Ok(())
    }
}

// ──── File (append-only JSONL) ────

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl NotificationSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn send(&self, event: &NotificationEvent) -> Result<()> {
        let record = NotificationRecord {
            level: event.level(),
            summary: event.summary(),
            event,
        };
        let json = serde_json::to_string(&record)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }

        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            opts.mode(0o600);
        }
        let mut file = opts
            .open(&self.path)
            .map_err(|e| MonitorError::io(&self.path, e))?;
        file.write_all(format!("{json}\n").as_bytes())
            .map_err(|e| MonitorError::io(&self.path, e))
    }
}

// ──────────────────── notification manager ────────────────────

/// Outcome of dispatching one alert to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Coordinates dispatching alerts to all configured sinks.
pub struct NotificationManager {
    sinks: Vec<Box<dyn NotificationSink>>,
    enabled: bool,
}

impl NotificationManager {
    /// Build a manager from configuration.
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        if let Some(url) = config.webhook.url.as_deref().filter(|u| !u.trim().is_empty()) {
            sinks.push(Box::new(WebhookSink::new(url, &config.webhook)?));
        }
        if let Some(path) = &config.file.path {
            sinks.push(Box::new(FileSink::new(path.clone())));
        }

        Ok(Self::with_sinks(sinks))
    }

    /// Build an enabled manager over explicit sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self {
            sinks,
            enabled: true,
        }
    }

    /// Create a disabled (no-op) manager.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            enabled: false,
        }
    }

    /// Dispatch an alert to all sinks. Failures are logged as warnings.
    pub fn notify(&self, event: &NotificationEvent, log: &mut ActivityLog) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !self.enabled {
            return report;
        }

        for sink in &self.sinks {
            match sink.send(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log.warning(format!(
                        "Failed to send {} notification: {e}",
                        sink.name()
                    ));
                }
            }
        }
        report
    }

    /// Whether any alert would actually leave the process.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.sinks.is_empty()
    }

    /// List the names of active sinks.
    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

// ──────────────────── tests ────────────────────
