//! Notification channels: webhook alerts and health-check pings.
//!
//! Callers treat these as fire-and-forget. Errors are returned so they can
//! be logged, never so they can change the outcome of a run.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint answered HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Success,
    Fail,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity) -> Result<(), NotifyError>;

    async fn ping_health(&self, status: HealthStatus) -> Result<(), NotifyError>;
}

/// Logs notifications only. Used when no endpoints are configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Result<(), NotifyError> {
        match severity {
            Severity::Info => info!(notification = %message),
            Severity::Error => error!(notification = %message),
        }
        Ok(())
    }

    async fn ping_health(&self, status: HealthStatus) -> Result<(), NotifyError> {
        info!(?status, "health check (no endpoint configured)");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    timestamp: &'a str,
}

/// Posts alerts to a chat webhook and pings a health-check URL.
pub struct WebhookNotifier {
    client: Client,
    label: String,
    webhook_url: Option<String>,
    healthcheck_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        label: impl Into<String>,
        webhook_url: Option<String>,
        healthcheck_url: Option<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            client,
            label: label.into(),
            webhook_url,
            healthcheck_url,
        })
    }

    fn health_url(base: &str, status: HealthStatus) -> String {
        let base = base.trim_end_matches('/');
        match status {
            HealthStatus::Success => format!("{}/", base),
            HealthStatus::Fail => format!("{}/fail", base),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Result<(), NotifyError> {
        let Some(url) = &self.webhook_url else {
            warn!("no monitoring webhook URL configured, skipping alert");
            return Ok(());
        };

        let timestamp = Utc::now().to_rfc3339();
        let payload = WebhookPayload {
            text: format!("[{}] {}: {}", severity, self.label, message),
            timestamp: &timestamp,
        };
        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn ping_health(&self, status: HealthStatus) -> Result<(), NotifyError> {
        let Some(base) = &self.healthcheck_url else {
            warn!("no healthcheck URL configured, skipping ping");
            return Ok(());
        };

        let response = self.client.get(Self::health_url(base, status)).send().await?;
        info!(?status, code = response.status().as_u16(), "healthcheck ping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_appends_fail_suffix() {
        assert_eq!(
            WebhookNotifier::health_url("https://hc.test/abc", HealthStatus::Success),
            "https://hc.test/abc/"
        );
        assert_eq!(
            WebhookNotifier::health_url("https://hc.test/abc/", HealthStatus::Fail),
            "https://hc.test/abc/fail"
        );
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_a_no_op() {
        let notifier = WebhookNotifier::new("Kenya", None, None).unwrap();
        assert!(notifier.notify("hello", Severity::Info).await.is_ok());
        assert!(notifier.ping_health(HealthStatus::Fail).await.is_ok());
    }
}
