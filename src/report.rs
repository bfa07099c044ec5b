//! Run reporting: persist the snapshot, write metrics and output files, and
//! send notifications. Nothing in here can fail a run.

use crate::notify::{HealthStatus, Notifier, Severity};
use crate::record::{CountryRecord, RunMetrics, RunRecord, RunStatus};
use crate::resolve::FieldOrigin;
use crate::storage::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Metrics file contents
#[derive(Debug, Serialize)]
pub struct MetricsReport<'a> {
    pub country: &'a str,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(flatten)]
    pub counters: &'a RunMetrics,
}

impl<'a> From<&'a RunRecord> for MetricsReport<'a> {
    fn from(record: &'a RunRecord) -> Self {
        Self {
            country: &record.country,
            status: record.status,
            start_time: record.started_at,
            end_time: record.finished_at,
            duration_seconds: record.duration_secs(),
            counters: &record.metrics,
        }
    }
}

pub struct RunReporter {
    store: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn Notifier>,
    output_path: Option<PathBuf>,
    metrics_path: Option<PathBuf>,
}

impl RunReporter {
    pub fn new(store: Arc<dyn SnapshotStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            output_path: None,
            metrics_path: None,
        }
    }

    pub fn with_output_path(mut self, path: Option<PathBuf>) -> Self {
        self.output_path = path;
        self
    }

    pub fn with_metrics_path(mut self, path: Option<PathBuf>) -> Self {
        self.metrics_path = path;
        self
    }

    pub async fn started(&self, country: &str) {
        info!(country = %country, "scraper started");
        self.send(&format!("Scraper started for {}", country), Severity::Info)
            .await;
    }

    pub async fn report(&self, record: &RunRecord) {
        if let Err(e) = self.store.save(record) {
            error!(error = %e, "failed to save snapshot");
            self.send(&format!("Snapshot save failed: {}", e), Severity::Error)
                .await;
        }

        if let Some(path) = &self.output_path {
            write_json(path, &CountryRecord::from(record));
        }
        if let Some(path) = &self.metrics_path {
            write_json(path, &MetricsReport::from(record));
        }

        for (field, origin) in record.degraded_fields() {
            let (message, severity) = match origin {
                FieldOrigin::Snapshot => (
                    format!("Field `{}` fell back to the previous snapshot", field),
                    Severity::Info,
                ),
                _ => (format!("Field `{}` has no value", field), Severity::Error),
            };
            self.send(&message, severity).await;
        }

        let m = &record.metrics;
        let summary = format!(
            "Scraper finished with status {} in {:.2}s. Pages: {} ok / {} failed, fields found: {}, fallbacks: {}, absent: {}, errors: {}",
            record.status,
            record.duration_secs(),
            m.pages_scraped,
            m.pages_failed,
            m.found,
            m.fallbacks,
            m.absent,
            m.errors
        );
        info!(status = %record.status, "{}", summary);

        let (severity, health) = match record.status {
            RunStatus::Failed => (Severity::Error, HealthStatus::Fail),
            _ => (Severity::Info, HealthStatus::Success),
        };
        self.send(&summary, severity).await;
        if let Err(e) = self.notifier.ping_health(health).await {
            warn!(error = %e, "healthcheck ping failed");
        }
    }

    async fn send(&self, message: &str, severity: Severity) {
        if let Err(e) = self.notifier.notify(message, severity).await {
            warn!(error = %e, "notification failed");
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    let result = (|| -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
        Ok(())
    })();

    match result {
        Ok(()) => info!(path = %path.display(), "wrote report file"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write report file"),
    }
}
