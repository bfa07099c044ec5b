//! The snapshot-fallback extraction pipeline.
//!
//! One run loads the prior snapshot, fetches every configured source page in
//! order, extracts and resolves each field, and aggregates the result into a
//! [`RunRecord`]. A failure anywhere below the run level degrades to the
//! snapshot instead of aborting.

use crate::agent::Summarizer;
use crate::config::{Config, CountryConfig, SourceConfig};
use crate::extract::{extract, ExtractionOutcome};
use crate::field::FieldValue;
use crate::record::{names, RunMetrics, RunRecord, RunStatus};
use crate::report::RunReporter;
use crate::resolve::{resolve, FieldOrigin};
use crate::snapshot::Snapshot;
use crate::source::{DocumentSource, FetchError};
use crate::storage::SnapshotStore;
use chrono::Utc;
use scraper::Html;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    LoadingSnapshot,
    FetchingSource(usize),
    ExtractingFields(usize),
    Summarizing,
    Aggregating,
    Reporting,
    Terminal(RunStatus),
}

/// Jittered pause between fetching a page and extracting from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn pick(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// Final values accumulated over one run.
#[derive(Default)]
struct Accumulator {
    fields: BTreeMap<String, FieldValue>,
    origins: BTreeMap<String, FieldOrigin>,
    metrics: RunMetrics,
}

impl Accumulator {
    fn apply(&mut self, name: &str, outcome: ExtractionOutcome, snapshot: Option<&Snapshot>) {
        let found = outcome.is_found();
        // A fresh value is never replaced by a later miss for the same name
        if !found && self.origins.get(name) == Some(&FieldOrigin::Fresh) {
            debug!(field = %name, "keeping fresh value from an earlier source");
            return;
        }
        match &outcome {
            ExtractionOutcome::Found(_) => debug!(field = %name, "field found"),
            ExtractionOutcome::NotFound => debug!(field = %name, "field not found"),
            ExtractionOutcome::Error(message) => {
                warn!(field = %name, error = %message, "field extraction failed")
            }
        }

        let resolution = resolve(outcome, name, snapshot);
        self.metrics.tally(found, &resolution);
        self.origins
            .insert(name.to_string(), resolution.value.origin());
        match resolution.value.into_value() {
            Some(value) => {
                self.fields.insert(name.to_string(), value);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }
}

pub struct SnapshotPipeline {
    country: CountryConfig,
    sources: Vec<SourceConfig>,
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn SnapshotStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
    timeout: Duration,
    pacing: Pacing,
}

impl SnapshotPipeline {
    pub fn new(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            country: config.country.clone(),
            sources: config.sources.clone(),
            source,
            store,
            summarizer: None,
            timeout: config.fetch_timeout(),
            pacing: Pacing::new(
                Duration::from_millis(config.scraper.min_delay_ms),
                Duration::from_millis(config.scraper.max_delay_ms),
            ),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the pipeline and hand the record to the reporter.
    pub async fn run(&self, reporter: &RunReporter) -> RunRecord {
        reporter.started(&self.country.name).await;
        let record = self.execute().await;

        enter(Stage::Reporting);
        reporter.report(&record).await;

        enter(Stage::Terminal(record.status));
        record
    }

    /// Produce a record without reporting it.
    pub async fn execute(&self) -> RunRecord {
        enter(Stage::Idle);
        let started_at = Utc::now();

        enter(Stage::LoadingSnapshot);
        let snapshot = self.load_snapshot();

        let mut acc = Accumulator::default();
        for (i, source) in self.sources.iter().enumerate() {
            enter(Stage::FetchingSource(i));
            match self.fetch(&source.url).await {
                Ok(html) => {
                    acc.metrics.pages_scraped += 1;
                    let pause = self.pacing.pick();
                    if !pause.is_zero() {
                        debug!(source = %source.name, ?pause, "pacing before extraction");
                        tokio::time::sleep(pause).await;
                    }

                    enter(Stage::ExtractingFields(i));
                    for (name, outcome) in extract_all(&html, source) {
                        acc.apply(&name, outcome, snapshot.as_ref());
                    }
                }
                Err(e) => {
                    acc.metrics.pages_failed += 1;
                    warn!(source = %source.name, url = %source.url, error = %e, "source fetch failed");
                    for field in &source.fields {
                        let outcome = ExtractionOutcome::Error(format!(
                            "source `{}` unavailable: {}",
                            source.name, e
                        ));
                        acc.apply(&field.name, outcome, snapshot.as_ref());
                    }
                }
            }
        }

        if let Some(summarizer) = &self.summarizer {
            enter(Stage::Summarizing);
            let outcome = self.summarize(summarizer.as_ref(), &acc).await;
            acc.apply(names::SUMMARY, outcome, snapshot.as_ref());
        }

        enter(Stage::Aggregating);
        self.aggregate(acc, snapshot.is_some(), started_at)
    }

    /// Best-effort snapshot read. Failures and empty snapshots count as none.
    fn load_snapshot(&self) -> Option<Snapshot> {
        match self.store.load() {
            Ok(Some(snapshot)) if !snapshot.is_empty() => {
                info!(captured_at = %snapshot.captured_at, fields = snapshot.fields.len(), "loaded snapshot");
                Some(snapshot)
            }
            Ok(_) => {
                info!("no prior snapshot");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not load snapshot, continuing without it");
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.source.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }

    /// Summaries are only produced from a freshly extracted introduction.
    async fn summarize(&self, summarizer: &dyn Summarizer, acc: &Accumulator) -> ExtractionOutcome {
        let intro = match acc.origins.get(names::INTRODUCTION) {
            Some(FieldOrigin::Fresh) => acc.fields.get(names::INTRODUCTION).and_then(|v| v.as_text()),
            _ => None,
        };
        let Some(intro) = intro else {
            return ExtractionOutcome::NotFound;
        };

        match summarizer.summarize(intro).await {
            Ok(summary) => ExtractionOutcome::Found(FieldValue::Text(summary)),
            Err(e) => ExtractionOutcome::Error(e.to_string()),
        }
    }

    fn aggregate(&self, acc: Accumulator, had_snapshot: bool, started_at: chrono::DateTime<Utc>) -> RunRecord {
        let Accumulator {
            mut fields,
            mut origins,
            metrics,
        } = acc;

        let all_failed = !self.sources.is_empty() && metrics.pages_scraped == 0;
        let status = if all_failed && !had_snapshot {
            warn!(country = %self.country.name, "every source failed and no snapshot exists, emitting minimal record");
            fields = BTreeMap::new();
            origins = BTreeMap::new();
            for (name, value) in [
                (names::COUNTRY, &self.country.name),
                (names::CAPITAL, &self.country.capital),
            ] {
                fields.insert(name.to_string(), FieldValue::Text(value.clone()));
                origins.insert(name.to_string(), FieldOrigin::Fresh);
            }
            RunStatus::Failed
        } else if metrics.not_found == 0 && metrics.errors == 0 {
            RunStatus::Success
        } else {
            RunStatus::Degraded
        };

        info!(
            status = %status,
            found = metrics.found,
            fallbacks = metrics.fallbacks,
            absent = metrics.absent,
            errors = metrics.errors,
            "run aggregated"
        );

        RunRecord {
            country: self.country.name.clone(),
            started_at,
            finished_at: Utc::now(),
            fields,
            origins,
            metrics,
            status,
        }
    }
}

/// Parse a page and extract every field declared for it, in order.
fn extract_all(html: &str, source: &SourceConfig) -> Vec<(String, ExtractionOutcome)> {
    let document = Html::parse_document(html);
    source
        .fields
        .iter()
        .map(|descriptor| (descriptor.name.clone(), extract(&document, descriptor)))
        .collect()
}

fn enter(stage: Stage) {
    debug!(?stage, "pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(name: &str, value: &str) -> Snapshot {
        let mut fields = BTreeMap::new();
        fields.insert(name.to_string(), FieldValue::from(value));
        Snapshot::new(Utc::now(), fields)
    }

    #[test]
    fn later_miss_keeps_earlier_fresh_value() {
        let snapshot = snapshot_with("capital", "Old Nairobi");
        let mut acc = Accumulator::default();
        acc.apply("capital", ExtractionOutcome::Found("Nairobi".into()), Some(&snapshot));
        acc.apply("capital", ExtractionOutcome::NotFound, Some(&snapshot));
        acc.apply("capital", ExtractionOutcome::Error("boom".into()), Some(&snapshot));

        assert_eq!(acc.fields.get("capital"), Some(&FieldValue::from("Nairobi")));
        assert_eq!(acc.origins.get("capital"), Some(&FieldOrigin::Fresh));
        assert_eq!((acc.metrics.found, acc.metrics.not_found, acc.metrics.errors), (1, 0, 0));
        assert_eq!(acc.metrics.fallbacks, 0);
    }

    #[test]
    fn later_find_replaces_stale_value() {
        let snapshot = snapshot_with("capital", "Old Nairobi");
        let mut acc = Accumulator::default();
        acc.apply("capital", ExtractionOutcome::NotFound, Some(&snapshot));
        assert_eq!(acc.origins.get("capital"), Some(&FieldOrigin::Snapshot));

        acc.apply("capital", ExtractionOutcome::Found("Nairobi".into()), Some(&snapshot));
        assert_eq!(acc.fields.get("capital"), Some(&FieldValue::from("Nairobi")));
        assert_eq!(acc.origins.get("capital"), Some(&FieldOrigin::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_sleeps_once_per_fetched_page() {
        use crate::source::StaticSource;
        use crate::storage::MemoryStore;

        let mut config = Config::default();
        for source in &mut config.sources {
            source.url = format!("https://example.test/{}", source.name);
        }
        let source = config.sources.iter().fold(StaticSource::new(), |s, src| {
            s.with_page(&src.url, "<html><body><h1 id='firstHeading'>Kenya</h1></body></html>")
        });
        let pipeline = SnapshotPipeline::new(&config, Arc::new(source), Arc::new(MemoryStore::new()))
            .with_pacing(Pacing::new(Duration::from_secs(2), Duration::from_secs(5)));

        let start = tokio::time::Instant::now();
        let record = pipeline.execute().await;
        let elapsed = start.elapsed();

        assert_eq!(record.metrics.pages_scraped, 2);
        assert!(elapsed >= Duration::from_secs(4), "slept {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(10), "slept {:?}", elapsed);
    }

    #[test]
    fn pacing_stays_in_range() {
        let pacing = Pacing::new(Duration::from_millis(20), Duration::from_millis(50));
        for _ in 0..100 {
            let d = pacing.pick();
            assert!(d >= Duration::from_millis(20) && d <= Duration::from_millis(50));
        }
    }

    #[test]
    fn pacing_orders_inverted_bounds() {
        let pacing = Pacing::new(Duration::from_millis(9), Duration::from_millis(3));
        assert_eq!(pacing, Pacing::new(Duration::from_millis(3), Duration::from_millis(9)));
        assert_eq!(Pacing::none().pick(), Duration::ZERO);
    }
}
