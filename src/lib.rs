//! # country-snapshot
//!
//! Scrapes facts about a country from public web pages and keeps the last
//! good result around as a fallback.
//!
//! ## Features
//!
//! - **Graceful degradation**: a field that cannot be extracted falls back to
//!   the previous snapshot instead of being lost
//! - **Pluggable storage**: flat JSON file or sled database
//! - **Monitoring**: webhook alerts, health-check pings and a metrics file
//! - **Summaries**: optional Gemini summary of the introduction via rstructor

pub mod agent;
pub mod config;
pub mod extract;
pub mod field;
pub mod notify;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod resolve;
pub mod snapshot;
pub mod source;
pub mod storage;

pub use config::Config;
pub use extract::{extract, ExtractionOutcome};
pub use field::{Column, FieldDescriptor, FieldValue, Rule};
pub use pipeline::{Pacing, SnapshotPipeline};
pub use record::{City, CountryRecord, RunRecord, RunStatus};
pub use report::RunReporter;
pub use resolve::{resolve, FieldOrigin, FinalValue};
pub use snapshot::Snapshot;
pub use storage::{JsonFileStore, SledStore, SnapshotStore};
