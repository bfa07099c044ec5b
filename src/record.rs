//! Run output: the aggregated record of one pipeline run.

use crate::field::{FieldValue, Item};
use crate::resolve::{FieldOrigin, Resolution};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known field names carried by the output schema.
pub mod names {
    pub const COUNTRY: &str = "country";
    pub const CAPITAL: &str = "capital";
    pub const OFFICIAL_LANGUAGES: &str = "official_languages";
    pub const POPULATION: &str = "population";
    pub const AREA: &str = "area";
    pub const CURRENCY: &str = "currency";
    pub const INTRODUCTION: &str = "introduction";
    pub const SUMMARY: &str = "summary";
    pub const TOURISM_HIGHLIGHTS: &str = "tourism_highlights";
    pub const CITIES: &str = "cities";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every field was found in this run
    Success,
    /// At least one field came from the snapshot or is missing
    Degraded,
    /// Nothing could be fetched and there was no snapshot
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Degraded => "degraded",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub pages_scraped: u32,
    pub pages_failed: u32,
    pub found: u32,
    pub not_found: u32,
    pub errors: u32,
    /// Fields whose final value came from the snapshot
    pub fallbacks: u32,
    /// Fields with no value at all
    pub absent: u32,
}

impl RunMetrics {
    /// Tally one resolved field.
    pub fn tally(&mut self, found: bool, resolution: &Resolution) {
        if found {
            self.found += 1;
        } else if resolution.errored {
            self.errors += 1;
        } else {
            self.not_found += 1;
        }
        match resolution.value.origin() {
            FieldOrigin::Fresh => {}
            FieldOrigin::Snapshot => self.fallbacks += 1,
            FieldOrigin::Absent => self.absent += 1,
        }
    }

    pub fn fields_total(&self) -> u32 {
        self.found + self.not_found + self.errors
    }
}

/// The aggregated output of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub country: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub origins: BTreeMap<String, FieldOrigin>,
    pub metrics: RunMetrics,
    pub status: RunStatus,
}

impl RunRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(|v| v.as_text()).map(str::to_string)
    }

    pub fn origin(&self, field: &str) -> Option<FieldOrigin> {
        self.origins.get(field).copied()
    }

    /// Fields whose final value did not come from this run.
    pub fn degraded_fields(&self) -> impl Iterator<Item = (&str, FieldOrigin)> {
        self.origins
            .iter()
            .filter(|(_, origin)| **origin != FieldOrigin::Fresh)
            .map(|(name, origin)| (name.as_str(), *origin))
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// The snapshot the next run falls back on.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::new(self.finished_at, self.fields.clone())
    }
}

/// One row of the major-cities table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub population: Option<String>,
    pub population_year: Option<u32>,
    pub is_capital: bool,
}

impl City {
    fn from_item(item: &Item, capital: Option<&str>) -> Option<Self> {
        let name = item.get("name")?.clone();
        Some(Self {
            is_capital: capital.is_some_and(|c| c.eq_ignore_ascii_case(&name)),
            population: item.get("population").cloned(),
            population_year: item.get("population_year").and_then(|y| y.parse().ok()),
            name,
        })
    }
}

/// Output document for one country, in a fixed schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub country: Option<String>,
    pub capital: Option<String>,
    pub official_languages: Option<String>,
    pub population: Option<String>,
    pub area: Option<String>,
    pub currency: Option<String>,
    pub introduction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tourism_highlights: Vec<String>,
    #[serde(default)]
    pub cities: Vec<City>,
    pub last_updated: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RunRecord> for CountryRecord {
    fn from(record: &RunRecord) -> Self {
        let highlights = record
            .get(names::TOURISM_HIGHLIGHTS)
            .and_then(|v| v.as_list())
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let capital = record.text(names::CAPITAL);
        let cities = record
            .get(names::CITIES)
            .and_then(|v| v.as_records())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| City::from_item(item, capital.as_deref()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            country: record.text(names::COUNTRY),
            capital,
            official_languages: record.text(names::OFFICIAL_LANGUAGES),
            population: record.text(names::POPULATION),
            area: record.text(names::AREA),
            currency: record.text(names::CURRENCY),
            introduction: record.text(names::INTRODUCTION),
            summary: record.text(names::SUMMARY),
            tourism_highlights: highlights,
            cities,
            last_updated: record.finished_at.format("%Y-%m-%d").to_string(),
            status: record.status,
            error: (record.status == RunStatus::Failed)
                .then(|| "Scraping failed, minimal data provided".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::FinalValue;

    fn record(status: RunStatus) -> RunRecord {
        let now = Utc::now();
        let mut fields = BTreeMap::new();
        let mut origins = BTreeMap::new();
        fields.insert(names::COUNTRY.to_string(), FieldValue::from("Kenya"));
        origins.insert(names::COUNTRY.to_string(), FieldOrigin::Fresh);
        fields.insert(
            names::TOURISM_HIGHLIGHTS.to_string(),
            FieldValue::List(vec!["Safari".into()]),
        );
        origins.insert(names::TOURISM_HIGHLIGHTS.to_string(), FieldOrigin::Snapshot);
        origins.insert(names::AREA.to_string(), FieldOrigin::Absent);
        RunRecord {
            country: "Kenya".into(),
            started_at: now,
            finished_at: now,
            fields,
            origins,
            metrics: RunMetrics::default(),
            status,
        }
    }

    #[test]
    fn tally_counts_outcomes_and_origins() {
        let mut m = RunMetrics::default();
        m.tally(true, &Resolution { value: FinalValue::Fresh("a".into()), errored: false });
        m.tally(false, &Resolution { value: FinalValue::Stale("b".into()), errored: false });
        m.tally(false, &Resolution { value: FinalValue::Absent, errored: true });
        assert_eq!((m.found, m.not_found, m.errors), (1, 1, 1));
        assert_eq!((m.fallbacks, m.absent), (1, 1));
        assert_eq!(m.fields_total(), 3);
    }

    #[test]
    fn country_record_maps_known_fields() {
        let out = CountryRecord::from(&record(RunStatus::Degraded));
        assert_eq!(out.country.as_deref(), Some("Kenya"));
        assert_eq!(out.capital, None);
        assert_eq!(out.tourism_highlights, vec!["Safari".to_string()]);
        assert!(out.error.is_none());
    }

    #[test]
    fn cities_map_to_typed_rows() {
        let mut r = record(RunStatus::Success);
        r.fields.insert(names::CAPITAL.to_string(), FieldValue::from("Nairobi"));
        let row = |name: &str, population: Option<&str>| {
            let mut item = Item::new();
            item.insert("name".to_string(), name.to_string());
            if let Some(p) = population {
                item.insert("population".to_string(), p.to_string());
            }
            item.insert("population_year".to_string(), "2019".to_string());
            item
        };
        r.fields.insert(
            names::CITIES.to_string(),
            FieldValue::Records(vec![row("Nairobi", Some("4397073")), row("Kisumu", None)]),
        );

        let out = CountryRecord::from(&r);
        assert_eq!(
            out.cities,
            vec![
                City {
                    name: "Nairobi".into(),
                    population: Some("4397073".into()),
                    population_year: Some(2019),
                    is_capital: true,
                },
                City {
                    name: "Kisumu".into(),
                    population: None,
                    population_year: Some(2019),
                    is_capital: false,
                },
            ]
        );
    }

    #[test]
    fn failed_record_carries_error_note() {
        let out = CountryRecord::from(&record(RunStatus::Failed));
        assert!(out.error.is_some());
    }

    #[test]
    fn degraded_fields_skip_fresh_ones() {
        let r = record(RunStatus::Degraded);
        let degraded: Vec<_> = r.degraded_fields().collect();
        assert_eq!(
            degraded,
            vec![
                (names::AREA, FieldOrigin::Absent),
                (names::TOURISM_HIGHLIGHTS, FieldOrigin::Snapshot)
            ]
        );
    }
}
