//! Configuration loading and management.
//!
//! Loads settings from `country-snapshot.toml` with environment variable
//! overrides for endpoints and keys. Without a config file the built-in
//! defaults for Kenya are used.

use crate::field::{Column, FieldDescriptor, Rule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "country-snapshot.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The country being scraped, and the last-resort record for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryConfig {
    pub name: String,
    pub capital: String,
}

/// Fetch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Upper bound on a single page fetch
    pub timeout_secs: u64,
    /// Pacing delay after each fetch, picked uniformly in this range
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub user_agent: String,
}

/// One page and the fields read from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Json,
    Sled,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Snapshot file (json) or database directory (sled)
    pub path: PathBuf,
    /// Where to write the country record JSON after each run
    pub output_path: Option<PathBuf>,
    /// Where to write run metrics JSON after each run
    pub metrics_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub healthcheck_url: Option<String>,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// LLM provider, only "gemini" for now
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash")
    pub model: String,
    /// System persona for the agent
    pub persona: String,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub gemini_key: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub country: CountryConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub agent: Option<AgentConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from the default locations, falling back to the
    /// built-in defaults when no file exists
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::read(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MONITORING_WEBHOOK_URL") {
            self.monitoring.webhook_url = Some(url);
        }
        if let Ok(url) = std::env::var("HEALTHCHECK_URL") {
            self.monitoring.healthcheck_url = Some(url);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("country-snapshot")
            .join(CONFIG_FILE);
        home_config.exists().then_some(home_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".to_string()));
        }
        if self.scraper.min_delay_ms > self.scraper.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "min_delay_ms ({}) is greater than max_delay_ms ({})",
                self.scraper.min_delay_ms, self.scraper.max_delay_ms
            )));
        }
        // Field names key the record, so they must be unique across sources
        let mut declared_by: HashMap<&str, &str> = HashMap::new();
        for source in &self.sources {
            for field in &source.fields {
                if let Some(first) = declared_by.insert(field.name.as_str(), source.name.as_str()) {
                    let message = if first == source.name {
                        format!("duplicate field `{}` in source `{}`", field.name, source.name)
                    } else {
                        format!(
                            "field `{}` declared by both `{}` and `{}`",
                            field.name, first, source.name
                        )
                    };
                    return Err(ConfigError::Invalid(message));
                }
            }
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.scraper.timeout_secs)
    }

    /// Get the API key for the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        let provider = self
            .agent
            .as_ref()
            .map(|a| a.provider.as_str())
            .unwrap_or("none");
        match provider {
            "gemini" => self
                .api
                .gemini_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingApiKey("gemini".to_string())),
            other => Err(ConfigError::MissingApiKey(other.to_string())),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            user_agent: crate::source::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: PathBuf::from("./data/snapshot.json"),
            output_path: None,
            metrics_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let infobox = "table.infobox tr";
        let wikipedia = SourceConfig {
            name: "wikipedia".to_string(),
            url: "https://en.wikipedia.org/wiki/Kenya".to_string(),
            fields: vec![
                FieldDescriptor::new("country", "h1#firstHeading"),
                FieldDescriptor::row("capital", infobox, "Capital").with_rule(Rule::StripFootnotes),
                FieldDescriptor::row("official_languages", infobox, "Official languages")
                    .with_rule(Rule::StripFootnotes),
                FieldDescriptor::row("population", infobox, "2019 census").with_rule(Rule::Digits),
                FieldDescriptor::row("area", infobox, "Total").with_rule(Rule::Digits),
                FieldDescriptor::row("currency", infobox, "Currency").with_rule(Rule::StripFootnotes),
                FieldDescriptor::new("introduction", ".mw-parser-output > p")
                    .with_rule(Rule::FirstLongerThan { min_chars: 50 }),
                FieldDescriptor::new("cities", "table.wikitable tbody tr").with_rule(Rule::Rows {
                    max_items: 10,
                    columns: vec![Column::text("name", 0), Column::number("population", 1)],
                    constants: BTreeMap::from([(
                        "population_year".to_string(),
                        "2019".to_string(),
                    )]),
                }),
            ],
        };
        let tourism = SourceConfig {
            name: "tourism".to_string(),
            url: "https://magicalkenya.com/things-to-do/".to_string(),
            fields: vec![FieldDescriptor::new("tourism_highlights", ".elementor-widget-container h2")
                .with_rule(Rule::List {
                    max_items: 5,
                    min_chars: 3,
                })],
        };

        Self {
            country: CountryConfig {
                name: "Kenya".to_string(),
                capital: "Nairobi".to_string(),
            },
            scraper: ScraperConfig::default(),
            sources: vec![wikipedia, tourism],
            storage: StorageConfig::default(),
            monitoring: MonitoringConfig::default(),
            agent: None,
            api: ApiConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [country]
        name = "Kenya"
        capital = "Nairobi"

        [scraper]
        min_delay_ms = 0
        max_delay_ms = 0

        [storage]
        backend = "sled"
        path = "./data/db"

        [[sources]]
        name = "wikipedia"
        url = "https://en.wikipedia.org/wiki/Kenya"

        [[sources.fields]]
        name = "population"
        selector = "table.infobox tr"
        label = "2019 census"
        value = "td"
        rule = { kind = "digits" }
    "#;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.country.capital, "Nairobi");
    }

    #[test]
    fn parses_sample_toml() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.scraper.timeout_secs, 60);
        assert_eq!(config.sources[0].fields[0].rule, Some(Rule::Digits));
        assert!(config.agent.is_none());
    }

    #[test]
    fn rejects_duplicate_fields() {
        let mut config = Config::default();
        let dup = config.sources[0].fields[0].clone();
        config.sources[0].fields.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_field_declared_by_two_sources() {
        let mut config = Config::default();
        let capital = config.sources[0].fields[1].clone();
        config.sources[1].fields.push(capital);
        match config.validate() {
            Err(ConfigError::Invalid(message)) => {
                assert!(message.contains("`capital`"));
                assert!(message.contains("`wikipedia`") && message.contains("`tourism`"));
            }
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn example_file_matches_defaults() {
        let example = Config::from_toml(include_str!("../country-snapshot.example.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(example.sources.len(), defaults.sources.len());
        for (a, b) in example.sources.iter().zip(&defaults.sources) {
            assert_eq!(a.fields, b.fields, "fields of source `{}`", a.name);
        }
    }

    #[test]
    fn default_config_reads_cities_table() {
        let config = Config::default();
        let cities = config.sources[0]
            .fields
            .iter()
            .find(|f| f.name == "cities")
            .unwrap();
        assert!(matches!(cities.rule, Some(Rule::Rows { max_items: 10, .. })));
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let mut config = Config::default();
        config.scraper.min_delay_ms = 10;
        config.scraper.max_delay_ms = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn api_key_requires_agent() {
        let config = Config::default();
        assert!(matches!(config.api_key(), Err(ConfigError::MissingApiKey(_))));
    }
}
