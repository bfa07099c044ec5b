//! country-snapshot CLI
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use country_snapshot::agent::{GeminiSummarizer, Summarizer};
use country_snapshot::config::StorageBackend;
use country_snapshot::notify::{LogNotifier, Notifier, WebhookNotifier};
use country_snapshot::source::HttpSource;
use country_snapshot::{
    Config, CountryRecord, JsonFileStore, Pacing, RunReporter, RunStatus, SledStore,
    SnapshotPipeline, SnapshotStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "country-snapshot")]
#[command(author, version, about = "Scrape country facts with fallback to the last good snapshot", long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all sources and store the result
    Run {
        /// Print the country record as JSON
        #[arg(long)]
        json: bool,
        /// Skip the pacing delay between fetch and extraction
        #[arg(long)]
        no_delay: bool,
    },
    /// Show the stored snapshot
    Show {
        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List configured sources and fields
    Fields,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Run {
        json: false,
        no_delay: false,
    }) {
        Commands::Run { json, no_delay } => {
            let status = run(&config, json, no_delay).await?;
            if status == RunStatus::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Show { json } => {
            let store = open_store(&config)?;
            match store.load_record()? {
                None => {
                    println!("No stored snapshot for {}.", config.country.name);
                    let others = store.countries()?;
                    if !others.is_empty() {
                        println!("Stored countries: {}", others.join(", "));
                    }
                }
                Some(record) if json => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Some(record) => print_record(&CountryRecord::from(&record)),
            }
        }
        Commands::Fields => {
            for source in &config.sources {
                println!("{} ({})", source.name.bold(), source.url);
                for field in &source.fields {
                    let label = field
                        .label
                        .as_deref()
                        .map(|l| format!(" [{}]", l))
                        .unwrap_or_default();
                    println!("  • {}: {}{}", field.name, field.selector, label);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(config: &Config, json: bool, no_delay: bool) -> anyhow::Result<RunStatus> {
    let store = open_store(config)?;
    let source = Arc::new(HttpSource::new(
        &config.scraper.user_agent,
        config.fetch_timeout(),
    )?);

    let mut pipeline = SnapshotPipeline::new(config, source, store.clone());
    if no_delay {
        pipeline = pipeline.with_pacing(Pacing::none());
    }
    if let Some(summarizer) = summarizer(config) {
        pipeline = pipeline.with_summarizer(summarizer);
    }

    let reporter = RunReporter::new(store, notifier(config)?)
        .with_output_path(config.storage.output_path.clone())
        .with_metrics_path(config.storage.metrics_path.clone());

    let record = pipeline.run(&reporter).await;
    let output = CountryRecord::from(&record);

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let status = match record.status {
            RunStatus::Success => record.status.to_string().green(),
            RunStatus::Degraded => record.status.to_string().yellow(),
            RunStatus::Failed => record.status.to_string().red(),
        };
        println!(
            "{}: {} ({} found, {} from snapshot, {} missing)",
            record.country.bold(),
            status,
            record.metrics.found,
            record.metrics.fallbacks,
            record.metrics.absent
        );
    }

    Ok(record.status)
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    let path = &config.storage.path;
    let store: Arc<dyn SnapshotStore> = match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonFileStore::new(path)),
        StorageBackend::Sled => Arc::new(
            SledStore::open(path, &config.country.name)
                .with_context(|| format!("opening sled store at {}", path.display()))?,
        ),
    };
    Ok(store)
}

fn notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    let monitoring = &config.monitoring;
    let notifier: Arc<dyn Notifier> =
        if monitoring.webhook_url.is_none() && monitoring.healthcheck_url.is_none() {
            Arc::new(LogNotifier)
        } else {
            Arc::new(WebhookNotifier::new(
                format!("{} Scraper", config.country.name),
                monitoring.webhook_url.clone(),
                monitoring.healthcheck_url.clone(),
            )?)
        };
    Ok(notifier)
}

fn summarizer(config: &Config) -> Option<Arc<dyn Summarizer>> {
    let agent = config.agent.as_ref()?;
    match config.api_key() {
        Ok(key) => {
            let summarizer: Arc<dyn Summarizer> = Arc::new(GeminiSummarizer::new(agent, key));
            Some(summarizer)
        }
        Err(e) => {
            warn!(error = %e, "summarisation disabled");
            None
        }
    }
}

fn print_record(record: &CountryRecord) {
    let show = |label: &str, value: &Option<String>| {
        println!("{:<20} {}", label.bold(), value.as_deref().unwrap_or("-"));
    };

    show("Country", &record.country);
    show("Capital", &record.capital);
    show("Official languages", &record.official_languages);
    show("Population", &record.population);
    show("Area (km²)", &record.area);
    show("Currency", &record.currency);
    show("Last updated", &Some(record.last_updated.clone()));

    if let Some(summary) = &record.summary {
        println!("\n💡 Summary:\n  {}", summary);
    } else if let Some(intro) = &record.introduction {
        println!("\n📄 Introduction:\n  {}", intro);
    }

    if !record.cities.is_empty() {
        println!("\n🏙️  Major cities:");
        for city in &record.cities {
            let population = city.population.as_deref().unwrap_or("-");
            let marker = if city.is_capital { " (capital)" } else { "" };
            println!("  • {}{}: {}", city.name, marker, population);
        }
    }

    if !record.tourism_highlights.is_empty() {
        println!("\n📌 Highlights:");
        for item in &record.tourism_highlights {
            println!("  • {}", item);
        }
    }
}
