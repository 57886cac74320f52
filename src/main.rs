// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lonkero Coordination CLI
 * Operator tooling for locks, target resolution and deduplication
 *
 * (c) 2026 Bountyy Oy
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lonkero_coordination::config::{ConfigLoader, ConfigValidator, CoordinationConfig};
use lonkero_coordination::resolver::{RecordType, Resolver};
use lonkero_coordination::store::{CoordinationStore, RedisStore, StoreTransaction};
use lonkero_coordination::task_dedup::ScheduledTaskKey;
use lonkero_coordination::types::{Finding, Task};
use lonkero_coordination::ReportDeduplicator;

/// Lonkero coordination tooling
#[derive(Parser)]
#[command(name = "lonkero-coord")]
#[command(author = "Bountyy Oy <info@bountyy.fi>")]
#[command(version)]
#[command(about = "Inspect and operate scanner coordination state", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "LONKERO_COORD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a domain the way workers do
    Resolve {
        domain: String,

        /// Record type: A, AAAA, NS or CNAME
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
    },

    /// Show who holds a lock
    LockStatus { name: String },

    /// Release a lock held by a crashed worker
    ReleaseLock { name: String, holder: String },

    /// Print the deduplication key of a task read from a JSON file
    TaskKey { file: PathBuf },

    /// Deduplicate candidate findings against already sent ones
    DedupReports {
        /// JSON array of findings already sent
        #[arg(long)]
        previous: PathBuf,

        /// JSON array of findings to send
        #[arg(long)]
        candidates: PathBuf,

        /// Evaluate grace periods at this instant (RFC 3339) instead of now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Validate the configuration and print findings
    CheckConfig,
}

fn load_config(path: Option<&Path>) -> Result<CoordinationConfig> {
    match path {
        Some(path) => ConfigLoader::new(path)?.load_config(),
        None => CoordinationConfig::from_env(),
    }
}

fn init_tracing(config: &CoordinationConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.observability.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn redis_store(config: &CoordinationConfig) -> Result<RedisStore> {
    RedisStore::new(&config.redis.url, config.redis.pool_size)
        .await
        .context("Failed to connect to Redis")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    debug!("Configuration loaded");

    match cli.command {
        Commands::Resolve {
            domain,
            record_type,
        } => {
            let record_type: RecordType = record_type.parse()?;
            let resolver = Resolver::from_system_conf(&config.resolver)?;

            for record in resolver.lookup(&domain, record_type).await? {
                println!("{}", record);
            }

            let stats = resolver.stats();
            debug!(flaky = stats.flaky, truncated = stats.truncated, "Resolution finished");
        }

        Commands::LockStatus { name } => {
            let store = redis_store(&config).await?;
            match store.get(&name).await? {
                Some(holder) => println!("{} held by {}", name, holder),
                None => println!("{} is free", name),
            }
        }

        Commands::ReleaseLock { name, holder } => {
            let store = redis_store(&config).await?;
            let released = store
                .execute(&StoreTransaction::CompareAndDelete {
                    key: name.clone(),
                    expected: holder,
                })
                .await?;

            if released {
                info!(resource = %name, "Lock released");
                println!("released {}", name);
            } else {
                println!("{} not held by that holder, left untouched", name);
            }
        }

        Commands::TaskKey { file } => {
            let task: Task = read_json(&file)?;
            let key = ScheduledTaskKey::for_task(&task)?;

            println!("analysis_id: {}", key.analysis_id);
            println!("deduplication_data: {}", key.deduplication_data);
            println!("deduplication_data_original: {}", key.deduplication_data_original);
        }

        Commands::DedupReports {
            previous,
            candidates,
            now,
        } => {
            let previous: Vec<Finding> = read_json(&previous)?;
            let candidates: Vec<Finding> = read_json(&candidates)?;

            let dedup = ReportDeduplicator::from_config(&config.reporting);
            let kept = dedup.deduplicate(&previous, &candidates, now.unwrap_or_else(Utc::now));

            info!(candidates = candidates.len(), kept = kept.len(), "Findings deduplicated");
            println!("{}", serde_json::to_string_pretty(&kept)?);
        }

        Commands::CheckConfig => {
            let report = ConfigValidator::generate_validation_report(&config);
            for (section, messages) in report.warnings.iter().chain(report.info.iter()) {
                for message in messages {
                    println!("[{}] {}", section, message);
                }
            }
            if report.has_errors() {
                anyhow::bail!("Configuration is invalid: {:?}", report.errors);
            }
            println!("Configuration OK");
        }
    }

    Ok(())
}
