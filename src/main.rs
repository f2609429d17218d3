//! Experiential - personal journal of phenomenological records
//!
//! Command-line front end and HTTP server for the journal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use experiential::{
    api,
    config::{JournalConfig, ServerConfig},
    journal::Journal,
    quality::{validate_signature, QualitySignature},
    record::{CreateRecord, Processing, Who},
    search::{SearchFilters, SearchRequest, SortBy},
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "experiential")]
#[command(version)]
#[command(about = "Journal of experiential records with semantic search")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "EXPERIENTIAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Record an experience
    Add {
        /// Record content
        content: String,

        /// Experiencer (repeatable)
        #[arg(short, long)]
        who: Vec<String>,

        /// Quality tag, optionally with a manifestation: `mood.closed=guarded`
        #[arg(short, long)]
        quality: Vec<String>,

        /// Id of an earlier record this one reflects on (repeatable)
        #[arg(short, long)]
        reflects: Vec<String>,

        /// during | right-after | long-after | crafted
        #[arg(long)]
        processing: Option<Processing>,

        /// Narrative perspective
        #[arg(long)]
        perspective: Option<String>,
    },

    /// Show one record
    Get {
        id: String,
    },

    /// Search records
    Search {
        /// Text to rank by meaning
        #[arg(short, long)]
        semantic: Option<String>,

        /// Words that must appear in the content
        #[arg(short = 'w', long)]
        query: Option<String>,

        /// Experiencer filter (repeatable)
        #[arg(long)]
        who: Vec<String>,

        /// Required quality tag (repeatable)
        #[arg(long)]
        quality: Vec<String>,

        /// Earliest occurrence (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Latest occurrence (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// relevance | created
        #[arg(long)]
        sort: Option<SortBy>,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Print search diagnostics
        #[arg(long)]
        debug: bool,
    },

    /// Delete a record and its vector
    Delete {
        id: String,
    },

    /// Re-embed every record with the configured provider
    Reembed {
        /// Delay between provider calls in milliseconds (overrides config)
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Run diagnostics
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("experiential={},tower_http=debug", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let config = match &cli.config {
        Some(path) => JournalConfig::from_file(path)?,
        None => JournalConfig::default(),
    }
    .with_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let mut server = config.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let journal = Arc::new(Journal::open(&config).await?);
            run_server(journal, server).await?;
        }
        Commands::Add {
            content,
            who,
            quality,
            reflects,
            processing,
            perspective,
        } => {
            let mut request = CreateRecord::new(content).reflects(reflects);
            if !who.is_empty() {
                request = request.who(Who::new(who));
            }
            if !quality.is_empty() {
                request = request.qualities(parse_quality_args(&quality)?);
            }
            if let Some(processing) = processing {
                request = request.processing(processing);
            }
            if let Some(perspective) = perspective {
                request = request.perspective(perspective);
            }
            let journal = Journal::open(&config).await?;
            let outcome = journal.create(request).await?;
            print_json(&outcome)?;
        }
        Commands::Get { id } => {
            let journal = Journal::open(&config).await?;
            print_json(&journal.get(&id).await?)?;
        }
        Commands::Search {
            semantic,
            query,
            who,
            quality,
            since,
            until,
            sort,
            limit,
            offset,
            debug,
        } => {
            let mut filters = SearchFilters::default();
            if !who.is_empty() {
                filters = filters.who(who);
            }
            filters.qualities = quality;
            if since.is_some() || until.is_some() {
                filters = filters.time_range(since.as_deref(), until.as_deref());
            }
            let request = SearchRequest {
                query,
                semantic_query: semantic,
                filters,
                sort_by: sort,
                limit,
                offset,
                debug,
            };
            let journal = Journal::open(&config).await?;
            print_json(&journal.search(&request).await?)?;
        }
        Commands::Delete { id } => {
            let journal = Journal::open(&config).await?;
            let record = journal.delete(&id).await?;
            println!("Released {}", record.id);
        }
        Commands::Reembed { delay_ms } => {
            let journal = Journal::open(&config).await?;
            let mut options = journal.batch_options();
            if let Some(ms) = delay_ms {
                options.delay = std::time::Duration::from_millis(ms);
            }
            let cancel = options.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted; finishing the current record");
                    cancel.cancel();
                }
            });
            print_json(&journal.reembed_all(options).await?)?;
        }
        Commands::Doctor => {
            run_doctor(&config).await?;
        }
        Commands::Config { default } => {
            let shown = if default {
                JournalConfig::default()
            } else {
                config
            };
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

async fn run_server(journal: Arc<Journal>, server: ServerConfig) -> Result<()> {
    tracing::info!("Starting Experiential API");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
            signal.cancel();
        }
    });

    api::serve(journal, &server, shutdown).await?;
    Ok(())
}

/// Turn `tag` / `tag=manifestation` arguments into a signature.
fn parse_quality_args(args: &[String]) -> Result<QualitySignature> {
    let map: BTreeMap<String, serde_json::Value> = args
        .iter()
        .map(|arg| match arg.split_once('=') {
            Some((tag, text)) => (tag.trim().to_string(), serde_json::Value::from(text.trim())),
            None => (arg.trim().to_string(), serde_json::Value::Bool(true)),
        })
        .collect();
    Ok(validate_signature(&map)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_doctor(config: &JournalConfig) -> Result<()> {
    println!("Experiential Doctor");
    println!();

    println!("Checking storage...");
    let records_path = config.storage.records_path();
    if records_path.exists() {
        println!("  ✓ Records file: {}", records_path.display());
    } else {
        println!("  ℹ No records yet ({} will be created)", records_path.display());
    }

    println!();
    println!("Checking components...");
    let journal = Journal::open(config).await?;
    let status = journal.status().await;
    match &status.fallback_reason {
        Some(reason) => println!(
            "  ✗ Embedding provider '{}' unavailable: {}",
            status.requested_provider, reason
        ),
        None => println!(
            "  ✓ Embedding provider: {} ({} dimensions)",
            status.provider, status.dimensions
        ),
    }
    if status.store_available {
        println!("  ✓ Vector store: {}", status.store);
    } else {
        println!("  ✗ Vector store '{}' unreachable", status.store);
    }
    println!(
        "  ℹ {} records, {} vectors",
        status.records,
        status
            .vectors
            .map_or_else(|| "unknown".to_string(), |n| n.to_string())
    );

    println!();
    println!("Doctor check complete!");
    Ok(())
}
