use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use vendsync_client::load_registry;
use vendsync_core::models::{DiffReport, PriceChange};
use vendsync_core::{ReconcileService, SourceRegistry};
use vendsync_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "vendsync", version, about = "Vendor catalog harvesting and hub reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a scrape target and stage its priced rows
    Harvest {
        /// Scrape target ID
        #[arg(short, long)]
        target: i64,

        /// Progress channel name (defaults to a fresh UUID)
        #[arg(long)]
        run_id: Option<String>,

        /// JSON file describing the vendor sources
        #[arg(long, env = "VENDSYNC_SOURCES_FILE")]
        sources: Option<PathBuf>,
    },

    /// Print the staged lines of a scrape target as JSON
    Staged {
        /// Scrape target ID
        #[arg(short, long)]
        target: i64,
    },

    /// Diff staged prices against hub paths and print the reports as JSON
    Diff {
        /// Hub category path IDs
        #[arg(short, long = "path", required = true, num_args = 1..)]
        paths: Vec<i64>,

        /// Restrict the reports to these product origins
        #[arg(short, long = "origin", num_args = 1..)]
        origins: Vec<i64>,
    },

    /// Commit diff reports (as printed by `diff`) or `{"changes": [...]}` to the hub
    Commit {
        /// JSON file to commit
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List the crawl sources defined in the sources file
    Sources {
        /// JSON file describing the vendor sources
        #[arg(long, env = "VENDSYNC_SOURCES_FILE")]
        sources: PathBuf,
    },
}

/// Contents accepted by `commit`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommitFile {
    Reports(Vec<DiffReport>),
    Changes { changes: Vec<PriceChange> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vendsync=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            target,
            run_id,
            sources,
        } => {
            let registry = load_sources(sources.as_deref())?;
            let db = connect_db().await?;
            cmd_harvest(target, run_id, registry, db).await?;
        }
        Commands::Staged { target } => {
            let db = connect_db().await?;
            cmd_staged(target, &db).await?;
        }
        Commands::Diff { paths, origins } => {
            let db = connect_db().await?;
            cmd_diff(&paths, &origins, &db).await?;
        }
        Commands::Commit { file } => {
            let db = connect_db().await?;
            cmd_commit(&file, &db).await?;
        }
        Commands::Sources { sources } => {
            let registry = load_sources(Some(&sources))?;
            for name in registry.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()
        .context("DATABASE_URL not set. Required for every command except `sources`.")?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

fn load_sources(path: Option<&Path>) -> Result<SourceRegistry> {
    let path = path.context("No sources file given (use --sources or VENDSYNC_SOURCES_FILE)")?;
    let registry = load_registry(path)
        .with_context(|| format!("Failed to load sources from {}", path.display()))?;
    tracing::info!(sources = ?registry.names(), "Crawl sources loaded");
    Ok(registry)
}

#[cfg(feature = "browser")]
async fn cmd_harvest(
    target: i64,
    run_id: Option<String>,
    registry: SourceRegistry,
    db: Database,
) -> Result<()> {
    use tokio_util::sync::CancellationToken;
    use vendsync_client::{ChromiumSessionFactory, ClientConfig, FileSessionStore, HttpImageMirror};
    use vendsync_core::{
        CrawlConfig, CrawlEngine, HarvestConfig, HarvestService, ProgressHub, ProgressPoll,
        new_run_id,
    };
    use vendsync_core::progress::DEFAULT_POLL_WAIT;

    let client = ClientConfig::from_env()?;
    let mut factory = ChromiumSessionFactory::new(client.page_timeout);
    if let Some(bin) = &client.chrome_bin {
        factory = factory.with_chrome_bin(bin.clone());
    }
    let engine = CrawlEngine::new(
        factory,
        FileSessionStore::new(&client.session_dir),
        CrawlConfig::from_env()?,
    );
    let mut service = HarvestService::new(
        engine,
        registry,
        db.target_repo(),
        db.harvest_repo(),
        db.hub_repo(),
        HarvestConfig::from_env()?,
    );
    if let Some(bucket) = &client.image_bucket_url {
        service = service.with_uploader(HttpImageMirror::with_timeout(
            bucket.as_str(),
            client.page_timeout,
        )?);
    }

    let progress = ProgressHub::default();
    let run_id = run_id.unwrap_or_else(new_run_id);
    let mut subscription = progress.subscribe(&run_id);
    let reporter = progress.reporter(run_id.clone());
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(target, &reporter, &cancel).await })
    };

    loop {
        tokio::select! {
            poll = subscription.next(DEFAULT_POLL_WAIT) => match poll {
                ProgressPoll::Message(message) => eprintln!("[{run_id}] {message}"),
                ProgressPoll::Idle => {}
                ProgressPoll::End => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                tracing::warn!("Interrupted, cancelling harvest");
                cancel.cancel();
            }
        }
    }

    let summary = run.await.context("Harvest task panicked")??;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn cmd_harvest(
    _target: i64,
    _run_id: Option<String>,
    _registry: SourceRegistry,
    _db: Database,
) -> Result<()> {
    anyhow::bail!("This build has no browser support; rebuild with `--features browser`")
}

async fn cmd_staged(target: i64, db: &Database) -> Result<()> {
    let lines = db.harvest_repo().get(target).await?;
    if lines.is_empty() {
        tracing::info!(target_id = target, "Nothing staged");
    }
    println!("{}", serde_json::to_string_pretty(&lines)?);
    Ok(())
}

async fn cmd_diff(paths: &[i64], origins: &[i64], db: &Database) -> Result<()> {
    let service = ReconcileService::new(db.hub_repo(), db.harvest_repo());
    let only = (!origins.is_empty()).then_some(origins);
    let reports = service.diff(paths, only).await?;

    for report in &reports {
        tracing::info!(path_id = report.path_id, items = report.items.len(), "Report ready");
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

async fn cmd_commit(file: &Path, db: &Database) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: CommitFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is neither diff reports nor price changes", file.display()))?;

    let service = ReconcileService::new(db.hub_repo(), db.harvest_repo());
    let updated = match parsed {
        CommitFile::Reports(reports) => service.commit_reports(&reports).await?,
        CommitFile::Changes { changes } => service.commit(&changes).await?,
    };

    if updated {
        println!("Hub prices updated");
    } else {
        println!("No hub entries changed");
    }
    Ok(())
}
