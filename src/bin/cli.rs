//! Course Crawler CLI
//!
//! Local entry point: one-shot collections, pending flushes, queries and
//! the long-running scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use course_crawler::{
    error::Result,
    models::Config,
    notify,
    pipeline::{
        ChangeDetector, CollectionOrchestrator, NewCourseNotifier, PendingNotifier,
        spawn_schedulers,
    },
    services::{AdapterRegistry, AdapterSettings},
    storage::{CourseStore, LatestQuery, LocalStorage},
};
use tokio_util::sync::CancellationToken;

/// Course Crawler - public course catalog harvester
#[derive(Parser, Debug)]
#[command(
    name = "course-crawler",
    version,
    about = "Harvests course catalogs and announces new courses"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Storage directory (overrides `storage.dir`)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect one platform and announce its new courses
    Collect {
        platform: String,

        /// Page budget for this run
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Collect every enabled platform
    CollectAll,

    /// Re-send pending announcements (default: `pending.platforms`)
    Flush { platforms: Vec<String> },

    /// Print the most recently updated courses as JSON
    Latest {
        #[arg(long)]
        platform: Option<String>,

        #[arg(long)]
        area: Option<String>,

        #[arg(long)]
        only_free: bool,

        /// RFC 3339 instant, e.g. 2025-01-31T00:00:00Z
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        size: usize,
    },

    /// Run the collection and recovery schedulers until Ctrl-C
    Run,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Everything the subcommands need, wired from configuration.
struct App {
    config: Arc<Config>,
    storage: Arc<LocalStorage>,
    orchestrator: Arc<CollectionOrchestrator>,
    pending: Arc<PendingNotifier>,
}

impl App {
    async fn build(config: Config, storage_dir: PathBuf, cancel: &CancellationToken) -> Result<Self> {
        let config = Arc::new(config);
        let storage = Arc::new(LocalStorage::open(&storage_dir, &config.platforms).await?);
        let port = Arc::new(notify::build_from_config(&config.notify, cancel)?);

        let adapters = AdapterRegistry::with_defaults(&AdapterSettings::from_config(&config))?;
        let detector = ChangeDetector::new(storage.clone());
        let dispatcher = NewCourseNotifier::new(port.clone(), storage.clone(), &config.notify)
            .with_cancel(cancel.clone());
        let orchestrator = CollectionOrchestrator::new(
            Arc::clone(&config),
            storage.clone(),
            adapters,
            detector,
            dispatcher,
            cancel.clone(),
        );
        let pending =
            PendingNotifier::new(storage.clone(), port, &config.pending).with_cancel(cancel.clone());

        Ok(Self {
            config,
            storage,
            orchestrator: Arc::new(orchestrator),
            pending: Arc::new(pending),
        })
    }
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Ctrl-C received, stopping...");
            cancel.cancel();
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Course Crawler starting...");

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!(
            "✓ Config OK ({} platforms, {} enabled)",
            config.platforms.len(),
            config.enabled_platforms().len()
        );
        return Ok(());
    }
    config.validate()?;

    let storage_dir = cli
        .storage_dir
        .unwrap_or_else(|| PathBuf::from(&config.storage.dir));
    log::info!("Using storage directory {}", storage_dir.display());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let app = App::build(config, storage_dir, &cancel).await?;

    match cli.command {
        Command::Collect {
            platform,
            max_pages,
        } => {
            let report = app
                .orchestrator
                .collect_for_platform(&platform, max_pages)
                .await?;
            log::info!(
                "Collected {}: status={:?} fetched={} new={} updated={}",
                report.platform,
                report.status,
                report.fetched,
                report.changes.new,
                report.changes.updated
            );
        }

        Command::CollectAll => {
            for report in app.orchestrator.collect_all_enabled().await {
                log::info!(
                    "{}: status={:?} fetched={} new={}",
                    report.platform,
                    report.status,
                    report.fetched,
                    report.changes.new
                );
            }
        }

        Command::Flush { platforms } => {
            let platforms = if platforms.is_empty() {
                app.config.pending.platforms.clone()
            } else {
                platforms
            };
            for (platform, result) in app.pending.flush_all(&platforms).await {
                match result {
                    Ok(report) => log::info!(
                        "{}: pending={} marked={} failed_batches={}",
                        platform,
                        report.pending,
                        report.marked,
                        report.batches_failed
                    ),
                    Err(e) => log::error!("{}: {}", platform, e),
                }
            }
        }

        Command::Latest {
            platform,
            area,
            only_free,
            since,
            page,
            size,
        } => {
            let query = LatestQuery {
                platform,
                area,
                only_free,
                since,
                page,
                size,
            };
            let courses = app.storage.find_latest(&query).await?;
            println!("{}", serde_json::to_string_pretty(&courses)?);
        }

        Command::Run => {
            let handles = spawn_schedulers(
                &app.config,
                Arc::clone(&app.orchestrator),
                Arc::clone(&app.pending),
                &cancel,
            );
            log::info!("Schedulers running; press Ctrl-C to stop");
            for handle in handles {
                if let Err(e) = handle.await {
                    log::error!("scheduler task ended abnormally: {}", e);
                }
            }
        }

        Command::Validate => {}
    }

    log::info!("Done!");

    Ok(())
}
