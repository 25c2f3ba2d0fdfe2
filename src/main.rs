//! Kumo-Sync main entry point
//!
//! This is the command-line interface for the Kumo-Sync mirroring tool.

use anyhow::Context;
use clap::Parser;
use kumo_sync::auth::StaticAuth;
use kumo_sync::config::{load_config_with_hash, Config, CrawlerConfig, SourceConfig, SyncConfig};
use kumo_sync::crawler::{Crawler, CrawlerState, RetryPolicy};
use kumo_sync::limiter::Limiter;
use kumo_sync::output::OutputDirectory;
use kumo_sync::prompt::{Defaults, DecisionProvider, Terminal};
use kumo_sync::source::{HttpSource, LocalSource, SourceAdapter};
use kumo_sync::transform::Transformer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Kumo-Sync: mirror remote file trees into local directories
///
/// Kumo-Sync crawls one or more remote sources, reshapes their paths through
/// user-defined transformation rules, and keeps a local mirror up to date
/// across repeated runs.
#[derive(Parser, Debug)]
#[command(name = "kumo-sync")]
#[command(version)]
#[command(about = "Mirror remote file trees into local directories", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Only run the crawlers with these names (repeatable)
    #[arg(short, long = "crawler", value_name = "NAME")]
    crawlers: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show what would change without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Never prompt, always take each conflict's default resolution
    #[arg(short, long)]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {hash})");

    run_crawlers(config, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kumo_sync=info,warn"),
            1 => EnvFilter::new("kumo_sync=debug,info"),
            2 => EnvFilter::new("kumo_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Runs the configured crawlers one after another.
///
/// Ctrl-C cancels the running crawler and skips the remaining ones; partial
/// state stays on disk and the next run picks up from there.
async fn run_crawlers(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let selected: Vec<&CrawlerConfig> = config
        .crawler
        .iter()
        .filter(|c| cli.crawlers.is_empty() || cli.crawlers.contains(&c.name))
        .collect();
    if selected.is_empty() {
        anyhow::bail!("no crawler matches the requested names");
    }

    let mut crawlers = Vec::new();
    for crawler_config in selected {
        crawlers.push(build_crawler(
            crawler_config,
            &config.sync,
            cli.dry_run,
            cli.non_interactive,
        )?);
    }

    let tokens: Vec<_> = crawlers.iter().map(|c| c.cancel_token()).collect();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling crawlers");
            for token in tokens {
                token.cancel();
            }
        }
    });

    let mut failed = Vec::new();
    for crawler in &crawlers {
        match crawler.run().await {
            Ok(()) => {
                if crawler.state() == CrawlerState::Cancelled {
                    tracing::warn!("Crawler {} was cancelled", crawler.name());
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Crawler {} failed: {e}", crawler.name());
                failed.push(crawler.name().to_string());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("crawlers failed: {}", failed.join(", "));
    }
    Ok(())
}

/// Assembles one crawler from its configuration section.
fn build_crawler(
    config: &CrawlerConfig,
    sync: &SyncConfig,
    dry_run: bool,
    non_interactive: bool,
) -> anyhow::Result<Arc<Crawler>> {
    let source: Arc<dyn SourceAdapter> = match &config.source {
        SourceConfig::Local {
            path,
            crawl_delay_ms,
        } => Arc::new(
            LocalSource::new(path.clone())
                .with_crawl_delay(Duration::from_millis(*crawl_delay_ms)),
        ),
        SourceConfig::Http {
            base_url,
            username,
            password,
        } => {
            // Validation already checked the URL parses
            let base = Url::parse(base_url)?;
            let auth = Arc::new(StaticAuth::new(username.clone(), password.clone()));
            Arc::new(HttpSource::new(base, auth)?)
        }
    };

    let decider: Arc<dyn DecisionProvider> = if non_interactive {
        Arc::new(Defaults)
    } else {
        Arc::new(Terminal)
    };

    let working_dir = sync.working_dir.clone().unwrap_or_else(|| ".".into());
    let output = OutputDirectory::new(
        working_dir.join(config.output_dir()),
        config.redownload,
        config.on_conflict,
        decider,
        config.report_orphans,
    )
    .with_dry_run(dry_run);

    let limiter = Limiter::new(config.tasks, config.downloads(), config.task_delay())?;
    let transformer = Transformer::new(&config.transform)?;

    Ok(Arc::new(Crawler::new(
        config.name.clone(),
        source,
        transformer,
        limiter,
        output,
        sync.windows_paths(),
        RetryPolicy {
            attempts: config.retry_attempts,
            base_delay: config.retry_delay(),
        },
    )))
}
