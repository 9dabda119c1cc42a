//! Pagesift main entry point
//!
//! This is the command-line interface for the Pagesift scraper.

use anyhow::Context;
use clap::Parser;
use pagesift::cleaning::CleaningEngine;
use pagesift::config::{load_config_with_hash, Config, ExtractRule};
use pagesift::crawler::{ScrapeSession, SessionStatus};
use pagesift::output::{print_preview, print_report, ScrapeReport};
use pagesift::storage::{save_snapshot, Snapshot};
use pagesift::PagesiftError;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Pagesift: paginated record extraction with undoable cleaning
///
/// Pagesift walks a paginated result set, extracts records with CSS rules,
/// runs the configured cleaning pipeline over the resulting table and
/// reports what it found.
#[derive(Parser, Debug)]
#[command(name = "pagesift")]
#[command(version)]
#[command(about = "Paginated record extraction with undoable cleaning", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be scraped without fetching anything
    #[arg(long, conflicts_with = "snapshot")]
    dry_run: bool,

    /// Write the cleaned table and its operation log to this JSON file
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_scrape(config, config_hash, cli.snapshot.as_deref()).await?;
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagesift=info,warn"),
            1 => EnvFilter::new("pagesift=debug,info"),
            2 => EnvFilter::new("pagesift=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated target
fn handle_dry_run(config: &Config) {
    let target = &config.target;
    println!("=== Pagesift Dry Run ===\n");

    println!("Target:");
    println!("  URL: {}", target.url);
    println!("  Max pages: {}", target.max_pages);
    println!("  Delay: {}ms", target.delay.as_millis());
    println!("  Timeout: {}ms", target.timeout.as_millis());
    println!(
        "  Retries: {} (backoff {}ms, capped at {}ms)",
        target.max_retries,
        target.backoff_base.as_millis(),
        target.backoff_cap.as_millis()
    );
    println!("  User agent: {}", target.user_agent);
    println!("  robots.txt: {}", if target.respect_robots_txt { "respected" } else { "ignored" });
    println!("  Dynamic: {}", target.dynamic);
    if let Some(next) = &target.next_selector {
        println!("  Next-page selector: {}", next);
    }

    println!("\nExtraction Rules ({}):", target.selectors.len());
    for rule in &target.selectors {
        match rule {
            ExtractRule::Selector(selector) => println!("  - elements: {}", selector),
            ExtractRule::Table { table } => println!("  - table: {}", table),
            ExtractRule::List { list } => println!("  - list items: {}", list),
            ExtractRule::Fields { selector, fields } => {
                println!("  - fields of {}:", selector);
                for (name, spec) in fields {
                    println!("    * {} = {:?}", name, spec);
                }
            }
        }
    }

    match &config.renderer {
        Some(renderer) => println!(
            "\nRenderer: {} via {}",
            renderer.browser, renderer.webdriver_url
        ),
        None => println!("\nRenderer: none"),
    }

    println!("\nCleaning Pipeline ({}):", config.cleaning.len());
    for op in &config.cleaning {
        println!("  - {}", op.describe());
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main scrape: session, cleaning, report, snapshot
///
/// # Returns
///
/// * `Ok(())` - The session completed or was interrupted, and any snapshot was written
/// * `Err(PagesiftError)` - The session failed, or the snapshot could not be written
async fn handle_scrape(
    config: Config,
    config_hash: String,
    snapshot_path: Option<&Path>,
) -> pagesift::Result<()> {
    let session = ScrapeSession::from_config(&config)?;
    let mut handle = session.spawn();
    let mut progress = handle.progress();

    loop {
        tokio::select! {
            update = progress.next() => match update {
                Some(update) => tracing::debug!(
                    "[{}] {} pages, {} records{}",
                    update.state,
                    update.pages_fetched,
                    update.records_so_far,
                    update.current_url.map(|u| format!(" at {}", u)).unwrap_or_default()
                ),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                tracing::warn!("Interrupted, cancelling session");
                handle.cancel();
            }
        }
    }

    let outcome = handle.join().await;

    let mut engine = CleaningEngine::new(outcome.table.clone());
    for op in config.cleaning.iter().cloned() {
        let description = op.describe();
        if let Err(e) = engine.apply(op) {
            tracing::error!("Cleaning step '{}' failed: {}", description, e);
        }
    }

    let table = engine.current();
    let report = ScrapeReport::new(&outcome, &table, engine.history().summary());
    print_report(&report);
    print_preview(&table);

    if let Some(path) = snapshot_path {
        let snapshot = Snapshot::from_engine(config.target.clone(), Some(config_hash), &engine);
        if let Err(e) = save_snapshot(&snapshot, path) {
            tracing::error!("Failed to write snapshot to {}: {}", path.display(), e);
            return Err(PagesiftError::Storage(e));
        }
        println!("\n✓ Snapshot written to: {}", path.display());
    }

    match outcome.status {
        SessionStatus::Failed(e) => Err(PagesiftError::Scrape(e)),
        SessionStatus::Completed | SessionStatus::Cancelled => Ok(()),
    }
}
