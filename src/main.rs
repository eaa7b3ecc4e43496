//! Sumi-Audit main entry point
//!
//! This is the command-line interface for the Sumi-Audit site auditor.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_audit::config::{load_config_with_hash, Config};
use sumi_audit::crawler::run_crawl;
use sumi_audit::output::{load_issue_summary, print_issue_summary};
use sumi_audit::progress::{crawl_topic, Broker, ProgressMessage};
use sumi_audit::storage::{open_storage, shared, Storage};
use sumi_audit::Project;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Pages between two info-level progress lines
const PROGRESS_EVERY: u64 = 25;

/// Sumi-Audit: A polite site auditor
///
/// Sumi-Audit crawls a single website while respecting robots.txt, records
/// every URL it meets and reports SEO defects grouped by severity.
#[derive(Parser, Debug)]
#[command(name = "sumi-audit")]
#[command(version = "1.0.0")]
#[command(about = "A polite site auditor", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "issues")]
    dry_run: bool,

    /// Show the issues of the project's last crawl and exit
    #[arg(long, conflicts_with = "dry_run")]
    issues: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.issues {
        handle_issues(&config)?;
    } else {
        handle_crawl(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_audit=info,warn"),
            1 => EnvFilter::new("sumi_audit=debug,info"),
            2 => EnvFilter::new("sumi_audit=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Audit Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Crawl delay: {}ms", config.crawler.crawl_delay);
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    println!("  Max URLs: {}", config.crawler.max_urls);
    println!("  Issue batch size: {}", config.crawler.batch_size);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let project = &config.project;
    println!("\nProject: {}", project.url);
    println!("  Ignore robots.txt: {}", project.ignore_robots_txt);
    println!("  Follow nofollow: {}", project.follow_nofollow);
    println!("  Include noindex: {}", project.include_noindex);
    println!("  Crawl sitemap: {}", project.crawl_sitemap);
    println!("  Allow subdomains: {}", project.allow_subdomains);
    println!("  Check external links: {}", project.check_external_links);

    println!("\n✓ Configuration is valid");
}

/// Handles the --issues mode: prints the last crawl's issue summary
fn handle_issues(config: &Config) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let project = storage.upsert_project(&Project::from_config(&config.project))?;

    match load_issue_summary(&storage, &project)? {
        Some(summary) => print_issue_summary(&summary),
        None => println!("{} has not been crawled yet", project.url),
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    let storage = shared(open_storage(Path::new(&config.output.database_path))?);
    let broker = Arc::new(Broker::new());

    let project = sumi_audit::storage::lock(&storage)?
        .upsert_project(&Project::from_config(&config.project))?;
    broker.subscribe(&crawl_topic(project.id), log_progress);

    let (stop, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping crawl");
            let _ = stop.send(true);
        }
    });

    let crawl = run_crawl(config, storage.clone(), broker, stop_rx).await?;
    tracing::info!(
        "Crawl {} {}: {} URLs, {} issues ({} critical, {} alert, {} warning)",
        crawl.id,
        crawl.phase,
        crawl.total_urls,
        crawl.total_issues,
        crawl.critical_issues,
        crawl.alert_issues,
        crawl.warning_issues
    );

    let guard = sumi_audit::storage::lock(&storage)?;
    if let Some(summary) = load_issue_summary(&*guard, &project)? {
        print_issue_summary(&summary);
    }
    Ok(())
}

fn log_progress(message: &ProgressMessage) -> anyhow::Result<()> {
    match message {
        ProgressMessage::PageReport(page) => {
            tracing::debug!("[{}] {}", page.status_code, page.url);
            if page.crawled_count > 0 && page.crawled_count % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "Progress: {} crawled, {} discovered, {} in flight",
                    page.crawled_count,
                    page.discovered_count,
                    page.crawling
                );
            }
        }
        ProgressMessage::IssuesInit => tracing::info!("Crawl finished, computing crawl-wide issues"),
        ProgressMessage::CrawlEnd(total) => tracing::info!("Audit complete: {} URLs", total),
    }
    Ok(())
}
