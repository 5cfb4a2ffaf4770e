//! # LLM News
//!
//! Scrapes the Anthropic news and research listing pages and republishes them
//! as Atom, RSS and JSON feeds. Meant to run as a scheduled batch job.
//!
//! ## Features
//!
//! - Conditional HTTP requests (`If-None-Match` / `If-Modified-Since`) with a
//!   persisted validator cache, so unchanged pages cost one 304 round trip
//! - An append-or-update article store: pages only list a recent window, so
//!   articles that drop off the page stay in the feed
//! - Three refresh modes: default (max-age), `--check-updates` and
//!   `--force-refresh`
//! - Atomic writes for every cache and feed file
//!
//! ## Usage
//!
//! ```sh
//! llm_news --output-dir ./public --cache-dir ./data
//! ```
//!
//! ## Architecture
//!
//! 1. **Decide**: per source, skip, check conditionally or force a fetch
//! 2. **Fetch**: conditional GET, bounded parallelism
//! 3. **Extract and merge**: only for changed pages
//! 4. **Output**: rebuild the feeds from the article store

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use itertools::Itertools;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod orchestrator;
mod outputs;
mod policy;
mod scrapers;
mod utils;

use cache::{ArticleStore, HttpMetadataCache};
use cli::Cli;
use config::RunConfig;
use error::AppError;
use fetch::{FetchConfig, HttpFetcher};
use orchestrator::{Orchestrator, RunOptions};
use outputs::FeedSnapshot;
use scrapers::LayoutExtractor;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("llm_news starting up");

    let args = Cli::parse();
    let mode = args.mode();
    debug!(?args.output_dir, ?args.cache_dir, ?mode, max_age = args.max_age, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = RunConfig::load(args.config.as_deref()).map_err(AppError::from)?;
    if let Some(timeout) = args.timeout {
        config.http.timeout_secs = timeout;
        config.validate().map_err(AppError::from)?;
    }

    // ---- Every directory written to must be writable before any fetch ----
    let cache_file = args.cache_file();
    let articles_file = args.articles_file();
    let dirs = [
        args.output_dir.clone(),
        parent_or_cwd(&cache_file),
        parent_or_cwd(&articles_file),
    ];
    for dir in dirs.iter().unique() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    // ---- Load state ----
    let now = Utc::now();
    let http_cache = HttpMetadataCache::load(&cache_file);
    let store = ArticleStore::load_or_upgrade(&articles_file, &args.legacy_articles_file(), now);
    if http_cache.is_empty() && store.is_empty() {
        info!("No cached state; this run fetches every source");
    } else {
        info!(
            cache_entries = http_cache.len(),
            articles = store.len(),
            "Loaded cached state"
        );
    }

    // ---- Run ----
    let fetcher = HttpFetcher::new(&FetchConfig {
        user_agent: config.http.user_agent.clone(),
        timeout: Duration::from_secs(config.http.timeout_secs),
    })?;
    let extractor = LayoutExtractor;
    let orchestrator = Orchestrator::new(&fetcher, &extractor, http_cache, store);
    let options = RunOptions {
        mode,
        max_age_seconds: args.max_age,
        concurrency: args.concurrency(),
    };
    let summary = orchestrator.run(&config.sources, &options, now).await;
    let (http_cache, store) = orchestrator.into_parts();

    http_cache.save().map_err(AppError::from)?;
    store.save().map_err(AppError::from)?;
    debug!(
        summary = %serde_json::to_string(&summary).unwrap_or_default(),
        "Run details"
    );

    // ---- Feeds ----
    let snapshot = FeedSnapshot::new(&store, &config.feed, now);
    if let Err(e) = outputs::write_feeds(&snapshot, &args.output_dir) {
        error!(path = %args.output_dir.display(), error = %e, "Failed writing feeds");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        skipped = summary.skipped(),
        unchanged = summary.unchanged(),
        updated = summary.updated(),
        failed = summary.failed(),
        "Execution complete"
    );
    Ok(())
}

/// Directory containing `file`; the working directory for a bare file name.
fn parent_or_cwd(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
