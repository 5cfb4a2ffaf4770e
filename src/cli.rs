//! Command-line interface definitions for LLM News.
//!
//! The directory, max-age and config options can also come from environment
//! variables, which is how the scheduled workflow passes them.

use std::path::PathBuf;

use clap::Parser;

use crate::policy::RefreshMode;

/// Command-line arguments for one feed refresh run.
///
/// # Examples
///
/// ```sh
/// # Steady-state run: check each source at most once an hour
/// llm_news --output-dir ./public --cache-dir ./data
///
/// # Frequent lightweight run: always send a conditional request
/// llm_news --check-updates
///
/// # Weekly backstop: re-download everything without validators
/// llm_news --force-refresh
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory the feeds and last_update.txt are written to
    #[arg(short, long, env = "LLM_NEWS_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Directory holding the HTTP metadata cache and the article store
    #[arg(long, env = "LLM_NEWS_CACHE_DIR", default_value = "data")]
    pub cache_dir: PathBuf,

    /// Fetch every source without conditional headers
    #[arg(long, conflicts_with = "check_updates")]
    pub force_refresh: bool,

    /// Send a conditional request to every source regardless of cache age
    #[arg(long)]
    pub check_updates: bool,

    /// Seconds a source stays fresh in the default mode
    #[arg(long, env = "LLM_NEWS_MAX_AGE", default_value_t = 3600)]
    pub max_age: u64,

    /// HTTP metadata cache file (default: <cache-dir>/http_cache.json)
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Article store file (default: <cache-dir>/articles.json)
    #[arg(long)]
    pub articles_file: Option<PathBuf>,

    /// Optional path to a YAML run configuration
    #[arg(short, long, env = "LLM_NEWS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Per-request timeout in seconds, overriding the configuration
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Sources fetched in parallel
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,
}

impl Cli {
    pub fn mode(&self) -> RefreshMode {
        if self.force_refresh {
            RefreshMode::ForceRefresh
        } else if self.check_updates {
            RefreshMode::CheckUpdates
        } else {
            RefreshMode::Default
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("http_cache.json"))
    }

    pub fn articles_file(&self) -> PathBuf {
        self.articles_file
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("articles.json"))
    }

    /// Article cache written by earlier releases, read when the store is absent.
    pub fn legacy_articles_file(&self) -> PathBuf {
        self.cache_dir.join("anthropic_articles.json")
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
