//! Run configuration: which pages to scrape, how the feeds describe
//! themselves, and HTTP client settings.
//!
//! Loaded from an optional YAML file. Every section has defaults, so a file
//! only needs the keys it changes:
//!
//! ```yaml
//! sources:
//!   - id: news
//!     url: https://www.anthropic.com/news
//!     layout: news
//! feed:
//!   self_url: https://example.github.io/llm-news/feed.atom
//! http:
//!   timeout_secs: 10
//! ```

use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use crate::error::ConfigError;
use crate::models::{Source, SourceLayout};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; LLM-News/1.0; +https://github.com/kelp/llm-news)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sources: Vec<Source>,
    pub feed: FeedMeta,
    pub http: HttpSettings,
}

/// Feed-level metadata shared by the Atom, RSS and JSON outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedMeta {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Public URL of `feed.atom`.
    pub self_url: String,
    /// Public page the feeds belong to.
    pub site_url: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            feed: FeedMeta::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for FeedMeta {
    fn default() -> Self {
        Self {
            id: "anthropic-feed".to_string(),
            title: "Anthropic News and Research".to_string(),
            author: "Anthropic Feed Generator".to_string(),
            self_url: "https://kelp.github.io/llm-news/feed.atom".to_string(),
            site_url: "https://kelp.github.io/llm-news/".to_string(),
            language: "en".to_string(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_sources() -> Vec<Source> {
    vec![
        Source {
            id: "news".to_string(),
            url: "https://www.anthropic.com/news".to_string(),
            layout: SourceLayout::News,
            base_url: Some("https://www.anthropic.com".to_string()),
        },
        Source {
            id: "research".to_string(),
            url: "https://www.anthropic.com/research".to_string(),
            layout: SourceLayout::Research,
            base_url: Some("https://www.anthropic.com".to_string()),
        },
    ]
}

impl RunConfig {
    /// Load from `path`, or return the built-in defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Any read, parse or validation failure. A configured file that cannot be
    /// used is fatal rather than silently replaced by defaults.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => {
                info!("No configuration file given; using built-in sources");
                Self::default()
            }
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(sources = config.sources.len(), "Loaded configuration file");
                config
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values after loading.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` if:
    /// - there are no sources, or a source id is empty or repeated
    /// - a source URL or base URL is not an absolute http(s) URL
    /// - the user agent is empty
    /// - the timeout is outside 1..=300 seconds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(invalid("sources", "must list at least one source"));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.id.trim().is_empty() {
                return Err(invalid(format!("sources[{i}].id"), "must not be empty"));
            }
            check_http_url(&format!("sources[{i}].url"), &source.url)?;
            if let Some(base) = &source.base_url {
                check_http_url(&format!("sources[{i}].base_url"), base)?;
            }
        }
        if let Some(dup) = self.sources.iter().map(|s| s.id.as_str()).duplicates().next() {
            return Err(invalid("sources", format!("duplicate source id `{dup}`")));
        }

        if self.http.user_agent.trim().is_empty() {
            return Err(invalid("http.user_agent", "must not be empty"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.http.timeout_secs) {
            return Err(invalid(
                "http.timeout_secs",
                format!("must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
            ));
        }

        if self.feed.id.trim().is_empty() {
            return Err(invalid("feed.id", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_http_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(invalid(field, format!("unsupported scheme `{}`", url.scheme()))),
        Err(e) => Err(invalid(field, format!("not an absolute URL: {e}"))),
    }
}
