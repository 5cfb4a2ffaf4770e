//! Conditional HTTP client.
//!
//! Sends a GET carrying the validators remembered for a page and classifies
//! the answer as [`FetchResult::Unchanged`], [`FetchResult::Changed`] or
//! [`FetchResult::Failed`]. Nothing is persisted here; the orchestrator owns
//! the validator cache and decides what to record.
//!
//! # Conditional headers
//!
//! - `If-None-Match: <etag>` when an entity tag is known
//! - otherwise `If-Modified-Since: <last-modified>` when a date is known
//! - nothing when there are no validators or the caller forces a full fetch

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::{info, instrument, warn};

use crate::error::{AppError, FetchError};
use crate::models::Validators;

/// Outcome of one conditional GET.
#[derive(Debug)]
pub enum FetchResult {
    /// The server reported no modification; no body was returned.
    Unchanged { status: u16 },
    /// New content, with the validators the response carried.
    Changed {
        body: String,
        validators: Validators,
        status: u16,
    },
    /// Network error, timeout or a status other than 2xx/304.
    Failed(FetchError),
}

/// Something that can perform a conditional GET.
///
/// `validators: None` requests the page unconditionally.
pub trait PageFetcher {
    async fn fetch(&self, url: &str, validators: Option<&Validators>) -> FetchResult;
}

/// HTTP settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Per-request timeout covering connect, headers and body.
    pub timeout: Duration,
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpClient(error_chain(&e)))?;
        Ok(Self {
            http,
            timeout: config.timeout,
        })
    }

    fn classify(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Network(error_chain(e))
        }
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url, conditional = validators.is_some()))]
    async fn fetch(&self, url: &str, validators: Option<&Validators>) -> FetchResult {
        let t0 = Instant::now();
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");

        if let Some(v) = validators {
            if let Some(etag) = &v.etag {
                request = request.header(IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &v.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = self.classify(&e);
                warn!(error = %err, elapsed_ms = t0.elapsed().as_millis() as u64, "Request failed");
                return FetchResult::Failed(err);
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Not modified");
            return FetchResult::Unchanged {
                status: status.as_u16(),
            };
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), "Unexpected HTTP status");
            return FetchResult::Failed(FetchError::HttpStatus(status.as_u16()));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let new_validators = Validators {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };

        match response.text().await {
            Ok(body) => {
                info!(
                    status = status.as_u16(),
                    bytes = body.len(),
                    etag = ?new_validators.etag,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched new content"
                );
                FetchResult::Changed {
                    body,
                    validators: new_validators,
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                let err = if e.is_timeout() {
                    FetchError::Timeout(self.timeout.as_secs())
                } else {
                    FetchError::Body(error_chain(&e))
                };
                warn!(error = %err, "Failed reading body");
                FetchResult::Failed(err)
            }
        }
    }
}

/// Render an error with its whole `source()` chain.
fn error_chain(e: &dyn StdError) -> String {
    let mut out = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
