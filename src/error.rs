//! Error taxonomy for a feed refresh run.
//!
//! Per-source errors ([`FetchError`], [`ExtractionError`]) are isolated by the
//! orchestrator and only show up in the end-of-run summary. [`AppError`] is the
//! fatal class: it stops the run and makes the process exit non-zero.

use std::path::PathBuf;

use thiserror::Error;

/// A failed network round trip.
///
/// Every variant is a `NetworkFailure` as far as refresh policy goes: nothing
/// is retried inside a run, the next scheduled run tries again.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    /// Status code carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// The page was downloaded but the extractor could not make sense of it.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no articles found on page for source `{0}`")]
    NoArticles(String),

    #[error("malformed page for source `{source_id}`: {reason}")]
    Malformed { source_id: String, reason: String },
}

/// Reading or writing one of the persisted cache files failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to move temporary file into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("directory {path} is not writable: {source}")]
    UnwritableDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::HttpStatus(503);
        assert_eq!(err.to_string(), "unexpected HTTP status 503");
        assert_eq!(err.status(), Some(503));
        assert_eq!(FetchError::Timeout(30).status(), None);
    }

    #[test]
    fn test_extraction_error_names_source() {
        let err = ExtractionError::NoArticles("news".to_string());
        assert!(err.to_string().contains("`news`"));
    }

    #[test]
    fn test_app_error_wraps_config_error() {
        let err: AppError = ConfigError::Invalid {
            field: "sources".into(),
            reason: "must not be empty".into(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid configuration: sources - must not be empty");
    }
}
