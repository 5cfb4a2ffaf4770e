//! Per-run orchestration.
//!
//! Every configured source goes through the same state machine:
//!
//! ```text
//! Decide ──Skip──────────────────────────────────────────────▶ Done
//!    │
//!    └─Fetch──┬─Unchanged ─ record check time ───────────────▶ Done
//!             ├─Changed ─── Extract ─┬─ok── Merge, save store,
//!             │                      │      commit validators ▶ Done
//!             │                      └─err─ record failure ──▶ Done
//!             └─Failed ──── record failure ──────────────────▶ Done
//! ```
//!
//! Sources run with bounded parallelism. The HTTP metadata cache and the
//! article store sit behind one async mutex each; every write goes through
//! them. The cache file is flushed after every mutation that followed a
//! network round trip. On new content the store is saved before the new
//! validators are flushed, so validators never get ahead of stored articles.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::cache::{ArticleStore, HttpMetadataCache, MergeResult};
use crate::fetch::{FetchResult, PageFetcher};
use crate::models::{HttpCacheEntry, Source};
use crate::policy::{RefreshDecision, RefreshMode, decide};
use crate::scrapers::Extractor;
use crate::utils::truncate_for_log;

/// Longest error text kept in a cache entry.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub mode: RefreshMode,
    pub max_age_seconds: u64,
    /// Sources processed at once; values below 1 are treated as 1.
    pub concurrency: usize,
}

/// What happened to one source this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SourceOutcome {
    /// Fresh enough; no network call.
    Skipped,
    /// Server answered "not modified".
    Unchanged,
    /// New content was extracted and merged.
    Updated(MergeResult),
    /// Network, HTTP or extraction failure; prior state kept.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub decision: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceReport {
    /// The network round trip succeeded (content new or not).
    fn fetched(&self) -> bool {
        matches!(
            self.outcome,
            SourceOutcome::Unchanged | SourceOutcome::Updated(_)
        )
    }
}

/// Process-level result of one run, in source configuration order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(skip)]
    pub mode: RefreshMode,
    pub reports: Vec<SourceReport>,
    /// Whether the store's "last updated" timestamp moved this run.
    pub last_updated_advanced: bool,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Skipped))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Unchanged))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Updated(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Failed { .. }))
    }

    /// Merge counts summed over every updated source.
    pub fn merged(&self) -> MergeResult {
        self.reports
            .iter()
            .fold(MergeResult::default(), |mut acc, r| {
                if let SourceOutcome::Updated(m) = &r.outcome {
                    acc.inserted += m.inserted;
                    acc.updated += m.updated;
                    acc.unchanged += m.unchanged;
                }
                acc
            })
    }

    /// At least one source inserted or updated an article.
    pub fn content_changed(&self) -> bool {
        self.merged().changed()
    }

    pub fn any_fetch_succeeded(&self) -> bool {
        self.reports.iter().any(SourceReport::fetched)
    }

    /// "Last updated" moves when content changed, on a forced refresh that
    /// reached at least one server, or the first time a store that was never
    /// stamped sees a successful fetch.
    pub fn should_advance_last_updated(&self, store_stamped: bool) -> bool {
        self.content_changed()
            || (self.mode == RefreshMode::ForceRefresh && self.any_fetch_succeeded())
            || (!store_stamped && self.any_fetch_succeeded())
    }
}

/// Runs the per-source state machine over a set of sources.
pub struct Orchestrator<'a, F, E> {
    fetcher: &'a F,
    extractor: &'a E,
    cache: Mutex<HttpMetadataCache>,
    store: Mutex<ArticleStore>,
}

impl<'a, F: PageFetcher, E: Extractor> Orchestrator<'a, F, E> {
    pub fn new(
        fetcher: &'a F,
        extractor: &'a E,
        cache: HttpMetadataCache,
        store: ArticleStore,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            cache: Mutex::new(cache),
            store: Mutex::new(store),
        }
    }

    /// Hand back the cache and store after a run.
    pub fn into_parts(self) -> (HttpMetadataCache, ArticleStore) {
        (self.cache.into_inner(), self.store.into_inner())
    }

    /// Process every source once and stamp the store if the run warrants it.
    ///
    /// Never fails: per-source errors end up in the returned summary.
    #[instrument(level = "info", skip_all, fields(sources = sources.len(), mode = ?options.mode))]
    pub async fn run(
        &self,
        sources: &[Source],
        options: &RunOptions,
        now: DateTime<Utc>,
    ) -> RunSummary {
        let t0 = Instant::now();
        let parallel = options.concurrency.max(1);

        let mut indexed: Vec<(usize, SourceReport)> = stream::iter(sources.iter().enumerate())
            .map(|(i, source)| async move { (i, self.process_source(source, options, now).await) })
            .buffer_unordered(parallel)
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);

        let mut summary = RunSummary {
            mode: options.mode,
            reports: indexed.into_iter().map(|(_, report)| report).collect(),
            last_updated_advanced: false,
        };

        let mut store = self.store.lock().await;
        if summary.should_advance_last_updated(store.last_updated().is_some()) {
            store.set_last_updated(now);
            summary.last_updated_advanced = true;
        }

        let merged = summary.merged();
        info!(
            skipped = summary.skipped(),
            unchanged = summary.unchanged(),
            updated = summary.updated(),
            failed = summary.failed(),
            inserted = merged.inserted,
            articles_updated = merged.updated,
            total_articles = store.len(),
            last_updated_advanced = summary.last_updated_advanced,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run summary"
        );
        summary
    }

    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    async fn process_source(
        &self,
        source: &Source,
        options: &RunOptions,
        now: DateTime<Utc>,
    ) -> SourceReport {
        let (entry, age) = {
            let cache = self.cache.lock().await;
            (cache.get(&source.id).cloned(), cache.age_seconds(&source.id, now))
        };
        let decision = decide(
            &source.id,
            options.mode,
            now,
            entry.as_ref(),
            options.max_age_seconds,
        );

        let outcome = if !decision.needs_network() {
            let stored = self.store.lock().await.count_for_source(&source.id);
            info!(?age, max_age = options.max_age_seconds, stored, "Cache fresh; reusing stored articles");
            SourceOutcome::Skipped
        } else {
            let validators = match decision {
                RefreshDecision::ConditionalCheck => entry.map(|e| e.validators()).filter(|v| !v.is_empty()),
                _ => None,
            };
            let result = self.fetcher.fetch(&source.url, validators.as_ref()).await;
            self.handle_fetch(source, result, now).await
        };

        match &outcome {
            SourceOutcome::Failed { error } => {
                warn!(decision = ?decision, %error, "Source failed; keeping previous articles")
            }
            other => info!(decision = ?decision, outcome = ?other, "Source done"),
        }

        SourceReport {
            source_id: source.id.clone(),
            decision: format!("{decision:?}"),
            outcome,
        }
    }

    async fn handle_fetch(&self, source: &Source, result: FetchResult, now: DateTime<Utc>) -> SourceOutcome {
        match result {
            FetchResult::Unchanged { status } => {
                self.record(&source.id, |e| e.record_unchanged(now, status)).await;
                SourceOutcome::Unchanged
            }
            FetchResult::Changed {
                body,
                validators,
                status,
            } => {
                let articles = match self.extractor.extract(&body, source) {
                    Ok(articles) => articles,
                    Err(e) => {
                        let message = e.to_string();
                        let stored = truncate_for_log(&message, MAX_ERROR_LEN);
                        self.record(&source.id, |entry| entry.record_failure(now, Some(status), stored))
                            .await;
                        return SourceOutcome::Failed { error: message };
                    }
                };

                let saved = {
                    let mut store = self.store.lock().await;
                    let merge = store.merge(&source.id, articles, now);
                    if merge.changed() {
                        store.save().map(|()| merge).map_err(|e| {
                            error!(path = %store.path().display(), error = %e, "Failed to save article store");
                            e.to_string()
                        })
                    } else {
                        Ok(merge)
                    }
                };

                match saved {
                    Ok(merge) => {
                        self.record(&source.id, |e| e.record_changed(now, validators, status))
                            .await;
                        SourceOutcome::Updated(merge)
                    }
                    Err(message) => {
                        let stored = truncate_for_log(&message, MAX_ERROR_LEN);
                        self.record(&source.id, |e| e.record_failure(now, Some(status), stored))
                            .await;
                        SourceOutcome::Failed { error: message }
                    }
                }
            }
            FetchResult::Failed(e) => {
                let message = e.to_string();
                let stored = truncate_for_log(&message, MAX_ERROR_LEN);
                self.record(&source.id, |entry| entry.record_failure(now, e.status(), stored))
                    .await;
                SourceOutcome::Failed { error: message }
            }
        }
    }

    /// Apply `update` to the source's cache entry and flush the cache file.
    async fn record(&self, source_id: &str, update: impl FnOnce(&mut HttpCacheEntry)) {
        let mut cache = self.cache.lock().await;
        let mut entry = cache.get(source_id).cloned().unwrap_or_default();
        update(&mut entry);
        cache.put(source_id, entry);
        flush(&cache);
    }
}

/// Persist the cache; a failed flush is logged and retried by the final save.
fn flush(cache: &HttpMetadataCache) {
    if let Err(e) = cache.save() {
        error!(path = %cache.path().display(), error = %e, "Failed to flush HTTP metadata cache");
    }
}
