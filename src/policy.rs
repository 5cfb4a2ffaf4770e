//! Refresh policy: per source and per run, decide whether to skip the
//! network, send a conditional request, or fetch unconditionally.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::HttpCacheEntry;

/// Run-level selector for how aggressively sources are re-fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// Check a source only once its last check is older than the max age.
    #[default]
    Default,
    /// Always send a conditional request.
    CheckUpdates,
    /// Always fetch without validators.
    ForceRefresh,
}

/// What to do with one source this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Skip,
    ConditionalCheck,
    ForceFetch,
}

impl RefreshDecision {
    pub fn needs_network(self) -> bool {
        !matches!(self, RefreshDecision::Skip)
    }
}

/// Decide the action for `source_id`.
///
/// - `ForceRefresh` always gives [`RefreshDecision::ForceFetch`].
/// - `CheckUpdates` always gives [`RefreshDecision::ConditionalCheck`].
/// - `Default` skips only when a prior successful entry exists and its last
///   check is younger than `max_age_seconds`.
///
/// An entry that never recorded a successful fetch counts as no entry. A
/// last check lying in the future counts as infinitely old.
pub fn decide(
    source_id: &str,
    mode: RefreshMode,
    now: DateTime<Utc>,
    entry: Option<&HttpCacheEntry>,
    max_age_seconds: u64,
) -> RefreshDecision {
    let prior = entry.filter(|e| e.has_succeeded());
    let age = prior
        .and_then(|e| e.last_checked)
        .and_then(|checked| u64::try_from((now - checked).num_seconds()).ok());

    let decision = match mode {
        RefreshMode::ForceRefresh => RefreshDecision::ForceFetch,
        RefreshMode::CheckUpdates => RefreshDecision::ConditionalCheck,
        RefreshMode::Default => match age {
            Some(age) if age < max_age_seconds => RefreshDecision::Skip,
            _ => RefreshDecision::ConditionalCheck,
        },
    };

    debug!(source = %source_id, ?mode, ?age, max_age_seconds, ?decision, "Refresh decision");
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Validators;
    use chrono::{Duration, TimeZone};

    const MAX_AGE: u64 = 3600;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn checked_ago(seconds: i64) -> HttpCacheEntry {
        let mut entry = HttpCacheEntry::default();
        entry.record_changed(
            now() - Duration::seconds(seconds),
            Validators {
                etag: Some("\"abc\"".into()),
                last_modified: None,
            },
            200,
        );
        entry
    }

    #[test]
    fn test_decision_grid() {
        let ages = [0, 1, 3599, 3600, 3601, 86_400];
        let modes = [
            RefreshMode::Default,
            RefreshMode::CheckUpdates,
            RefreshMode::ForceRefresh,
        ];

        for mode in modes {
            for age in ages {
                let entry = checked_ago(age);
                let decision = decide("news", mode, now(), Some(&entry), MAX_AGE);

                assert_eq!(
                    decision == RefreshDecision::ForceFetch,
                    mode == RefreshMode::ForceRefresh,
                    "mode={mode:?} age={age}"
                );
                assert_eq!(
                    decision == RefreshDecision::Skip,
                    mode == RefreshMode::Default && (age as u64) < MAX_AGE,
                    "mode={mode:?} age={age}"
                );
            }
        }
    }

    #[test]
    fn test_no_entry_is_never_skipped() {
        for mode in [
            RefreshMode::Default,
            RefreshMode::CheckUpdates,
            RefreshMode::ForceRefresh,
        ] {
            let decision = decide("news", mode, now(), None, u64::MAX);
            assert_ne!(decision, RefreshDecision::Skip, "mode={mode:?}");
        }
    }

    #[test]
    fn test_entry_without_success_counts_as_absent() {
        let mut entry = HttpCacheEntry::default();
        entry.record_failure(now(), Some(503), "unexpected HTTP status 503".into());

        let decision = decide("news", RefreshMode::Default, now(), Some(&entry), MAX_AGE);
        assert_eq!(decision, RefreshDecision::ConditionalCheck);
    }

    #[test]
    fn test_future_check_time_is_stale() {
        let entry = checked_ago(-600);
        let decision = decide("news", RefreshMode::Default, now(), Some(&entry), MAX_AGE);
        assert_eq!(decision, RefreshDecision::ConditionalCheck);
    }

    #[test]
    fn test_zero_max_age_always_checks() {
        let entry = checked_ago(0);
        let decision = decide("news", RefreshMode::Default, now(), Some(&entry), 0);
        assert_eq!(decision, RefreshDecision::ConditionalCheck);
    }

    #[test]
    fn test_needs_network() {
        assert!(!RefreshDecision::Skip.needs_network());
        assert!(RefreshDecision::ConditionalCheck.needs_network());
        assert!(RefreshDecision::ForceFetch.needs_network());
    }
}
