//! Expiry and refresh-delay computation.
//!
//! Both functions are pure: callers pass `now` explicitly.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use super::config::RefreshPolicy;
use super::document::{MetadataDocument, ValidityHint};

/// Instant at which a freshly fetched document stops being fresh.
///
/// The smallest `cacheDuration` and the earliest `validUntil` across the
/// document bound the window, capped by `max_refresh_delay` and floored by
/// `min_refresh_delay`. A document without hints lives for `max_refresh_delay`.
pub fn compute_expiry<D: MetadataDocument + ?Sized>(
    document: &D,
    now: DateTime<Utc>,
    policy: &RefreshPolicy,
) -> DateTime<Utc> {
    expiry_from_hints(&document.validity_hints(), now, policy)
}

/// [`compute_expiry`] over an explicit set of hints.
pub fn expiry_from_hints(
    hints: &[ValidityHint],
    now: DateTime<Utc>,
    policy: &RefreshPolicy,
) -> DateTime<Utc> {
    let min_cache_duration = hints.iter().filter_map(|h| h.cache_duration).min();
    let earliest_valid_until = hints.iter().filter_map(|h| h.valid_until).min();

    let by_source = [
        min_cache_duration.map(to_delta),
        earliest_valid_until.map(|valid_until| valid_until - now),
    ]
    .into_iter()
    .flatten()
    .min();

    let max_delay = to_delta(policy.max_refresh_delay);
    let min_delay = to_delta(policy.min_refresh_delay);

    let delay = by_source.map_or(max_delay, |d| d.min(max_delay)).max(min_delay);

    now.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Delay until the next refresh attempt for a document expiring at `expires_at`.
///
/// The provider wakes after `refresh_delay_factor` of the remaining window, so
/// a refresh right after a fetch lands at `fetched_at + window * factor`. The
/// delay never drops below `min_refresh_delay * factor`, which keeps repeated
/// 304 responses near (or past) expiry from turning into a tight loop.
pub fn refresh_delay(
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    policy: &RefreshPolicy,
) -> Duration {
    let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
    let factor = policy.refresh_delay_factor;

    remaining
        .mul_f64(factor)
        .max(policy.min_refresh_delay.mul_f64(factor))
}

/// Earliest `validUntil` declared anywhere in the document.
pub fn earliest_valid_until<D: MetadataDocument + ?Sized>(document: &D) -> Option<DateTime<Utc>> {
    document
        .validity_hints()
        .iter()
        .filter_map(|h| h.valid_until)
        .min()
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Hints(Vec<ValidityHint>);

    impl MetadataDocument for Hints {
        fn root_validity_hint(&self) -> ValidityHint {
            self.0.first().copied().unwrap_or_default()
        }

        fn validity_hints(&self) -> Vec<ValidityHint> {
            self.0.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn policy(min_secs: u64, max_secs: u64) -> RefreshPolicy {
        RefreshPolicy {
            min_refresh_delay: Duration::from_secs(min_secs),
            max_refresh_delay: Duration::from_secs(max_secs),
            refresh_delay_factor: 0.75,
            require_valid_metadata: false,
            failure_backoff: None,
        }
    }

    fn cache_duration(secs: u64) -> ValidityHint {
        ValidityHint {
            cache_duration: Some(Duration::from_secs(secs)),
            valid_until: None,
        }
    }

    fn valid_until(at: DateTime<Utc>) -> ValidityHint {
        ValidityHint {
            cache_duration: None,
            valid_until: Some(at),
        }
    }

    #[test]
    fn test_no_hints_uses_max_delay() {
        let document = Hints(vec![]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(1, 3600)),
            now() + TimeDelta::seconds(3600)
        );
    }

    #[test]
    fn test_cache_duration_within_bounds() {
        let document = Hints(vec![cache_duration(5)]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(1, 3600)),
            now() + TimeDelta::seconds(5)
        );
    }

    #[test]
    fn test_zero_cache_duration_hits_floor() {
        let document = Hints(vec![cache_duration(0)]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(60, 3600)),
            now() + TimeDelta::seconds(60)
        );
    }

    #[test]
    fn test_smallest_descendant_hint_wins() {
        let document = Hints(vec![
            cache_duration(600),
            cache_duration(120),
            valid_until(now() + TimeDelta::seconds(300)),
        ]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(1, 3600)),
            now() + TimeDelta::seconds(120)
        );

        let document = Hints(vec![
            cache_duration(600),
            valid_until(now() + TimeDelta::seconds(90)),
            valid_until(now() + TimeDelta::seconds(400)),
        ]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(1, 3600)),
            now() + TimeDelta::seconds(90)
        );
    }

    #[test]
    fn test_max_delay_caps_long_hints() {
        let document = Hints(vec![valid_until(now() + TimeDelta::days(30))]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(1, 3600)),
            now() + TimeDelta::seconds(3600)
        );
    }

    #[test]
    fn test_past_valid_until_hits_floor() {
        let document = Hints(vec![valid_until(now() - TimeDelta::hours(1))]);
        assert_eq!(
            compute_expiry(&document, now(), &policy(30, 3600)),
            now() + TimeDelta::seconds(30)
        );
        assert_eq!(
            earliest_valid_until(&document),
            Some(now() - TimeDelta::hours(1))
        );
    }

    #[test]
    fn test_refresh_delay_scales_window() {
        let p = policy(1, 3600);
        let expires_at = now() + TimeDelta::seconds(10);
        assert_eq!(
            refresh_delay(now(), expires_at, &p),
            Duration::from_millis(7500)
        );
    }

    #[test]
    fn test_refresh_delay_floor_after_expiry() {
        let p = policy(60, 3600);
        let expired = now() - TimeDelta::seconds(5);
        assert_eq!(refresh_delay(now(), expired, &p), Duration::from_secs(45));
    }
}
