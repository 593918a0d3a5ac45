//! Pure expiry arithmetic for bearer tokens and the access-token cookie.
//!
//! All instants are Unix epoch seconds; durations are whole seconds. The
//! minimum-validity floor guarantees cookies are never issued shorter than
//! an operationally required window, even when the provider advertises a
//! shorter token lifetime.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as Unix epoch seconds.
#[must_use]
pub fn epoch_seconds_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// A token without an expiry is treated as expired; otherwise expired iff
/// the expiry lies strictly before `now`.
#[must_use]
pub fn is_expired(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.map_or(true, |expiry| expiry < now)
}

/// Compute the effective expiry of an access window.
///
/// Starts from the provider-supplied expiry, falling back to
/// `now + default_validity`. When a minimum-validity floor is configured and
/// `now + minimum` is later than the computed expiry, the expiry is raised
/// to that floor.
#[must_use]
pub fn compute_access_window(
    now: i64,
    default_validity: Duration,
    provider_expiry: Option<i64>,
    minimum_validity: Option<Duration>,
) -> i64 {
    let mut expires_at =
        provider_expiry.unwrap_or_else(|| now.saturating_add(as_seconds(default_validity)));

    if let Some(minimum) = minimum_validity {
        let floor = now.saturating_add(as_seconds(minimum));
        if floor > expires_at {
            expires_at = floor;
        }
    }

    expires_at
}

fn as_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn missing_expiry_counts_as_expired() {
        assert!(is_expired(None, NOW));
    }

    #[test]
    fn expiry_compares_against_now() {
        assert!(is_expired(Some(NOW - 1), NOW));
        assert!(!is_expired(Some(NOW), NOW));
        assert!(!is_expired(Some(NOW + 1), NOW));
    }

    #[test]
    fn window_uses_provider_expiry_when_present() {
        let expiry = compute_access_window(NOW, Duration::from_secs(3600), Some(NOW + 120), None);
        assert_eq!(expiry, NOW + 120);
    }

    #[test]
    fn window_falls_back_to_default_validity() {
        let expiry = compute_access_window(NOW, Duration::from_secs(3600), None, None);
        assert_eq!(expiry, NOW + 3600);
    }

    #[test]
    fn window_never_ends_before_minimum_floor() {
        let expiry = compute_access_window(
            NOW,
            Duration::from_secs(3600),
            Some(NOW + 30),
            Some(Duration::from_secs(600)),
        );
        assert_eq!(expiry, NOW + 600);
    }

    #[test]
    fn floor_leaves_longer_windows_alone() {
        let expiry = compute_access_window(
            NOW,
            Duration::from_secs(3600),
            Some(NOW + 7200),
            Some(Duration::from_secs(600)),
        );
        assert_eq!(expiry, NOW + 7200);
    }

    #[test]
    fn floor_applies_to_default_validity_too() {
        let expiry = compute_access_window(
            NOW,
            Duration::from_secs(60),
            None,
            Some(Duration::from_secs(600)),
        );
        assert_eq!(expiry, NOW + 600);
    }
}
