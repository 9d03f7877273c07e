//! Expiry policy over decoded claims
//!
//! All functions take `now` explicitly (epoch seconds) so callers decide the
//! clock. An undecodable credential or one without `exp` counts as expired.

use std::time::{SystemTime, UNIX_EPOCH};

use super::claims::Claims;

/// Renew this many seconds ahead of expiry.
pub const DEFAULT_RENEWAL_WINDOW_SECS: u64 = 300;

/// Current wall clock as epoch seconds.
pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn is_expired(claims: &Claims, now: i64) -> bool {
    match claims.expires_at() {
        Some(exp) => exp < now,
        None => true,
    }
}

pub fn seconds_until_expiry(claims: &Claims, now: i64) -> u64 {
    claims
        .expires_at()
        .map_or(0, |exp| exp.saturating_sub(now).max(0) as u64)
}

/// True only while the credential is still live but inside the window.
/// Already-expired credentials are left to reactive renewal.
pub fn should_renew_proactively(claims: &Claims, now: i64, window_secs: u64) -> bool {
    let remaining = seconds_until_expiry(claims, now);
    remaining > 0 && remaining < window_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{decode, encode_unsigned};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn claims_expiring_at(exp: i64) -> Claims {
        decode(&encode_unsigned(&json!({"sub": "u", "exp": exp})))
    }

    #[test]
    fn test_undecodable_is_expired() {
        for bad in ["", "one", "a.b", "a.%%%.c", "a.b.c.d"] {
            let claims = decode(bad);
            assert!(is_expired(&claims, NOW), "{:?} should be expired", bad);
            assert_eq!(seconds_until_expiry(&claims, NOW), 0);
            assert!(!should_renew_proactively(&claims, NOW, 300));
        }
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let claims = decode(&encode_unsigned(&json!({"sub": "u"})));
        assert!(is_expired(&claims, NOW));
        assert_eq!(seconds_until_expiry(&claims, NOW), 0);
    }

    #[test]
    fn test_expiry_boundary() {
        assert!(is_expired(&claims_expiring_at(NOW - 1), NOW));
        assert!(!is_expired(&claims_expiring_at(NOW), NOW));
        assert!(!is_expired(&claims_expiring_at(NOW + 1), NOW));
    }

    #[test]
    fn test_seconds_until_expiry_clamps() {
        assert_eq!(seconds_until_expiry(&claims_expiring_at(NOW + 600), NOW), 600);
        assert_eq!(seconds_until_expiry(&claims_expiring_at(NOW - 600), NOW), 0);
    }

    #[test]
    fn test_proactive_window() {
        assert!(should_renew_proactively(&claims_expiring_at(NOW + 100), NOW, 300));
        assert!(should_renew_proactively(&claims_expiring_at(NOW + 299), NOW, 300));
        assert!(!should_renew_proactively(&claims_expiring_at(NOW + 300), NOW, 300));
        assert!(!should_renew_proactively(&claims_expiring_at(NOW + 301), NOW, 300));
        // Already expired is not "proactive"
        assert!(!should_renew_proactively(&claims_expiring_at(NOW - 1), NOW, 300));
        assert!(!should_renew_proactively(&claims_expiring_at(NOW), NOW, 300));
    }
}
