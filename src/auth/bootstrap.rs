//! Session restore at startup

use super::claims::decode;
use super::expiry::{is_expired, now_epoch_secs};
use super::manager::TokenManager;
use super::tokens::CredentialPair;

/// Pick up whatever session the previous run left behind.
///
/// - live access credential: re-arm the renewal timer, no network call
/// - expired/missing access but a refresh credential: one renewal
/// - nothing stored: `None`, no call
pub async fn restore(manager: &TokenManager) -> Option<CredentialPair> {
    let stored = manager.credentials();

    if let Some(access) = stored.access.as_deref() {
        if !is_expired(&decode(access), now_epoch_secs()) {
            tracing::debug!("Restored live access credential");
            match stored.refresh.as_deref() {
                Some(refresh) => manager.set_tokens(access, refresh),
                // Nothing to renew with; serve the access credential until it lapses
                None => tracing::debug!("No refresh credential stored, renewal disabled"),
            }
            return Some(stored);
        }
    }

    if stored.refresh.is_some() {
        tracing::info!("Stored access credential expired, renewing");
        return manager.renew().await.ok();
    }

    tracing::debug!("No stored session");
    None
}
