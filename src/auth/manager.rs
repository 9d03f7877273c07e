//! Token lifecycle manager
//!
//! Owns the credential pair for the running session:
//! - arms a timer that renews the access credential shortly before it expires
//! - collapses concurrent renewal requests into one network call
//! - clears the session and notifies observers when a renewal fails
//!
//! A renewal failure is terminal for the session. There is no retry or
//! backoff; callers are expected to send the user back through login.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::claims::decode;
use super::endpoint::{RefreshClient, RenewalError};
use super::expiry::{
    is_expired, now_epoch_secs, seconds_until_expiry, should_renew_proactively,
    DEFAULT_RENEWAL_WINDOW_SECS,
};
use super::tokens::{CredentialPair, CredentialStore};

type RenewalResult = Result<CredentialPair, RenewalError>;
type PendingRenewal = Shared<BoxFuture<'static, RenewalResult>>;

type RenewedObserver = Arc<dyn Fn(&CredentialPair) + Send + Sync>;
type ExpiredObserver = Arc<dyn Fn() + Send + Sync>;

/// Renewal timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct RenewalSettings {
    /// Renew this many seconds before the access credential expires
    pub window_secs: u64,
    /// After a failed renewal, suppress automatic renewals for this long.
    /// Zero returns straight to idle.
    pub cooldown: Duration,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_RENEWAL_WINDOW_SECS,
            cooldown: Duration::ZERO,
        }
    }
}

enum RenewalState {
    Idle,
    InFlight(PendingRenewal),
    Cooldown { until: Instant },
}

/// Handle returned by observer registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
    renewed: Vec<(ObserverId, RenewedObserver)>,
    expired: Vec<(ObserverId, ExpiredObserver)>,
}

struct ScheduledRenewal {
    generation: u64,
    handle: AbortHandle,
}

struct Inner {
    store: CredentialStore,
    client: Arc<dyn RefreshClient>,
    settings: RenewalSettings,
    state: Mutex<RenewalState>,
    timer: Mutex<Option<ScheduledRenewal>>,
    observers: Mutex<Observers>,
    next_observer: AtomicU64,
    timer_generation: AtomicU64,
    /// Bumped by `clear`; a renewal that started under an older epoch is discarded.
    session_epoch: AtomicU64,
}

/// Cheaply cloneable handle to the session's credential lifecycle.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(
        store: CredentialStore,
        client: Arc<dyn RefreshClient>,
        settings: RenewalSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                settings,
                state: Mutex::new(RenewalState::Idle),
                timer: Mutex::new(None),
                observers: Mutex::new(Observers::default()),
                next_observer: AtomicU64::new(1),
                timer_generation: AtomicU64::new(0),
                session_epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> RenewalSettings {
        self.inner.settings
    }

    /// Store a new pair and re-arm the renewal timer from the access
    /// credential's expiry. Expired or undecodable credentials arm nothing.
    pub fn set_tokens(&self, access: &str, refresh: &str) {
        self.inner.set_tokens(access, refresh);
    }

    /// Current access credential, without any renewal.
    pub fn access_token(&self) -> Option<String> {
        self.inner.store.get_access()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.store.get_refresh()
    }

    pub fn credentials(&self) -> CredentialPair {
        self.inner.store.pair()
    }

    /// Access credential that is valid and outside the renewal window,
    /// renewing first if needed. `None` means the session is gone.
    pub async fn ensure_fresh(&self) -> Option<String> {
        if let Some(access) = self.inner.store.get_access() {
            let claims = decode(&access);
            let now = now_epoch_secs();
            if !is_expired(&claims, now)
                && !should_renew_proactively(&claims, now, self.inner.settings.window_secs)
            {
                return Some(access);
            }
        }

        if self.inner.cooling_down() {
            tracing::debug!("Renewal cooling down after failure, not renewing");
            return None;
        }

        match self.renew().await {
            Ok(pair) => pair.access,
            Err(_) => None,
        }
    }

    /// Exchange the refresh credential for a new pair.
    ///
    /// While a renewal is in flight every caller awaits that same renewal.
    pub async fn renew(&self) -> RenewalResult {
        let pending = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            match &*state {
                RenewalState::InFlight(pending) => {
                    tracing::debug!("Renewal already in flight, joining it");
                    pending.clone()
                }
                RenewalState::Idle | RenewalState::Cooldown { .. } => {
                    let pending = Arc::clone(&self.inner)
                        .perform_renewal()
                        .boxed()
                        .shared();
                    *state = RenewalState::InFlight(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    pub fn on_renewed<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CredentialPair) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.renewed.push((id, Arc::new(observer)));
        id
    }

    pub fn on_expired<F>(&self, observer: F) -> ObserverId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.expired.push((id, Arc::new(observer)));
        id
    }

    /// Deregister an observer. Returns false if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        let before = observers.renewed.len() + observers.expired.len();
        observers.renewed.retain(|(oid, _)| *oid != id);
        observers.expired.retain(|(oid, _)| *oid != id);
        before != observers.renewed.len() + observers.expired.len()
    }

    /// Logout: cancel the timer and wipe both credentials. A renewal still in
    /// flight will have its result discarded, and the next `renew` starts a
    /// fresh one instead of joining it.
    pub fn clear(&self) {
        self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.rearm(None);
        self.inner.store.clear();
        self.inner.finish(RenewalState::Idle);
    }

    /// Cancel the renewal timer, leaving stored credentials alone.
    pub fn shutdown(&self) {
        self.inner.rearm(None);
    }

    #[cfg(test)]
    pub(crate) fn has_timer(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Inner {
    fn next_observer_id(&self) -> ObserverId {
        ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed))
    }

    fn set_tokens(self: &Arc<Self>, access: &str, refresh: &str) {
        self.store.set_access(access);
        self.store.set_refresh(refresh);

        let remaining = seconds_until_expiry(&decode(access), now_epoch_secs());
        if remaining > 0 {
            let delay = Duration::from_secs(remaining.saturating_sub(self.settings.window_secs));
            tracing::debug!(
                "Access credential expires in {}s, renewal armed in {}s",
                remaining,
                delay.as_secs()
            );
            self.rearm(Some(delay));
        } else {
            tracing::debug!("Access credential expired or undecodable, no renewal armed");
            self.rearm(None);
        }
    }

    /// Cancel any pending timer and optionally arm a new one. Done under the
    /// timer lock so a firing timer cannot interleave with re-arming.
    fn rearm(self: &Arc<Self>, delay: Option<Duration>) {
        let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.take() {
            old.handle.abort();
        }

        let Some(delay) = delay else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                tracing::warn!("No async runtime, proactive renewal disabled");
                return;
            }
        };

        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.disarm(generation);
            if inner.cooling_down() {
                return;
            }
            tracing::info!("Access credential nearing expiry, renewing");
            let manager = TokenManager { inner };
            if let Err(e) = manager.renew().await {
                tracing::debug!("Scheduled renewal failed: {}", e);
            }
        });

        *slot = Some(ScheduledRenewal {
            generation,
            handle: handle.abort_handle(),
        });
    }

    /// Forget the timer slot if it still belongs to `generation`.
    fn disarm(&self, generation: u64) {
        let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }

    fn cooling_down(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            RenewalState::Cooldown { until } if Instant::now() < until => true,
            RenewalState::Cooldown { .. } => {
                *state = RenewalState::Idle;
                false
            }
            _ => false,
        }
    }

    async fn perform_renewal(self: Arc<Self>) -> RenewalResult {
        let epoch = self.session_epoch.load(Ordering::SeqCst);

        let result = match self.store.get_refresh() {
            None => Err(RenewalError::NoRefreshCredential),
            Some(refresh) => {
                tracing::info!("Renewing access credential");
                self.client.refresh(&refresh).await
            }
        };

        if self.session_epoch.load(Ordering::SeqCst) != epoch {
            // `clear` already reset the state; a newer renewal may own it now
            tracing::info!("Session cleared during renewal, discarding result");
            return Err(RenewalError::Cleared);
        }

        match result {
            Ok(resp) => {
                self.set_tokens(&resp.access_token, &resp.refresh_token);
                self.finish(RenewalState::Idle);
                tracing::info!("Access credential renewed");

                let pair = CredentialPair::from(resp);
                for observer in self.renewed_observers() {
                    observer(&pair);
                }
                Ok(pair)
            }
            Err(e) => {
                tracing::warn!("Renewal failed, session expired: {}", e);
                self.rearm(None);
                self.store.clear();

                let next = if self.settings.cooldown.is_zero() {
                    RenewalState::Idle
                } else {
                    RenewalState::Cooldown {
                        until: Instant::now() + self.settings.cooldown,
                    }
                };
                self.finish(next);

                for observer in self.expired_observers() {
                    observer();
                }
                Err(e)
            }
        }
    }

    fn finish(&self, next: RenewalState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = next;
    }

    fn renewed_observers(&self) -> Vec<RenewedObserver> {
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.renewed.iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    fn expired_observers(&self) -> Vec<ExpiredObserver> {
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.expired.iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.timer.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = slot.take() {
            timer.handle.abort();
        }
    }
}
