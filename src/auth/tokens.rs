//! Credential storage and caching

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::storage::KeyValueStore;

const ACCESS_KEY: &str = "access_token";
const REFRESH_KEY: &str = "refresh_token";

/// Access + refresh credentials as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Cached slot: `None` until the first read or write this process.
type Slot = Option<Option<String>>;

#[derive(Default)]
struct Cache {
    access: Slot,
    refresh: Slot,
}

/// Two-tier credential store.
///
/// The access credential lives in the session-scoped backend, the refresh
/// credential in the persistent one. Reads go through an in-process cache
/// filled lazily from the backend on first access. Backend failures are
/// logged and read as "absent".
pub struct CredentialStore {
    session: Arc<dyn KeyValueStore>,
    persistent: Arc<dyn KeyValueStore>,
    cache: Mutex<Cache>,
}

impl CredentialStore {
    pub fn new(session: Arc<dyn KeyValueStore>, persistent: Arc<dyn KeyValueStore>) -> Self {
        Self {
            session,
            persistent,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn get_access(&self) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .access
            .get_or_insert_with(|| read(self.session.as_ref(), ACCESS_KEY))
            .clone()
    }

    pub fn get_refresh(&self) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .refresh
            .get_or_insert_with(|| read(self.persistent.as_ref(), REFRESH_KEY))
            .clone()
    }

    pub fn set_access(&self, credential: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        write(self.session.as_ref(), ACCESS_KEY, credential);
        cache.access = Some(Some(credential.to_string()));
    }

    pub fn set_refresh(&self, credential: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        write(self.persistent.as_ref(), REFRESH_KEY, credential);
        cache.refresh = Some(Some(credential.to_string()));
    }

    /// Both credentials, read through the cache.
    pub fn pair(&self) -> CredentialPair {
        CredentialPair {
            access: self.get_access(),
            refresh: self.get_refresh(),
        }
    }

    /// Wipe both backends and the cache.
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.session.remove(ACCESS_KEY) {
            tracing::warn!("Failed to remove access credential: {:#}", e);
        }
        if let Err(e) = self.persistent.remove(REFRESH_KEY) {
            tracing::warn!("Failed to remove refresh credential: {:#}", e);
        }
        cache.access = Some(None);
        cache.refresh = Some(None);
    }
}

fn read(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            tracing::warn!("Failed to read {}: {:#}", key, e);
            None
        }
    }
}

fn write(store: &dyn KeyValueStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        tracing::warn!("Failed to persist {}: {:#}", key, e);
    }
}
