//! Credential lifecycle for the learning platform
//!
//! Stores the access/refresh credential pair, decodes expiry from the
//! access credential, and keeps it renewed through `/auth/refresh`.

pub mod bootstrap;
pub mod claims;
pub mod commands;
pub mod endpoint;
pub mod expiry;
pub mod manager;
pub mod tokens;

use anyhow::Result;
use std::sync::Arc;

pub use bootstrap::restore;
pub use commands::{login, logout, refresh, status, token, watch};
pub use endpoint::AuthEndpoint;
pub use manager::{RenewalSettings, TokenManager};
pub use tokens::CredentialStore;

use crate::config::Config;
use crate::storage::{FileStorage, KeyValueStore, MemoryStorage};

/// Everything a command needs: the endpoint and the manager built over the
/// configured credential files.
pub struct Session {
    pub endpoint: AuthEndpoint,
    pub manager: TokenManager,
}

impl Session {
    pub fn open(config: &Config) -> Result<Self> {
        let endpoint = AuthEndpoint::new(&config.api_base_url, config.request_timeout())?;
        let session: Arc<dyn KeyValueStore> = if config.persist_access {
            Arc::new(FileStorage::new(config.session_path()?))
        } else {
            Arc::new(MemoryStorage::new())
        };
        let store = CredentialStore::new(
            session,
            Arc::new(FileStorage::new(config.credentials_path()?)),
        );
        let manager = TokenManager::new(
            store,
            Arc::new(endpoint.clone()),
            config.renewal_settings(),
        );

        Ok(Self { endpoint, manager })
    }
}
