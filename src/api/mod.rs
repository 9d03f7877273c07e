//! API client module for the learning platform

pub mod client;
mod me;

use anyhow::{Context, Result};

use crate::auth::{restore, Session};
use crate::config::Config;

pub use client::ApiClient;

/// Show current user info (verifies the session works end to end)
pub async fn whoami(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    restore(&session.manager).await;

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    let http = builder.build().context("Failed to build HTTP client")?;
    let client = ApiClient::new(http, &config.api_base_url, session.manager.clone());
    let result = me::whoami(&client).await;
    session.manager.shutdown();
    result
}
