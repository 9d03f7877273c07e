//! Authenticated HTTP client for the platform API
//!
//! Wraps reqwest::Client with bearer injection from the token manager.
//! A 401 triggers one renewal and one retry.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Method, StatusCode};

use crate::auth::TokenManager;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    manager: TokenManager,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: &str, manager: TokenManager) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            manager,
        }
    }

    /// GET request (bearer auth).
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        self.send(Method::GET, path, None).await
    }

    /// POST request (bearer auth, JSON body).
    #[cfg(test)]
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let token = self
            .manager
            .ensure_fresh()
            .await
            .context("No active session. Run 'lms-session login'.")?;
        let resp = self.request(method.clone(), &url, body, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_response(resp, &url).await;
        }

        // Server no longer accepts the credential; renew once and retry
        tracing::info!("401 for {}, renewing credential", url);
        let pair = self
            .manager
            .renew()
            .await
            .map_err(|e| anyhow!("Session expired ({}). Run 'lms-session login'.", e))?;
        let token = pair
            .access
            .context("Renewal returned no access token. Run 'lms-session login'.")?;
        let resp = self.request(method, &url, body, &token).await?;
        check_response(resp, &url).await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<reqwest::Response> {
        tracing::debug!("{} {}", method, url);

        let mut req = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send()
            .await
            .with_context(|| format!("{} {} failed", method, url))
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Credential rejected -- run 'lms-session login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
