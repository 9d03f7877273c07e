//! Auth endpoints of the platform API
//!
//! `POST /auth/login` and `POST /auth/refresh` both answer with
//! `{ "accessToken": ..., "refreshToken": ... }`.

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::tokens::CredentialPair;

/// Why a renewal did not produce a new credential pair. Every variant ends
/// the session; `Cleared` means it had already ended by logout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    #[error("no refresh credential available")]
    NoRefreshCredential,
    #[error("refresh rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh response unusable: {0}")]
    InvalidResponse(String),
    #[error("session was cleared while renewing")]
    Cleared,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenResponse> for CredentialPair {
    fn from(resp: TokenResponse) -> Self {
        CredentialPair::new(resp.access_token, resp.refresh_token)
    }
}

/// Exchanges a refresh credential for a new pair.
///
/// Boxed future so the token manager can hold it as a trait object.
pub trait RefreshClient: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, std::result::Result<TokenResponse, RenewalError>>;
}

/// HTTP client for the `/auth/*` routes.
#[derive(Clone)]
pub struct AuthEndpoint {
    http: reqwest::Client,
    base_url: String,
}

impl AuthEndpoint {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange email + password for a credential pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let url = self.url("/auth/login");
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Login failed (HTTP {}): {}", status.as_u16(), body);
        }

        resp.json()
            .await
            .context("Failed to parse login response")
    }

    async fn post_refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<TokenResponse, RenewalError> {
        let url = self.url("/auth/refresh");
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RenewalError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))
    }
}

impl RefreshClient for AuthEndpoint {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, std::result::Result<TokenResponse, RenewalError>> {
        self.post_refresh(refresh_token).boxed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn answer(sock: &mut TcpStream, status_line: &str, body: &str) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        // Read headers, then as much body as Content-Length announces
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(idx) = text.find("\r\n\r\n") {
                let len = text[..idx]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= idx + 4 + len {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer one connection per canned `(status, body)`, in order, handing
    /// back the raw requests.
    pub(crate) async fn serve(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status_line, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                requests.push(answer(&mut sock, status_line, body).await);
            }
            requests
        });

        (format!("http://{}", addr), handle)
    }

    pub(crate) async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let (base, handle) = serve(vec![(status_line, body)]).await;
        let single = tokio::spawn(async move { handle.await.unwrap().remove(0) });
        (base, single)
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let (base, server) =
            serve_once("200 OK", r#"{"accessToken":"new.a.t","refreshToken":"new.r.t"}"#).await;
        let endpoint = AuthEndpoint::new(&base, None).unwrap();

        let resp = endpoint.refresh("old.r.t").await.unwrap();
        assert_eq!(resp.access_token, "new.a.t");
        assert_eq!(resp.refresh_token, "new.r.t");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/refresh "), "{}", request);
        assert!(request.contains(r#"{"refreshToken":"old.r.t"}"#), "{}", request);
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"error":"revoked"}"#).await;
        let endpoint = AuthEndpoint::new(&format!("{}/", base), None).unwrap();

        let err = endpoint.refresh("old.r.t").await.unwrap_err();
        assert_eq!(
            err,
            RenewalError::Rejected {
                status: 401,
                body: r#"{"error":"revoked"}"#.to_string()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let (base, server) = serve_once("200 OK", r#"{"accessToken":"only"}"#).await;
        let endpoint = AuthEndpoint::new(&base, None).unwrap();

        let err = endpoint.refresh("old.r.t").await.unwrap_err();
        assert!(matches!(err, RenewalError::InvalidResponse(_)), "{:?}", err);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = AuthEndpoint::new(&format!("http://{}", addr), None).unwrap();
        let err = endpoint.refresh("old.r.t").await.unwrap_err();
        assert!(matches!(err, RenewalError::Transport(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let (base, server) =
            serve_once("200 OK", r#"{"accessToken":"a.b.c","refreshToken":"d.e.f"}"#).await;
        let endpoint = AuthEndpoint::new(&base, None).unwrap();

        let resp = endpoint.login("ada@example.com", "hunter2").await.unwrap();
        assert_eq!(CredentialPair::from(resp), CredentialPair::new("a.b.c", "d.e.f"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/login "));
        assert!(request.contains(r#""email":"ada@example.com""#));
    }

    #[tokio::test]
    async fn test_login_failure_is_error() {
        let (base, server) = serve_once("403 Forbidden", "bad credentials").await;
        let endpoint = AuthEndpoint::new(&base, None).unwrap();

        let err = endpoint.login("ada@example.com", "nope").await.unwrap_err();
        assert!(format!("{:#}", err).contains("HTTP 403"));
        server.await.unwrap();
    }
}
