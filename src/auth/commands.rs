//! `login`, `logout`, `status`, `refresh`, `token` and `watch` commands

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::Notify;

use super::claims::{decode, Claims};
use super::expiry::{is_expired, now_epoch_secs, seconds_until_expiry, should_renew_proactively};
use super::{restore, Session};
use crate::config::Config;

/// Exchange email + password for a credential pair and store it
pub async fn login(config: &Config, email: &str, password: &str) -> Result<()> {
    let session = Session::open(config)?;

    tracing::info!("Logging in as {}", email);
    let resp = session.endpoint.login(email, password).await?;
    session
        .manager
        .set_tokens(&resp.access_token, &resp.refresh_token);
    session.manager.shutdown();

    match decode(&resp.access_token) {
        Claims::Decoded(claims) => println!(
            "Logged in as {} ({}).",
            claims.subject,
            claims.role.as_deref().unwrap_or("no role")
        ),
        Claims::Undecodable => println!("Logged in."),
    }
    Ok(())
}

/// Clear stored credentials
pub async fn logout(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    session.manager.clear();
    println!("Logged out.");
    Ok(())
}

/// Display current credential status
pub async fn status(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    let window = session.manager.settings().window_secs;
    let now = now_epoch_secs();

    match session.manager.access_token() {
        Some(access) => {
            let claims = decode(&access);
            match &claims {
                Claims::Decoded(decoded) if !is_expired(&claims, now) => {
                    println!("Access token: valid");
                    println!("  subject:    {}", decoded.subject);
                    if let Some(role) = &decoded.role {
                        println!("  role:       {}", role);
                    }
                    if let Some(exp) = decoded.expires_at {
                        println!("  expires_at: {}", format_epoch(exp));
                    }
                    println!("  remaining:  {}s", seconds_until_expiry(&claims, now));
                    if !decoded.extra.is_empty() {
                        let keys: Vec<&str> = decoded.extra.keys().map(String::as_str).collect();
                        println!("  claims:     {}", keys.join(", "));
                    }
                    if should_renew_proactively(&claims, now, window) {
                        println!("  (inside {}s renewal window)", window);
                    }
                }
                Claims::Decoded(_) => println!("Access token: expired"),
                Claims::Undecodable => println!("Access token: undecodable"),
            }
        }
        None => println!("Access token: none"),
    }

    match session.manager.refresh_token() {
        Some(_) => println!("Refresh tok:  present"),
        None => println!("Refresh tok:  none"),
    }

    if session.manager.credentials().is_empty() {
        println!("\nRun 'lms-session login' to authenticate.");
    }

    Ok(())
}

/// Force a renewal now
pub async fn refresh(config: &Config) -> Result<()> {
    let session = Session::open(config)?;

    let result = session.manager.renew().await;
    session.manager.shutdown();
    match result {
        Ok(_) => {
            println!("Token refreshed.");
            Ok(())
        }
        Err(e) => bail!("Token refresh failed: {}. Run 'lms-session login'.", e),
    }
}

/// Print a fresh access credential (for scripting)
pub async fn token(config: &Config) -> Result<()> {
    let session = Session::open(config)?;

    restore(&session.manager).await;
    let access = session.manager.ensure_fresh().await;
    session.manager.shutdown();

    let access = access.context("No active session. Run 'lms-session login'.")?;
    println!("{}", access);
    Ok(())
}

/// Keep the session alive, renewing ahead of expiry, until ctrl-c or the
/// session ends.
pub async fn watch(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    let manager = &session.manager;

    let expired = Arc::new(Notify::new());
    let renewed_id = manager.on_renewed(|pair| {
        let exp = pair
            .access
            .as_deref()
            .and_then(|a| decode(a).expires_at());
        match exp {
            Some(exp) => tracing::info!("Session renewed, valid until {}", format_epoch(exp)),
            None => tracing::info!("Session renewed"),
        }
    });
    let signal = expired.clone();
    let expired_id = manager.on_expired(move || signal.notify_one());

    if restore(manager).await.is_none() {
        manager.remove_observer(renewed_id);
        manager.remove_observer(expired_id);
        bail!("No active session. Run 'lms-session login'.");
    }
    println!("Watching session (ctrl-c to stop)...");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
        _ = expired.notified() => {
            Err(anyhow::anyhow!("Session expired. Run 'lms-session login'."))
        }
    };

    manager.remove_observer(renewed_id);
    manager.remove_observer(expired_id);
    manager.shutdown();
    outcome
}

fn format_epoch(secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
