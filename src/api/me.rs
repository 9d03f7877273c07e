//! Current user endpoint (/auth/me)

use anyhow::{Context, Result};

use super::client::ApiClient;
use crate::models::User;

/// Fetch and display the signed-in user's profile.
pub async fn whoami(client: &ApiClient) -> Result<()> {
    let resp = client.get("/auth/me").await?;
    let me: User = resp.json().await.context("Failed to parse /auth/me response")?;

    println!();
    println!("Name:  {}", me.name.as_deref().unwrap_or("(none)"));
    println!("Email: {}", me.email.as_deref().unwrap_or("(none)"));
    println!(
        "Role:  {}",
        me.role
            .map(|r| format!("{:?}", r))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("ID:    {}", me.id);

    Ok(())
}
