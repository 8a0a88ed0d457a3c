//! Authentication commands

use crate::api::Client;
use crate::config::SettingsManager;
use anyhow::{Context, Result};
use colored::Colorize;
use hollow_core::CoreError;

pub async fn login(secret: Option<String>) -> Result<()> {
    let mut settings = SettingsManager::load()?;
    println!("{} {}", "Login to".blue().bold(), settings.server_url.cyan());

    let secret = match secret {
        Some(secret) => secret,
        None => dialoguer::Password::new()
            .with_prompt("Secret")
            .interact()?,
    };

    let client = Client::from_settings(&settings);
    let token = match client.login(&secret).await {
        Ok(token) => token,
        Err(e) if e.is_auth() => anyhow::bail!("Wrong secret"),
        Err(e) => return Err(e).context("Login failed"),
    };

    settings.token = Some(token);
    SettingsManager::save(&settings)?;
    println!("{}", "✓ Login successful".green().bold());
    Ok(())
}

pub async fn logout() -> Result<()> {
    let mut settings = SettingsManager::load()?;
    if settings.token.take().is_none() {
        println!("{}", "Not logged in".yellow());
        return Ok(());
    }
    SettingsManager::save(&settings)?;
    println!("{}", "✓ Logged out".green());
    Ok(())
}

/// Check the saved token against the server
pub async fn whoami() -> Result<()> {
    let settings = SettingsManager::load()?;
    if settings.token.is_none() {
        println!("{}", "Not logged in".yellow());
        return Ok(());
    }
    match Client::from_settings(&settings).verify().await {
        Ok(()) => println!("{} {}", "✓ Logged in to".green(), settings.server_url.cyan()),
        Err(CoreError::Unauthorized) => {
            println!("{}", "Token expired or revoked, run `hollow login`".yellow())
        }
        Err(e) => return Err(e).context("Could not reach the server"),
    }
    Ok(())
}
