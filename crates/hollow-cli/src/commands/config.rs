//! Config command - Manage CLI configuration

use crate::api::Client;
use crate::config::{Settings, SettingsManager};
use anyhow::{Context, Result};
use colored::Colorize;
use hollow_types::Bucket;

/// Set the server URL
pub async fn set_server(url: &str) -> Result<()> {
    let mut settings = SettingsManager::load().context("Failed to load settings")?;

    let url = url.trim().trim_end_matches('/');
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!(
            "Invalid URL: {}. URL must start with http:// or https://",
            url
        );
    }
    if settings.server_url != url {
        // Tokens are only valid on the server that issued them
        settings.token = None;
    }
    settings.server_url = url.to_string();

    SettingsManager::save(&settings).context("Failed to save settings")?;
    println!("{} Server URL set to: {}", "✓".green(), url.cyan());
    Ok(())
}

pub async fn set_project(project_id: i64) -> Result<()> {
    let mut settings = SettingsManager::load()?;
    settings.project_id = project_id;
    SettingsManager::save(&settings)?;
    println!("{} Project set to: {}", "✓".green(), project_id.to_string().cyan());
    Ok(())
}

pub async fn set_bucket(bucket: Bucket) -> Result<()> {
    let mut settings = SettingsManager::load()?;
    settings.bucket = bucket;
    SettingsManager::save(&settings)?;
    println!("{} Bucket set to: {}", "✓".green(), bucket.as_str().cyan());
    Ok(())
}

pub async fn set_debounce(ms: u64) -> Result<()> {
    let mut settings = SettingsManager::load()?;
    settings.debounce_ms = ms;
    SettingsManager::save(&settings)?;
    println!("{} Save delay set to: {}ms", "✓".green(), ms.to_string().cyan());
    Ok(())
}

/// Show current configuration, plus what the server reports when reachable
pub async fn show() -> Result<()> {
    let settings = SettingsManager::load().context("Failed to load settings")?;

    println!("{}", "Hollow Configuration".bold().underline());
    println!();
    println!("{}", "Client:".cyan().bold());
    println!("  Server:     {}", settings.server_url);
    println!("  Project:    {}", settings.project_id);
    println!("  Bucket:     {}", settings.bucket);
    println!("  Save delay: {}ms", settings.debounce_ms);
    println!(
        "  Logged in:  {}",
        if settings.token.is_some() {
            "yes".green()
        } else {
            "no".yellow()
        }
    );
    println!(
        "  Config dir: {}",
        SettingsManager::hollow_home()?.display().to_string().dimmed()
    );

    if settings.token.is_none() {
        return Ok(());
    }
    let client = Client::from_settings(&settings);
    println!();
    println!("{}", "Server:".cyan().bold());
    match (client.repos().await, client.setting().await) {
        (Ok(repos), Ok(setting)) => {
            println!("  Source repo:    {}", describe(&repos.source));
            println!("  Deploy repo:    {}", describe(&repos.deploy));
            println!("  Preview domain: {}", setting.preview_domain);
        }
        (Err(e), _) | (_, Err(e)) => println!("  {}", e.to_string().yellow()),
    }
    Ok(())
}

fn describe(repo: &hollow_types::Repo) -> String {
    if repo.is_configured() {
        format!("{} ({})", repo.remote, repo.branch_or_default())
    } else {
        "not configured".dimmed().to_string()
    }
}

/// Reset to default configuration
pub async fn reset() -> Result<()> {
    SettingsManager::save(&Settings::default())?;
    println!("{} Configuration reset", "✓".green());
    Ok(())
}
