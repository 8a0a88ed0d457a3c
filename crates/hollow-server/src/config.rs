//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `HOLLOW__*` environment variables, then command line flags.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use hollow_types::{Bucket, Repo, RepoConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub source_dir: PathBuf,
    /// Defaults to `<source_dir>/.theme`
    #[serde(default)]
    pub theme_dir: Option<PathBuf>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub preview_domain: String,
    pub tree_depth: usize,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub source: Repo,
    #[serde(default)]
    pub deploy: Repo,
    pub tasks: TaskConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishConfig {
    /// Shell command that builds the site, run in the source directory
    #[serde(default)]
    pub command: Option<String>,
    /// Build output pushed to the deploy repository, relative to the source
    /// directory. Nothing is pushed when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub serialize_per_project: bool,
    pub retention_secs: u64,
    pub buffer_bytes: usize,
}

/// Values given on the command line. They win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub secret: Option<String>,
}

impl ServerConfig {
    pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("bind_address", "0.0.0.0:9432")?
            .set_default("source_dir", "source")?
            .set_default("tree_depth", 10_i64)?
            .set_default("tasks.serialize_per_project", true)?
            .set_default("tasks.retention_secs", 600_i64)?
            .set_default("tasks.buffer_bytes", 64 * 1024_i64)?;

        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("hollow").required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix("HOLLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("bind_address", overrides.bind_address)?
            .set_override_option(
                "source_dir",
                overrides
                    .source_dir
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("secret", overrides.secret)?
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn theme_dir(&self) -> PathBuf {
        self.theme_dir
            .clone()
            .unwrap_or_else(|| self.source_dir.join(".theme"))
    }

    pub fn bucket_root(&self, bucket: Bucket) -> PathBuf {
        match bucket {
            Bucket::Project => self.source_dir.clone(),
            Bucket::Theme => self.theme_dir(),
        }
    }

    pub fn repos(&self) -> RepoConfig {
        RepoConfig {
            source: self.source.clone(),
            deploy: self.deploy.clone(),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.tasks.retention_secs)
    }

    /// The configured secret, or a random one generated for this run.
    pub fn resolve_secret(&self) -> String {
        match self.secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                let secret = random_string(8);
                warn!("No secret configured, generated one for this run");
                info!("Editor secret: {}", secret);
                secret
            }
        }
    }
}

pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
