//! Hollow CLI
//!
//! Terminal client for the Hollow editor: browse and edit project files,
//! and run publish, pull and push with live output.

mod api;
mod commands;
mod config;
mod stream;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use commands::tasks::RepoArgs;
use hollow_types::{Bucket, TaskKind};
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "hollow")]
#[command(author, version, about = "Hollow - edit and publish a site from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct RepoFlags {
    /// Remote URL, overriding the server's configured repository
    #[arg(long)]
    remote: Option<String>,
    /// Branch to use with --remote
    #[arg(long, requires = "remote")]
    branch: Option<String>,
    /// Access token to use with --remote
    #[arg(long, requires = "remote", env = "HOLLOW_GIT_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl From<RepoFlags> for RepoArgs {
    fn from(flags: RepoFlags) -> Self {
        RepoArgs {
            remote: flags.remote,
            branch: flags.branch,
            token: flags.token,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the server secret
    Login {
        /// Secret (prompted if not provided)
        #[arg(short, long, env = "HOLLOW_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
    /// Forget the saved token
    Logout,
    /// Check the saved token
    Whoami,

    /// Show the file tree
    Tree,
    /// Open or close a directory in the tree
    Toggle { path: String },
    /// Print a file, with unsaved local edits if any
    Open { path: String },
    /// Replace a file's content through the save pipeline
    Edit {
        path: String,
        /// Read content from this file instead of stdin
        #[arg(short, long)]
        from: Option<PathBuf>,
    },
    /// Write a file immediately
    Save {
        path: String,
        /// Read content from this file instead of stdin
        #[arg(short, long)]
        from: Option<PathBuf>,
    },
    /// Show the open file and unsaved changes
    Status,
    /// Save every file with unsaved changes
    Sync,
    /// Create an empty file
    Touch { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or directory
    Rm {
        path: String,
        /// Delete a directory with its content
        #[arg(short = 'r', long = "dir")]
        dir: bool,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Upload local files into a directory
    Upload {
        /// Target directory
        dir: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Build and publish the site
    Publish,
    /// Pull the source repository
    Pull {
        #[command(flatten)]
        repo: RepoFlags,
    },
    /// Commit and push the source repository
    Push {
        #[command(flatten)]
        repo: RepoFlags,
    },
    /// Cancel a running task
    Cancel { key: String },
    /// Show the state of a task
    Task { key: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set the server URL
    SetServer {
        /// Server URL (e.g., http://127.0.0.1:9432)
        url: String,
    },
    /// Set the project id sent with every request
    SetProject { project_id: i64 },
    /// Set the bucket to edit (project or theme)
    SetBucket { bucket: Bucket },
    /// Set the save delay in milliseconds
    SetDebounce { ms: u64 },
    /// Show current configuration
    Show,
    /// Reset to default configuration
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "hollow=debug,hollow_core=debug"
        } else {
            "hollow=warn,hollow_core=warn"
        })
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    debug!("Starting Hollow CLI");

    let result = match cli.command {
        Commands::Login { secret } => commands::auth::login(secret).await,
        Commands::Logout => commands::auth::logout().await,
        Commands::Whoami => commands::auth::whoami().await,

        Commands::Tree => commands::files::show_tree().await,
        Commands::Toggle { path } => commands::files::toggle(&path).await,
        Commands::Open { path } => commands::files::open(&path).await,
        Commands::Edit { path, from } => commands::files::edit(&path, from).await,
        Commands::Save { path, from } => commands::files::save(&path, from).await,
        Commands::Status => commands::files::status().await,
        Commands::Sync => commands::files::sync().await,
        Commands::Touch { path } => commands::files::touch(&path).await,
        Commands::Mkdir { path } => commands::files::mkdir(&path).await,
        Commands::Rm { path, dir, yes } => commands::files::remove(&path, dir, yes).await,
        Commands::Upload { dir, files } => commands::files::upload(&dir, files).await,

        Commands::Publish => commands::tasks::run(TaskKind::Publish, RepoArgs::default()).await,
        Commands::Pull { repo } => commands::tasks::run(TaskKind::Pull, repo.into()).await,
        Commands::Push { repo } => commands::tasks::run(TaskKind::Push, repo.into()).await,
        Commands::Cancel { key } => commands::tasks::cancel(&key).await,
        Commands::Task { key } => commands::tasks::status(&key).await,

        Commands::Config { action } => match action {
            ConfigAction::SetServer { url } => commands::config::set_server(&url).await,
            ConfigAction::SetProject { project_id } => {
                commands::config::set_project(project_id).await
            }
            ConfigAction::SetBucket { bucket } => commands::config::set_bucket(bucket).await,
            ConfigAction::SetDebounce { ms } => commands::config::set_debounce(ms).await,
            ConfigAction::Show => commands::config::show().await,
            ConfigAction::Reset => commands::config::reset().await,
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "hollow", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!("Command failed: {:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}
