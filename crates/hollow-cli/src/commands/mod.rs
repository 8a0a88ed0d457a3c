//! CLI commands

pub mod auth;
pub mod config;
pub mod files;
pub mod tasks;

use crate::api::Client;
use crate::config::{Settings, SettingsManager};
use anyhow::Result;
use colored::Colorize;
use hollow_core::notice::{self, NoticeReceiver};
use hollow_core::ports::FilePersistence;
use hollow_core::{Editor, MutationPipeline, Notice, SessionStore};
use std::sync::Arc;

/// An editor wired to the configured server and the persisted session
pub struct Workspace {
    pub editor: Editor,
    pub client: Arc<Client>,
    notices: NoticeReceiver,
}

impl Workspace {
    pub fn open() -> Result<Self> {
        let settings = SettingsManager::load()?;
        Self::with_settings(&settings)
    }

    pub fn with_settings(settings: &Settings) -> Result<Self> {
        let client = Arc::new(Client::from_settings(settings));
        let persistence = Arc::new(FilePersistence::new(SettingsManager::state_dir()?)?);
        let session = SessionStore::open(persistence)?.shared();
        let (tx, notices) = notice::channel();
        let pipeline = MutationPipeline::new(
            client.clone(),
            session.clone(),
            tx.clone(),
            settings.quiet_window(),
        );
        let editor = Editor::new(
            settings.bucket,
            client.clone(),
            client.clone(),
            session,
            pipeline,
            tx,
        );
        Ok(Self {
            editor,
            client,
            notices,
        })
    }

    /// Print queued notices
    pub fn report(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            print_notice(&notice);
        }
    }
}

pub fn print_notice(notice: &Notice) {
    match notice {
        Notice::AuthRequired => {
            eprintln!(
                "{} {} (run {})",
                "!".yellow().bold(),
                notice,
                "hollow login".cyan()
            );
        }
        n if n.is_error() => eprintln!("{} {}", "✗".red().bold(), n),
        n => println!("{} {}", "✓".green(), n),
    }
}
