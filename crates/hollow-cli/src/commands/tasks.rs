//! Task commands: publish, pull, push, and their control

use super::Workspace;
use anyhow::Result;
use colored::Colorize;
use hollow_core::ports::TaskClient;
use hollow_types::{Repo, TaskKind, TaskOutcome, TaskState};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

/// Repository override given on the command line
#[derive(Debug, Clone, Default)]
pub struct RepoArgs {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub token: Option<String>,
}

impl RepoArgs {
    pub fn into_repo(self) -> Option<Repo> {
        let remote = self.remote?;
        Some(Repo {
            remote,
            token: self.token.unwrap_or_default(),
            branch: self.branch.unwrap_or_default(),
        })
    }
}

fn spinner(kind: TaskKind) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(format!("starting {}...", kind));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Start a task and follow its output until it ends or Ctrl-C detaches
pub async fn run(kind: TaskKind, repo: RepoArgs) -> Result<()> {
    let mut ws = Workspace::open()?;
    let bar = spinner(kind);
    let sink_bar = bar.clone();
    let mut stdout = std::io::stdout();
    let sink = move |bytes: &[u8]| {
        if !sink_bar.is_finished() {
            sink_bar.finish_and_clear();
        }
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    };
    let detach = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = ws.editor.run_task(kind, repo.into_repo(), sink, detach).await;
    bar.finish_and_clear();
    ws.report();

    match result? {
        TaskOutcome::Succeeded => {
            println!("{} {} succeeded", "✓".green().bold(), kind);
            Ok(())
        }
        TaskOutcome::Interrupted { reason } if reason == "detached" => {
            println!(
                "{} detached, {} keeps running on the server",
                "↪".yellow(),
                kind
            );
            Ok(())
        }
        outcome => anyhow::bail!("{} {}", kind, outcome),
    }
}

pub async fn cancel(key: &str) -> Result<()> {
    let ws = Workspace::open()?;
    ws.client.cancel(key).await?;
    println!("{} Cancel requested for {}", "✓".green(), key.cyan());
    Ok(())
}

pub async fn status(key: &str) -> Result<()> {
    let ws = Workspace::open()?;
    let info = ws.client.task_info(key).await?;
    println!("Task:     {}", info.key.cyan());
    println!("Kind:     {}", info.kind);
    println!("Project:  {}", info.project_id);
    println!("Started:  {}", info.started_at.format("%Y-%m-%d %H:%M:%S"));
    match info.state {
        TaskState::Running => println!("State:    {}", "running".yellow()),
        TaskState::Finished { outcome } => {
            let text = outcome.to_string();
            let text = if outcome.is_success() {
                text.green()
            } else {
                text.red()
            };
            println!("State:    {}", text);
            if let Some(at) = info.finished_at {
                println!("Finished: {}", at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}
