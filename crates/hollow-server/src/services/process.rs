//! Task backend that shells out to `sh` and `git`
//!
//! Every step echoes its command line and streams stdout and stderr into the
//! task output as raw bytes. Child processes are killed when the task future
//! is dropped.

use super::orchestrator::{Job, TaskBackend, TaskError};
use super::task_hub::TaskOutput;
use crate::config::ServerConfig;
use async_trait::async_trait;
use chrono::Utc;
use hollow_types::{Repo, TaskKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

const READ_CHUNK: usize = 4096;
const DEPLOY_BRANCH: &str = "docs";
const DEPLOY_MESSAGE: &str = "by hollow";
const GIT_IDENTITY: [&str; 4] = ["-c", "user.name=hollow", "-c", "user.email=hollow@localhost"];

pub struct ProcessBackend {
    source_dir: PathBuf,
    publish_command: Option<String>,
    output_dir: Option<PathBuf>,
    source: Repo,
    deploy: Repo,
}

impl ProcessBackend {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            publish_command: config.publish.command.clone(),
            output_dir: config
                .publish
                .output_dir
                .as_ref()
                .map(|dir| config.source_dir.join(dir)),
            source: config.source.clone(),
            deploy: config.deploy.clone(),
        }
    }

    async fn publish(&self, job: &Job, out: &TaskOutput) -> Result<(), TaskError> {
        let command = self
            .publish_command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(TaskError::NotConfigured("publish.command"))?;
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.source_dir)
            .env("HOLLOW_PROJECT_ID", job.project_id.to_string());
        run_step(out, "build", command, cmd).await?;

        match &self.output_dir {
            Some(dir) if self.deploy.is_configured() => self.deploy(dir, out).await,
            _ => {
                out.line("[Hollow] no deploy repository configured, skipping push");
                Ok(())
            }
        }
    }

    /// Force-push the build output as a single commit on the deploy branch
    async fn deploy(&self, dir: &Path, out: &TaskOutput) -> Result<(), TaskError> {
        let branch = if self.deploy.branch.trim().is_empty() {
            DEPLOY_BRANCH
        } else {
            self.deploy.branch.trim()
        };
        ensure_repo(dir, out).await?;
        git(dir, out, &["checkout", "-B", branch]).await?;
        git(dir, out, &["add", "-A"]).await?;
        let mut commit: Vec<&str> = GIT_IDENTITY.to_vec();
        commit.extend(["commit", "--allow-empty", "-m", DEPLOY_MESSAGE]);
        git(dir, out, &commit).await?;
        push(dir, out, &self.deploy, branch, true).await
    }

    async fn pull(&self, repo: &Repo, out: &TaskOutput) -> Result<(), TaskError> {
        if !repo.is_configured() {
            return Err(TaskError::NotConfigured("source.remote"));
        }
        tokio::fs::create_dir_all(&self.source_dir).await?;
        ensure_repo(&self.source_dir, out).await?;
        let remote = authenticated_remote(repo);
        let branch = repo.branch_or_default();
        let shown = format!("git pull {} {}", redact(&remote, &repo.token), branch);
        let mut cmd = Command::new("git");
        cmd.args(["pull", remote.as_str(), branch])
            .current_dir(&self.source_dir);
        run_step(out, "git pull", &shown, cmd).await
    }

    async fn push(&self, repo: &Repo, out: &TaskOutput) -> Result<(), TaskError> {
        if !repo.is_configured() {
            return Err(TaskError::NotConfigured("source.remote"));
        }
        let dir = self.source_dir.as_path();
        ensure_repo(dir, out).await?;
        git(dir, out, &["add", "-A"]).await?;
        if working_tree_dirty(dir).await? {
            let message = format!("hollow: update {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
            let mut commit: Vec<&str> = GIT_IDENTITY.to_vec();
            commit.extend(["commit", "-m", message.as_str()]);
            git(dir, out, &commit).await?;
        } else {
            out.line("[Hollow] nothing to commit");
        }
        push(dir, out, repo, repo.branch_or_default(), false).await
    }
}

#[async_trait]
impl TaskBackend for ProcessBackend {
    async fn run(&self, job: &Job, out: &TaskOutput) -> Result<(), TaskError> {
        let repo = job.repo.as_ref().unwrap_or(&self.source);
        match job.kind {
            TaskKind::Publish => self.publish(job, out).await,
            TaskKind::Pull => self.pull(repo, out).await,
            TaskKind::Push => self.push(repo, out).await,
        }
    }
}

async fn ensure_repo(dir: &Path, out: &TaskOutput) -> Result<(), TaskError> {
    tokio::fs::create_dir_all(dir).await?;
    if tokio::fs::metadata(dir.join(".git")).await.is_err() {
        git(dir, out, &["init"]).await?;
    }
    Ok(())
}

async fn push(dir: &Path, out: &TaskOutput, repo: &Repo, branch: &str, force: bool) -> Result<(), TaskError> {
    let remote = authenticated_remote(repo);
    let refspec = format!("HEAD:{}", branch);
    let mut args = vec!["push"];
    if force {
        args.push("--force");
    }
    args.extend([remote.as_str(), refspec.as_str()]);
    let shown = format!("git {}", args.join(" ").replace(&remote, &redact(&remote, &repo.token)));
    let mut cmd = Command::new("git");
    cmd.args(&args).current_dir(dir);
    run_step(out, "git push", &shown, cmd).await
}

async fn git(dir: &Path, out: &TaskOutput, args: &[&str]) -> Result<(), TaskError> {
    let shown = format!("git {}", args.join(" "));
    let step = match args.iter().find(|a| !a.starts_with('-') && !a.contains('=')) {
        Some(sub) => format!("git {}", sub),
        None => "git".to_string(),
    };
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    run_step(out, &step, &shown, cmd).await
}

async fn working_tree_dirty(dir: &Path) -> Result<bool, TaskError> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TaskError::Spawn {
            step: "git status".to_string(),
            source,
        })?;
    Ok(!output.stdout.is_empty())
}

/// Remote URL with the token spliced in as basic-auth credentials
fn authenticated_remote(repo: &Repo) -> String {
    let remote = repo.remote.trim();
    if repo.token.is_empty() {
        return remote.to_string();
    }
    match remote.strip_prefix("https://") {
        Some(rest) => format!("https://hollow:{}@{}", repo.token, rest),
        None => remote.to_string(),
    }
}

fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        text.to_string()
    } else {
        text.replace(token, "***")
    }
}

/// Run one child process, echoing `shown` and pumping its output
async fn run_step(out: &TaskOutput, step: &str, shown: &str, mut cmd: Command) -> Result<(), TaskError> {
    out.line(format!("$ {}", shown));
    debug!("Running {}", shown);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TaskError::Spawn {
            step: step.to_string(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, _, _) = tokio::try_join!(child.wait(), pump(stdout, out), pump(stderr, out))?;
    if status.success() {
        Ok(())
    } else {
        Err(TaskError::Exit {
            step: step.to_string(),
            status: status.to_string(),
        })
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, out: &TaskOutput) -> std::io::Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.write(buf[..n].to_vec());
    }
}
