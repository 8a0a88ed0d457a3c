//! File commands: browse, open, edit, and manage the project tree

use super::Workspace;
use anyhow::{Context, Result};
use bytes::Bytes;
use colored::Colorize;
use hollow_core::ports::UploadFile;
use hollow_core::{tree, Command};
use hollow_types::{split_path, FileNode};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Body from a local file, or stdin when none is given
async fn read_body(from: Option<&Path>) -> Result<String> {
    match from {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .context("Failed to read stdin")?;
            Ok(body)
        }
    }
}

fn print_tree(ws: &Workspace) {
    let state = ws.editor.state();
    let rendered = tree::render_tree(&state.tree, &state.session);
    if rendered.is_empty() {
        println!("{}", "(empty)".dimmed());
    } else {
        print!("{}", rendered);
    }
}

pub async fn show_tree() -> Result<()> {
    let mut ws = Workspace::open()?;
    let result = ws.editor.reload_tree().await;
    ws.report();
    result?;
    print_tree(&ws);
    Ok(())
}

/// Open or close a directory in the tree view
pub async fn toggle(path: &str) -> Result<()> {
    let mut ws = Workspace::open()?;
    ws.editor.reload_tree().await?;
    let result = ws.editor.toggle_dir(&absolute(path)).await;
    ws.report();
    result?;
    print_tree(&ws);
    Ok(())
}

pub async fn open(path: &str) -> Result<()> {
    let mut ws = Workspace::open()?;
    let result = ws
        .editor
        .dispatch(Command::Open {
            path: absolute(path),
        })
        .await;
    ws.report();
    result?;

    if let Some(current) = &ws.editor.state().session.curr_file {
        if ws.editor.state().session.is_modified(current.path()) {
            eprintln!("{}", "(showing unsaved local edits)".yellow());
        }
        print!("{}", current.node.body);
    }
    Ok(())
}

/// Record an edit and let the save pipeline write it
pub async fn edit(path: &str, from: Option<PathBuf>) -> Result<()> {
    let body = read_body(from.as_deref()).await?;
    let mut ws = Workspace::open()?;
    ws.editor
        .edit(FileNode::new(absolute(path), false).with_body(body))
        .await?;
    let result = ws.editor.flush().await;
    ws.report();
    result?;
    Ok(())
}

/// Write a file immediately
pub async fn save(path: &str, from: Option<PathBuf>) -> Result<()> {
    let body = read_body(from.as_deref()).await?;
    let mut ws = Workspace::open()?;
    let result = ws
        .editor
        .save(FileNode::new(absolute(path), false).with_body(body))
        .await;
    ws.report();
    result?;
    Ok(())
}

/// List files with unsaved edits
pub async fn status() -> Result<()> {
    let ws = Workspace::open()?;
    let session = &ws.editor.state().session;

    match &session.curr_file {
        Some(current) => println!("Open file: {}", current.path().cyan()),
        None => println!("Open file: {}", "none".dimmed()),
    }
    if session.modified_files.is_empty() {
        println!("{}", "No unsaved changes".green());
        return Ok(());
    }
    println!("{}", "Unsaved changes:".yellow().bold());
    for file in &session.modified_files {
        println!("  {} {}", "*".yellow(), file.path);
    }
    Ok(())
}

/// Write every file that still has unsaved edits
pub async fn sync() -> Result<()> {
    let mut ws = Workspace::open()?;
    let pending = ws.editor.state().session.modified_files.clone();
    if pending.is_empty() {
        println!("{}", "Nothing to sync".green());
        return Ok(());
    }
    let mut failed = 0;
    for file in pending {
        if ws.editor.save(file).await.is_err() {
            failed += 1;
        }
    }
    ws.report();
    if failed > 0 {
        anyhow::bail!("{} files could not be saved", failed);
    }
    Ok(())
}

pub async fn touch(path: &str) -> Result<()> {
    let path = absolute(path);
    let (parent, name) = split_path(&path);
    run(Command::NewFile {
        parent: parent.to_string(),
        name: name.to_string(),
    })
    .await
}

pub async fn mkdir(path: &str) -> Result<()> {
    let path = absolute(path);
    let (parent, name) = split_path(&path);
    run(Command::NewDirectory {
        parent: parent.to_string(),
        name: name.to_string(),
    })
    .await
}

pub async fn remove(path: &str, is_dir: bool, yes: bool) -> Result<()> {
    let path = absolute(path);
    if !yes {
        let what = if is_dir { "directory" } else { "file" };
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete {} {}?", what, path))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }
    run(Command::Delete { path, is_dir }).await
}

pub async fn upload(dir: &str, files: Vec<PathBuf>) -> Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for file in &files {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", file.display()))?;
        uploads.push(UploadFile {
            name,
            data: Bytes::from(data),
        });
    }
    run(Command::Upload {
        dir: absolute(dir),
        files: uploads,
    })
    .await
}

/// Dispatch a mutating command and show the reloaded tree
async fn run(command: Command) -> Result<()> {
    let mut ws = Workspace::open()?;
    let name = command.name();
    let result = ws.editor.dispatch(command).await;
    ws.report();
    result?;
    println!("{} {}", "✓".green(), name);
    print_tree(&ws);
    Ok(())
}
