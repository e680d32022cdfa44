//! Git adapter for working-tree status.
//!
//! The workflow only reads git state (commits are delegated to the agent), so
//! this is a small, explicit wrapper around `git` subprocess calls.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    pub fn is_staged(&self) -> bool {
        self.code_char(0).is_some_and(|c| c != ' ' && c != '?')
    }

    pub fn is_modified(&self) -> bool {
        self.code_char(1).is_some_and(|c| c != ' ' && c != '?')
    }

    fn code_char(&self, index: usize) -> Option<char> {
        self.code.chars().nth(index)
    }
}

/// Working-tree status plus upstream tracking counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub entries: Vec<StatusEntry>,
}

impl GitStatus {
    pub fn staged(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_staged())
    }

    pub fn modified(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_modified())
    }

    pub fn untracked(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_untracked())
    }

    /// True if anything is staged, modified or untracked.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.staged().next().is_some()
            || self.modified().next().is_some()
            || self.untracked().next().is_some()
    }
}

/// Point-in-time view of the working tree, used for before/after reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSnapshot {
    /// `XY path` lines, one per changed file.
    pub files: Vec<String>,
    /// Output of `git diff --stat`.
    pub diff_stat: String,
}

/// Upstream sync state of the current branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStatus {
    pub ahead: u32,
    pub behind: u32,
    pub synced: bool,
}

/// Version-control queries the workflow depends on.
pub trait VersionControl {
    fn has_uncommitted_changes(&self) -> Result<bool>;
    fn snapshot(&self) -> Result<GitSnapshot>;
    fn push_status(&self) -> Result<PushStatus>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Status entries (including untracked) and branch tracking info.
    #[instrument(skip_all)]
    pub fn status(&self) -> Result<GitStatus> {
        let out = self.run_capture(&["status", "--porcelain=v1", "--branch", "-uall"])?;
        let status = parse_status(&out)?;
        debug!(
            branch = status.branch.as_deref().unwrap_or("(detached)"),
            entries = status.entries.len(),
            ahead = status.ahead,
            behind = status.behind,
            "git status"
        );
        Ok(status)
    }

    /// `git diff --stat` for unstaged changes.
    pub fn diff_stat(&self) -> Result<String> {
        let out = self.run_capture(&["diff", "--stat"])?;
        Ok(out.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.status()?.has_uncommitted_changes())
    }

    fn snapshot(&self) -> Result<GitSnapshot> {
        let status = self.status()?;
        Ok(GitSnapshot {
            files: status
                .entries
                .iter()
                .map(|entry| format!("{} {}", entry.code, entry.path))
                .collect(),
            diff_stat: self.diff_stat()?,
        })
    }

    fn push_status(&self) -> Result<PushStatus> {
        let status = self.status()?;
        Ok(PushStatus {
            ahead: status.ahead,
            behind: status.behind,
            synced: status.ahead == 0 && status.behind == 0,
        })
    }
}

fn parse_status(out: &str) -> Result<GitStatus> {
    let mut status = GitStatus::default();
    for line in out.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        status.entries.push(parse_status_line(line)?);
    }
    Ok(status)
}

/// Parse `main...origin/main [ahead 1, behind 2]` style headers.
fn parse_branch_header(header: &str, status: &mut GitStatus) {
    let (refs, tracking) = match header.split_once(" [") {
        Some((refs, rest)) => (refs, rest.trim_end_matches(']')),
        None => (header, ""),
    };
    let branch = refs
        .strip_prefix("No commits yet on ")
        .or_else(|| refs.strip_prefix("Initial commit on "))
        .unwrap_or(refs);
    let branch = branch.split("...").next().unwrap_or(branch).trim();
    if !branch.is_empty() && !branch.starts_with("HEAD (") {
        status.branch = Some(branch.to_string());
    }
    for part in tracking.split(',') {
        let part = part.trim();
        if let Some(n) = part.strip_prefix("ahead ") {
            status.ahead = n.trim().parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            status.behind = n.trim().parse().unwrap_or(0);
        }
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 || !line.is_char_boundary(2) || !line.is_char_boundary(3) {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
