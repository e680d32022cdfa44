//! Test-only helpers: task builders, story documents, a scratch git repo and
//! scripted fakes for the workflow seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::task::Task;
use crate::io::agent::{Agent, AgentResult};
use crate::io::git::{GitSnapshot, PushStatus, VersionControl};
use crate::io::webhook::{Notifier, StoryReport};

/// Incomplete task named after its id.
pub fn open(id: &str, subtasks: Vec<Task>) -> Task {
    Task {
        id: id.to_string(),
        name: format!("task {id}"),
        completed: false,
        subtasks,
    }
}

/// Completed task named after its id.
pub fn done(id: &str, subtasks: Vec<Task>) -> Task {
    Task {
        completed: true,
        ..open(id, subtasks)
    }
}

/// A BMad-shaped story document with the given status and checklist body.
pub fn story_doc(status: &str, tasks_md: &str) -> String {
    format!(
        "# Story 1.1: Login form\n\
         \n\
         ## Status\n\
         \n\
         {status}\n\
         \n\
         ## Story\n\
         \n\
         **As a** user, **I want** to sign in, **so that** I can see my data.\n\
         \n\
         ## Tasks / Subtasks\n\
         \n\
         {tasks_md}\n\
         ## Dev Notes\n\
         \n\
         Use the existing session store.\n"
    )
}

/// Shift a file's modification time by `secs` relative to now.
pub fn set_mtime_offset(path: &Path, secs: i64) {
    let now = SystemTime::now();
    let delta = Duration::from_secs(secs.unsigned_abs());
    let when = if secs >= 0 { now + delta } else { now - delta };
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .expect("set mtime");
}

/// Scratch git repository with one initial commit and a clean tree.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.name", "Storyloop Test"])?;
        repo.git(&["config", "user.email", "storyloop@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "# scratch\n")?;
        repo.commit_all("chore: init")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` at `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Side effect a scripted reply applies to the working directory.
pub type Effect = Box<dyn Fn(&Path) -> Result<()>>;

/// One queued agent response.
pub struct ScriptedReply {
    pub output: String,
    pub exit_code: i32,
    pub duration: Duration,
    /// Return this error instead of a result.
    pub error: Option<String>,
    pub effect: Option<Effect>,
}

impl ScriptedReply {
    pub fn ok(output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit_code: 0,
            duration: Duration::from_millis(1500),
            error: None,
            effect: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::ok("")
        }
    }

    pub fn with_effect(mut self, effect: impl Fn(&Path) -> Result<()> + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

/// Agent that replays queued replies and records every instruction.
/// An exhausted queue answers with an empty successful transcript.
#[derive(Default)]
pub struct ScriptedAgent {
    replies: RefCell<VecDeque<ScriptedReply>>,
    sent: RefCell<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn send(&self, instruction: &str, workdir: &Path) -> Result<AgentResult> {
        self.sent.borrow_mut().push(instruction.to_string());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::ok(""));
        if let Some(effect) = &reply.effect {
            effect(workdir)?;
        }
        if let Some(message) = reply.error {
            return Err(anyhow!(message));
        }
        Ok(AgentResult {
            output: reply.output,
            exit_code: reply.exit_code,
            duration: reply.duration,
            instruction: instruction.to_string(),
        })
    }
}

/// In-memory version control state.
#[derive(Default)]
pub struct FakeVcs {
    pub dirty: Cell<bool>,
    /// Answers for upcoming dirty checks, consumed before `dirty`.
    pub dirty_sequence: RefCell<VecDeque<bool>>,
    pub files: RefCell<Vec<String>>,
    /// `None` makes `push_status` fail.
    pub push: Cell<Option<PushStatus>>,
    /// Make every query fail.
    pub broken: Cell<bool>,
}

impl FakeVcs {
    pub fn clean() -> Self {
        let vcs = Self::default();
        vcs.push.set(Some(PushStatus {
            ahead: 0,
            behind: 0,
            synced: true,
        }));
        vcs
    }

    fn check(&self) -> Result<()> {
        if self.broken.get() {
            return Err(anyhow!("git unavailable"));
        }
        Ok(())
    }
}

impl VersionControl for FakeVcs {
    fn has_uncommitted_changes(&self) -> Result<bool> {
        self.check()?;
        let queued = self.dirty_sequence.borrow_mut().pop_front();
        Ok(queued.unwrap_or_else(|| self.dirty.get()))
    }

    fn snapshot(&self) -> Result<GitSnapshot> {
        self.check()?;
        Ok(GitSnapshot {
            files: self.files.borrow().clone(),
            diff_stat: String::new(),
        })
    }

    fn push_status(&self) -> Result<PushStatus> {
        self.check()?;
        self.push.get().ok_or_else(|| anyhow!("no upstream"))
    }
}

/// Notifier that keeps every report it is given.
#[derive(Default)]
pub struct RecordingNotifier {
    reports: RefCell<Vec<StoryReport>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<StoryReport> {
        self.reports.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, report: &StoryReport) {
        self.reports.borrow_mut().push(report.clone());
    }
}
