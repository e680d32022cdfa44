//! Story lifecycle driver.
//!
//! Each tick re-reads the stories directory and applies the first matching
//! rule:
//!
//! 1. a `Draft` story is approved;
//! 2. an `Approved` story gets its next open task developed, or moves to
//!    `Ready for Review` once every task is checked;
//! 3. a `Ready for Review` story is reviewed, marked `Done`, committed and
//!    reported;
//! 4. with no `Draft` story, pending changes are committed and a new draft is
//!    requested (when `workflow.auto_draft` is on);
//! 5. pending changes are committed;
//! 6. otherwise there is nothing to do.
//!
//! [`Workflow::run_continuous`] repeats ticks until several consecutive ticks
//! find no work.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::analytics::{CommandLog, CommandRecord};
use crate::core::selector::{next_task, uncompleted_tasks};
use crate::core::status::StoryStatus;
use crate::core::task::Task;
use crate::instructions::{CommandKind, Instructions};
use crate::io::agent::{Agent, AgentResult};
use crate::io::config::{Config, WorkflowConfig};
use crate::io::git::{PushStatus, VersionControl};
use crate::io::stories::{Story, find_story_by_status, update_story_status};
use crate::io::webhook::{Notifier, StoryReport};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Approved { story: String },
    Developed { story: String, task_id: String },
    ReadyForReview { story: String },
    Completed { story: String },
    /// A new draft was requested, after committing pending changes if any.
    Drafted { committed: bool },
    Committed,
    NoWork,
}

impl TickOutcome {
    pub fn is_work(&self) -> bool {
        !matches!(self, Self::NoWork)
    }
}

/// Counters from a finished [`Workflow::run_continuous`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub actions: u32,
    pub errors: u32,
    pub ticks: u32,
}

/// Drives stories in one project through their lifecycle.
pub struct Workflow<'a, A, V, N> {
    project_dir: PathBuf,
    stories_dir: PathBuf,
    settings: WorkflowConfig,
    instructions: Instructions,
    agent: &'a A,
    vcs: &'a V,
    notifier: &'a N,
}

impl<'a, A: Agent, V: VersionControl, N: Notifier> Workflow<'a, A, V, N> {
    pub fn new(
        project_dir: &Path,
        config: &Config,
        agent: &'a A,
        vcs: &'a V,
        notifier: &'a N,
    ) -> Result<Self> {
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            stories_dir: config.stories_path(project_dir),
            settings: config.workflow.clone(),
            instructions: Instructions::new(&config.instructions)?,
            agent,
            vcs,
            notifier,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Evaluate the rules once and perform at most one action.
    #[instrument(skip_all)]
    pub fn tick(&self, log: &mut CommandLog) -> Result<TickOutcome> {
        if let Some(mut story) = self.find(StoryStatus::Draft)? {
            self.transition(&mut story, StoryStatus::Approved)?;
            return Ok(TickOutcome::Approved { story: story.name });
        }

        if let Some(story) = self.find(StoryStatus::Approved)? {
            return self.advance_approved(story, log);
        }

        if let Some(story) = self.find(StoryStatus::ReadyForReview)? {
            return self.complete(story, log);
        }

        if self.settings.auto_draft {
            let committed = self.commit_pending(log)?;
            let instruction = self.instructions.draft()?;
            self.dispatch(CommandKind::Draft, &instruction, log)?;
            return Ok(TickOutcome::Drafted { committed });
        }

        if self.commit_pending(log)? {
            return Ok(TickOutcome::Committed);
        }

        Ok(TickOutcome::NoWork)
    }

    /// Tick until `no_work_limit` consecutive ticks find nothing to do.
    ///
    /// Tick errors are logged and followed by `error_pause`; they never end
    /// the loop and do not count towards the no-work limit.
    pub fn run_continuous(&self) -> LoopSummary {
        let mut log = CommandLog::new();
        let mut summary = LoopSummary::default();
        let mut idle_ticks = 0u32;

        while idle_ticks < self.settings.no_work_limit {
            summary.ticks += 1;
            match self.tick(&mut log) {
                Ok(outcome) if outcome.is_work() => {
                    idle_ticks = 0;
                    summary.actions += 1;
                    debug!(?outcome, "tick finished");
                }
                Ok(_) => {
                    idle_ticks += 1;
                    info!(
                        idle_ticks,
                        limit = self.settings.no_work_limit,
                        "no work available"
                    );
                    if idle_ticks < self.settings.no_work_limit {
                        thread::sleep(self.settings.idle_pause());
                    }
                }
                Err(err) => {
                    summary.errors += 1;
                    error!(err = %format!("{err:#}"), "tick failed");
                    thread::sleep(self.settings.error_pause());
                }
            }
        }

        info!(
            actions = summary.actions,
            errors = summary.errors,
            ticks = summary.ticks,
            "workflow drained"
        );
        summary
    }

    fn advance_approved(&self, mut story: Story, log: &mut CommandLog) -> Result<TickOutcome> {
        let tasks = story.tasks();
        let Some(task) = next_task(&tasks) else {
            self.transition(&mut story, StoryStatus::ReadyForReview)?;
            return Ok(TickOutcome::ReadyForReview { story: story.name });
        };

        let remaining = uncompleted_tasks(&tasks).iter().map(Task::count).sum::<usize>();
        info!(
            story = %story.name,
            task = %task.id,
            name = %task.name,
            remaining,
            "developing task"
        );
        let instruction = self
            .instructions
            .develop(&task.id, &task.name, &story.name)?;
        self.dispatch(CommandKind::Dev, &instruction, log)?;
        Ok(TickOutcome::Developed {
            story: story.name,
            task_id: task.id.clone(),
        })
    }

    fn complete(&self, mut story: Story, log: &mut CommandLog) -> Result<TickOutcome> {
        let instruction = self.instructions.review(&story.name)?;
        self.dispatch(CommandKind::Qa, &instruction, log)?;
        self.transition(&mut story, StoryStatus::Done)?;

        let instruction = self.instructions.commit()?;
        self.dispatch(CommandKind::Commit, &instruction, log)?;

        let report = StoryReport {
            story_name: story.name.clone(),
            project_dir: self.project_dir.clone(),
            commands: log.commands().to_vec(),
            git_before: log.baseline().cloned(),
            git_after: self
                .vcs
                .snapshot()
                .inspect_err(|err| warn!(err = %format!("{err:#}"), "git snapshot failed"))
                .ok(),
            push_status: self.push_status(),
            commit_message: log.commit_message().map(str::to_string),
        };
        self.notifier.notify(&report);
        info!(
            story = %story.name,
            commands = report.commands.len(),
            duration_s = log.total_duration().as_secs(),
            "story completed"
        );
        log.reset();
        Ok(TickOutcome::Completed { story: story.name })
    }

    /// Ask the agent to commit when the tree is dirty. Returns whether it did.
    fn commit_pending(&self, log: &mut CommandLog) -> Result<bool> {
        if !self.vcs.has_uncommitted_changes()? {
            return Ok(false);
        }
        info!("committing uncommitted changes");
        let instruction = self.instructions.commit()?;
        self.dispatch(CommandKind::Commit, &instruction, log)?;
        Ok(true)
    }

    fn dispatch(
        &self,
        kind: CommandKind,
        instruction: &str,
        log: &mut CommandLog,
    ) -> Result<AgentResult> {
        if log.needs_baseline() {
            match self.vcs.snapshot() {
                Ok(snapshot) => log.set_baseline(snapshot),
                Err(err) => warn!(err = %format!("{err:#}"), "git baseline snapshot failed"),
            }
        }
        let started = Utc::now();
        let result = self.agent.send(instruction, &self.project_dir)?;
        info!(
            kind = %kind,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "agent finished"
        );
        log.record(CommandRecord::from_result(kind, &result, started));
        Ok(result)
    }

    fn push_status(&self) -> PushStatus {
        self.vcs.push_status().unwrap_or_else(|err| {
            warn!(err = %format!("{err:#}"), "push status unavailable");
            PushStatus::default()
        })
    }

    fn find(&self, status: StoryStatus) -> Result<Option<Story>> {
        find_story_by_status(&self.stories_dir, status.as_str())
    }

    fn transition(&self, story: &mut Story, status: StoryStatus) -> Result<()> {
        let from = story.status.clone();
        if !update_story_status(story, status.as_str())? {
            return Err(anyhow!("story {} has no status marker", story.name));
        }
        info!(story = %story.name, from = %from, to = %status, "story status updated");
        Ok(())
    }
}
