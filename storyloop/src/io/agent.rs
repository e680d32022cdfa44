//! Agent abstraction for instruction dispatch.
//!
//! The [`Agent`] trait decouples the workflow from the actual coding agent
//! (by default the `claude` CLI). Tests use scripted agents that return
//! predetermined transcripts without spawning processes.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use portable_pty::CommandBuilder;
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::{LivenessPolicy, TIMEOUT_EXIT_CODE, run_streaming};

/// Outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    /// Full terminal transcript.
    pub output: String,
    pub exit_code: i32,
    pub duration: Duration,
    /// Instruction the agent was given.
    pub instruction: String,
}

impl AgentResult {
    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

/// Abstraction over coding agent backends.
pub trait Agent {
    /// Run `instruction` with `workdir` as the working directory.
    ///
    /// A non-zero exit or a liveness kill is reported in the result; only
    /// failing to start the agent is an error.
    fn send(&self, instruction: &str, workdir: &Path) -> Result<AgentResult>;
}

/// Agent that runs a CLI program in a pseudo-terminal and watches its output
/// for liveness.
#[derive(Debug, Clone)]
pub struct CliAgent {
    program: PathBuf,
    config: AgentConfig,
}

impl CliAgent {
    /// Resolve the configured executable; a missing agent is a startup error.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let program = resolve_executable(&config.program)?;
        debug!(program = %program.display(), "resolved agent executable");
        Ok(Self {
            program,
            config: config.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, instruction: &str) -> Vec<String> {
        let mut args = self.config.args.clone();
        if self.config.verbose {
            args.push("--verbose".to_string());
        }
        if let Some(max_turns) = self.config.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(instruction.to_string());
        args
    }

    fn policy(&self) -> LivenessPolicy {
        self.config.liveness()
    }
}

impl Agent for CliAgent {
    #[instrument(skip_all, fields(workdir = %workdir.display()))]
    fn send(&self, instruction: &str, workdir: &Path) -> Result<AgentResult> {
        let args = self.args(instruction);
        info!("> {} {}", self.config.program, args.join(" "));

        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&args);
        cmd.cwd(workdir);

        let out = run_streaming(cmd, &self.policy(), self.config.echo_output)
            .with_context(|| format!("run agent {}", self.program.display()))?;

        if out.timed_out {
            warn!(
                duration_ms = out.duration.as_millis() as u64,
                "agent went quiet after minimum runtime and was killed"
            );
        } else if out.exit_code != 0 {
            warn!(exit_code = out.exit_code, "agent exited with non-zero status");
        }

        Ok(AgentResult {
            output: out.output_lossy(),
            exit_code: out.exit_code,
            duration: out.duration,
            instruction: instruction.to_string(),
        })
    }
}

/// Find an executable: paths are checked directly, bare names on `PATH`.
pub fn resolve_executable(program: &str) -> Result<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(anyhow!("agent executable not found: {program}"));
    }

    let path = env::var_os("PATH").ok_or_else(|| anyhow!("PATH is not set"))?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
        .ok_or_else(|| anyhow!("agent executable '{program}' not found on PATH"))
}
