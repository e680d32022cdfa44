//! Workflow configuration stored under `.storyloop/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::instructions::InstructionTemplates;
use crate::io::process::LivenessPolicy;

/// Config file location relative to the project directory.
pub const CONFIG_RELATIVE_PATH: &str = ".storyloop/config.toml";

/// Environment variable consulted when `notify.webhook_url` is unset.
pub const WEBHOOK_URL_ENV: &str = "DISCORD_WEBHOOK_URL";

/// Storyloop configuration (TOML).
///
/// The file is optional and meant to be edited by humans. Missing fields
/// default to the values the BMad workflow expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Story documents directory, relative to the project directory.
    pub stories_dir: PathBuf,

    pub agent: AgentConfig,

    pub workflow: WorkflowConfig,

    pub instructions: InstructionTemplates,

    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable, either a bare name searched on `PATH` or a path.
    pub program: String,

    /// Arguments passed before the instruction.
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    pub verbose: bool,

    /// Echo the agent transcript to stdout while it runs.
    pub echo_output: bool,

    /// Runtime before a silent agent may be considered hung.
    pub min_runtime_secs: u64,

    /// Silence after the first output chunk that counts as hung.
    pub idle_timeout_secs: u64,

    pub poll_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--dangerously-skip-permissions".to_string()],
            model: None,
            max_turns: None,
            verbose: false,
            echo_output: true,
            min_runtime_secs: 30,
            idle_timeout_secs: 5,
            poll_interval_ms: 250,
        }
    }
}

impl AgentConfig {
    pub fn liveness(&self) -> LivenessPolicy {
        LivenessPolicy {
            min_runtime: Duration::from_secs(self.min_runtime_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Consecutive no-work ticks before the loop stops.
    pub no_work_limit: u32,

    /// Pause after a tick that found no work.
    pub idle_pause_secs: u64,

    /// Pause after a tick that failed.
    pub error_pause_secs: u64,

    /// Ask the agent for a new draft whenever no story is in `Draft`.
    pub auto_draft: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            no_work_limit: 3,
            idle_pause_secs: 30,
            error_pause_secs: 10,
            auto_draft: true,
        }
    }
}

impl WorkflowConfig {
    pub fn idle_pause(&self) -> Duration {
        Duration::from_secs(self.idle_pause_secs)
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_secs(self.error_pause_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Display name of the posting bot.
    pub username: String,

    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "BMAD Workflow Bot".to_string(),
            timeout_secs: 10,
        }
    }
}

impl NotifyConfig {
    /// Configured webhook URL, falling back to `DISCORD_WEBHOOK_URL`.
    pub fn resolved_webhook_url(&self) -> Option<String> {
        self.webhook_url
            .clone()
            .or_else(|| std::env::var(WEBHOOK_URL_ENV).ok())
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stories_dir: PathBuf::from("docs/stories"),
            agent: AgentConfig::default(),
            workflow: WorkflowConfig::default(),
            instructions: InstructionTemplates::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.stories_dir.as_os_str().is_empty() {
            return Err(anyhow!("stories_dir must not be empty"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must not be empty"));
        }
        if self.agent.min_runtime_secs == 0 {
            return Err(anyhow!("agent.min_runtime_secs must be > 0"));
        }
        if self.agent.idle_timeout_secs == 0 {
            return Err(anyhow!("agent.idle_timeout_secs must be > 0"));
        }
        if self.agent.poll_interval_ms == 0 {
            return Err(anyhow!("agent.poll_interval_ms must be > 0"));
        }
        if self.workflow.no_work_limit == 0 {
            return Err(anyhow!("workflow.no_work_limit must be > 0"));
        }
        if self.notify.timeout_secs == 0 {
            return Err(anyhow!("notify.timeout_secs must be > 0"));
        }
        self.instructions
            .validate()
            .context("invalid instruction template")?;
        Ok(())
    }

    /// Absolute stories directory for a project.
    pub fn stories_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.stories_dir)
    }
}

/// Default config path for a project directory.
pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_RELATIVE_PATH)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        let mut cfg = Config::default();
        cfg.agent.model = Some("opus".to_string());
        cfg.workflow.auto_draft = false;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "stories_dir = \"stories\"\n\n[workflow]\nno_work_limit = 5\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.stories_dir, PathBuf::from("stories"));
        assert_eq!(cfg.workflow.no_work_limit, 5);
        assert_eq!(cfg.workflow.idle_pause_secs, 30);
        assert_eq!(cfg.agent.program, "claude");
    }

    #[test]
    fn rejects_zero_limits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\nidle_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("idle_timeout_secs"));
    }

    #[test]
    fn rejects_broken_instruction_template() {
        let mut cfg = Config::default();
        cfg.instructions.develop = "{{ task_id".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn liveness_uses_configured_durations() {
        let policy = AgentConfig::default().liveness();
        assert_eq!(policy.min_runtime, Duration::from_secs(30));
        assert_eq!(policy.idle_timeout, Duration::from_secs(5));
    }
}
