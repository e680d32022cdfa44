//! Per-story command log.
//!
//! Every agent invocation made while a story is in flight is recorded here and
//! flushed into the completion notification. The log is owned by the workflow
//! loop and passed into each tick; it is reset once a story is reported.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::instructions::CommandKind;
use crate::io::agent::AgentResult;
use crate::io::git::GitSnapshot;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
        .expect("ansi regex should be valid")
});

/// `git commit` summary line: `[main 1a2b3c4] message`.
static COMMIT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]\s]+(?: \([^)]*\))? [0-9a-f]{7,40}\] (.+)")
        .expect("commit line regex should be valid")
});

/// One recorded agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub kind: CommandKind,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub exit_code: i32,
    pub commit_message: Option<String>,
}

impl CommandRecord {
    pub fn from_result(kind: CommandKind, result: &AgentResult, timestamp: DateTime<Utc>) -> Self {
        let commit_message = match kind {
            CommandKind::Commit => extract_commit_message(&result.output),
            _ => None,
        };
        Self {
            kind,
            duration: result.duration,
            timestamp,
            exit_code: result.exit_code,
            commit_message,
        }
    }
}

/// Commands recorded for the story currently in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLog {
    commands: Vec<CommandRecord>,
    /// Working tree state before the first recorded command.
    baseline: Option<GitSnapshot>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: CommandRecord) {
        self.commands.push(record);
    }

    pub fn commands(&self) -> &[CommandRecord] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn baseline(&self) -> Option<&GitSnapshot> {
        self.baseline.as_ref()
    }

    pub fn needs_baseline(&self) -> bool {
        self.baseline.is_none()
    }

    pub fn set_baseline(&mut self, snapshot: GitSnapshot) {
        self.baseline = Some(snapshot);
    }

    pub fn total_duration(&self) -> Duration {
        self.commands.iter().map(|c| c.duration).sum()
    }

    /// Message of the most recent commit that printed one.
    pub fn commit_message(&self) -> Option<&str> {
        self.commands
            .iter()
            .rev()
            .find_map(|c| c.commit_message.as_deref())
    }

    /// Start over for the next story.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.baseline = None;
    }
}

/// Pull the last `git commit` summary out of an agent transcript.
pub fn extract_commit_message(transcript: &str) -> Option<String> {
    let plain = ANSI_RE.replace_all(transcript, "");
    plain.lines().rev().find_map(|line| {
        let caps = COMMIT_LINE_RE.captures(line)?;
        let message = caps.get(1)?.as_str().trim();
        (!message.is_empty()).then(|| message.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(output: &str, ms: u64) -> AgentResult {
        AgentResult {
            output: output.to_string(),
            exit_code: 0,
            duration: Duration::from_millis(ms),
            instruction: "/commit".to_string(),
        }
    }

    #[test]
    fn extracts_commit_summary_from_transcript() {
        let transcript = "Staging files...\n\
                          \x1b[32m[main 3f2a9c1] feat: add login form\x1b[0m\n \
                          3 files changed, 40 insertions(+)\n";
        assert_eq!(
            extract_commit_message(transcript).as_deref(),
            Some("feat: add login form")
        );
    }

    #[test]
    fn root_commit_and_last_match_win() {
        let transcript =
            "[main (root-commit) abcdef1] chore: init\n[feature/x 1234567890] fix: later\n";
        assert_eq!(extract_commit_message(transcript).as_deref(), Some("fix: later"));
        assert_eq!(extract_commit_message("nothing to commit, working tree clean"), None);
    }

    #[test]
    fn only_commit_records_carry_messages() {
        let now = Utc::now();
        let dev = CommandRecord::from_result(CommandKind::Dev, &result("[main abcdef1] x", 5), now);
        assert_eq!(dev.commit_message, None);
        let commit =
            CommandRecord::from_result(CommandKind::Commit, &result("[main abcdef1] x", 5), now);
        assert_eq!(commit.commit_message.as_deref(), Some("x"));
    }

    #[test]
    fn log_totals_and_resets() {
        let now = Utc::now();
        let mut log = CommandLog::new();
        assert!(log.needs_baseline());
        log.set_baseline(GitSnapshot::default());
        log.record(CommandRecord::from_result(CommandKind::Dev, &result("", 1500), now));
        log.record(CommandRecord::from_result(
            CommandKind::Commit,
            &result("[main 1111111] first", 500),
            now,
        ));
        log.record(CommandRecord::from_result(CommandKind::Commit, &result("", 10), now));
        assert_eq!(log.total_duration(), Duration::from_millis(2010));
        assert_eq!(log.commit_message(), Some("first"));

        log.reset();
        assert!(log.is_empty());
        assert!(log.needs_baseline());
    }
}
