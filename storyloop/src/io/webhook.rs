//! Story completion notifications.
//!
//! Reports are posted as a Discord-style embed. Notifications are best effort:
//! a missing webhook URL or a failed delivery is logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::analytics::CommandRecord;
use crate::io::config::NotifyConfig;
use crate::io::git::{GitSnapshot, PushStatus};

const EMBED_COLOR: u32 = 0x00ff00;
const COMMIT_MESSAGE_LIMIT: usize = 100;

/// Everything a completion notification summarizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryReport {
    pub story_name: String,
    pub project_dir: PathBuf,
    pub commands: Vec<CommandRecord>,
    pub git_before: Option<GitSnapshot>,
    pub git_after: Option<GitSnapshot>,
    pub push_status: PushStatus,
    pub commit_message: Option<String>,
}

/// Sink for story completion reports. Implementations never fail the caller.
pub trait Notifier {
    fn notify(&self, report: &StoryReport);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Posts reports to a webhook URL with a blocking HTTP client.
pub struct WebhookNotifier {
    url: Option<String>,
    username: String,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("storyloop/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build webhook http client")?;
        Ok(Self {
            url: config.resolved_webhook_url(),
            username: config.username.clone(),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    fn send(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .context("send webhook")?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(anyhow!("webhook returned {status}: {}", body.trim()))
    }
}

impl Notifier for WebhookNotifier {
    #[instrument(skip_all, fields(story = %report.story_name))]
    fn notify(&self, report: &StoryReport) {
        let Some(url) = &self.url else {
            info!("no webhook URL configured, skipping notification");
            return;
        };
        let payload = build_payload(report, &self.username, Utc::now());
        match self.send(url, &payload) {
            Ok(()) => info!("story report delivered"),
            Err(err) => warn!(err = %format!("{err:#}"), "failed to deliver story report"),
        }
    }
}

/// Build the embed payload for a finished story.
pub fn build_payload(report: &StoryReport, username: &str, now: DateTime<Utc>) -> WebhookPayload {
    let total: Duration = report.commands.iter().map(|c| c.duration).sum();
    let total_minutes = total.as_secs_f64() / 60.0;

    let push_status = if report.push_status.synced {
        "✅ All changes pushed".to_string()
    } else {
        format!("⏳ {} commits ahead", report.push_status.ahead)
    };

    let commit_message = report
        .commit_message
        .as_deref()
        .unwrap_or("No commit message found");

    let mut fields = vec![
        EmbedField {
            name: "⏰ Story Duration".to_string(),
            value: format!("{total_minutes:.2} minutes"),
            inline: true,
        },
        EmbedField {
            name: "🔧 Commands Executed".to_string(),
            value: format!("{} commands", report.commands.len()),
            inline: true,
        },
        EmbedField {
            name: "📊 Git Changes".to_string(),
            value: git_changes(report.git_before.as_ref(), report.git_after.as_ref()),
            inline: true,
        },
        EmbedField {
            name: "🔄 Push Status".to_string(),
            value: push_status,
            inline: true,
        },
        EmbedField {
            name: "💬 Commit Message".to_string(),
            value: truncate(commit_message, COMMIT_MESSAGE_LIMIT),
            inline: false,
        },
    ];
    fields.extend(report.commands.iter().map(|cmd| EmbedField {
        name: format!("🔧 {}", cmd.kind),
        value: format!(
            "⏱️ {:.2}s\n🕐 {}",
            cmd.duration.as_secs_f64(),
            cmd.timestamp.with_timezone(&Local).format("%H:%M:%S")
        ),
        inline: true,
    }));

    WebhookPayload {
        username: username.to_string(),
        embeds: vec![Embed {
            title: "📖 Story Completed!".to_string(),
            description: format!(
                "**{}** has been successfully completed!\n\n🚀 **Project:** {}",
                report.story_name,
                project_name(&report.project_dir)
            ),
            color: EMBED_COLOR,
            fields,
            footer: EmbedFooter {
                text: format!(
                    "BMAD Workflow Engine • Completed at {}",
                    now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                ),
            },
            timestamp: now.to_rfc3339(),
        }],
    }
}

fn git_changes(before: Option<&GitSnapshot>, after: Option<&GitSnapshot>) -> String {
    match (before, after) {
        (Some(before), Some(after)) => {
            let added = after.files.len() as i64 - before.files.len() as i64;
            let mut out = format!(
                "📁 Files: {} → {}\n📈 Added: {added}",
                before.files.len(),
                after.files.len()
            );
            // `git diff --stat` ends with its "N files changed" summary.
            if let Some(summary) = after.diff_stat.lines().last().map(str::trim)
                && !summary.is_empty()
            {
                out.push_str("\n📝 Uncommitted: ");
                out.push_str(summary);
            }
            out
        }
        _ => "No git changes tracked".to_string(),
    }
}

fn project_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::CommandKind;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn record(kind: CommandKind, secs: u64) -> CommandRecord {
        CommandRecord {
            kind,
            duration: Duration::from_secs(secs),
            timestamp: Utc::now(),
            exit_code: 0,
            commit_message: None,
        }
    }

    fn report() -> StoryReport {
        StoryReport {
            story_name: "1.2.story.md".to_string(),
            project_dir: PathBuf::from("/work/acme-app"),
            commands: vec![record(CommandKind::Dev, 90), record(CommandKind::Qa, 30)],
            git_before: Some(GitSnapshot {
                files: vec!["?? a".to_string()],
                diff_stat: String::new(),
            }),
            git_after: Some(GitSnapshot {
                files: vec!["?? a".to_string(), " M b".to_string(), " M c".to_string()],
                diff_stat: String::new(),
            }),
            push_status: PushStatus {
                ahead: 2,
                behind: 0,
                synced: false,
            },
            commit_message: None,
        }
    }

    fn field<'a>(payload: &'a WebhookPayload, name: &str) -> &'a EmbedField {
        payload.embeds[0]
            .fields
            .iter()
            .find(|f| f.name.ends_with(name))
            .expect("field present")
    }

    #[test]
    fn payload_summarizes_story() {
        let payload = build_payload(&report(), "bot", Utc::now());
        assert_eq!(payload.username, "bot");
        let embed = &payload.embeds[0];
        assert!(embed.description.contains("**1.2.story.md**"));
        assert!(embed.description.contains("acme-app"));
        assert_eq!(field(&payload, "Story Duration").value, "2.00 minutes");
        assert_eq!(field(&payload, "Commands Executed").value, "2 commands");
        assert_eq!(
            field(&payload, "Git Changes").value,
            "📁 Files: 1 → 3\n📈 Added: 2"
        );
        assert_eq!(field(&payload, "Push Status").value, "⏳ 2 commits ahead");
        assert_eq!(
            field(&payload, "Commit Message").value,
            "No commit message found"
        );
        assert_eq!(embed.fields.len(), 5 + 2);
        assert!(embed.fields[5].name.ends_with("dev"));
        assert!(embed.fields[5].value.starts_with("⏱️ 90.00s"));
    }

    #[test]
    fn missing_snapshots_and_long_messages() {
        let mut report = report();
        report.git_before = None;
        report.commit_message = Some("x".repeat(150));
        report.push_status = PushStatus {
            ahead: 0,
            behind: 0,
            synced: true,
        };
        let payload = build_payload(&report, "bot", Utc::now());
        assert_eq!(field(&payload, "Git Changes").value, "No git changes tracked");
        assert_eq!(field(&payload, "Push Status").value, "✅ All changes pushed");
        let message = &field(&payload, "Commit Message").value;
        assert_eq!(message.len(), 103);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn uncommitted_diff_summary_is_shown() {
        let mut report = report();
        if let Some(after) = report.git_after.as_mut() {
            after.diff_stat =
                " b | 3 ++-\n c | 1 +\n 2 files changed, 3 insertions(+), 1 deletion(-)"
                    .to_string();
        }
        let payload = build_payload(&report, "bot", Utc::now());
        assert_eq!(
            field(&payload, "Git Changes").value,
            "📁 Files: 1 → 3\n📈 Added: 2\n\
             📝 Uncommitted: 2 files changed, 3 insertions(+), 1 deletion(-)"
        );
    }

    #[test]
    fn unconfigured_notifier_is_a_no_op() {
        let notifier = WebhookNotifier {
            url: None,
            username: "bot".to_string(),
            client: reqwest::blocking::Client::new(),
        };
        assert!(!notifier.is_configured());
        notifier.notify(&report());
    }

    #[test]
    fn delivery_failure_is_swallowed() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let notifier = WebhookNotifier {
            url: Some(format!("http://{addr}/hook")),
            username: "bot".to_string(),
            client: reqwest::blocking::Client::new(),
        };
        notifier.notify(&report());
    }

    #[test]
    fn posts_json_payload_to_webhook() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut content_length = 0usize;
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header");
                if line.trim().is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("length");
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("body");
            stream
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                .expect("respond");
            (request_line, String::from_utf8(body).expect("utf8 body"))
        });

        let notifier = WebhookNotifier {
            url: Some(format!("http://{addr}/hook")),
            username: "BMAD Workflow Bot".to_string(),
            client: reqwest::blocking::Client::new(),
        };
        notifier.notify(&report());

        let (request_line, body) = server.join().expect("server thread");
        assert!(request_line.starts_with("POST /hook"));
        let json: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(json["username"], "BMAD Workflow Bot");
        assert_eq!(json["embeds"][0]["title"], "📖 Story Completed!");
        assert_eq!(json["embeds"][0]["color"], 0x00ff00);
    }
}
