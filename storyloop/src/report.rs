//! Overview of every story for `storyloop --report`.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::selector::uncompleted_tasks;
use crate::core::task::Task;
use crate::io::stories::{Story, list_stories};

/// One block per story, sorted by file name, listing outstanding tasks.
pub fn render_report(stories_dir: &Path) -> Result<String> {
    let mut stories = list_stories(stories_dir)?;
    stories.sort_by(|a, b| a.name.cmp(&b.name));

    if stories.is_empty() {
        return Ok(format!("No stories found in {}\n", stories_dir.display()));
    }

    let mut out = String::new();
    for story in &stories {
        render_story(&mut out, story);
    }
    Ok(out)
}

/// Machine-readable entry for `--report --json`.
#[derive(Debug, Serialize)]
pub struct StorySummary {
    pub name: String,
    pub status: String,
    pub open_tasks: Vec<Task>,
}

/// Same content as [`render_report`] as a pretty JSON array.
pub fn render_report_json(stories_dir: &Path) -> Result<String> {
    let mut stories = list_stories(stories_dir)?;
    stories.sort_by(|a, b| a.name.cmp(&b.name));
    let summaries: Vec<StorySummary> = stories
        .into_iter()
        .map(|story| StorySummary {
            open_tasks: uncompleted_tasks(&story.tasks()),
            name: story.name,
            status: story.status,
        })
        .collect();
    let mut payload = serde_json::to_string_pretty(&summaries).context("serialize report")?;
    payload.push('\n');
    Ok(payload)
}

fn render_story(out: &mut String, story: &Story) {
    let _ = writeln!(out, "{} [{}]", story.name, story.status);
    let open = uncompleted_tasks(&story.tasks());
    if open.is_empty() {
        let _ = writeln!(out, "  (no open tasks)");
    }
    render_tasks(out, &open, 1);
}

fn render_tasks(out: &mut String, tasks: &[Task], depth: usize) {
    for task in tasks {
        let mark = if task.completed { 'x' } else { ' ' };
        let _ = writeln!(
            out,
            "{:indent$}[{mark}] {} {}",
            "",
            task.id,
            task.name,
            indent = depth * 2
        );
        render_tasks(out, &task.subtasks, depth + 1);
    }
}
