//! Story documents on disk: scanning, status lookup and status writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::status::{extract_status, replace_status};
use crate::core::task::{Task, parse_tasks};

/// One story document as read from the stories directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    /// File name, e.g. `1.2.story.md`.
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    pub modified: SystemTime,
    pub status: String,
}

impl Story {
    pub fn tasks(&self) -> Vec<Task> {
        parse_tasks(&self.content)
    }
}

/// Read every `*.md` document directly inside `stories_dir` that carries a
/// status marker. A missing directory yields no stories.
pub fn list_stories(stories_dir: &Path) -> Result<Vec<Story>> {
    if !stories_dir.is_dir() {
        debug!(dir = %stories_dir.display(), "stories directory missing");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(stories_dir)
        .with_context(|| format!("read stories dir {}", stories_dir.display()))?;
    let mut stories = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", stories_dir.display()))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "md") || !path.is_file() {
            continue;
        }
        match read_story(&path) {
            Ok(Some(story)) => stories.push(story),
            Ok(None) => debug!(path = %path.display(), "no status marker, ignoring"),
            Err(err) => warn!(
                path = %path.display(),
                err = %format!("{err:#}"),
                "skipping unreadable story"
            ),
        }
    }
    Ok(stories)
}

/// Most recently modified story whose status equals `status` exactly.
///
/// Ties on modification time may resolve to any of the tied stories.
pub fn find_story_by_status(stories_dir: &Path, status: &str) -> Result<Option<Story>> {
    let story = list_stories(stories_dir)?
        .into_iter()
        .filter(|story| story.status == status)
        .max_by_key(|story| story.modified);
    if let Some(story) = &story {
        debug!(name = %story.name, status, "story selected");
    }
    Ok(story)
}

/// Rewrite the story's status marker on disk.
///
/// Returns `Ok(false)` without writing when the story has no marker. On
/// success the in-memory story is updated to match the file.
pub fn update_story_status(story: &mut Story, new_status: &str) -> Result<bool> {
    let Some(updated) = replace_status(&story.content, new_status) else {
        warn!(name = %story.name, "status marker not found, not updating");
        return Ok(false);
    };
    write_atomic(&story.path, &updated)?;
    story.content = updated;
    story.status = new_status.to_string();
    story.modified = fs::metadata(&story.path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("stat {}", story.path.display()))?;
    debug!(name = %story.name, status = new_status, "story status written");
    Ok(true)
}

fn read_story(path: &Path) -> Result<Option<Story>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read story {}", path.display()))?;
    let Some(status) = extract_status(&content) else {
        return Ok(None);
    };
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("stat {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Some(Story {
        name,
        path: path.to_path_buf(),
        content,
        modified,
        status,
    }))
}

/// Write via a sibling temp file + rename so a crash never leaves half a story.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("md.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp story {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace story {}", path.display()))?;
    Ok(())
}
