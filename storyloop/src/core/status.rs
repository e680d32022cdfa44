//! Story status vocabulary and the `## Status` marker.
//!
//! A story records its lifecycle state as a level-2 heading titled `Status`
//! followed by a single-line paragraph holding the value:
//!
//! ```text
//! ## Status
//!
//! Approved
//! ```
//!
//! Documents without that shape have no status. Replacement rewrites only the
//! value span so every other byte of the document survives untouched.

use std::fmt;
use std::ops::Range;

use crate::core::markdown::{Line, Setext, find_heading, is_paragraph_text, scan_lines};

const STATUS_HEADING: &str = "Status";

/// Lifecycle states a story moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryStatus {
    Draft,
    Approved,
    ReadyForReview,
    Done,
}

impl StoryStatus {
    pub const ALL: [StoryStatus; 4] = [
        StoryStatus::Draft,
        StoryStatus::Approved,
        StoryStatus::ReadyForReview,
        StoryStatus::Done,
    ];

    /// Exact marker text for this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Approved => "Approved",
            Self::ReadyForReview => "Ready for Review",
            Self::Done => "Done",
        }
    }

    /// Case-sensitive match against the marker text.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a status value inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMarker {
    /// Byte range of the trimmed value text.
    pub span: Range<usize>,
    pub value: String,
}

/// Locate the status value following the first level-2 `Status` heading.
pub fn find_status_marker(content: &str) -> Option<StatusMarker> {
    let lines = scan_lines(content);
    let heading = find_heading(&lines, 2, STATUS_HEADING)?;
    let (offset, line) = lines
        .iter()
        .enumerate()
        .skip(heading + 1)
        .find(|(_, line)| !line.is_blank() && line.setext != Some(Setext::Underline))?;
    if !is_paragraph_text(line) || !paragraph_ends_after(&lines, offset) {
        return None;
    }

    let value = line.text.trim();
    let lead = line.text.len() - line.text.trim_start().len();
    let start = line.start + lead;
    Some(StatusMarker {
        span: start..start + value.len(),
        value: value.to_string(),
    })
}

/// Status value of a document, if it carries a well-formed marker.
pub fn extract_status(content: &str) -> Option<String> {
    find_status_marker(content).map(|marker| marker.value)
}

/// Return `content` with the status value replaced, or `None` without a marker.
pub fn replace_status(content: &str, new_status: &str) -> Option<String> {
    let marker = find_status_marker(content)?;
    let mut updated = String::with_capacity(content.len() + new_status.len());
    updated.push_str(&content[..marker.span.start]);
    updated.push_str(new_status);
    updated.push_str(&content[marker.span.end..]);
    Some(updated)
}

/// A single-line paragraph ends at a blank line, a heading or end of input.
/// Anything else would be a lazy continuation of the same paragraph.
fn paragraph_ends_after(lines: &[Line<'_>], index: usize) -> bool {
    match lines.get(index + 1) {
        None => true,
        Some(next) => next.is_blank() || next.heading().is_some() || next.in_fence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = "# Story 1.2: Login\n\n## Status\n\nDraft\n\n## Story\n\nAs a user...\n";

    #[test]
    fn extracts_status_value() {
        assert_eq!(extract_status(STORY).as_deref(), Some("Draft"));
    }

    #[test]
    fn status_without_blank_line_is_found() {
        let doc = "## Status\nReady for Review\n";
        assert_eq!(extract_status(doc).as_deref(), Some("Ready for Review"));
    }

    #[test]
    fn missing_or_malformed_marker_has_no_status() {
        assert_eq!(extract_status("# Story\n\nno status here\n"), None);
        assert_eq!(extract_status("### Status\n\nDraft\n"), None);
        assert_eq!(extract_status("## Status\n\n- Draft\n"), None);
        assert_eq!(extract_status("## Status\n\nDraft\nstill paragraph\n"), None);
        assert_eq!(extract_status("## Status\n"), None);
    }

    #[test]
    fn underlined_status_heading_is_a_marker() {
        let doc = "Status\n------\n\nApproved\n";
        assert_eq!(extract_status(doc).as_deref(), Some("Approved"));
        assert_eq!(
            replace_status(doc, "Done").as_deref(),
            Some("Status\n------\n\nDone\n")
        );
    }

    #[test]
    fn underlined_value_is_not_a_status() {
        assert_eq!(extract_status("## Status\n\nDraft\n-----\n"), None);
    }

    #[test]
    fn status_in_code_fence_is_ignored() {
        let doc = "```md\n## Status\n\nDraft\n```\n";
        assert_eq!(extract_status(doc), None);
    }

    #[test]
    fn replace_touches_only_the_value() {
        let updated = replace_status(STORY, "Approved").expect("marker");
        assert_eq!(
            updated,
            "# Story 1.2: Login\n\n## Status\n\nApproved\n\n## Story\n\nAs a user...\n"
        );
    }

    #[test]
    fn replace_preserves_crlf_and_indentation() {
        let doc = "## Status\r\n\r\n  Draft  \r\n\r\nbody\r\n";
        let updated = replace_status(doc, "Done").expect("marker");
        assert_eq!(updated, "## Status\r\n\r\n  Done  \r\n\r\nbody\r\n");
    }

    #[test]
    fn replace_is_idempotent() {
        let once = replace_status(STORY, "Approved").expect("first");
        let twice = replace_status(&once, "Approved").expect("second");
        assert_eq!(once, twice);
    }

    #[test]
    fn replace_with_same_value_round_trips() {
        let same = replace_status(STORY, "Draft").expect("marker");
        assert_eq!(same, STORY);
        assert_eq!(extract_status(&same).as_deref(), Some("Draft"));
    }

    #[test]
    fn replace_without_marker_returns_none() {
        assert_eq!(replace_status("# Title\n", "Done"), None);
    }

    #[test]
    fn only_first_status_heading_counts() {
        let doc = "## Status\n\n- nope\n\n## Status\n\nDraft\n";
        assert_eq!(extract_status(doc), None);
    }

    #[test]
    fn status_vocabulary_is_case_sensitive() {
        assert_eq!(StoryStatus::parse("Ready for Review"), Some(StoryStatus::ReadyForReview));
        assert_eq!(StoryStatus::parse("draft"), None);
        assert_eq!(StoryStatus::Done.to_string(), "Done");
    }
}
