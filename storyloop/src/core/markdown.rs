//! Line-level markdown scanning shared by the status and task parsers.
//!
//! Only the block structure the story documents rely on is recognised:
//! ATX and setext headings, fenced code blocks, list items, thematic breaks
//! and plain paragraph lines.
//! Byte offsets are kept so callers can rewrite spans in place.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?[ \t]*$").expect("heading regex should be valid")
});

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").expect("fence regex should be valid"));

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)([-*+]|\d{1,9}[.)])([ \t]+|$)").expect("list item regex should be valid")
});

static SETEXT_UNDERLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(=+|-+)[ \t]*$").expect("setext underline regex should be valid")
});

static THEMATIC_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
        .expect("thematic break regex should be valid")
});

/// One physical line of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Line text without its terminator (`\n` or `\r\n`).
    pub text: &'a str,
    /// Byte offset of `text` within the document.
    pub start: usize,
    /// True for fence delimiters and everything between them.
    pub in_fence: bool,
    pub setext: Option<Setext>,
}

/// Part a line plays in a setext heading (`Title` over `=====` or `-----`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setext {
    /// Heading text with its level: 1 for `=`, 2 for `-`.
    Title(usize),
    Underline,
}

impl Line<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Heading level and title, unless the line sits inside a code fence.
    /// Setext underlines are not headings on their own.
    pub fn heading(&self) -> Option<(usize, &str)> {
        if self.in_fence {
            return None;
        }
        match self.setext {
            Some(Setext::Title(level)) => Some((level, self.text.trim())),
            Some(Setext::Underline) => None,
            None => parse_heading(self.text),
        }
    }
}

/// A list item marker found at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListItem<'a> {
    /// Column of the marker.
    pub indent: usize,
    /// Column where the item's content starts; nested items must reach it.
    pub content_indent: usize,
    /// Bullet character, or the delimiter (`.` or `)`) of an ordered marker.
    /// Items with different markers belong to different lists.
    pub marker: char,
    /// Item text after the marker.
    pub text: &'a str,
}

/// Split a document into lines, tracking fenced code blocks.
pub fn scan_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut open_fence: Option<(char, usize)> = None;
    let mut start = 0usize;

    for raw in content.split_inclusive('\n') {
        let text = raw
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(raw);
        let fence = fence_marker(text);
        let in_fence = match (open_fence, fence) {
            (Some((ch, len)), Some((fch, flen))) if ch == fch && flen >= len => {
                open_fence = None;
                true
            }
            (Some(_), _) => true,
            (None, Some(marker)) => {
                open_fence = Some(marker);
                true
            }
            (None, None) => false,
        };
        lines.push(Line {
            text,
            start,
            in_fence,
            setext: None,
        });
        start += raw.len();
    }

    mark_setext_headings(&mut lines);
    lines
}

/// Turn paragraphs followed by an underline into setext headings. A
/// paragraph that continues a list item lazily cannot become a heading.
fn mark_setext_headings(lines: &mut [Line<'_>]) {
    for under in 1..lines.len() {
        let level = match setext_underline(&lines[under]) {
            Some(level) if is_paragraph_text(&lines[under - 1]) => level,
            _ => continue,
        };
        let mut first = under - 1;
        while first > 0 && is_paragraph_text(&lines[first - 1]) {
            first -= 1;
        }
        let opens_block = first == 0 || {
            let before = &lines[first - 1];
            before.is_blank()
                || before.in_fence
                || before.heading().is_some()
                || before.setext.is_some()
                || is_thematic_break(before.text)
        };
        if !opens_block {
            continue;
        }
        for line in &mut lines[first..under] {
            line.setext = Some(Setext::Title(level));
        }
        lines[under].setext = Some(Setext::Underline);
    }
}

fn setext_underline(line: &Line<'_>) -> Option<usize> {
    if line.in_fence {
        return None;
    }
    let caps = SETEXT_UNDERLINE_RE.captures(line.text)?;
    Some(if caps[1].starts_with('=') { 1 } else { 2 })
}

/// Index of the first heading with the given level and exact title.
pub fn find_heading(lines: &[Line<'_>], level: usize, title: &str) -> Option<usize> {
    lines
        .iter()
        .position(|line| line.heading() == Some((level, title)))
}

pub fn parse_heading(text: &str) -> Option<(usize, &str)> {
    let caps = HEADING_RE.captures(text)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps.get(2).map_or("", |m| m.as_str());
    Some((level, strip_closing_hashes(title)))
}

pub fn parse_list_item(text: &str) -> Option<ListItem<'_>> {
    let caps = LIST_ITEM_RE.captures(text)?;
    let indent = columns(caps.get(1)?.as_str());
    let marker = caps.get(2)?.as_str();
    let kind = marker.chars().last()?;
    let spacing = caps.get(3)?;
    let rest = &text[spacing.end()..];
    // Five or more spaces after the marker start indented code, so the content
    // column sits one space past the marker.
    let gap = match columns(spacing.as_str()) {
        0 => 1,
        n if n > 4 => 1,
        n => n,
    };
    Some(ListItem {
        indent,
        content_indent: indent + marker.len() + gap,
        marker: kind,
        text: rest,
    })
}

/// True when the line can only be plain paragraph text.
pub fn is_paragraph_text(line: &Line<'_>) -> bool {
    !line.in_fence
        && line.setext.is_none()
        && !line.is_blank()
        && parse_heading(line.text).is_none()
        && parse_list_item(line.text).is_none()
        && !is_thematic_break(line.text)
        && !line.text.trim_start().starts_with('>')
        && !line.text.trim_start().starts_with('<')
        && indent_of(line.text) < 4
}

pub fn is_thematic_break(text: &str) -> bool {
    THEMATIC_BREAK_RE.is_match(text)
}

pub fn indent_of(text: &str) -> usize {
    let leading = text.len() - text.trim_start_matches([' ', '\t']).len();
    columns(&text[..leading])
}

fn columns(whitespace: &str) -> usize {
    whitespace
        .chars()
        .fold(0, |col, ch| if ch == '\t' { col + 4 - col % 4 } else { col + 1 })
}

fn fence_marker(text: &str) -> Option<(char, usize)> {
    let caps = FENCE_RE.captures(text)?;
    let run = caps.get(1)?.as_str();
    let ch = run.chars().next()?;
    Some((ch, run.len()))
}

fn strip_closing_hashes(title: &str) -> &str {
    let stripped = title.trim_end_matches('#');
    if stripped.len() == title.len() {
        return title;
    }
    if stripped.is_empty() {
        return "";
    }
    if stripped.ends_with([' ', '\t']) {
        stripped.trim_end()
    } else {
        title
    }
}
