//! Task tree parsed from a story's `## Tasks / Subtasks` checklist.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::markdown::{
    find_heading, indent_of, is_thematic_break, parse_list_item, scan_lines,
};

const TASKS_HEADING: &str = "Tasks / Subtasks";

static CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[([ xX])\]\s*(.+)").expect("checkbox regex should be valid")
});

/// One checklist entry. Ids reflect position (`2.1.3`) and change when the
/// document is edited.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub completed: bool,
    pub subtasks: Vec<Task>,
}

impl Task {
    /// Number of tasks in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.subtasks.iter().map(Task::count).sum::<usize>()
    }
}

/// Numbering state of one list level.
#[derive(Default)]
struct ListState {
    marker: Option<char>,
    positions: usize,
}

impl ListState {
    /// Position of the next item. A different marker starts a new list.
    fn next(&mut self, marker: char) -> usize {
        if self.marker != Some(marker) {
            self.marker = Some(marker);
            self.positions = 0;
        }
        self.positions += 1;
        self.positions
    }
}

/// An open list item while its nested lines are still being read.
struct Frame {
    content_indent: usize,
    id: String,
    /// `None` for items that are not checkboxes; their nested items are dropped.
    task: Option<Task>,
    children: ListState,
}

/// Parse the checklist under `## Tasks / Subtasks` into root tasks.
///
/// The section ends at the next heading of any level outside a list item.
/// List items without a `[ ]`/`[x]` prefix are skipped but still occupy a
/// position. Every list numbers its items from 1, so a list interrupted by a
/// paragraph, heading or rule, or continued with another marker, restarts.
pub fn parse_tasks(content: &str) -> Vec<Task> {
    let lines = scan_lines(content);
    let Some(heading) = find_heading(&lines, 2, TASKS_HEADING) else {
        return Vec::new();
    };

    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root_list = ListState::default();
    let mut after_blank = false;

    for line in &lines[heading + 1..] {
        if line.in_fence {
            continue;
        }
        if line.is_blank() {
            after_blank = true;
            continue;
        }
        if line.heading().is_some() || is_thematic_break(line.text) {
            let nested = end_list(&mut stack, &mut roots, &mut root_list, indent_of(line.text));
            if !nested && line.heading().is_some() {
                break;
            }
            after_blank = false;
            continue;
        }

        let Some(item) = parse_list_item(line.text) else {
            // Lazy continuation unless a blank line separated it from the item.
            if after_blank {
                end_list(&mut stack, &mut roots, &mut root_list, indent_of(line.text));
            }
            after_blank = false;
            continue;
        };
        after_blank = false;

        unwind(&mut stack, &mut roots, item.indent);
        let id = match stack.last_mut() {
            Some(parent) => format!("{}.{}", parent.id, parent.children.next(item.marker)),
            None => root_list.next(item.marker).to_string(),
        };
        let dropped = stack.last().is_some_and(|parent| parent.task.is_none());
        let task = if dropped {
            None
        } else {
            parse_checkbox(item.text, &id)
        };
        stack.push(Frame {
            content_indent: item.content_indent,
            id,
            task,
            children: ListState::default(),
        });
    }

    unwind(&mut stack, &mut roots, 0);
    roots
}

/// Close the items a non-list block at `indent` falls outside of, and end
/// the list it interrupts. Returns whether the block is still inside an item.
fn end_list(
    stack: &mut Vec<Frame>,
    roots: &mut Vec<Task>,
    root_list: &mut ListState,
    indent: usize,
) -> bool {
    unwind(stack, roots, indent);
    match stack.last_mut() {
        Some(top) => {
            top.children = ListState::default();
            true
        }
        None => {
            *root_list = ListState::default();
            false
        }
    }
}

/// Close every open item that `indent` does not reach into.
fn unwind(stack: &mut Vec<Frame>, roots: &mut Vec<Task>, indent: usize) {
    while let Some(top) = stack.last() {
        if indent >= top.content_indent {
            break;
        }
        let Some(frame) = stack.pop() else { break };
        let Some(task) = frame.task else { continue };
        match stack.last_mut() {
            Some(parent) => {
                if let Some(parent_task) = parent.task.as_mut() {
                    parent_task.subtasks.push(task);
                }
            }
            None => roots.push(task),
        }
    }
}

fn parse_checkbox(text: &str, id: &str) -> Option<Task> {
    let caps = CHECKBOX_RE.captures(text)?;
    let completed = !caps[1].trim().is_empty();
    let name = caps[2].trim();
    if name.is_empty() {
        return None;
    }
    Some(Task {
        id: id.to_string(),
        name: name.to_string(),
        completed,
        subtasks: Vec::new(),
    })
}
