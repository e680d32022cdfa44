//! Deterministic selection over the task tree.

use crate::core::task::Task;

/// Find the next task to work on, depth-first in document order.
///
/// Completed tasks are skipped without descending: a checked parent hides its
/// subtree. Within an open task the deepest open descendant wins, so the most
/// granular item is worked before its ancestor. Returns `None` when every
/// root is complete.
pub fn next_task(tasks: &[Task]) -> Option<&Task> {
    let task = tasks.iter().find(|task| !task.completed)?;
    Some(next_task(&task.subtasks).unwrap_or(task))
}

/// Report view of all outstanding work.
///
/// Unlike [`next_task`], this descends into completed parents so unchecked
/// children under a checked parent still show up (with the parent kept as
/// context). Completed branches with nothing open are dropped.
pub fn uncompleted_tasks(tasks: &[Task]) -> Vec<Task> {
    let mut uncompleted = Vec::new();
    for task in tasks {
        let subtasks = uncompleted_tasks(&task.subtasks);
        if !task.completed || !subtasks.is_empty() {
            uncompleted.push(Task {
                subtasks,
                ..task.clone()
            });
        }
    }
    uncompleted
}
