//! Story lifecycle automation for BMad-style projects.
//!
//! Stories are markdown files carrying a `## Status` marker and a
//! `## Tasks / Subtasks` checklist. The workflow polls the stories directory,
//! drives an external coding agent through drafting, development, review and
//! commit, and reports finished stories to a webhook.
//!
//! - **[`core`]**: Pure document logic (status marker, task tree, selection).
//! - **[`io`]**: Story files, git, agent processes, config and notifications.
//!
//! [`workflow`] ties the two together into the tick-based driver loop.

pub mod analytics;
pub mod core;
pub mod exit_codes;
pub mod instructions;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
