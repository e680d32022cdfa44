//! Stable exit codes for the storyloop CLI.

/// The workflow drained or the report was printed.
pub const OK: i32 = 0;
/// Invalid project directory, configuration, missing agent executable or other errors.
pub const INVALID: i32 = 1;
