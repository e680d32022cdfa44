//! Deterministic, pure logic shared by the workflow.
//!
//! Core modules must be free of I/O side effects. They operate on document
//! text and in-memory task trees and return deterministic outputs suitable
//! for tests.

pub mod markdown;
pub mod selector;
pub mod status;
pub mod task;
