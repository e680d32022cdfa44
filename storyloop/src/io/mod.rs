//! Side-effecting adapters: filesystem, git, agent processes and webhooks.

pub mod agent;
pub mod config;
pub mod git;
pub mod process;
pub mod stories;
pub mod webhook;
