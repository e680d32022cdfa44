//! CLI tests for the `storyloop` binary.
//!
//! Spawns the binary and checks exit codes and output for startup failures
//! and the read-only `--report` mode.

use std::fs;
use std::process::Command;

use storyloop::exit_codes;
use storyloop::io::config::{Config, config_path, load_config, write_config};
use storyloop::test_support::story_doc;

#[test]
fn missing_project_dir_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .arg(temp.path().join("does-not-exist"))
        .output()
        .expect("run storyloop");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("project directory does not exist"), "{stderr}");
}

#[test]
fn report_lists_stories_without_running_agent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stories = temp.path().join("docs/stories");
    fs::create_dir_all(&stories).expect("mkdir");
    fs::write(
        stories.join("1.1.story.md"),
        story_doc("Approved", "- [x] Model\n- [ ] View\n"),
    )
    .expect("write story");

    // A broken agent path proves the report never touches the agent.
    let mut config = Config::default();
    config.agent.program = "/nonexistent/agent".to_string();
    write_config(&config_path(temp.path()), &config).expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .arg(temp.path())
        .arg("--report")
        .output()
        .expect("run storyloop");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "1.1.story.md [Approved]\n  [ ] 2 View\n");
}

#[test]
fn missing_agent_is_a_startup_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.agent.program = "/nonexistent/agent".to_string();
    let config_file = temp.path().join("custom.toml");
    write_config(&config_file, &config).expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .arg(temp.path())
        .arg("--config")
        .arg(&config_file)
        .output()
        .expect("run storyloop");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("locate agent executable"), "{stderr}");
    assert!(stderr.contains("/nonexistent/agent"), "{stderr}");
}

#[test]
fn invalid_config_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_file = config_path(temp.path());
    fs::create_dir_all(config_file.parent().expect("parent")).expect("mkdir");
    fs::write(&config_file, "[workflow]\nno_work_limit = 0\n").expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .arg(temp.path())
        .arg("--report")
        .output()
        .expect("run storyloop");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no_work_limit"), "{stderr}");
}

#[test]
fn init_config_writes_defaults_under_project() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .arg(temp.path())
        .arg("--init-config")
        .output()
        .expect("run storyloop");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let written = config_path(temp.path());
    assert!(written.is_file());
    assert_eq!(load_config(&written).expect("load"), Config::default());
}
