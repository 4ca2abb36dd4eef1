//! CLI tests for the `gp` binary

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TASKS_YAML: &str = r#"tasks:
  - id: design
    text: Design review
  - id: api
    text: Build API
    parent: design
    progress: 0.4
  - id: launch
    text: Launch (v1.0)
"#;

const SCRIPT: &str = r#"// one streamed reply
{"type": "chunk", "text": "Start with [#1.1 Build API], "}
{"type": "chunk", "text": "then **launch**."}
{"type": "finish", "usage": {"prompt_tokens": 20, "completion_tokens": 7, "total_tokens": 27}}
"#;

/// Isolated home so logs and config never touch the real user dirs
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("tasks.yml"), TASKS_YAML).expect("write tasks");
        fs::write(dir.path().join("turn.jsonl"), SCRIPT).expect("write script");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn gp(&self) -> Command {
        let mut cmd = Command::cargo_bin("gp").expect("binary builds");
        let root: &Path = self.dir.path();
        cmd.current_dir(root)
            .env("HOME", root)
            .env("XDG_DATA_HOME", root.join("data"))
            .env("XDG_CONFIG_HOME", root.join("config"));
        cmd
    }
}

#[test]
fn test_help_lists_subcommands() {
    let sandbox = Sandbox::new();
    sandbox
        .gp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("replay"));
}

#[test]
fn test_render_markdown_from_stdin() {
    let sandbox = Sandbox::new();
    sandbox
        .gp()
        .arg("render")
        .write_stdin("See [#1.1 Build API] and **this**")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"data-hierarchy-id="1.1""#))
        .stdout(predicate::str::contains("<strong>this</strong>"));
}

#[test]
fn test_render_structured_as_json() {
    let sandbox = Sandbox::new();
    let file = sandbox.path("reply.txt");
    fs::write(&file, r#"{"type": "task_split", "subtasks": [{"text": "Research"}]}"#).expect("write");

    sandbox
        .gp()
        .args(["render", "--format", "json"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "structured""#))
        .stdout(predicate::str::contains("task_split"));
}

#[test]
fn test_resolve_by_marker_and_name() {
    let sandbox = Sandbox::new();
    sandbox
        .gp()
        .args(["resolve", "--tasks"])
        .arg(sandbox.path("tasks.yml"))
        .arg("[#1.1 Build API]")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build API"))
        .stdout(predicate::str::contains("id: api"));

    sandbox
        .gp()
        .args(["resolve", "-f", "json", "--tasks"])
        .arg(sandbox.path("tasks.yml"))
        .arg("launch v1.0")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""hierarchy_id": "2""#));
}

#[test]
fn test_resolve_missing_task_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .gp()
        .args(["resolve", "--tasks"])
        .arg(sandbox.path("tasks.yml"))
        .arg("[#9.9 Gone]")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found"));
}

#[test]
fn test_replay_prints_history_and_usage() {
    let sandbox = Sandbox::new();
    sandbox
        .gp()
        .args(["replay", "--tasks"])
        .arg(sandbox.path("tasks.yml"))
        .arg(sandbox.path("turn.jsonl"))
        .args(["--message", "Where do I start?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Where do I start?"))
        .stdout(predicate::str::contains("Start with [#1.1 Build API], then **launch**."))
        .stdout(predicate::str::contains(r#""total_tokens": 27"#))
        .stderr(predicate::str::contains("total=27"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let sandbox = Sandbox::new();
    let config = sandbox.path("bad.yml");
    fs::write(&config, "undo:\n  max-entries: 0\n").expect("write config");

    sandbox
        .gp()
        .arg("--config")
        .arg(&config)
        .arg("render")
        .write_stdin("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}
