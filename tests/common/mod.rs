//! Shared test infrastructure for integration tests.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Mock LM: answers each stage from markers in the rendered request.
///
/// The summary carries `SUMMARY-V1`, the outline `OUTLINE-V1`; the structure
/// reply echoes the summary's word count so edits can be traced downstream.
const MOCK_LM: &str = r#"#!/bin/sh
input=$(cat)
case "$input" in
  *"=== CONTENT (NO CITATIONS) ==="*)
    printf '# Introduction\nTides rise (Adams, 2023).\n\n# Conclusion\nTides fall (Brown, 2021).\n\nReference List\nAdams (2023)\nBrown (2021)\n'
    ;;
  *"Target reference count:"*)
    printf 'Reference List\nAdams (2023)\nBrown (2021)\n\nCitation List\n(Adams, 2023)\n(Brown, 2021)\n'
    ;;
  *"OUTLINE-V1"*)
    printf '# Introduction\nTides rise.\n\n# Conclusion\nTides fall.\n'
    ;;
  *"SUMMARY-V1"*)
    words=$(printf '%s' "$input" | grep -o 'Word Count: [0-9][0-9]*' | tail -n 1 | sed 's/[^0-9]//g')
    printf '1. Introduction (%s words) OUTLINE-V1\n2. Conclusion\n' "$words"
    ;;
  *)
    printf 'Topic: Tides\nWord Count: 800\nReference Style: APA\nWriting Style: Essay\nJob Summary: SUMMARY-V1\n'
    ;;
esac
"#;

/// A session directory plus a mock LM script, both in a temp dir.
pub struct TestSession {
    _temp: TempDir,
    pub root: PathBuf,
    lm_command: String,
}

impl TestSession {
    /// Create and `init` a session wired to the mock LM.
    pub fn new() -> Self {
        Self::with_script(MOCK_LM)
    }

    /// Create and `init` a session wired to a custom LM script.
    pub fn with_script(script: &str) -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let script_path = temp.path().join("mock-lm.sh");
        fs::write(&script_path, script).expect("write mock lm");
        let lm_command = format!("sh '{}'", script_path.display());
        let root = temp.path().join("session");
        let session = Self {
            _temp: temp,
            root,
            lm_command,
        };
        let output = session.run(&["init"]);
        assert_success(&output);
        session
    }

    /// Run `clickdraft <command> --session <root> --lm <mock> [args]`.
    pub fn run_stage(&self, command: &str, args: &[&str]) -> Output {
        let mut full = vec![command, "--lm", self.lm_command.as_str()];
        full.extend_from_slice(args);
        self.run(&full)
    }

    /// Run `clickdraft <args[0]> --session <root> <args[1..]>`.
    pub fn run(&self, args: &[&str]) -> Output {
        let (command, rest) = args.split_first().expect("command");
        Command::new(env!("CARGO_BIN_EXE_clickdraft"))
            .arg(command)
            .arg("--session")
            .arg(&self.root)
            .args(rest)
            .env_remove("CLICKDRAFT_LM_COMMAND")
            .env_remove("CLICKDRAFT_LOG")
            .output()
            .expect("run clickdraft")
    }

    pub fn artifact(&self, file: &str) -> Option<String> {
        fs::read_to_string(self.root.join("artifacts").join(file)).ok()
    }

    pub fn artifact_path(&self, file: &str) -> PathBuf {
        self.root.join("artifacts").join(file)
    }

    pub fn state_bytes(&self) -> Vec<u8> {
        fs::read(self.root.join("session/state.json")).expect("read state")
    }

    pub fn status_json(&self) -> Value {
        let output = self.run(&["status", "--json"]);
        assert_success(&output);
        serde_json::from_slice(&output.stdout).expect("parse status json")
    }

    pub fn jsonl(&self, name: &str) -> Vec<Value> {
        read_jsonl(&self.root.join("session").join(name))
    }
}

pub fn read_jsonl(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("parse jsonl line"))
        .collect()
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
