//! Typed paths into a session directory.
use crate::pipeline::Stage;
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating session files.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `session/` directory holding machine-owned files.
    pub fn session_dir(&self) -> PathBuf {
        self.root.join("session")
    }

    pub fn config_path(&self) -> PathBuf {
        self.session_dir().join("config.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.session_dir().join("state.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.session_dir().join("history.jsonl")
    }

    pub fn lm_log_path(&self) -> PathBuf {
        self.session_dir().join("lm_log.jsonl")
    }

    /// Return the `session/lm_log/` directory for full prompt/response storage.
    pub fn lm_log_dir(&self) -> PathBuf {
        self.session_dir().join("lm_log")
    }

    /// Return the `artifacts/` directory the human edits.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn artifact_path(&self, stage: Stage) -> PathBuf {
        self.artifacts_dir().join(stage.artifact_file())
    }

    /// Return the `prompts/` directory for per-stage instruction overrides.
    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    /// Session-relative display form of `path`.
    pub fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
