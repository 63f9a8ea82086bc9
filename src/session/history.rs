//! Append-only record of what happened to a session.
use super::{now_epoch_ms, SessionPaths, HISTORY_SCHEMA_VERSION};
use crate::pipeline::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Init,
    Run,
    Edit,
    Refused,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub ts: u64,
    pub action: HistoryAction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cleared: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub instructions_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, stage: Option<Stage>) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            action,
            stage,
            cleared: Vec::new(),
            instructions_version: None,
            detail: None,
        }
    }

    pub fn with_cleared(mut self, cleared: &[Stage]) -> Self {
        self.cleared = cleared.to_vec();
        self
    }

    pub fn with_instructions_version(mut self, version: &str) -> Self {
        self.instructions_version = Some(version.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append a history entry as JSONL.
pub fn append_history(paths: &SessionPaths, entry: &HistoryEntry) -> Result<()> {
    let path = paths.history_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create session dir")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize history entry")?;
    writeln!(file, "{line}").with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn load_history(paths: &SessionPaths) -> Result<Vec<HistoryEntry>> {
    let path = paths.history_path();
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skipping corrupt history entry");
            }
        }
    }
    Ok(entries)
}
