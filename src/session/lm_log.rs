//! Generation call logging.
//!
//! Every call made on behalf of a stage is recorded so the human can see what
//! was sent, what came back, and why a stage failed.
//!
//! # Log Format
//!
//! Entries are appended to `session/lm_log.jsonl` as newline-delimited JSON:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"seq":1,"stage":"summarize","duration_ms":4200,...}
//! {"schema_version":1,"ts":1707900060000,"seq":2,"stage":"structure","duration_ms":3100,...}
//! ```
//!
//! # Full Content
//!
//! The rendered request and the reply are stored in full under
//! `session/lm_log/NNN_<stage>_prompt.txt` and `NNN_<stage>_response.txt`.
use super::{now_epoch_ms, SessionPaths};
use crate::generate::{render_request_text, ContentItem, GenerationClient, ServiceError};
use crate::pipeline::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Instant;

/// Current schema version for lm_log.jsonl entries.
pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    Success,
    Failed,
}

/// A single generation call log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the call finished.
    pub ts: u64,

    /// Sequence number within the session (1-indexed).
    pub seq: u32,

    pub stage: Stage,

    /// Backend label, e.g. `model: gpt-4.1` or `command: llm`.
    pub client: String,

    pub instructions_version: String,

    pub duration_ms: u64,

    pub text_items: usize,

    pub image_items: usize,

    pub outcome: LmOutcome,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_chars: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    /// First few hundred characters of the rendered request.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_preview: Option<String>,
}

/// Builder for constructing LM log entries with timing.
pub struct LmLogBuilder {
    start: Instant,
    seq: u32,
    stage: Stage,
    client: String,
    instructions_version: String,
    text_items: usize,
    image_items: usize,
    prompt_preview: Option<String>,
}

impl LmLogBuilder {
    pub fn new(seq: u32, stage: Stage) -> Self {
        Self {
            start: Instant::now(),
            seq,
            stage,
            client: String::new(),
            instructions_version: String::new(),
            text_items: 0,
            image_items: 0,
            prompt_preview: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    pub fn with_instructions_version(mut self, version: impl Into<String>) -> Self {
        self.instructions_version = version.into();
        self
    }

    pub fn with_payload(mut self, payload: &[ContentItem]) -> Self {
        self.image_items = payload
            .iter()
            .filter(|item| matches!(item, ContentItem::Image { .. }))
            .count();
        self.text_items = payload.len() - self.image_items;
        self
    }

    /// Set a preview of the prompt, truncated on a character boundary.
    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        let mut preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        if preview.len() < prompt.len() {
            preview.push_str("...");
        }
        self.prompt_preview = Some(preview);
        self
    }

    pub fn success(self, response: &str) -> LmLogEntry {
        let chars = response.chars().count();
        self.build(LmOutcome::Success, Some(chars), None)
    }

    pub fn failed(self, error: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Failed, None, Some(error.into()))
    }

    fn build(
        self,
        outcome: LmOutcome,
        response_chars: Option<usize>,
        error: Option<String>,
    ) -> LmLogEntry {
        LmLogEntry {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            seq: self.seq,
            stage: self.stage,
            client: self.client,
            instructions_version: self.instructions_version,
            duration_ms: self.start.elapsed().as_millis() as u64,
            text_items: self.text_items,
            image_items: self.image_items,
            outcome,
            response_chars,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Append an LM log entry to the log file.
pub fn append_lm_log(paths: &SessionPaths, entry: &LmLogEntry) -> Result<()> {
    let log_path = paths.lm_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create session directory for lm_log")?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open lm_log for append: {}", log_path.display()))?;
    let line = serde_json::to_string(entry).context("serialize lm_log entry")?;
    writeln!(file, "{line}").context("write lm_log entry")?;
    Ok(())
}

/// Store the full request and reply for one call.
pub fn store_lm_content(
    paths: &SessionPaths,
    seq: u32,
    stage: Stage,
    prompt: &str,
    response: &str,
) -> Result<()> {
    let log_dir = paths.lm_log_dir();
    fs::create_dir_all(&log_dir).context("create lm_log directory")?;

    let prompt_path = log_dir.join(format!("{seq:03}_{}_prompt.txt", stage.slug()));
    let response_path = log_dir.join(format!("{seq:03}_{}_response.txt", stage.slug()));
    fs::write(&prompt_path, prompt)
        .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    fs::write(&response_path, response)
        .with_context(|| format!("write response: {}", response_path.display()))?;
    Ok(())
}

/// Load all LM log entries, skipping corrupt lines.
pub fn load_lm_log(paths: &SessionPaths) -> Result<Vec<LmLogEntry>> {
    let log_path = paths.lm_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&log_path)
        .with_context(|| format!("read lm_log: {}", log_path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LmLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skipping corrupt lm_log entry");
            }
        }
    }
    Ok(entries)
}

/// Next sequence number based on existing log entries.
pub fn next_sequence_number(paths: &SessionPaths) -> Result<u32> {
    let entries = load_lm_log(paths)?;
    Ok(entries.iter().map(|entry| entry.seq).max().unwrap_or(0) + 1)
}

/// Client decorator that records every call in the session's LM log.
///
/// Logging is best-effort: a write failure is reported as a warning and never
/// turns a successful generation into an error.
pub struct LoggedClient<'a, C: ?Sized> {
    inner: &'a C,
    paths: &'a SessionPaths,
    stage: Stage,
    instructions_version: String,
}

impl<'a, C: GenerationClient + ?Sized> LoggedClient<'a, C> {
    pub fn new(inner: &'a C, paths: &'a SessionPaths, stage: Stage, instructions_version: &str) -> Self {
        Self {
            inner,
            paths,
            stage,
            instructions_version: instructions_version.to_string(),
        }
    }

    fn record(&self, seq: u32, entry: &LmLogEntry, prompt: &str, response: &str) {
        if let Err(err) = append_lm_log(self.paths, entry) {
            tracing::warn!(%err, "failed to append lm_log entry");
        }
        if let Err(err) = store_lm_content(self.paths, seq, self.stage, prompt, response) {
            tracing::warn!(%err, "failed to store lm_log content");
        }
    }
}

impl<C: GenerationClient + ?Sized> GenerationClient for LoggedClient<'_, C> {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError> {
        let seq = next_sequence_number(self.paths).unwrap_or_else(|err| {
            tracing::warn!(%err, "could not read lm_log; restarting sequence");
            1
        });
        let prompt = render_request_text(instructions, payload);
        let builder = LmLogBuilder::new(seq, self.stage)
            .with_client(self.inner.describe())
            .with_instructions_version(self.instructions_version.as_str())
            .with_payload(payload)
            .with_prompt_preview(&prompt);

        let result = self.inner.generate(instructions, payload);
        match &result {
            Ok(text) => self.record(seq, &builder.success(text), &prompt, text),
            Err(err) => self.record(seq, &builder.failed(err.to_string()), &prompt, ""),
        }
        result
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::scripted::ScriptedClient;

    fn session() -> (tempfile::TempDir, SessionPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new(dir.path().to_path_buf());
        (dir, paths)
    }

    #[test]
    fn prompt_preview_truncates_on_char_boundary() {
        let prompt = "é".repeat(600);
        let entry = LmLogBuilder::new(1, Stage::Draft)
            .with_prompt_preview(&prompt)
            .success("ok");
        let preview = entry.prompt_preview.unwrap();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PROMPT_PREVIEW_CHARS + 3);
    }

    #[test]
    fn logged_client_records_success_and_failure() {
        let (_dir, paths) = session();
        let inner = ScriptedClient::replying(&["Topic: Wind"]);
        inner.push_failure("quota exceeded");
        let client = LoggedClient::new(&inner, &paths, Stage::Summarize, "1");
        let payload = vec![
            ContentItem::Text("brief".to_string()),
            ContentItem::Image {
                mime: "image/png".to_string(),
                data: vec![1, 2],
            },
        ];

        assert_eq!(client.generate("Summarize.", &payload).unwrap(), "Topic: Wind");
        assert!(client.generate("Summarize.", &payload).is_err());

        let entries = load_lm_log(&paths).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[0].outcome, LmOutcome::Success);
        assert_eq!(entries[0].text_items, 1);
        assert_eq!(entries[0].image_items, 1);
        assert_eq!(entries[0].client, "scripted");
        assert_eq!(entries[1].seq, 2);
        assert_eq!(entries[1].outcome, LmOutcome::Failed);
        assert_eq!(entries[1].error.as_deref(), Some("quota exceeded"));

        let response = paths.lm_log_dir().join("001_summarize_response.txt");
        assert_eq!(fs::read_to_string(response).unwrap(), "Topic: Wind");
        let prompt = fs::read_to_string(paths.lm_log_dir().join("002_summarize_prompt.txt")).unwrap();
        assert!(prompt.contains("# Instructions\n\nSummarize."));
    }
}
