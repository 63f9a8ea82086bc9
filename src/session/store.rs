//! Persisted pipeline state and the editable artifact files.
//!
//! `session/state.json` is authoritative for which slots are FRESH. The files
//! under `artifacts/` mirror the FRESH slots; when the human changes one, the
//! next command picks the change up as an edit of that slot.
use super::{SessionPaths, STATE_SCHEMA_VERSION};
use crate::pipeline::{PipelineState, Stage};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    #[serde(flatten)]
    state: PipelineState,
}

/// A human edit picked up from the artifact files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEdit {
    pub stage: Stage,
    /// The file was deleted or blanked, so the slot itself became EMPTY.
    pub emptied: bool,
    pub cleared: Vec<Stage>,
}

/// Load the state record, or an all-EMPTY state for a fresh session.
pub fn load_state(paths: &SessionPaths) -> Result<PipelineState> {
    let path = paths.state_path();
    if !path.is_file() {
        return Ok(PipelineState::new());
    }
    let bytes = fs::read(&path).with_context(|| format!("read state {}", path.display()))?;
    let file: StateFile = serde_json::from_slice(&bytes).context("parse session state JSON")?;
    if file.schema_version != STATE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported session state schema_version {} (expected {STATE_SCHEMA_VERSION})",
            file.schema_version
        ));
    }
    Ok(file.state)
}

/// Persist `state`: artifact files for FRESH slots first, then removal of the
/// files for `cleared` slots, then the state record itself.
pub fn save_state(paths: &SessionPaths, state: &PipelineState, cleared: &[Stage]) -> Result<()> {
    for stage in Stage::ALL {
        let Some(text) = state.text(stage) else {
            continue;
        };
        let path = paths.artifact_path(stage);
        if read_optional(&path)?.as_deref() != Some(text) {
            write_atomic(&path, text.as_bytes())?;
        }
    }
    for stage in cleared.iter().filter(|stage| !state.is_fresh(**stage)) {
        remove_if_present(&paths.artifact_path(*stage))?;
    }
    let file = StateFile {
        schema_version: STATE_SCHEMA_VERSION,
        state: state.clone(),
    };
    let text = serde_json::to_string_pretty(&file).context("serialize session state")?;
    write_atomic(&paths.state_path(), text.as_bytes())
}

/// Fold edits made directly to artifact files back into `state`.
///
/// The lowest edited slot wins; everything after it is cleared by the usual
/// cascade. A missing or blank file empties its slot. Files for EMPTY slots are
/// never adopted.
pub fn reconcile_edits(paths: &SessionPaths, state: &mut PipelineState) -> Result<Option<ArtifactEdit>> {
    let mut edit = None;
    for stage in Stage::ALL {
        let Some(recorded) = state.text(stage) else {
            continue;
        };
        let on_disk = read_optional(&paths.artifact_path(stage))?.unwrap_or_default();
        if on_disk.trim_end() == recorded.trim_end() {
            continue;
        }
        let emptied = on_disk.trim().is_empty();
        let cleared = state.edit(stage, on_disk)?;
        tracing::info!(stage = %stage, emptied, cleared = ?cleared, "picked up artifact edit");
        edit = Some(ArtifactEdit {
            stage,
            emptied,
            cleared,
        });
        break;
    }

    for stage in Stage::ALL {
        let path = paths.artifact_path(stage);
        let pending_removal = edit
            .as_ref()
            .is_some_and(|edit| edit.cleared.contains(&stage));
        if !state.is_fresh(stage) && !pending_removal && path.is_file() {
            tracing::warn!(
                path = %paths.rel_path(&path),
                "ignoring artifact file for a {} that has not been generated",
                stage.artifact_name()
            );
        }
    }
    Ok(edit)
}

/// Write via a temp file in the same directory and rename into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
