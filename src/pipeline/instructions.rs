//! Versioned instruction sets for the generation service.
//!
//! Built-in instructions are compiled in from `prompts/`. A session can replace
//! any of them by dropping `<stage>.md` into its own `prompts/` directory.
use super::Stage;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Version of the built-in instruction files.
pub const INSTRUCTION_SET_VERSION: &str = "1";

// Prompt templates loaded at compile time
const SUMMARIZE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/summarize.md"));
const STRUCTURE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/structure.md"));
const DRAFT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/draft.md"));
const CITE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/cite.md"));
const FINALIZE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/finalize.md"));

/// Instructions for a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInstructions {
    pub text: String,
    pub version: String,
}

/// The fixed instruction text for all five stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSet {
    stages: [StageInstructions; 5],
}

impl InstructionSet {
    pub fn builtin() -> Self {
        let builtin = |text: &str| StageInstructions {
            text: text.trim().to_string(),
            version: INSTRUCTION_SET_VERSION.to_string(),
        };
        Self {
            stages: [
                builtin(SUMMARIZE),
                builtin(STRUCTURE),
                builtin(DRAFT),
                builtin(CITE),
                builtin(FINALIZE),
            ],
        }
    }

    /// Built-in set with any `<dir>/<stage>.md` files taking precedence.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut set = Self::builtin();
        if !dir.is_dir() {
            return Ok(set);
        }
        for stage in Stage::ALL {
            let path = dir.join(format!("{}.md", stage.slug()));
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read instructions {}", path.display()))?;
            if text.trim().is_empty() {
                tracing::warn!(path = %path.display(), "ignoring empty instruction override");
                continue;
            }
            tracing::debug!(stage = %stage, path = %path.display(), "using instruction override");
            set.stages[stage.index()] = StageInstructions {
                text: text.trim().to_string(),
                version: format!("{INSTRUCTION_SET_VERSION}+custom"),
            };
        }
        Ok(set)
    }

    pub fn for_stage(&self, stage: Stage) -> &StageInstructions {
        &self.stages[stage.index()]
    }
}

impl Default for InstructionSet {
    fn default() -> Self {
        Self::builtin()
    }
}
