use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five pipeline stages in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Summarize,
    Structure,
    Draft,
    CiteBuild,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Summarize,
        Stage::Structure,
        Stage::Draft,
        Stage::CiteBuild,
        Stage::Finalize,
    ];

    /// Zero-based slot index.
    pub fn index(self) -> usize {
        match self {
            Stage::Summarize => 0,
            Stage::Structure => 1,
            Stage::Draft => 2,
            Stage::CiteBuild => 3,
            Stage::Finalize => 4,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Stage::Summarize => "summarize",
            Stage::Structure => "structure",
            Stage::Draft => "draft",
            Stage::CiteBuild => "cite",
            Stage::Finalize => "finalize",
        }
    }

    /// Human name of the artifact this stage produces.
    pub fn artifact_name(self) -> &'static str {
        match self {
            Stage::Summarize => "job summary",
            Stage::Structure => "structure",
            Stage::Draft => "draft",
            Stage::CiteBuild => "reference bundle",
            Stage::Finalize => "final document",
        }
    }

    /// File name of the editable artifact inside `artifacts/`.
    pub fn artifact_file(self) -> &'static str {
        match self {
            Stage::Summarize => "1-job-summary.md",
            Stage::Structure => "2-structure.md",
            Stage::Draft => "3-draft.md",
            Stage::CiteBuild => "4-references.md",
            Stage::Finalize => "5-final-document.md",
        }
    }

    /// Upstream slots whose artifacts this stage consumes.
    pub fn requires(self) -> &'static [Stage] {
        match self {
            Stage::Summarize => &[],
            Stage::Structure => &[Stage::Summarize],
            Stage::Draft => &[Stage::Structure],
            Stage::CiteBuild => &[Stage::Draft],
            Stage::Finalize => &[Stage::Draft, Stage::CiteBuild],
        }
    }

    /// Stages strictly after this one.
    pub fn downstream(self) -> &'static [Stage] {
        &Stage::ALL[self.index() + 1..]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "summarize" | "summary" | "1" => Ok(Stage::Summarize),
            "structure" | "2" => Ok(Stage::Structure),
            "draft" | "content" | "3" => Ok(Stage::Draft),
            "cite" | "cite-build" | "references" | "4" => Ok(Stage::CiteBuild),
            "finalize" | "final" | "5" => Ok(Stage::Finalize),
            other => Err(format!(
                "unknown stage {other:?} (expected summarize, structure, draft, cite, or finalize)"
            )),
        }
    }
}
