//! The five-slot artifact record and its invalidation cascade.
//!
//! A slot is either EMPTY or FRESH. Downstream artifacts are never kept around
//! in a stale form: the moment an upstream slot changes they are cleared, so the
//! record can never pair a document with inputs that no longer produced it.
use super::{CiteParams, PipelineError, Stage};
use serde::{Deserialize, Serialize};

/// One stage's storage location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum Slot {
    #[default]
    Empty,
    Fresh(String),
}

impl Slot {
    pub fn text(&self) -> Option<&str> {
        match self {
            Slot::Empty => None,
            Slot::Fresh(text) => Some(text),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Slot::Fresh(_))
    }
}

/// Latest artifact of every stage for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    slots: [Slot; 5],
    /// Parameters the current reference bundle was generated with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cite_params: Option<CiteParams>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, stage: Stage) -> &Slot {
        &self.slots[stage.index()]
    }

    pub fn text(&self, stage: Stage) -> Option<&str> {
        self.slot(stage).text()
    }

    pub fn is_fresh(&self, stage: Stage) -> bool {
        self.slot(stage).is_fresh()
    }

    pub fn cite_params(&self) -> Option<&CiteParams> {
        self.cite_params.as_ref()
    }

    /// Required upstream slots of `stage` that are not FRESH.
    pub fn missing_requirements(&self, stage: Stage) -> Vec<Stage> {
        stage
            .requires()
            .iter()
            .copied()
            .filter(|required| !self.is_fresh(*required))
            .collect()
    }

    /// First stage whose slot is EMPTY, or `None` once the document is final.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| !self.is_fresh(*stage))
    }

    /// Record a freshly generated artifact. Returns the downstream stages that
    /// lost their artifact.
    pub fn store(&mut self, stage: Stage, text: String) -> Vec<Stage> {
        self.slots[stage.index()] = Slot::Fresh(text);
        self.invalidate_after(stage)
    }

    /// Record the Cite-Build artifact together with the parameters used.
    pub fn store_references(&mut self, text: String, params: CiteParams) -> Vec<Stage> {
        let cleared = self.store(Stage::CiteBuild, text);
        self.cite_params = Some(params);
        cleared
    }

    /// Replace a FRESH slot's text with a human edit.
    ///
    /// Whitespace-only text empties the slot itself. Either way every slot after
    /// `stage` is cleared, exactly as for a regeneration.
    pub fn edit(&mut self, stage: Stage, text: String) -> Result<Vec<Stage>, PipelineError> {
        if !self.is_fresh(stage) {
            return Err(PipelineError::precondition(
                stage,
                format!("there is no {} to edit yet", stage.artifact_name()),
            ));
        }
        if text.trim().is_empty() {
            let mut cleared = self.clear(stage).into_iter().collect::<Vec<_>>();
            cleared.extend(self.invalidate_after(stage));
            return Ok(cleared);
        }
        Ok(self.store(stage, text))
    }

    /// Clear every slot after `stage`. This is the only place the cascade
    /// happens.
    pub fn invalidate_after(&mut self, stage: Stage) -> Vec<Stage> {
        stage
            .downstream()
            .iter()
            .copied()
            .filter_map(|later| self.clear(later))
            .collect()
    }

    fn clear(&mut self, stage: Stage) -> Option<Stage> {
        if stage == Stage::CiteBuild {
            self.cite_params = None;
        }
        let was_fresh = self.is_fresh(stage);
        self.slots[stage.index()] = Slot::Empty;
        was_fresh.then_some(stage)
    }
}
