use crate::generate::GenerationClient;
use crate::pipeline::{InstructionSet, Orchestrator, PipelineError, Stage, StageOutcome};
use crate::session::{self, HistoryAction, HistoryEntry, SessionConfig, SessionPaths};
use anyhow::{anyhow, Result};
use std::path::Path;

/// Everything a command needs from an initialized session directory.
pub(crate) struct SessionContext {
    pub(crate) paths: SessionPaths,
    pub(crate) config: SessionConfig,
    pub(crate) orchestrator: Orchestrator,
}

impl SessionContext {
    /// Open the session, folding any artifact file edits into the state first.
    pub(crate) fn load(root: &Path) -> Result<Self> {
        let paths = SessionPaths::new(root.to_path_buf());
        if !paths.config_path().is_file() {
            return Err(anyhow!(
                "missing session config at {} (run `clickdraft init --session {}` first)",
                paths.config_path().display(),
                paths.root().display()
            ));
        }
        let config = session::load_config(&paths)?;
        let mut state = session::load_state(&paths)?;
        let instructions = InstructionSet::with_overrides(&paths.prompts_dir())?;

        if let Some(edit) = session::reconcile_edits(&paths, &mut state)? {
            session::save_state(&paths, &state, &edit.cleared)?;
            let detail = if edit.emptied {
                "artifact file removed or blanked"
            } else {
                "artifact file edited"
            };
            session::append_history(
                &paths,
                &HistoryEntry::new(HistoryAction::Edit, Some(edit.stage))
                    .with_cleared(&edit.cleared)
                    .with_detail(detail),
            )?;
            eprintln!(
                "note: picked up edit of {} ({})",
                paths.rel_path(&paths.artifact_path(edit.stage)),
                edit.stage.artifact_name()
            );
            let discarded: Vec<Stage> = edit
                .cleared
                .iter()
                .copied()
                .filter(|stage| *stage != edit.stage)
                .collect();
            if !discarded.is_empty() {
                eprintln!("note: discarded {}", stage_list(&discarded));
            }
        }

        Ok(Self {
            paths,
            config,
            orchestrator: Orchestrator::new(state, instructions),
        })
    }

    pub(crate) fn client(
        &self,
        stage: Stage,
        lm: Option<&str>,
    ) -> Result<Box<dyn GenerationClient>, PipelineError> {
        session::build_client(&self.config, stage, lm)
    }

    pub(crate) fn instructions_version(&self, stage: Stage) -> &str {
        &self.orchestrator.instructions().for_stage(stage).version
    }

    /// Persist a successful stage run and record it.
    pub(crate) fn commit(&self, outcome: &StageOutcome) -> Result<()> {
        session::save_state(&self.paths, self.orchestrator.state(), &outcome.cleared)?;
        session::append_history(
            &self.paths,
            &HistoryEntry::new(HistoryAction::Run, Some(outcome.stage))
                .with_cleared(&outcome.cleared)
                .with_instructions_version(self.instructions_version(outcome.stage)),
        )
    }

    /// Record a refused or failed command. State is not touched.
    pub(crate) fn record_error(&self, stage: Stage, err: &PipelineError) {
        let action = match err {
            PipelineError::Precondition { .. } => HistoryAction::Refused,
            PipelineError::Service { .. } | PipelineError::Configuration(_) => {
                HistoryAction::Failed
            }
        };
        let entry = HistoryEntry::new(action, Some(stage))
            .with_detail(format!("{}: {err}", err.kind()));
        if let Err(history_err) = session::append_history(&self.paths, &entry) {
            tracing::warn!(%history_err, "failed to record history entry");
        }
    }
}

pub(crate) fn stage_list(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(|stage| stage.slug())
        .collect::<Vec<_>>()
        .join(", ")
}
