//! Human-gated execution of the five stages.
//!
//! Every entry point follows the same order: check preconditions, assemble the
//! payload from the current state, call the client, and only then store the
//! result. A refused or failed call therefore never touches the state.
use super::payload::{
    artifact_payload, cite_payload, finalize_payload, summarize_payload, summary_field,
    word_count, Brief, CiteParams, FinalizeParams, ReferenceBundle,
};
use super::{InstructionSet, PipelineError, PipelineState, Stage};
use crate::generate::{ContentItem, GenerationClient};
use std::time::Instant;

/// Result of a successful stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub text: String,
    /// Downstream stages whose artifacts were discarded.
    pub cleared: Vec<Stage>,
}

/// Owns the pipeline state for one session and runs stages against it.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    state: PipelineState,
    instructions: InstructionSet,
}

impl Orchestrator {
    pub fn new(state: PipelineState, instructions: InstructionSet) -> Self {
        Self {
            state,
            instructions,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn instructions(&self) -> &InstructionSet {
        &self.instructions
    }

    /// Refuse `stage` unless all of its required upstream slots are FRESH.
    pub fn check_ready(&self, stage: Stage) -> Result<(), PipelineError> {
        let missing = self.state.missing_requirements(stage);
        if missing.is_empty() {
            return Ok(());
        }
        let names = missing
            .iter()
            .map(|required| required.artifact_name())
            .collect::<Vec<_>>()
            .join(" and ");
        Err(PipelineError::precondition(
            stage,
            format!("it needs a current {names}"),
        ))
    }

    pub fn summarize<C>(&mut self, client: &C, brief: &Brief) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        if brief.is_empty() {
            return Err(PipelineError::precondition(
                Stage::Summarize,
                "the brief has no instruction text and no attachments",
            ));
        }
        let payload = summarize_payload(brief);
        let text = self.call(client, Stage::Summarize, &payload)?;
        Ok(self.commit(Stage::Summarize, text))
    }

    pub fn structure<C>(&mut self, client: &C) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        self.run_on_upstream(client, Stage::Structure, Stage::Summarize)
    }

    pub fn draft<C>(&mut self, client: &C) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        self.run_on_upstream(client, Stage::Draft, Stage::Structure)
    }

    pub fn cite_build<C>(
        &mut self,
        client: &C,
        params: &CiteParams,
    ) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        self.check_ready(Stage::CiteBuild)?;
        let draft = self.state.text(Stage::Draft).unwrap_or_default();
        let payload = cite_payload(draft, params);
        let text = self.call(client, Stage::CiteBuild, &payload)?;
        let cleared = self.state.store_references(text.clone(), params.clone());
        Ok(StageOutcome {
            stage: Stage::CiteBuild,
            text,
            cleared,
        })
    }

    pub fn finalize<C>(
        &mut self,
        client: &C,
        params: &FinalizeParams,
    ) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        self.check_ready(Stage::Finalize)?;
        let draft = self.state.text(Stage::Draft).unwrap_or_default();
        let mut bundle =
            ReferenceBundle::split(self.state.text(Stage::CiteBuild).unwrap_or_default());
        if let Some(list) = &params.reference_list {
            bundle.reference_list = list.clone();
        }
        if let Some(list) = &params.citation_list {
            bundle.citation_list = list.clone();
        }
        let payload = finalize_payload(draft, &bundle, &params.reference_style);
        let text = self.call(client, Stage::Finalize, &payload)?;
        Ok(self.commit(Stage::Finalize, text))
    }

    /// Substitute human-edited text into a FRESH slot.
    pub fn edit(&mut self, stage: Stage, text: String) -> Result<Vec<Stage>, PipelineError> {
        self.state.edit(stage, text)
    }

    /// Cite-Build parameters used when the human gives none: the job summary's
    /// reference style (or `fallback_style`) and the live Draft word count.
    pub fn default_cite_params(&self, fallback_style: &str) -> CiteParams {
        let reference_style = self
            .state
            .text(Stage::Summarize)
            .and_then(|summary| summary_field(summary, "Reference Style"))
            .unwrap_or_else(|| {
                tracing::debug!(
                    fallback = fallback_style,
                    "job summary names no reference style; using the default"
                );
                fallback_style.to_string()
            });
        CiteParams {
            reference_style,
            word_count: self.state.text(Stage::Draft).map(word_count).unwrap_or(0),
        }
    }

    /// Finalize style when the human gives none: whatever Cite-Build used.
    pub fn default_finalize_style(&self, fallback_style: &str) -> String {
        self.state
            .cite_params()
            .map(|params| params.reference_style.clone())
            .unwrap_or_else(|| self.default_cite_params(fallback_style).reference_style)
    }

    fn run_on_upstream<C>(
        &mut self,
        client: &C,
        stage: Stage,
        upstream: Stage,
    ) -> Result<StageOutcome, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        self.check_ready(stage)?;
        let payload = artifact_payload(self.state.text(upstream).unwrap_or_default());
        let text = self.call(client, stage, &payload)?;
        Ok(self.commit(stage, text))
    }

    fn call<C>(&self, client: &C, stage: Stage, payload: &[ContentItem]) -> Result<String, PipelineError>
    where
        C: GenerationClient + ?Sized,
    {
        let instructions = self.instructions.for_stage(stage);
        let span = tracing::info_span!(
            "stage",
            stage = %stage,
            client = %client.describe(),
            instructions = %instructions.version
        );
        let _guard = span.enter();
        let start = Instant::now();
        match client.generate(&instructions.text, payload) {
            Ok(text) => {
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    words = word_count(&text),
                    "stage generated"
                );
                Ok(text)
            }
            Err(error) => {
                tracing::warn!(%error, "stage generation failed; state unchanged");
                Err(PipelineError::Service { stage, error })
            }
        }
    }

    fn commit(&mut self, stage: Stage, text: String) -> StageOutcome {
        let cleared = self.state.store(stage, text.clone());
        if !cleared.is_empty() {
            tracing::info!(stage = %stage, cleared = ?cleared, "cleared downstream artifacts");
        }
        StageOutcome {
            stage,
            text,
            cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::scripted::ScriptedClient;
    use crate::pipeline::state::Slot;

    const SUMMARY: &str = "Topic: Renewable energy; Word Count: 500; Reference Style: MLA; Writing Style: Essay; Job Summary: A 500-word essay on renewable energy.";

    fn brief(instruction: &str) -> Brief {
        Brief {
            instruction: instruction.to_string(),
            attachments: Vec::new(),
        }
    }

    fn through_draft() -> Orchestrator {
        let client = ScriptedClient::replying(&[
            SUMMARY,
            "1. Introduction (100 words)\n2. Body (400 words)",
            "# Introduction\nRenewable energy matters.\n# Body\nSolar and wind.",
        ]);
        let mut orchestrator = Orchestrator::default();
        orchestrator.summarize(&client, &brief("Write an essay")).unwrap();
        orchestrator.structure(&client).unwrap();
        orchestrator.draft(&client).unwrap();
        orchestrator
    }

    fn complete() -> Orchestrator {
        let mut orchestrator = through_draft();
        let client = ScriptedClient::replying(&[
            "Reference List\nAdams (2023)\n\nCitation List\n(Adams, 2023)",
            "# Introduction\nRenewable energy matters (Adams, 2023).\n# Body\nSolar and wind.\n\nReference List\nAdams (2023)",
        ]);
        let params = orchestrator.default_cite_params("Harvard");
        orchestrator.cite_build(&client, &params).unwrap();
        let style = orchestrator.default_finalize_style("Harvard");
        orchestrator
            .finalize(
                &client,
                &FinalizeParams {
                    reference_style: style,
                    ..FinalizeParams::default()
                },
            )
            .unwrap();
        orchestrator
    }

    #[test]
    fn edited_word_count_reaches_structure_and_rerun_clears_downstream() {
        let client = ScriptedClient::replying(&[SUMMARY, "1. Introduction (800 words)"]);
        let mut orchestrator = Orchestrator::default();
        let outcome = orchestrator
            .summarize(
                &client,
                &brief("Write a 500-word essay on renewable energy, MLA style"),
            )
            .unwrap();
        assert_eq!(summary_field(&outcome.text, "Word Count").as_deref(), Some("500"));
        assert_eq!(summary_field(&outcome.text, "Reference Style").as_deref(), Some("MLA"));

        let edited = outcome.text.replace("Word Count: 500", "Word Count: 800");
        orchestrator.edit(Stage::Summarize, edited).unwrap();
        orchestrator.structure(&client).unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].text().contains("Word Count: 800"));
        assert!(!calls[1].text().contains("Word Count: 500"));

        let mut orchestrator = complete();
        let client = ScriptedClient::replying(&["1. Introduction (800 words)"]);
        let outcome = orchestrator.structure(&client).unwrap();
        assert_eq!(
            outcome.cleared,
            vec![Stage::Draft, Stage::CiteBuild, Stage::Finalize]
        );
        assert!(orchestrator.state().is_fresh(Stage::Summarize));
        for stage in [Stage::Draft, Stage::CiteBuild, Stage::Finalize] {
            assert_eq!(orchestrator.state().slot(stage), &Slot::Empty);
        }
    }

    #[test]
    fn finalize_before_cite_build_never_calls_the_client() {
        let mut orchestrator = through_draft();
        let before = orchestrator.state().clone();
        let client = ScriptedClient::replying(&["should not be used"]);
        let err = orchestrator
            .finalize(
                &client,
                &FinalizeParams {
                    reference_style: "MLA".to_string(),
                    ..FinalizeParams::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Precondition { stage: Stage::Finalize, .. }));
        assert!(err.to_string().contains("reference bundle"), "{err}");
        assert_eq!(client.call_count(), 0);
        assert_eq!(orchestrator.state(), &before);
    }

    #[test]
    fn every_stage_is_refused_on_an_empty_state() {
        let client = ScriptedClient::new();
        let mut orchestrator = Orchestrator::default();
        assert!(orchestrator.structure(&client).is_err());
        assert!(orchestrator.draft(&client).is_err());
        let params = CiteParams {
            reference_style: "APA".to_string(),
            word_count: 100,
        };
        assert!(orchestrator.cite_build(&client, &params).is_err());
        assert!(orchestrator
            .finalize(&client, &FinalizeParams::default())
            .is_err());
        assert_eq!(client.call_count(), 0);
        assert_eq!(orchestrator.state(), &PipelineState::new());
    }

    #[test]
    fn empty_brief_is_refused() {
        let client = ScriptedClient::new();
        let mut orchestrator = Orchestrator::default();
        let err = orchestrator.summarize(&client, &brief("  ")).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition { stage: Stage::Summarize, .. }));
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn service_failure_leaves_state_untouched() {
        let mut orchestrator = complete();
        let before = orchestrator.state().clone();
        let client = ScriptedClient::new();
        client.push_failure("HTTP 429: quota exceeded");
        let err = orchestrator.draft(&client).unwrap_err();
        match err {
            PipelineError::Service { stage, error } => {
                assert_eq!(stage, Stage::Draft);
                assert_eq!(error.message, "HTTP 429: quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.state(), &before);
    }

    #[test]
    fn each_stage_sends_only_its_own_inputs() {
        let mut orchestrator = through_draft();
        let structure = orchestrator.state().text(Stage::Structure).unwrap().to_string();
        let draft = orchestrator.state().text(Stage::Draft).unwrap().to_string();

        let client = ScriptedClient::replying(&[&draft]);
        orchestrator.draft(&client).unwrap();
        let call = &client.calls()[0];
        assert_eq!(call.text(), structure);
        assert_eq!(
            call.instructions,
            orchestrator.instructions().for_stage(Stage::Draft).text
        );

        let client = ScriptedClient::replying(&["Reference List\nA\nCitation List\n(A)"]);
        let params = orchestrator.default_cite_params("Harvard");
        orchestrator.cite_build(&client, &params).unwrap();
        let call = &client.calls()[0];
        assert!(call.text().starts_with("Reference style: MLA\n"));
        assert!(call.text().ends_with(&draft));
        assert!(!call.text().contains("Topic:"));
        assert!(!call.text().contains(&structure));
    }

    #[test]
    fn default_cite_params_follow_summary_and_draft() {
        let orchestrator = through_draft();
        let params = orchestrator.default_cite_params("Harvard");
        assert_eq!(params.reference_style, "MLA");
        assert_eq!(params.word_count, 10);

        let mut bare = Orchestrator::default();
        let client = ScriptedClient::replying(&["Topic: Wind"]);
        bare.summarize(&client, &brief("wind")).unwrap();
        assert_eq!(bare.default_cite_params("Harvard").reference_style, "Harvard");
        assert_eq!(bare.default_cite_params("Harvard").word_count, 0);
    }

    #[test]
    fn finalize_uses_split_bundle_and_overrides() {
        let mut orchestrator = through_draft();
        let client = ScriptedClient::replying(&[
            "Reference List\nAdams (2023)\n\nCitation List\n(Adams, 2023)",
            "final",
            "final again",
        ]);
        let params = CiteParams {
            reference_style: "APA".to_string(),
            word_count: 1000,
        };
        orchestrator.cite_build(&client, &params).unwrap();
        assert_eq!(orchestrator.default_finalize_style("Harvard"), "APA");

        orchestrator
            .finalize(
                &client,
                &FinalizeParams {
                    reference_style: "APA".to_string(),
                    ..FinalizeParams::default()
                },
            )
            .unwrap();
        let sent = client.calls()[1].text();
        assert!(sent.contains("=== REFERENCE LIST ===\nReference List\nAdams (2023)\n\n"));
        assert!(sent.contains("=== CITATION LIST ===\nCitation List\n(Adams, 2023)\n"));

        orchestrator
            .finalize(
                &client,
                &FinalizeParams {
                    reference_style: "APA".to_string(),
                    reference_list: None,
                    citation_list: Some("(Brown, 2020)".to_string()),
                },
            )
            .unwrap();
        let sent = client.calls()[2].text();
        assert!(sent.contains("=== CITATION LIST ===\n(Brown, 2020)\n"));
        assert_eq!(orchestrator.state().text(Stage::Finalize), Some("final again"));
        assert!(orchestrator.state().is_fresh(Stage::CiteBuild));
    }
}
