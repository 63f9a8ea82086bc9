//! The five-stage document pipeline.
//!
//! Summarize → Structure → Draft → Cite-Build → Finalize. Each stage is a fixed
//! instruction set plus a payload drawn from the pipeline state, triggered
//! explicitly by the human. Changing any artifact, by regeneration or by edit,
//! discards every artifact after it.
mod error;
mod instructions;
mod orchestrator;
mod payload;
mod stage;
mod state;

pub use error::PipelineError;
pub use instructions::InstructionSet;
pub use orchestrator::{Orchestrator, StageOutcome};
pub use payload::{
    target_reference_count, word_count, Brief, CiteParams, FinalizeParams, ReferenceBundle,
    CITATION_LIST_MARKER, DEFAULT_REFERENCE_STYLE,
};
pub use stage::Stage;
pub use state::PipelineState;
