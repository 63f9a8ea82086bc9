//! CLI argument parsing for the session workflow.
//!
//! Each stage is its own subcommand so the human decides when the next
//! generation call happens; nothing runs on its own.
use crate::pipeline::Stage;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "clickdraft",
    version,
    about = "Human-gated pipeline that turns a writing brief into a cited academic document",
    after_help = "Stages (run in order; each one reads the previous artifact):\n  summarize  brief + attachments  -> artifacts/1-job-summary.md\n  structure  job summary          -> artifacts/2-structure.md\n  draft      structure            -> artifacts/3-draft.md\n  cite       draft                -> artifacts/4-references.md\n  finalize   draft + references   -> artifacts/5-final-document.md\n\nEdit any artifact file (or use `edit`) before the next stage; every later\nartifact is discarded when an earlier one changes.\n\nExamples:\n  clickdraft init --session essay\n  clickdraft summarize --session essay --instruction \"Write a 1500-word essay on wind power, APA style\"\n  clickdraft structure --session essay\n  clickdraft status --session essay",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log progress to stderr (CLICKDRAFT_LOG takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a session directory and its config
    Init(InitArgs),
    /// Summarize the brief and attachments into a job summary
    Summarize(SummarizeArgs),
    /// Turn the job summary into an outline with word targets
    Structure(StageArgs),
    /// Write the document body from the outline
    Draft(StageArgs),
    /// Build the reference and citation lists for the draft
    Cite(CiteArgs),
    /// Insert citations and append the reference list
    Finalize(FinalizeArgs),
    /// Replace an artifact's text; later artifacts are discarded
    Edit(EditArgs),
    /// Show slot states and the next action
    Status(StatusArgs),
    /// Review generated artifacts for structural problems
    Check(CheckArgs),
    /// Print the text extracted from attachments
    Extract(ExtractArgs),
}

// Options shared by every generation stage.
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    /// Session directory created by `clickdraft init`
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Local LM command to use instead of the configured backend
    #[arg(long, value_name = "COMMAND")]
    pub lm: Option<String>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Session directory to create
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Configure the command backend with this LM command
    #[arg(long, value_name = "COMMAND")]
    pub lm: Option<String>,

    /// Overwrite an existing config.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Brief text
    #[arg(long, value_name = "TEXT", conflicts_with = "instruction_file")]
    pub instruction: Option<String>,

    /// Read the brief text from a file
    #[arg(long, value_name = "PATH")]
    pub instruction_file: Option<PathBuf>,

    /// Attach a document or image (repeatable)
    #[arg(long, value_name = "PATH")]
    pub attach: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CiteArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Reference style (default: the job summary's, else the config default)
    #[arg(long, value_name = "STYLE")]
    pub reference_style: Option<String>,

    /// Word count used to size the reference list (default: the draft's)
    #[arg(long, value_name = "N")]
    pub word_count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct FinalizeArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Reference style (default: the one used for the references)
    #[arg(long, value_name = "STYLE")]
    pub reference_style: Option<String>,

    /// Use this reference list instead of the stored one, for this run only
    #[arg(long, value_name = "PATH")]
    pub reference_list: Option<PathBuf>,

    /// Use this citation list instead of the stored one, for this run only
    #[arg(long, value_name = "PATH")]
    pub citation_list: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Session directory created by `clickdraft init`
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Stage whose artifact to replace (summarize, structure, draft, cite, finalize)
    #[arg(long, value_name = "STAGE")]
    pub stage: Stage,

    /// Read the new text from a file
    #[arg(long, value_name = "PATH", conflicts_with = "text", required_unless_present = "text")]
    pub from: Option<PathBuf>,

    /// New text
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Session directory created by `clickdraft init`
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Session directory created by `clickdraft init`
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Files to extract
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        RootArgs::command().debug_assert();
    }

    #[test]
    fn stage_names_parse_for_edit() {
        let args = RootArgs::try_parse_from([
            "clickdraft", "edit", "--session", "s", "--stage", "cite", "--text", "refs",
        ])
        .unwrap();
        match args.command {
            Command::Edit(edit) => {
                assert_eq!(edit.stage, Stage::CiteBuild);
                assert_eq!(edit.text.as_deref(), Some("refs"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn edit_requires_a_source() {
        assert!(RootArgs::try_parse_from(["clickdraft", "edit", "--session", "s", "--stage", "draft"]).is_err());
    }

    #[test]
    fn verbose_is_accepted_after_the_subcommand() {
        let args = RootArgs::try_parse_from([
            "clickdraft", "draft", "--session", "s", "--lm", "llm -m x", "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Draft(stage) => assert_eq!(stage.lm.as_deref(), Some("llm -m x")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
