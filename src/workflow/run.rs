//! Stage commands.
//!
//! Each command opens the session, runs exactly one stage (or one edit), and
//! persists the result. Refusals and failures are recorded in history and
//! leave the state record as it was.
use super::context::{stage_list, SessionContext};
use crate::cli::{CiteArgs, EditArgs, ExtractArgs, FinalizeArgs, StageArgs, SummarizeArgs};
use crate::extract::{extract, Attachment};
use crate::generate::GenerationClient;
use crate::pipeline::{
    word_count, Brief, CiteParams, FinalizeParams, Orchestrator, PipelineError, Stage,
    StageOutcome,
};
use crate::session::{self, HistoryAction, HistoryEntry, LoggedClient};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

pub fn run_summarize(args: &SummarizeArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.stage.session)?;
    let brief = load_brief(args)?;
    run_stage(&mut ctx, Stage::Summarize, args.stage.lm.as_deref(), |orchestrator, client| {
        orchestrator.summarize(client, &brief)
    })
}

pub fn run_structure(args: &StageArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.session)?;
    run_stage(&mut ctx, Stage::Structure, args.lm.as_deref(), |orchestrator, client| {
        orchestrator.structure(client)
    })
}

pub fn run_draft(args: &StageArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.session)?;
    run_stage(&mut ctx, Stage::Draft, args.lm.as_deref(), |orchestrator, client| {
        orchestrator.draft(client)
    })
}

pub fn run_cite(args: &CiteArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.stage.session)?;
    let defaults = ctx
        .orchestrator
        .default_cite_params(&ctx.config.default_reference_style);
    let params = CiteParams {
        reference_style: args
            .reference_style
            .clone()
            .unwrap_or(defaults.reference_style),
        word_count: args.word_count.unwrap_or(defaults.word_count),
    };
    tracing::info!(
        style = %params.reference_style,
        words = params.word_count,
        target = params.target_references(),
        "cite parameters"
    );
    run_stage(&mut ctx, Stage::CiteBuild, args.stage.lm.as_deref(), |orchestrator, client| {
        orchestrator.cite_build(client, &params)
    })
}

pub fn run_finalize(args: &FinalizeArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.stage.session)?;
    let params = FinalizeParams {
        reference_style: args.reference_style.clone().unwrap_or_else(|| {
            ctx.orchestrator
                .default_finalize_style(&ctx.config.default_reference_style)
        }),
        reference_list: read_optional_text(args.reference_list.as_deref())?,
        citation_list: read_optional_text(args.citation_list.as_deref())?,
    };
    run_stage(&mut ctx, Stage::Finalize, args.stage.lm.as_deref(), |orchestrator, client| {
        orchestrator.finalize(client, &params)
    })
}

/// Replace a FRESH slot's text through the same path as a file edit.
pub fn run_edit(args: &EditArgs) -> Result<()> {
    let mut ctx = SessionContext::load(&args.session)?;
    let text = match (&args.text, &args.from) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => return Err(anyhow!("edit needs --from or --text")),
    };

    let cleared = match ctx.orchestrator.edit(args.stage, text) {
        Ok(cleared) => cleared,
        Err(err) => {
            ctx.record_error(args.stage, &err);
            return Err(err.into());
        }
    };
    session::save_state(&ctx.paths, ctx.orchestrator.state(), &cleared)?;
    session::append_history(
        &ctx.paths,
        &HistoryEntry::new(HistoryAction::Edit, Some(args.stage))
            .with_cleared(&cleared)
            .with_detail("edit command"),
    )?;

    let path = ctx.paths.artifact_path(args.stage);
    if ctx.orchestrator.state().is_fresh(args.stage) {
        println!("updated {}", ctx.paths.rel_path(&path));
    } else {
        println!("emptied {}", args.stage.artifact_name());
    }
    let discarded: Vec<Stage> = cleared
        .into_iter()
        .filter(|stage| *stage != args.stage)
        .collect();
    if !discarded.is_empty() {
        println!("discarded: {}", stage_list(&discarded));
    }
    print_next(&ctx);
    Ok(())
}

/// Print the extractor's text for each file.
pub fn run_extract(args: &ExtractArgs) -> Result<()> {
    for (idx, path) in args.paths.iter().enumerate() {
        let attachment =
            Attachment::read(path).with_context(|| format!("read {}", path.display()))?;
        if !attachment.kind.is_listed() {
            tracing::warn!(name = %attachment.name, "file type is not one the brief accepts");
        }
        if idx > 0 {
            println!();
        }
        println!("----- File: {} -----", attachment.name);
        println!("{}", extract(&attachment));
    }
    Ok(())
}

fn run_stage<F>(ctx: &mut SessionContext, stage: Stage, lm: Option<&str>, run: F) -> Result<()>
where
    F: FnOnce(&mut Orchestrator, &dyn GenerationClient) -> Result<StageOutcome, PipelineError>,
{
    let version = ctx.instructions_version(stage).to_string();
    let result = ctx.client(stage, lm).and_then(|client| {
        tracing::info!(stage = %stage, client = %client.describe(), "running stage");
        let logged = LoggedClient::new(client.as_ref(), &ctx.paths, stage, &version);
        let client: &dyn GenerationClient = &logged;
        run(&mut ctx.orchestrator, client)
    });

    match result {
        Ok(outcome) => {
            ctx.commit(&outcome)?;
            print_outcome(ctx, &outcome);
            Ok(())
        }
        Err(err) => {
            ctx.record_error(stage, &err);
            Err(err.into())
        }
    }
}

fn print_outcome(ctx: &SessionContext, outcome: &StageOutcome) {
    let path = ctx.paths.artifact_path(outcome.stage);
    println!(
        "wrote {} ({} words)",
        ctx.paths.rel_path(&path),
        word_count(&outcome.text)
    );
    if !outcome.cleared.is_empty() {
        println!("discarded: {}", stage_list(&outcome.cleared));
    }
    print_next(ctx);
}

fn print_next(ctx: &SessionContext) {
    match ctx.orchestrator.state().next_stage() {
        Some(next) => println!(
            "next: review or edit the artifacts, then `clickdraft {next} --session {}`",
            ctx.paths.root().display()
        ),
        None => println!(
            "done: {}",
            ctx.paths.rel_path(&ctx.paths.artifact_path(Stage::Finalize))
        ),
    }
}

fn load_brief(args: &SummarizeArgs) -> Result<Brief> {
    let instruction = match (&args.instruction, &args.instruction_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => String::new(),
    };
    let mut attachments = Vec::with_capacity(args.attach.len());
    for path in &args.attach {
        let attachment =
            Attachment::read(path).with_context(|| format!("read attachment {}", path.display()))?;
        if !attachment.kind.is_listed() {
            tracing::warn!(name = %attachment.name, "attaching a file type the brief does not list");
        }
        attachments.push(attachment);
    }
    Ok(Brief {
        instruction,
        attachments,
    })
}

fn read_optional_text(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|path| fs::read_to_string(path).with_context(|| format!("read {}", path.display())))
        .transpose()
}
