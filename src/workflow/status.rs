//! Workflow status and review steps.
//!
//! Status summarizes the session deterministically and names the next action.
use super::context::SessionContext;
use crate::cli::{CheckArgs, StatusArgs};
use crate::pipeline::{word_count, CiteParams, Stage};
use crate::review::{review, ReviewReport, Severity};
use crate::session::{self, HistoryEntry, SessionPaths};
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SlotStatus {
    pub stage: Stage,
    pub artifact: &'static str,
    pub fresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub instructions_version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub schema_version: u32,
    pub session: String,
    pub backend: String,
    pub slots: Vec<SlotStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cite_params: Option<CiteParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,
    pub next_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<HistoryEntry>,
}

/// Build a status summary for an opened session without side effects.
pub(crate) fn status_summary(ctx: &SessionContext) -> Result<StatusSummary> {
    let state = ctx.orchestrator.state();
    let slots = Stage::ALL
        .iter()
        .map(|stage| {
            let text = state.text(*stage);
            SlotStatus {
                stage: *stage,
                artifact: stage.artifact_name(),
                fresh: text.is_some(),
                words: text.map(word_count),
                file: text.map(|_| ctx.paths.rel_path(&ctx.paths.artifact_path(*stage))),
                instructions_version: ctx.instructions_version(*stage).to_string(),
            }
        })
        .collect();
    let next_stage = state.next_stage();
    let next_action = next_action(&ctx.paths, next_stage);
    let last_event = session::load_history(&ctx.paths)?.pop();

    Ok(StatusSummary {
        schema_version: 1,
        session: ctx.paths.root().display().to_string(),
        backend: describe_backend(ctx),
        slots,
        cite_params: state.cite_params().cloned(),
        next_stage,
        next_action,
        last_event,
    })
}

/// Run the status step and print a summary or JSON output.
pub fn run_status(args: &StatusArgs) -> Result<()> {
    let ctx = SessionContext::load(&args.session)?;
    let summary = status_summary(&ctx)?;
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize status summary")?;
        println!("{text}");
    } else {
        print_status(&summary);
    }
    Ok(())
}

/// Run the post-hoc review and print its findings.
pub fn run_check(args: &CheckArgs) -> Result<()> {
    let ctx = SessionContext::load(&args.session)?;
    let report = review(ctx.orchestrator.state());
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize review report")?;
        println!("{text}");
    } else {
        print_review(&report);
    }
    Ok(())
}

fn describe_backend(ctx: &SessionContext) -> String {
    match &ctx.config.backend {
        session::BackendConfig::OpenAi { base_url, .. } => format!("openai ({base_url})"),
        session::BackendConfig::Command { command } => format!("command ({command})"),
    }
}

fn next_action(paths: &SessionPaths, next: Option<Stage>) -> String {
    let root = paths.root().display();
    match next {
        Some(Stage::Summarize) => {
            format!("clickdraft summarize --session {root} --instruction \"...\" [--attach FILE]")
        }
        Some(stage) => format!("clickdraft {stage} --session {root}"),
        None => format!(
            "done; read {}",
            paths.rel_path(&paths.artifact_path(Stage::Finalize))
        ),
    }
}

fn print_status(summary: &StatusSummary) {
    println!("session: {}", summary.session);
    println!("backend: {}", summary.backend);
    for slot in &summary.slots {
        let state = if slot.fresh { "fresh" } else { "empty" };
        let detail = match (&slot.file, slot.words) {
            (Some(file), Some(words)) => format!("{file}, {words} words"),
            _ => String::new(),
        };
        println!(
            "  {}. {:<16} {:<5} {}",
            slot.stage.index() + 1,
            slot.artifact,
            state,
            detail
        );
    }
    if let Some(params) = &summary.cite_params {
        println!(
            "references: {} style, {} words, target {}",
            params.reference_style,
            params.word_count,
            params.target_references()
        );
    }
    if let Some(event) = &summary.last_event {
        let stage = event
            .stage
            .map(|stage| format!(" {stage}"))
            .unwrap_or_default();
        println!("last: {:?}{stage}", event.action);
    }
    println!("next: {}", summary.next_action);
}

fn print_review(report: &ReviewReport) {
    if report.checked.is_empty() {
        println!("nothing to check yet");
        return;
    }
    for finding in &report.findings {
        let label = match finding.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        println!("{label}: {}: {}", finding.stage, finding.message);
    }
    println!(
        "checked {} artifact(s): {} warning(s), {} finding(s)",
        report.checked.len(),
        report.warnings(),
        report.findings.len()
    );
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
