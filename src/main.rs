//! clickdraft: a human-gated pipeline from writing brief to cited document.
//!
//! Every stage is one command against a session directory; the artifacts in
//! `artifacts/` are the hand-off points where the human reviews and edits.
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod extract;
mod generate;
mod pipeline;
mod review;
mod session;
mod workflow;

use cli::{Command, RootArgs};

/// Environment variable holding the tracing filter directives.
const LOG_ENV: &str = "CLICKDRAFT_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Init(init) => workflow::run_init(init),
        Command::Summarize(summarize) => workflow::run_summarize(summarize),
        Command::Structure(stage) => workflow::run_structure(stage),
        Command::Draft(stage) => workflow::run_draft(stage),
        Command::Cite(cite) => workflow::run_cite(cite),
        Command::Finalize(finalize) => workflow::run_finalize(finalize),
        Command::Edit(edit) => workflow::run_edit(edit),
        Command::Status(status) => workflow::run_status(status),
        Command::Check(check) => workflow::run_check(check),
        Command::Extract(extract) => workflow::run_extract(extract),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
