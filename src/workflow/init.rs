//! Workflow init step.
//!
//! Init creates the session layout and a config so every later command can
//! rely on session-owned inputs.
use crate::cli::InitArgs;
use crate::pipeline::PipelineState;
use crate::session::{self, HistoryAction, HistoryEntry, SessionPaths};
use anyhow::{anyhow, Context, Result};
use std::fs;

/// Run the init step.
pub fn run_init(args: &InitArgs) -> Result<()> {
    let paths = SessionPaths::new(args.session.clone());
    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }

    let config = session::default_config(args.lm.as_deref());
    session::validate_config(&config)?;
    session::write_config(&paths, &config)?;
    println!("wrote {}", config_path.display());

    for dir in [paths.artifacts_dir(), paths.prompts_dir()] {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    }
    if !paths.state_path().is_file() {
        session::save_state(&paths, &PipelineState::new(), &[])?;
        println!("wrote {}", paths.state_path().display());
    }

    let mut entry = HistoryEntry::new(HistoryAction::Init, None);
    if args.force {
        entry = entry.with_detail("force");
    }
    session::append_history(&paths, &entry)?;

    println!(
        "next: clickdraft summarize --session {} --instruction \"...\"",
        paths.root().display()
    );
    Ok(())
}
