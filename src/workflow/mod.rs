//! Workflow commands for a session directory.
//!
//! Each command is a small step so the CLI stays thin and the human stays in
//! control of when the next generation call happens.
mod context;
mod init;
mod run;
mod status;

pub(crate) use init::run_init;
pub(crate) use run::{
    run_cite, run_draft, run_edit, run_extract, run_finalize, run_structure, run_summarize,
};
pub(crate) use status::{run_check, run_status};
