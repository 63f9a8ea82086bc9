//! Session directory layout, configuration, and persisted pipeline state.
//!
//! A session directory holds everything one document run owns: the config, the
//! pipeline state record, one editable file per FRESH artifact, optional
//! instruction overrides, and append-only history and generation logs.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current schema version for `session/config.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `session/state.json`.
pub const STATE_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `session/history.jsonl`.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Environment variable that selects the command backend.
pub const LM_COMMAND_ENV: &str = "CLICKDRAFT_LM_COMMAND";

mod config;
mod history;
mod lm_log;
mod paths;
mod store;

pub use config::{
    build_client, default_config, load_config, validate_config, write_config, BackendConfig,
    SessionConfig,
};
pub use history::{append_history, load_history, HistoryAction, HistoryEntry};
pub use lm_log::LoggedClient;
pub use paths::SessionPaths;
pub use store::{load_state, reconcile_edits, save_state};

/// Current epoch time in milliseconds.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
