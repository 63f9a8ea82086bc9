//! Session configuration helpers.
//!
//! Loads, validates, and resolves `session/config.json` into a generation
//! client for one stage. Anything that would make every stage fail is reported
//! as a configuration error before a payload is assembled.
use super::{SessionPaths, CONFIG_SCHEMA_VERSION, LM_COMMAND_ENV};
use crate::generate::{CommandClient, GenerationClient, OpenAiClient};
use crate::pipeline::{PipelineError, Stage, DEFAULT_REFERENCE_STYLE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Where generation requests go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
    Command {
        command: String,
    },
}

/// Model name per stage. Unused by the command backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageModels {
    pub summarize: String,
    pub structure: String,
    pub draft: String,
    pub cite: String,
    pub finalize: String,
}

impl StageModels {
    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Summarize => &self.summarize,
            Stage::Structure => &self.structure,
            Stage::Draft => &self.draft,
            Stage::CiteBuild => &self.cite,
            Stage::Finalize => &self.finalize,
        }
    }
}

impl Default for StageModels {
    fn default() -> Self {
        let light = "gpt-4.1-mini".to_string();
        let strong = "gpt-4.1".to_string();
        Self {
            summarize: light.clone(),
            structure: light.clone(),
            draft: light,
            cite: strong.clone(),
            finalize: strong,
        }
    }
}

/// Contents of `session/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub schema_version: u32,
    pub backend: BackendConfig,
    #[serde(default)]
    pub models: StageModels,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_reference_style")]
    pub default_reference_style: String,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_reference_style() -> String {
    DEFAULT_REFERENCE_STYLE.to_string()
}

/// Config written by `init`: the hosted backend unless a command is given.
pub fn default_config(lm_command: Option<&str>) -> SessionConfig {
    let backend = match lm_command {
        Some(command) => BackendConfig::Command {
            command: command.to_string(),
        },
        None => BackendConfig::OpenAi {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        },
    };
    SessionConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        backend,
        models: StageModels::default(),
        timeout_secs: DEFAULT_TIMEOUT_SECS,
        default_reference_style: default_reference_style(),
    }
}

pub fn load_config(paths: &SessionPaths) -> Result<SessionConfig> {
    let path = paths.config_path();
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: SessionConfig =
        serde_json::from_slice(&bytes).context("parse session config JSON")?;
    Ok(config)
}

pub fn write_config(paths: &SessionPaths, config: &SessionConfig) -> Result<()> {
    let text = serde_json::to_string_pretty(config).context("serialize session config")?;
    super::store::write_atomic(&paths.config_path(), text.as_bytes())
}

/// Check the parts of the config that do not depend on the environment.
pub fn validate_config(config: &SessionConfig) -> Result<(), PipelineError> {
    let invalid = |message: String| Err(PipelineError::Configuration(message));
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return invalid(format!(
            "unsupported session config schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.timeout_secs == 0 {
        return invalid("timeout_secs must be greater than zero".to_string());
    }
    if config.default_reference_style.trim().is_empty() {
        return invalid("default_reference_style must be non-empty".to_string());
    }
    match &config.backend {
        BackendConfig::OpenAi {
            base_url,
            api_key_env,
        } => {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return invalid(format!("base_url must be an http(s) URL (got {base_url:?})"));
            }
            if api_key_env.trim().is_empty() {
                return invalid("api_key_env must name an environment variable".to_string());
            }
            for stage in Stage::ALL {
                if config.models.for_stage(stage).trim().is_empty() {
                    return invalid(format!("models.{} must be non-empty", stage.slug()));
                }
            }
        }
        BackendConfig::Command { command } => {
            if command.trim().is_empty() {
                return invalid("backend.command must be non-empty".to_string());
            }
        }
    }
    Ok(())
}

/// Pick the LM command override: the flag wins over the environment.
pub fn resolve_lm_command(explicit: Option<&str>, from_env: Option<String>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or(from_env)
        .map(|command| command.trim().to_string())
        .filter(|command| !command.is_empty())
}

/// Build the client for `stage`.
///
/// Priority: `--lm` flag, then `CLICKDRAFT_LM_COMMAND`, then the configured
/// backend.
pub fn build_client(
    config: &SessionConfig,
    stage: Stage,
    lm_flag: Option<&str>,
) -> Result<Box<dyn GenerationClient>, PipelineError> {
    validate_config(config)?;
    let timeout = config.timeout();
    if let Some(command) = resolve_lm_command(lm_flag, std::env::var(LM_COMMAND_ENV).ok()) {
        tracing::debug!(%command, "using LM command override");
        return Ok(Box::new(CommandClient::new(&command, timeout)?));
    }
    match &config.backend {
        BackendConfig::OpenAi {
            base_url,
            api_key_env,
        } => {
            let model = config.models.for_stage(stage);
            Ok(Box::new(OpenAiClient::from_env(
                base_url,
                api_key_env,
                model,
                timeout,
            )?))
        }
        BackendConfig::Command { command } => {
            Ok(Box::new(CommandClient::new(command, timeout)?))
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
