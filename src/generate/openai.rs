//! HTTP backend for OpenAI-style `responses` endpoints.
use super::{describe_timeout, non_empty_reply, ContentItem, GenerationClient, ServiceError};
use crate::pipeline::PipelineError;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: Vec<InputMessage>,
}

#[derive(Serialize)]
struct InputMessage {
    role: &'static str,
    content: Vec<InputContent>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent {
    InputText { text: String },
    InputImage { image_url: String },
}

/// Generation client for a hosted model.
pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Build a client whose API key comes from `api_key_env`.
    ///
    /// A missing or blank key is a configuration error: no stage can run.
    pub fn from_env(
        base_url: &str,
        api_key_env: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let api_key = env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "{api_key_env} is not set; export an API key or configure a command backend"
                ))
            })?;
        Ok(Self::new(base_url, api_key, model, timeout))
    }

    pub fn new(base_url: &str, api_key: String, model: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            timeout,
        }
    }
}

impl GenerationClient for OpenAiClient {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError> {
        let request = build_request(&self.model, instructions, payload);
        let url = format!("{}/responses", self.base_url);
        let start = Instant::now();

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&request)
            .map_err(|err| match err {
                ureq::Error::Timeout(_) => {
                    ServiceError::new(format!("request to {url} {}", describe_timeout(self.timeout)))
                }
                other => ServiceError::new(format!("request to {url} failed: {other}")),
            })?;
        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ServiceError::new(format!("read response body: {err}")))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            model = %self.model,
            status = status.as_u16(),
            response_bytes = body.len(),
            "lm invoke complete"
        );

        if !status.is_success() {
            return Err(ServiceError::new(format!(
                "generation service returned HTTP {}: {}",
                status.as_u16(),
                error_message(&body)
            )));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|err| ServiceError::new(format!("parse response JSON: {err}")))?;
        let text = output_text(&value)
            .ok_or_else(|| ServiceError::new("response contained no output text"))?;
        non_empty_reply(text)
    }

    fn describe(&self) -> String {
        format!("model: {}", self.model)
    }
}

fn build_request<'a>(
    model: &'a str,
    instructions: &'a str,
    payload: &[ContentItem],
) -> ResponsesRequest<'a> {
    let content = payload
        .iter()
        .map(|item| match item {
            ContentItem::Text(text) => InputContent::InputText { text: text.clone() },
            ContentItem::Image { mime, data } => InputContent::InputImage {
                image_url: ContentItem::data_url(mime, data),
            },
        })
        .collect();
    ResponsesRequest {
        model,
        instructions,
        input: vec![InputMessage {
            role: "user",
            content,
        }],
    }
}

/// Pull the generated text out of a `responses` reply.
fn output_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let parts: Vec<&str> = value
        .get("output")?
        .as_array()?
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.concat())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}
