//! Generation service clients.
//!
//! Every stage talks to the service through [`GenerationClient`]: fixed
//! instructions plus an ordered payload in, generated text out. Calls are
//! stateless, uncached, and never retried; a failure is reported as a
//! [`ServiceError`] and left to the human.
//!
//! Two backends exist:
//!
//! - [`OpenAiClient`] posts to an OpenAI-style `responses` endpoint and forwards
//!   images inline.
//! - [`CommandClient`] pipes a rendered text request into a user-configured
//!   local command (`llm`, `ollama run`, a script) and reads the reply from
//!   stdout.
use base64::Engine;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod command;
mod openai;
#[cfg(test)]
pub(crate) mod scripted;

pub use command::CommandClient;
pub use openai::OpenAiClient;

/// One element of a generation payload.
#[derive(Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    Image { mime: String, data: Vec<u8> },
}

impl ContentItem {
    /// `data:` URL for an image item.
    pub fn data_url(mime: &str, data: &[u8]) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        format!("data:{mime};base64,{encoded}")
    }
}

impl fmt::Debug for ContentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Image { mime, data } => f
                .debug_struct("Image")
                .field("mime", mime)
                .field("bytes", &data.len())
                .finish(),
        }
    }
}

/// Failure of a generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Abstraction over the external text/vision generation service.
pub trait GenerationClient {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError>;

    /// Model or command label for logs.
    fn describe(&self) -> String;
}

impl<C: GenerationClient + ?Sized> GenerationClient for Box<C> {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError> {
        (**self).generate(instructions, payload)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Render a request as plain text for text-only backends and logs.
///
/// Images cannot travel through a text channel, so each one becomes a single
/// descriptive line.
pub fn render_request_text(instructions: &str, payload: &[ContentItem]) -> String {
    let mut prompt = String::new();
    prompt.push_str("# Instructions\n\n");
    prompt.push_str(instructions.trim());
    prompt.push_str("\n\n# Input\n");
    for item in payload {
        prompt.push('\n');
        match item {
            ContentItem::Text(text) => prompt.push_str(text),
            ContentItem::Image { mime, data } => {
                prompt.push_str(&format!("[image attachment: {mime}, {} bytes]", data.len()));
            }
        }
        prompt.push('\n');
    }
    prompt
}

/// Reject empty replies so a blank artifact is never stored.
pub(crate) fn non_empty_reply(text: String) -> Result<String, ServiceError> {
    if text.trim().is_empty() {
        return Err(ServiceError::new("generation service returned no text"));
    }
    Ok(text)
}

pub(crate) fn describe_timeout(timeout: Duration) -> String {
    format!("timed out after {timeout:?}")
}
