use super::{ContentItem, GenerationClient, ServiceError};
use std::cell::RefCell;
use std::collections::VecDeque;

/// A recorded generation call.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub instructions: String,
    pub payload: Vec<ContentItem>,
}

impl RecordedCall {
    /// Text of every text item, joined with newlines.
    pub fn text(&self) -> String {
        self.payload
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text(text) => Some(text.as_str()),
                ContentItem::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// In-memory client that replays queued replies and records every call.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    replies: RefCell<VecDeque<Result<String, ServiceError>>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(replies: &[&str]) -> Self {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.borrow_mut().push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.replies
            .borrow_mut()
            .push_back(Err(ServiceError::new(message)));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl GenerationClient for ScriptedClient {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError> {
        self.calls.borrow_mut().push(RecordedCall {
            instructions: instructions.to_string(),
            payload: payload.to_vec(),
        });
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::new("scripted client has no reply queued")))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
