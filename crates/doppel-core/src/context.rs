use serde::{Deserialize, Serialize};

/// A role-tagged message for the backend's chat API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ApiMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// A fully composed generation request.
///
/// The system prompt is kept separate because chat backends take it outside
/// the messages array (or as a leading `system` role message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub system_prompt: String,
    /// Role-mapped conversation, oldest first.
    pub messages: Vec<ApiMessage>,
}

/// A validated backend response.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    /// Model identifier the backend reports, if any.
    pub model: Option<String>,
    /// Token count, if the backend reports one.
    pub tokens_used: Option<u64>,
    /// Wall-clock time of the backend call in milliseconds.
    pub processing_time_ms: u64,
}
