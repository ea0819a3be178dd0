//! Ollama local model provider.
//!
//! Connects to a locally running Ollama server over its chat API. No API
//! key required. Streaming is always off — the dispatcher wants exactly one
//! validated body per call.

use async_trait::async_trait;
use doppel_core::{
    config::OllamaConfig,
    context::{Context, GeneratedReply},
    error::DoppelError,
    traits::Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Ollama provider backed by a local server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Create from config values.
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }
}

// --- Serde types ---

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaChatMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct OllamaChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaChatMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

/// Build Ollama-format messages: leading system message, then the
/// role-mapped conversation.
fn build_messages(context: &Context) -> Vec<OllamaChatMessage> {
    let mut messages = Vec::with_capacity(context.messages.len() + 1);
    if !context.system_prompt.is_empty() {
        messages.push(OllamaChatMessage {
            role: "system".to_string(),
            content: context.system_prompt.clone(),
        });
    }
    for m in &context.messages {
        messages.push(OllamaChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        });
    }
    messages
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, context: &Context) -> Result<GeneratedReply, DoppelError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let start = Instant::now();

        let body = OllamaChatRequest {
            model: self.model.clone(),
            messages: build_messages(context),
            stream: false,
        };

        debug!("ollama: POST {url} model={}", self.model);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DoppelError::Backend(format!("ollama request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DoppelError::Backend(format!(
                "ollama returned {status}: {text}"
            )));
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| DoppelError::Backend(format!("ollama: failed to parse response: {e}")))?;

        let text = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(DoppelError::Backend("ollama returned an empty reply".into()));
        }

        let tokens = match (parsed.eval_count, parsed.prompt_eval_count) {
            (Some(e), Some(p)) => Some(e + p),
            (Some(e), None) => Some(e),
            _ => None,
        };

        Ok(GeneratedReply {
            text,
            model: parsed.model,
            tokens_used: tokens,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("ollama not available: {e}");
                false
            }
        }
    }
}
