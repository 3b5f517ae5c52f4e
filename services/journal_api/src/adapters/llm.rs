//! services/journal_api/src/adapters/llm.rs
//!
//! The chat-completion call shared by the classification adapters, plus parsing
//! of the JSON replies they ask for.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use mood_journal_core::ports::{PortError, PortResult};
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

/// A chat model bound to one client.
#[derive(Clone)]
pub struct ChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatModel {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Sends one system + user exchange and returns the text of the first choice.
    pub async fn complete(&self, system: &str, user: String, max_tokens: u32) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(max_tokens)
            .temperature(0.2)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Malformed("Model returned no text content.".to_string()))?;
        debug!("Model {} replied with {} characters.", self.model, content.len());
        Ok(content)
    }
}

/// Strips a surrounding markdown code fence, if the model added one.
pub fn strip_code_fence(reply: &str) -> PortResult<String> {
    let fence = Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    Ok(match fence.captures(reply).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => reply.trim().to_string(),
    })
}

/// Parses a JSON reply into `T`. Anything off-contract is `Malformed`.
pub fn parse_json<T: DeserializeOwned>(reply: &str) -> PortResult<T> {
    let body = strip_code_fence(reply)?;
    serde_json::from_str(&body).map_err(|e| PortError::Malformed(format!("{}: {}", e, body)))
}
