//! Chat model abstraction layer.
//!
//! This module provides:
//! - [`ChatModel`] trait for swappable model providers
//! - [`ModelRegistry`] for creating clients from configuration
//! - The OpenAI-compatible implementation
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement the `ChatModel` trait
//! 3. Add a match arm in `ModelRegistry::create()`

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::Error;
use crate::tool::ToolDefinition;
use crate::Result;

use super::message::{Message, ToolCallRequest};

pub mod openai;

pub use openai::OpenAiClient;

/// Response from a chat model.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl ChatResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if the response requests tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Chat model trait — swappable provider abstraction.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send messages with bound tool definitions and get a response.
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse>;

    /// Stream a text-only completion chunk by chunk.
    ///
    /// The default delegates to `chat` and yields the whole response as one
    /// chunk; providers with native streaming should override this.
    async fn chat_stream(&self, messages: &[Message]) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.chat(messages, &[]).await?;
        let content = response.content.unwrap_or_default();
        Ok(futures_util::stream::iter([Ok(content)]).boxed())
    }

    /// Model identifier this client targets.
    fn model_name(&self) -> &str;
}

/// Model registry — creates chat clients from configuration.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Create a chat model client from configuration.
    ///
    /// Supported providers:
    /// - `"openai"`: OpenAI chat completions, or any compatible endpoint
    ///   via `base_url`
    pub fn create(config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
        match config.provider.as_str() {
            "openai" => Ok(Arc::new(OpenAiClient::new(config))),
            other => Err(Error::Config(format!("Unknown model provider: {other}"))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["openai"]
    }
}

/// Scripted chat model for testing.
#[cfg(test)]
pub(crate) struct FakeChatModel {
    responses: std::sync::Mutex<std::collections::VecDeque<ChatResponse>>,
}

#[cfg(test)]
impl FakeChatModel {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses.iter().map(|s| ChatResponse::text(*s)).collect(),
            ),
        }
    }

    /// Create from fully scripted responses.
    pub fn scripted(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }

    /// Response that calls one tool.
    pub fn tool_call_response(name: &str, args: serde_json::Value) -> ChatResponse {
        ChatResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "tc_1".to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ChatModel for FakeChatModel {
    async fn chat(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChatResponse> {
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .ok_or_else(|| Error::Model("No more scripted responses".to_string()))
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
