//! OpenAI-compatible chat model client.
//!
//! Targets the chat completions endpoint with function-calling tools, both
//! non-streaming and SSE streaming. Any gateway speaking the same protocol
//! works through `base_url`.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{ModelConfig, ModelSettings};
use crate::error::Error;
use crate::tool::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::types::{ChatCompletionResponse, StreamChunk};
use super::{ChatModel, ChatResponse, Usage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    settings: ModelSettings,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
            settings: config.settings.clone(),
            client: Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::Human => json!({"role": "user", "content": m.content}),
                Role::Ai => {
                    if let Some(ref tool_calls) = m.tool_calls {
                        let calls: Vec<Value> = tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string(),
                                    }
                                })
                            })
                            .collect();
                        json!({"role": "assistant", "content": m.content, "tool_calls": calls})
                    } else {
                        json!({"role": "assistant", "content": m.content})
                    }
                }
                Role::Tool => json!({
                    "role": "tool",
                    "content": m.content,
                    "tool_call_id": m.tool_call_id.as_deref().unwrap_or("unknown"),
                }),
            })
            .collect()
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }

        let functions: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        Some(Value::Array(functions))
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition], stream: bool) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": self.convert_messages(messages),
        });

        if let Some(tool_config) = self.convert_tools(tools) {
            request["tools"] = tool_config;
        }
        if let Some(temperature) = self.settings.temperature {
            request["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            request["max_tokens"] = json!(max_tokens);
        }
        if stream {
            request["stream"] = json!(true);
        }

        request
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let mut request = self.client.post(self.completions_url()).json(payload);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "Chat API error ({status}): {error_text}"
            )));
        }
        Ok(response)
    }

    fn parse_response(&self, response: ChatCompletionResponse) -> Result<ChatResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("No choices in response".to_string()))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::Object(Default::default()));
            tool_calls.push(ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse> {
        let payload = self.build_request(messages, tools, false);
        debug!("Chat request to {} with {} tools", self.model, tools.len());

        let response = self.send(&payload).await?;
        let parsed: ChatCompletionResponse = response.json().await?;
        self.parse_response(parsed)
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<BoxStream<'static, Result<String>>> {
        let payload = self.build_request(messages, &[], true);
        let response = self.send(&payload).await?;
        let body = response.bytes_stream();

        let chunks = futures_util::stream::try_unfold(
            (body, String::new()),
            |(mut body, mut buffer)| async move {
                loop {
                    if let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim().to_string();
                        buffer.drain(..=pos);

                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data == "[DONE]" {
                            return Ok(None);
                        }
                        if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
                            let content = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .unwrap_or_default();
                            if !content.is_empty() {
                                return Ok(Some((content, (body, buffer))));
                            }
                        }
                        continue;
                    }

                    match body.next().await {
                        Some(Ok(bytes)) => buffer.push_str(&String::from_utf8_lossy(&bytes)),
                        Some(Err(e)) => return Err(Error::Http(e)),
                        None => return Ok(None),
                    }
                }
            },
        );

        Ok(chunks.boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Message;

    fn client() -> OpenAiClient {
        OpenAiClient::new(&ModelConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: None,
            settings: ModelSettings {
                temperature: Some(0.2),
                max_tokens: Some(512),
            },
        })
    }

    #[test]
    fn test_message_conversion() {
        let client = client();
        let messages = vec![
            Message::system("be helpful"),
            Message::human("hi"),
            Message::ai_with_tools(
                "",
                vec![ToolCallRequest {
                    id: "tc_1".to_string(),
                    name: "get_balance".to_string(),
                    arguments: json!({"network": "solana"}),
                }],
            ),
            Message::tool_result("tc_1", "get_balance", "{\"status\":\"success\"}"),
        ];

        let converted = client.convert_messages(&messages);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(
            converted[2]["tool_calls"][0]["function"]["name"],
            "get_balance"
        );
        assert_eq!(converted[3]["role"], "tool");
        assert_eq!(converted[3]["tool_call_id"], "tc_1");
    }

    #[test]
    fn test_request_includes_settings_and_tools() {
        let client = client();
        let tools = vec![ToolDefinition {
            name: "get_balance".to_string(),
            description: "Get balances".to_string(),
            parameters: json!({"type": "object"}),
        }];

        let request = client.build_request(&[Message::human("hi")], &tools, true);
        assert_eq!(request["model"], "gpt-4o-mini");
        assert_eq!(request["temperature"], 0.2);
        assert_eq!(request["max_tokens"], 512);
        assert_eq!(request["stream"], true);
        assert_eq!(request["tools"][0]["function"]["name"], "get_balance");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let client = client();
        let parsed: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "get_swap_quote",
                            "arguments": "{\"fromToken\":\"SOL\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let response = client.parse_response(parsed).unwrap();
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].name, "get_swap_quote");
        assert_eq!(response.tool_calls[0].arguments["fromToken"], "SOL");
        assert_eq!(response.usage.total_tokens, 15);
    }
}
