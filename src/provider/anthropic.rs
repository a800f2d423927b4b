// src/provider/anthropic.rs
// Anthropic Messages API backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{BackendReply, ModelBackend, ToolDescriptor, ToolInvocation};
use crate::compaction::TokenCounter;
use crate::config::CONFIG;
use crate::conversation::{ContentBlock, Message, Role};
use crate::error::ProviderError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    context_window: u32,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(CONFIG.request_timeout))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: CONFIG.anthropic_base_url.clone(),
            model,
            max_tokens: CONFIG.anthropic_max_tokens,
            context_window: CONFIG.anthropic_context_window,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        anyhow::ensure!(
            !CONFIG.anthropic_api_key.is_empty(),
            "ANTHROPIC_API_KEY is not set"
        );
        Ok(Self::new(
            CONFIG.anthropic_api_key.clone(),
            CONFIG.anthropic_model_id.clone(),
        ))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Conversation in Messages API shape. System-role messages never travel
    /// in the list; the system prompt is a top-level request field.
    fn api_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| {
                json!({
                    "role": message.role,
                    "content": message.content,
                })
            })
            .collect()
    }

    fn api_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                })
            })
            .collect()
    }

    fn map_status(&self, status: StatusCode, body: String) -> ProviderError {
        match status.as_u16() {
            429 => ProviderError::RateLimited {
                provider: self.id().to_string(),
                message: body,
            },
            401 | 403 => ProviderError::AuthFailed {
                provider: self.id().to_string(),
                message: body,
            },
            529 => ProviderError::Overloaded {
                provider: self.id().to_string(),
                message: body,
            },
            code if status.is_server_error() => ProviderError::Overloaded {
                provider: self.id().to_string(),
                message: format!("{code}: {body}"),
            },
            code => ProviderError::BadResponse {
                provider: self.id().to_string(),
                message: format!("{code}: {body}"),
            },
        }
    }
}

#[async_trait]
impl TokenCounter for AnthropicBackend {
    async fn count_tokens(&self, messages: &[Message], system: &str) -> anyhow::Result<u32> {
        let body = json!({
            "model": self.model,
            "system": system,
            "messages": Self::api_messages(messages),
        });
        let response = self
            .client
            .post(format!("{}/v1/messages/count_tokens", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("count_tokens failed ({status}): {text}");
        }
        let raw: Value = response.json().await?;
        raw["input_tokens"]
            .as_u64()
            .map(|count| count as u32)
            .ok_or_else(|| anyhow::anyhow!("count_tokens response missing input_tokens"))
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_input_tokens(&self) -> u32 {
        self.context_window - self.max_tokens - CONFIG.token_buffer
    }

    async fn invoke(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDescriptor],
    ) -> Result<BackendReply, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": CONFIG.temperature,
            "system": system,
            "messages": Self::api_messages(messages),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::api_tools(tools));
        }

        debug!(model = %self.model, tools = tools.len(), "anthropic request");
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, text));
        }

        let raw: Value = response.json().await?;
        let content = raw["content"].as_array().ok_or_else(|| {
            ProviderError::BadResponse {
                provider: self.id().to_string(),
                message: "response has no content array".into(),
            }
        })?;

        let mut text = String::new();
        let mut tool_call: Option<ToolInvocation> = None;
        for block in content {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
                // Only the first tool call is surfaced; one call per turn.
                Some("tool_use") if tool_call.is_none() => {
                    tool_call = Some(ToolInvocation {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        args: block["input"].clone(),
                    });
                }
                _ => {}
            }
        }

        let mut blocks = Vec::new();
        if !text.is_empty() {
            blocks.push(ContentBlock::Text { text });
        }
        if let Some(call) = &tool_call {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.args.clone(),
            });
        }

        Ok(BackendReply {
            assistant: Message::assistant_blocks(blocks),
            tool_call,
            input_tokens: raw["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: raw["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_messages_stay_out_of_the_list() {
        let messages = vec![
            Message::system("instructions"),
            Message::user("hello"),
        ];
        let api = AnthropicBackend::api_messages(&messages);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0]["role"], "user");
    }

    #[test]
    fn tools_use_input_schema_key() {
        let tools = vec![ToolDescriptor {
            name: "get_file_content".into(),
            description: "Reads a file".into(),
            parameters: json!({"type": "object"}),
            strict: false,
        }];
        let api = AnthropicBackend::api_tools(&tools);
        assert_eq!(api[0]["name"], "get_file_content");
        assert!(api[0]["input_schema"].is_object());
        assert!(api[0].get("parameters").is_none());
    }

    #[test]
    fn status_mapping_matches_taxonomy() {
        let backend = AnthropicBackend::new("key".into(), "claude".into());
        assert!(matches!(
            backend.map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            backend.map_status(StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::AuthFailed { .. }
        ));
        assert!(matches!(
            backend.map_status(StatusCode::from_u16(529).unwrap(), String::new()),
            ProviderError::Overloaded { .. }
        ));
        assert!(matches!(
            backend.map_status(StatusCode::BAD_REQUEST, String::new()),
            ProviderError::BadResponse { .. }
        ));
    }
}
