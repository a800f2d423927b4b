// src/provider/openai.rs
// OpenAI Chat Completions backend (failover fallback).
//
// The conversation is kept in tool_use/tool_result block shape; this backend
// converts on the way in: the system prompt rides under the `developer` role,
// a tool_use block becomes an assistant `tool_calls` entry, and a tool_result
// becomes a `tool`-role message carrying the originating call id and name.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{BackendReply, ModelBackend, ToolDescriptor, ToolInvocation};
use crate::compaction::TokenCounter;
use crate::config::CONFIG;
use crate::conversation::{ContentBlock, Message, MessageContent, Role};
use crate::error::ProviderError;

/// Output reservation used when deriving the input budget.
const MAX_OUTPUT_TOKENS: u32 = 16_384;

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    context_window: u32,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(CONFIG.request_timeout))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: CONFIG.openai_base_url.clone(),
            model,
            context_window: CONFIG.openai_context_window,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        anyhow::ensure!(!CONFIG.openai_api_key.is_empty(), "OPENAI_API_KEY is not set");
        Ok(Self::new(
            CONFIG.openai_api_key.clone(),
            CONFIG.openai_model_id.clone(),
        ))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn api_messages(messages: &[Message], system: &str) -> Vec<Value> {
        let mut api = vec![json!({"role": "developer", "content": system})];
        // tool_call_id → tool name, so tool results can carry their name.
        let mut call_names: HashMap<String, String> = HashMap::new();

        for message in messages {
            match &message.content {
                MessageContent::Text(text) => {
                    api.push(json!({"role": Self::role_str(message.role), "content": text}));
                }
                MessageContent::Blocks(blocks) => {
                    let mut text = String::new();
                    let mut tool_calls: Vec<Value> = Vec::new();
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text: t } => text.push_str(t),
                            ContentBlock::ToolUse { id, name, input } => {
                                call_names.insert(id.clone(), name.clone());
                                tool_calls.push(json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {
                                        "name": name,
                                        "arguments": input.to_string(),
                                    },
                                }));
                            }
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                            } => {
                                api.push(json!({
                                    "role": "tool",
                                    "tool_call_id": tool_use_id,
                                    "name": call_names.get(tool_use_id).cloned().unwrap_or_default(),
                                    "content": content,
                                }));
                            }
                        }
                    }
                    if !text.is_empty() || !tool_calls.is_empty() {
                        let mut entry = json!({
                            "role": Self::role_str(message.role),
                            "content": text,
                        });
                        if !tool_calls.is_empty() {
                            entry["tool_calls"] = Value::Array(tool_calls);
                        }
                        api.push(entry);
                    }
                }
            }
        }
        api
    }

    fn api_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                        "strict": tool.strict,
                    },
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
impl TokenCounter for OpenAiBackend {
    /// Local approximation (~4 chars per token); the API has no counting
    /// endpoint. Only trimming precision depends on this.
    async fn count_tokens(&self, messages: &[Message], system: &str) -> anyhow::Result<u32> {
        let serialized = serde_json::to_string(messages)?;
        Ok(((serialized.len() + system.len()) / 4) as u32)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn id(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_input_tokens(&self) -> u32 {
        self.context_window - MAX_OUTPUT_TOKENS - CONFIG.token_buffer
    }

    async fn invoke(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDescriptor],
    ) -> Result<BackendReply, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "temperature": CONFIG.temperature,
            "messages": Self::api_messages(messages, system),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::api_tools(tools));
            body["parallel_tool_calls"] = Value::Bool(false);
        }

        debug!(model = %self.model, tools = tools.len(), "openai request");
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, text));
        }

        let raw: Value = response.json().await?;
        let message = &raw["choices"][0]["message"];
        if message.is_null() {
            return Err(ProviderError::BadResponse {
                provider: self.id().to_string(),
                message: "response has no choices".into(),
            });
        }

        let text = message["content"].as_str().unwrap_or_default().to_string();
        let tool_call = message["tool_calls"]
            .as_array()
            .and_then(|calls| calls.first())
            .map(|call| {
                let arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
                let args = serde_json::from_str(arguments).unwrap_or_else(|err| {
                    warn!(%err, "tool call arguments were not valid JSON");
                    json!({})
                });
                ToolInvocation {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                    args,
                }
            });

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
            input_tokens: raw["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: raw["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }
}
