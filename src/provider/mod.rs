// src/provider/mod.rs
// Model backend abstraction: two or more chat APIs normalized behind one call
// contract, fronted by a failover gateway with per-backend rate-limit
// cooldowns.

pub mod anthropic;
pub mod cooldown;
pub mod gateway;
pub mod openai;

pub use anthropic::AnthropicBackend;
pub use cooldown::{Clock, CooldownTracker, SystemClock};
pub use gateway::{GatewayReply, ProviderGateway};
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compaction::TokenCounter;
use crate::conversation::Message;
use crate::error::ProviderError;

/// Tool definition handed to a backend, in provider-neutral form.
///
/// When `strict` is set the schema must satisfy the structured-output rules:
/// every declared property listed in `required`, and `additionalProperties`
/// pinned to `false`. Violations are registry-build errors, not runtime ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default)]
    pub strict: bool,
}

impl ToolDescriptor {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.strict {
            return Ok(());
        }
        let required: Vec<&str> = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(properties) = self.parameters.get("properties").and_then(Value::as_object) {
            for key in properties.keys() {
                if !required.contains(&key.as_str()) {
                    anyhow::bail!(
                        "strict tool '{}': property '{}' must be listed in 'required'",
                        self.name,
                        key
                    );
                }
            }
        }
        if self.parameters.get("additionalProperties") != Some(&Value::Bool(false)) {
            anyhow::bail!(
                "strict tool '{}': 'additionalProperties' must be false",
                self.name
            );
        }
        Ok(())
    }
}

/// The model's request to invoke one named tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Normalized result of one backend call. At most one tool call is surfaced
/// (the first, when the model emits several).
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub assistant: Message,
    pub tool_call: Option<ToolInvocation>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One model backend in the failover chain. Counting goes through the same
/// trait so the trimmer can measure with the backend's own tokenizer.
#[async_trait]
pub trait ModelBackend: TokenCounter {
    /// Stable identity for cooldown tracking and logging.
    fn id(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Input-token budget: context window minus output reservation and buffer.
    fn max_input_tokens(&self) -> u32;

    async fn invoke(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDescriptor],
    ) -> Result<BackendReply, ProviderError>;
}

/// Row handed to the request-log sink after each successful invocation.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequestRecord {
    pub usage_id: i64,
    pub provider: String,
    pub model_id: String,
    pub input_messages: Value,
    pub input_tokens: u32,
    pub output_message: Value,
    pub output_tokens: u32,
    pub response_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Fire-and-forget conversation-side logging sink. The gateway calls it once
/// per successful backend invocation when a usage id is supplied and ignores
/// everything about the outcome.
pub trait RequestLog: Send + Sync {
    fn insert_llm_request(&self, record: LlmRequestRecord);
}
