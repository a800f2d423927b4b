// src/provider/gateway.rs
// Failover across an ordered backend chain (primary → fallbacks).
//
// A backend inside its cooldown window is skipped without an attempt. A
// rate-limited attempt starts that backend's cooldown and moves on to the
// next. Every other error propagates unchanged, and a rate limit from the
// final backend propagates too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{
    BackendReply, CooldownTracker, LlmRequestRecord, ModelBackend, RequestLog, ToolDescriptor,
    ToolInvocation,
};
use crate::config::CONFIG;
use crate::conversation::Message;
use crate::error::ProviderError;

/// Result of a gateway call, attributed to exactly one backend.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub assistant: Message,
    pub tool_call: Option<ToolInvocation>,
    pub provider: String,
    pub model_id: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

pub struct ProviderGateway {
    backends: Vec<Arc<dyn ModelBackend>>,
    cooldowns: CooldownTracker,
    request_log: Option<Arc<dyn RequestLog>>,
}

impl ProviderGateway {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>) -> anyhow::Result<Self> {
        anyhow::ensure!(!backends.is_empty(), "gateway needs at least one backend");
        Ok(Self {
            backends,
            cooldowns: CooldownTracker::new(Duration::from_secs(CONFIG.rate_limit_cooldown)),
            request_log: None,
        })
    }

    pub fn with_request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.request_log = Some(log);
        self
    }

    pub fn with_cooldowns(mut self, cooldowns: CooldownTracker) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    /// The backend the next invocation will try first: the earliest one in
    /// the chain that is not cooling down. Used to pick the token budget for
    /// compaction before the call itself.
    pub fn preferred_backend(&self) -> Arc<dyn ModelBackend> {
        self.backends
            .iter()
            .find(|backend| !self.cooldowns.is_cooling(backend.id()))
            .unwrap_or(&self.backends[0])
            .clone()
    }

    pub async fn invoke(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDescriptor],
        usage_id: Option<i64>,
    ) -> Result<GatewayReply, ProviderError> {
        let mut last_rate_limit: Option<ProviderError> = None;

        for backend in &self.backends {
            if let Some(remaining) = self.cooldowns.remaining(backend.id()) {
                debug!(
                    provider = backend.id(),
                    remaining_secs = remaining.as_secs(),
                    "skipping backend in cooldown"
                );
                continue;
            }

            info!(provider = backend.id(), model = backend.model_id(), "invoking model");
            let started = Instant::now();
            match backend.invoke(messages, system, tools).await {
                Ok(reply) => {
                    let elapsed_ms = started.elapsed().as_millis() as i64;
                    self.record_request(usage_id, backend.as_ref(), messages, &reply, elapsed_ms);
                    return Ok(GatewayReply {
                        assistant: reply.assistant,
                        tool_call: reply.tool_call,
                        provider: backend.id().to_string(),
                        model_id: backend.model_id().to_string(),
                        input_tokens: reply.input_tokens,
                        output_tokens: reply.output_tokens,
                    });
                }
                Err(err) if err.is_rate_limit() => {
                    warn!(provider = backend.id(), %err, "rate limited, failing over");
                    self.cooldowns.begin(backend.id());
                    last_rate_limit = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_rate_limit.unwrap_or(ProviderError::RateLimited {
            provider: "gateway".into(),
            message: "every backend in the chain is cooling down".into(),
        }))
    }

    fn record_request(
        &self,
        usage_id: Option<i64>,
        backend: &dyn ModelBackend,
        messages: &[Message],
        reply: &BackendReply,
        response_time_ms: i64,
    ) {
        let (Some(usage_id), Some(log)) = (usage_id, &self.request_log) else {
            return;
        };
        log.insert_llm_request(LlmRequestRecord {
            usage_id,
            provider: backend.id().to_string(),
            model_id: backend.model_id().to_string(),
            input_messages: serde_json::to_value(messages).unwrap_or_else(|_| json!([])),
            input_tokens: reply.input_tokens,
            output_message: serde_json::to_value(&reply.assistant).unwrap_or_else(|_| json!({})),
            output_tokens: reply.output_tokens,
            response_time_ms,
            created_at: Utc::now(),
        });
    }
}
