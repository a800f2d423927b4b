// tests/support/mod.rs
// Shared scaffolding for integration tests: a scripted model backend and a
// capturing progress sink.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use autoforge::compaction::TokenCounter;
use autoforge::conversation::{ContentBlock, Message};
use autoforge::error::ProviderError;
use autoforge::provider::{BackendReply, ModelBackend, ToolDescriptor, ToolInvocation};
use autoforge::tools::ProgressSink;

/// Backend that plays back a fixed list of replies. Once the script runs dry
/// it answers with plain text (no tool call), which ends any driver loop.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<BackendReply>>,
    pub invocations: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<BackendReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            invocations: AtomicU32::new(0),
        })
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenCounter for ScriptedBackend {
    async fn count_tokens(&self, _messages: &[Message], _system: &str) -> Result<u32> {
        Ok(0)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    fn max_input_tokens(&self) -> u32 {
        100_000
    }

    async fn invoke(
        &self,
        _messages: &[Message],
        _system: &str,
        _tools: &[ToolDescriptor],
    ) -> Result<BackendReply, ProviderError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| text_reply("Nothing further to do.")))
    }
}

/// An assistant reply that calls one tool.
pub fn tool_reply(id: &str, name: &str, args: Value) -> BackendReply {
    BackendReply {
        assistant: Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input: args.clone(),
        }]),
        tool_call: Some(ToolInvocation {
            id: id.into(),
            name: name.into(),
            args,
        }),
        input_tokens: 100,
        output_tokens: 20,
    }
}

/// An assistant reply with text only (terminates the driver loop).
pub fn text_reply(text: &str) -> BackendReply {
    BackendReply {
        assistant: Message::assistant_blocks(vec![ContentBlock::Text { text: text.into() }]),
        tool_call: None,
        input_tokens: 100,
        output_tokens: 10,
    }
}

/// Progress sink that remembers every comment body it was given.
#[derive(Default)]
pub struct CapturingSink {
    pub bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl ProgressSink for CapturingSink {
    async fn update_comment(&self, body: &str) -> Result<()> {
        self.bodies.lock().unwrap().push(body.to_string());
        Ok(())
    }
}
