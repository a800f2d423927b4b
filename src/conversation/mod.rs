// src/conversation/mod.rs
// Conversation data model: messages, content blocks, and the per-invocation
// accumulator the driver threads through its loop.
//
// Message ordering is significant (position = conversation index). The system
// message and the very first user message are protected from eviction; a
// tool_use block and the tool_result carrying the same id form a pair that is
// evicted together.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One block of message content, in the wire shape model backends use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    /// The `input.file_path` of a tool_use block invoking `tool`, if any.
    pub fn tool_use_path(&self, tool: &str) -> Option<&str> {
        match self {
            ContentBlock::ToolUse { name, input, .. } if name == tool => {
                input.get("file_path").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

/// Message content is either a bare string (initial user input) or a list of
/// typed blocks (everything the tool loop produces).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// The user-role message carrying one tool_result block, as backends
    /// expect after a tool_use turn.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
            }]),
        }
    }

    pub fn blocks(&self) -> Option<&[ContentBlock]> {
        match &self.content {
            MessageContent::Blocks(blocks) => Some(blocks),
            MessageContent::Text(_) => None,
        }
    }

    /// The id of the first tool_use block, when this is an assistant message
    /// awaiting its tool_result.
    pub fn tool_use_id(&self) -> Option<&str> {
        self.blocks()?.iter().find_map(|block| match block {
            ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn has_tool_result_for(&self, tool_use_id: &str) -> bool {
        self.blocks().is_some_and(|blocks| {
            blocks.iter().any(|block| {
                matches!(block, ContentBlock::ToolResult { tool_use_id: id, .. } if id == tool_use_id)
            })
        })
    }
}

/// Set-membership key for the duplicate-call loop-breaker. A record is added
/// only after its tool actually ran, never on a duplicate skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
}

/// Accumulator for one agent invocation. Created once, mutated by each loop
/// iteration, discarded when the loop terminates.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub previous_calls: Vec<ToolCallRecord>,
    pub recursion_count: u32,
    pub progress: u32,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            previous_calls: Vec::new(),
            recursion_count: 0,
            progress: 0,
        }
    }

    pub fn was_called_before(&self, record: &ToolCallRecord) -> bool {
        self.previous_calls.contains(record)
    }
}
