// src/compaction/trim.rs
// Token-budget enforcement: evict oldest removable messages until the list
// fits the backend's input budget.
//
// Protected from eviction: every system message and the first user message.
// An assistant message whose tool_use has a matching tool_result in the next
// message takes the pair out together so no orphaned tool_result remains; a
// tool_use with no result (end of conversation) goes alone. The conversation
// never trims below one message, even over budget.

use anyhow::Result;
use tracing::debug;

use super::TokenCounter;
use crate::conversation::{Message, MessageContent, Role};

pub async fn trim_to_token_limit(
    mut messages: Vec<Message>,
    counter: &dyn TokenCounter,
    system: &str,
    max_input: u32,
) -> Result<Vec<Message>> {
    if messages.is_empty() {
        return Ok(messages);
    }

    let mut tokens = counter.count_tokens(&messages, system).await?;
    while tokens > max_input && messages.len() > 1 {
        let Some((index, paired)) = next_removable(&messages) else {
            break;
        };
        if paired {
            messages.drain(index..=index + 1);
        } else {
            messages.remove(index);
        }
        tokens = counter.count_tokens(&messages, system).await?;
        debug!(tokens, remaining = messages.len(), "trimmed conversation");
    }
    Ok(messages)
}

/// First removable message, scanning forward (earliest-first tie-break is a
/// contract: later messages carry the more recent context). Returns the index
/// and whether the following tool_result comes out with it.
fn next_removable(messages: &[Message]) -> Option<(usize, bool)> {
    let first_user = messages.iter().position(|m| m.role == Role::User);
    for (i, message) in messages.iter().enumerate() {
        if message.role == Role::System {
            continue;
        }
        if first_user == Some(i) {
            continue;
        }
        let paired = message.role == Role::Assistant
            && i + 1 < messages.len()
            && matches!(message.content, MessageContent::Blocks(_))
            && message
                .tool_use_id()
                .is_some_and(|id| messages[i + 1].has_tool_result_for(id));
        return Some((i, paired));
    }
    None
}
