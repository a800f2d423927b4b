// src/compaction/mod.rs
// Conversation compaction, run before every model call: deduplicate
// superseded file/diff content, then trim to the backend's input budget.

pub mod dedup;
pub mod trim;

pub use dedup::deduplicate;
pub use trim::trim_to_token_limit;

use anyhow::Result;
use async_trait::async_trait;

use crate::conversation::Message;

/// Token measurement through the model backend's own counting call.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    async fn count_tokens(&self, messages: &[Message], system: &str) -> Result<u32>;
}

/// Full compaction pass: dedup sub-rules in their fixed order, then
/// token-budget trimming.
pub async fn compact(
    messages: Vec<Message>,
    counter: &dyn TokenCounter,
    system: &str,
    max_input: u32,
) -> Result<Vec<Message>> {
    let deduped = deduplicate(&messages);
    trim_to_token_limit(deduped, counter, system, max_input).await
}
