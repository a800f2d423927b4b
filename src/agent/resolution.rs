// src/agent/resolution.rs
// The outer loop: alternate explore and commit invocations until the ticket
// is resolved or the agent stops making progress.

use anyhow::Result;
use tracing::info;

use super::{ChatOutcome, ConversationDriver, Mode};
use crate::conversation::{ConversationState, Message, ToolCallRecord};

/// Consecutive one-sided rounds tolerated before the loop is declared stuck.
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub messages: Vec<Message>,
    pub previous_calls: Vec<ToolCallRecord>,
    pub token_input: u32,
    pub token_output: u32,
    /// At least one commit-mode invocation changed the repository.
    pub committed: bool,
    pub progress: u32,
}

impl ConversationDriver {
    /// Drives explore → commit rounds over one shared conversation until
    /// neither side does work. One-sided rounds (exploring without
    /// committing, or committing without exploring) usually mean the agent
    /// is circling, so they only get a few retries.
    pub async fn run_resolution_loop(
        &self,
        initial_messages: Vec<Message>,
    ) -> Result<ResolutionReport> {
        let mut messages = initial_messages;
        let mut previous_calls: Vec<ToolCallRecord> = Vec::new();
        let mut progress = 0u32;
        let mut log_messages: Vec<String> = Vec::new();
        let mut token_input = 0u32;
        let mut token_output = 0u32;
        let mut committed = false;
        let mut retry_count = 0u32;

        loop {
            let explore = self
                .run_mode(
                    Mode::Explore,
                    messages,
                    previous_calls,
                    progress,
                    &mut log_messages,
                )
                .await?;
            token_input += explore.token_input;
            token_output += explore.token_output;
            let is_explored = explore.did_work;

            let commit = self
                .run_mode(
                    Mode::Commit,
                    explore.messages,
                    explore.previous_calls,
                    explore.progress,
                    &mut log_messages,
                )
                .await?;
            token_input += commit.token_input;
            token_output += commit.token_output;
            let is_committed = commit.did_work;
            committed |= is_committed;

            messages = commit.messages;
            previous_calls = commit.previous_calls;
            progress = commit.progress;

            info!(is_explored, is_committed, retry_count, "resolution round finished");

            // Nothing on either side: the ticket is done or the agent gave up.
            if !is_explored && !is_committed {
                break;
            }
            // One-sided rounds get a bounded number of retries.
            if is_explored != is_committed {
                retry_count += 1;
                if retry_count > MAX_RETRIES {
                    break;
                }
                continue;
            }
            retry_count = 0;
        }

        Ok(ResolutionReport {
            messages,
            previous_calls,
            token_input,
            token_output,
            committed,
            progress,
        })
    }

    async fn run_mode(
        &self,
        mode: Mode,
        messages: Vec<Message>,
        previous_calls: Vec<ToolCallRecord>,
        progress: u32,
        log_messages: &mut Vec<String>,
    ) -> Result<ChatOutcome> {
        let state = ConversationState {
            messages,
            previous_calls,
            recursion_count: 0,
            progress,
        };
        self.chat_with_agent(state, mode, log_messages).await
    }
}
