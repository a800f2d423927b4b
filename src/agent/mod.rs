// src/agent/mod.rs
// The mode-based tool-calling loop that drives the model.
//
// One invocation runs one mode: compact the conversation, call the model,
// execute (at most) one tool, append the exchange, repeat while the mode
// allows. The loop is iterative with an explicit accumulator
// (ConversationState); the recursion bound of 3 is a counter check, a hard
// stop regardless of whether further exploration would help.

mod progress;
mod prompts;
mod resolution;

pub use progress::create_progress_bar;
pub use prompts::system_prompt;
pub use resolution::ResolutionReport;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::compaction;
use crate::compaction::dedup::{APPLY_DIFF_TOOL, REPLACE_TOOL};
use crate::conversation::{ConversationState, Message, ToolCallRecord};
use crate::provider::ProviderGateway;
use crate::tools::{ToolContext, ToolRegistry};

/// Hard stop for explore-mode iterations within one invocation.
const MAX_RECURSION: u32 = 3;

/// Progress percent added per completed step.
const PROGRESS_STEP: u32 = 5;

/// Selects the system prompt and tool subset for one invocation. The mode
/// never changes across iterations within an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Comment,
    Commit,
    Explore,
    Get,
    Search,
}

impl Mode {
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Mode::Comment => &["update_progress_comment"],
            Mode::Commit => &[
                "apply_diff_to_file",
                "delete_file",
                "move_file",
                "replace_file_content",
            ],
            Mode::Explore => &[
                "get_file_tree_list",
                "get_file_content",
                "search_file_contents",
            ],
            Mode::Get => &["get_file_tree_list", "get_file_content"],
            Mode::Search => &["search_web"],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Comment => "comment",
            Mode::Commit => "commit",
            Mode::Explore => "explore",
            Mode::Get => "get",
            Mode::Search => "search",
        };
        f.write_str(name)
    }
}

/// What one invocation hands back to its caller.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub messages: Vec<Message>,
    pub previous_calls: Vec<ToolCallRecord>,
    pub tool_name: Option<String>,
    pub tool_args: Option<Value>,
    pub token_input: u32,
    pub token_output: u32,
    /// A tool actually executed (duplicate-skips and unknown tools don't count).
    pub did_work: bool,
    pub progress: u32,
}

pub struct ConversationDriver {
    gateway: Arc<ProviderGateway>,
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ConversationDriver {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        registry: Arc<ToolRegistry>,
        context: ToolContext,
    ) -> Self {
        Self {
            gateway,
            registry,
            context,
        }
    }

    /// Runs one invocation of the agent in the given mode.
    ///
    /// `log_messages` accumulates the human-readable step log across
    /// invocations; each new step re-renders the progress comment.
    pub async fn chat_with_agent(
        &self,
        mut state: ConversationState,
        mode: Mode,
        log_messages: &mut Vec<String>,
    ) -> Result<ChatOutcome> {
        let system = prompts::system_prompt(mode);
        let tools = self.registry.descriptors(mode.tool_names());

        let mut token_input = 0u32;
        let mut token_output = 0u32;
        let mut last_tool: Option<(String, Value)> = None;
        let mut did_work = false;

        loop {
            // Compact against the backend the gateway will try first; its
            // tokenizer and budget are the ones that matter for this call.
            let backend = self.gateway.preferred_backend();
            let messages = std::mem::take(&mut state.messages);
            state.messages = compaction::compact(
                messages,
                backend.as_ref(),
                &system,
                backend.max_input_tokens(),
            )
            .await?;

            let reply = self
                .gateway
                .invoke(&state.messages, &system, &tools, self.context.usage_id)
                .await?;
            token_input += reply.input_tokens;
            token_output += reply.output_tokens;

            let Some(call) = reply.tool_call else {
                info!(%mode, "no tools were called");
                let (tool_name, tool_args) = last_tool.unzip();
                return Ok(ChatOutcome {
                    messages: state.messages,
                    previous_calls: state.previous_calls,
                    tool_name,
                    tool_args,
                    token_input,
                    token_output,
                    did_work,
                    progress: state.progress,
                });
            };

            let (tool_name, tool_args) =
                correct_misdirected_call(&self.registry, call.name, call.args);
            let record = ToolCallRecord {
                name: tool_name.clone(),
                args: tool_args.clone(),
            };

            let mut executed = false;
            let tool_result = if state.was_called_before(&record) {
                // Loop-breaker: answer with a deterministic error instead of
                // re-running the tool.
                let message = format!(
                    "Error: The function '{tool_name}' was already called with the same arguments '{tool_args}' as before. You need to either:\n1. Call the function with different arguments, or\n2. Call another function, or\n3. Stop calling the function."
                );
                info!(tool = %tool_name, "duplicate tool call skipped");
                message
            } else {
                match self.registry.resolve(&tool_name) {
                    Some(tool) => {
                        let result = tool.execute(&tool_args, &self.context).await?;
                        state.previous_calls.push(record);
                        executed = true;
                        did_work = true;
                        result
                    }
                    None => format!(
                        "Error: The function '{tool_name}' does not exist in the available tools. Please use one of the available tools."
                    ),
                }
            };

            state.messages.push(reply.assistant);
            state
                .messages
                .push(Message::tool_result(call.id.as_str(), tool_result.as_str()));

            if let Some(step) = describe_tool_call(&tool_name, &tool_args, &tool_result) {
                log_messages.push(step);
                state.progress = (state.progress + PROGRESS_STEP).min(95);
                let body = create_progress_bar(state.progress, &log_messages.join("\n"));
                if let Err(err) = self.context.progress.update_comment(&body).await {
                    warn!(%err, "progress comment update failed");
                }
            }

            last_tool = Some((tool_name, tool_args));
            state.recursion_count += 1;

            if mode == Mode::Explore && executed && state.recursion_count < MAX_RECURSION {
                continue;
            }

            let (tool_name, tool_args) = last_tool.unzip();
            return Ok(ChatOutcome {
                messages: state.messages,
                previous_calls: state.previous_calls,
                tool_name,
                tool_args,
                token_input,
                token_output,
                did_work,
                progress: state.progress,
            });
        }
    }
}

/// The model regularly reaches for a committing tool with the other tool's
/// arguments, or for tool names that never existed. Redirect the recognizable
/// cases instead of bouncing an error back.
fn correct_misdirected_call(
    registry: &ToolRegistry,
    name: String,
    args: Value,
) -> (String, Value) {
    if registry.resolve(&name).is_some() {
        let has = |key: &str| args.get(key).is_some();
        if name == APPLY_DIFF_TOOL && has("file_path") && !has("diff") && has("file_content") {
            warn!("redirecting call from '{name}' to '{REPLACE_TOOL}'");
            return (REPLACE_TOOL.to_string(), args);
        }
        if name == REPLACE_TOOL && has("diff") {
            warn!("redirecting call from '{name}' to '{APPLY_DIFF_TOOL}'");
            return (APPLY_DIFF_TOOL.to_string(), args);
        }
        return (name, args);
    }
    let corrected = match name.as_str() {
        "create_remote_file" | "update_remote_file" | "modify_remote_file" => REPLACE_TOOL,
        _ => return (name, args),
    };
    warn!("redirecting call from '{name}' to '{corrected}'");
    (corrected.to_string(), args)
}

fn is_valid_line_number(value: &Value) -> bool {
    value.as_i64().is_some_and(|n| n > 0)
}

/// Human-readable step message for the progress log. None means the step is
/// not worth narrating (e.g. the progress comment itself).
fn describe_tool_call(name: &str, args: &Value, result: &str) -> Option<String> {
    let arg = |key: &str| args.get(key).and_then(Value::as_str);
    match name {
        "get_file_content" => {
            let file_path = arg("file_path")?;
            if let Some(line_number) = args.get("line_number") {
                let line_info = if is_valid_line_number(line_number) {
                    format!(" around line {line_number}")
                } else {
                    String::new()
                };
                Some(format!("Read `{file_path}`{line_info}."))
            } else if let Some(keyword) = arg("keyword") {
                Some(format!("Read `{file_path}` around keyword `{keyword}`."))
            } else {
                Some(format!("Read `{file_path}`."))
            }
        }
        "search_file_contents" => {
            let query = arg("query")?;
            let files: Vec<&str> = result
                .lines()
                .filter_map(|line| line.strip_prefix("- "))
                .collect();
            if result.starts_with("0 files found") || files.is_empty() {
                Some(format!(
                    "Searched repository for `{query}` but found no matching files."
                ))
            } else {
                Some(format!(
                    "Searched repository for `{query}` and found: \n- {}\n",
                    files.join("\n- ")
                ))
            }
        }
        "get_file_tree_list" => {
            let dir_path = arg("dir_path").filter(|dir| !dir.is_empty());
            let listed = result.starts_with("- ");
            match (listed, dir_path) {
                (true, Some(dir)) => {
                    Some(format!("Listed contents of directory '{dir}': \n{result}\n"))
                }
                (true, None) => Some(format!("Listed root directory contents: \n{result}\n")),
                (false, Some(dir)) => Some(format!("Directory '{dir}' not found or is empty.")),
                (false, None) => Some("Root directory is empty or not found.".to_string()),
            }
        }
        APPLY_DIFF_TOOL | REPLACE_TOOL => {
            let file_path = arg("file_path")?;
            Some(format!("Committed changes to `{file_path}`."))
        }
        "delete_file" => {
            let file_path = arg("file_path")?;
            Some(format!("Deleted `{file_path}`."))
        }
        "move_file" => {
            let old = arg("old_file_path")?;
            let new = arg("new_file_path")?;
            Some(format!("Moved `{old}` to `{new}`."))
        }
        "search_web" => {
            let query = arg("query")?;
            if query.trim().is_empty() {
                None
            } else {
                Some(format!("Searched the web for `{query}` and went through the results."))
            }
        }
        "update_progress_comment" => None,
        _ => Some(format!("Calling `{name}()` with `{args}`.")),
    }
}
