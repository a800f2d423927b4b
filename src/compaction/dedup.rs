// src/compaction/dedup.rs
// Removes superseded conversation content so the token budget is spent on the
// latest state of each file, not on every version the agent ever saw.
//
// Three sub-rules run in a fixed order, each idempotent and order-preserving:
//   1. earlier reads of a file collapse once a later read of it exists;
//   2. reads collapse once a later full-file replace supersedes them;
//   3. earlier diff attempts (the tool_use diff payload and failed results)
//      collapse once a later attempt on the same file exists.
// Message count and positions never change, only `content` fields. Unmatched
// or malformed markers are left untouched.
//
// The marker strings matched here are the ones the built-in tools emit; they
// are behavioral contracts shared with `tools::file_ops` / `tools::commit_ops`.

use std::collections::HashMap;

use serde_json::Value;

use crate::conversation::{ContentBlock, Message, MessageContent, Role};

pub const APPLY_DIFF_TOOL: &str = "apply_diff_to_file";
pub const REPLACE_TOOL: &str = "replace_file_content";

const OPENED_FILE: &str = "Opened file: '";
const LINE_NUMBERS_MARKER: &str = "with line numbers for your information.";
const KEYWORD_MARKER: &str = "and found multiple occurrences of";
const LINE_NUMBERS_END: &str = "' with line numbers";
const FAILED_DIFF_START: &str = "diff partially applied to the file: ";
const FAILED_DIFF_END: &str = ". But, some changes were rejected";
const SUCCESS_DIFF_START: &str = "diff applied to the file: ";
const SUCCESS_DIFF_END: &str = " successfully by apply_diff_to_file";

/// All dedup sub-rules, in their contract order.
pub fn deduplicate(messages: &[Message]) -> Vec<Message> {
    let messages = remove_duplicate_file_reads(messages);
    let messages = remove_reads_before_replace(&messages);
    remove_outdated_diff_attempts(&messages)
}

/// Path of an "Opened file" tool result (either read flavor).
fn opened_file_path(content: &str) -> Option<&str> {
    if !content.starts_with(OPENED_FILE) {
        return None;
    }
    if !content.contains(LINE_NUMBERS_MARKER) && !content.contains(KEYWORD_MARKER) {
        return None;
    }
    let rest = &content[OPENED_FILE.len()..];
    let end = rest.find('\'')?;
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}

/// Path of a line-numbered "Opened file" tool result only.
fn opened_with_line_numbers_path(content: &str) -> Option<&str> {
    let rest = content.strip_prefix(OPENED_FILE)?;
    let end = rest.find(LINE_NUMBERS_END)?;
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}

fn path_between<'a>(content: &'a str, start_marker: &str, end_marker: &str) -> Option<&'a str> {
    let start = content.find(start_marker)? + start_marker.len();
    let end = content.find(end_marker)?;
    if start >= end {
        return None;
    }
    Some(&content[start..end])
}

fn failed_diff_path(content: &str) -> Option<&str> {
    path_between(content, FAILED_DIFF_START, FAILED_DIFF_END)
}

fn successful_diff_path(content: &str) -> Option<&str> {
    path_between(content, SUCCESS_DIFF_START, SUCCESS_DIFF_END)
}

fn for_each_user_tool_result(message: &Message, mut visit: impl FnMut(&str)) {
    if message.role != Role::User {
        return;
    }
    let Some(blocks) = message.blocks() else {
        return;
    };
    for block in blocks {
        if let ContentBlock::ToolResult { content, .. } = block {
            visit(content);
        }
    }
}

/// Sub-rule 1: among all "Opened file" results, only the newest read of each
/// path keeps its content.
pub fn remove_duplicate_file_reads(messages: &[Message]) -> Vec<Message> {
    let mut latest_read: HashMap<String, usize> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        for_each_user_tool_result(message, |content| {
            if let Some(path) = opened_file_path(content) {
                latest_read.insert(path.to_string(), i);
            }
        });
    }

    let mut result = messages.to_vec();
    for (i, message) in result.iter_mut().enumerate() {
        if message.role != Role::User {
            continue;
        }
        let MessageContent::Blocks(blocks) = &mut message.content else {
            continue;
        };
        for block in blocks {
            let ContentBlock::ToolResult { content, .. } = block else {
                continue;
            };
            let replacement = opened_file_path(content)
                .filter(|path| latest_read.get(*path).is_some_and(|&latest| i < latest))
                .map(|path| format!("[Outdated '{path}' content removed]"));
            if let Some(replacement) = replacement {
                *content = replacement;
            }
        }
    }
    result
}

/// Sub-rule 2: a line-numbered read collapses once a later event for the same
/// path exists (a newer read or a full-file replace).
pub fn remove_reads_before_replace(messages: &[Message]) -> Vec<Message> {
    let mut latest_event: HashMap<String, usize> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        if let Some(blocks) = message.blocks() {
            if message.role == Role::Assistant {
                for block in blocks {
                    if let Some(path) = block.tool_use_path(REPLACE_TOOL) {
                        latest_event.insert(path.to_string(), i);
                    }
                }
            }
        }
        for_each_user_tool_result(message, |content| {
            if let Some(path) = opened_with_line_numbers_path(content) {
                latest_event.insert(path.to_string(), i);
            }
        });
    }

    let mut result = messages.to_vec();
    for (i, message) in result.iter_mut().enumerate() {
        if message.role != Role::User {
            continue;
        }
        let MessageContent::Blocks(blocks) = &mut message.content else {
            continue;
        };
        for block in blocks {
            let ContentBlock::ToolResult { content, .. } = block else {
                continue;
            };
            let Some(path) = opened_with_line_numbers_path(content) else {
                continue;
            };
            if latest_event.get(path).is_some_and(|&latest| i < latest) {
                *content = "[Outdated content removed]".to_string();
            }
        }
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DiffEventKind {
    Input,
    Replace,
    Failed,
    Successful,
}

/// Sub-rule 3: per path, only the newest diff attempt keeps its payload.
/// Earlier `apply_diff_to_file` tool_use blocks lose their `diff` field and
/// earlier failed results collapse; successful results are already terse and
/// are never collapsed. A tool_use immediately followed by its matching
/// result counts as one event, so the newest attempt keeps both halves.
pub fn remove_outdated_diff_attempts(messages: &[Message]) -> Vec<Message> {
    let mut latest_event: HashMap<String, (usize, DiffEventKind)> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        if let Some(blocks) = message.blocks() {
            if message.role == Role::Assistant {
                for block in blocks {
                    if let Some(path) = block.tool_use_path(APPLY_DIFF_TOOL) {
                        latest_event.insert(path.to_string(), (i, DiffEventKind::Input));
                    }
                    if let Some(path) = block.tool_use_path(REPLACE_TOOL) {
                        latest_event.insert(path.to_string(), (i, DiffEventKind::Replace));
                    }
                }
            }
        }
        for_each_user_tool_result(message, |content| {
            if let Some(path) = failed_diff_path(content) {
                latest_event.insert(path.to_string(), (i, DiffEventKind::Failed));
            } else if let Some(path) = successful_diff_path(content) {
                latest_event.insert(path.to_string(), (i, DiffEventKind::Successful));
            }
        });
    }

    let mut result = messages.to_vec();
    for i in 0..result.len() {
        // The immediately preceding message, for the "path already named
        // above" placeholder variant.
        let named_in_previous = |path: &str| {
            i > 0
                && messages[i - 1].blocks().is_some_and(|blocks| {
                    blocks.iter().any(|block| {
                        matches!(
                            block,
                            ContentBlock::ToolUse { input, .. }
                                if input.get("file_path").and_then(Value::as_str) == Some(path)
                        )
                    })
                })
        };
        // Matching result in the next message makes (tool_use, result) one
        // event: the pair is the latest attempt and keeps its payload.
        let paired_with_next = |id: &str| {
            messages
                .get(i + 1)
                .is_some_and(|next| next.has_tool_result_for(id))
        };

        let message = &mut result[i];
        let role = message.role;
        let MessageContent::Blocks(blocks) = &mut message.content else {
            continue;
        };
        for block in blocks {
            match block {
                ContentBlock::ToolUse { id, name, input }
                    if role == Role::Assistant && name.as_str() == APPLY_DIFF_TOOL =>
                {
                    let Some(path) = input.get("file_path").and_then(Value::as_str) else {
                        continue;
                    };
                    let Some(&(latest, _)) = latest_event.get(path) else {
                        continue;
                    };
                    if i >= latest || (latest == i + 1 && paired_with_next(id)) {
                        continue;
                    }
                    if input.get("diff").is_some() {
                        input["diff"] = Value::String("[Outdated diff input removed]".into());
                    }
                }
                ContentBlock::ToolResult { content, .. } if role == Role::User => {
                    let replacement = match failed_diff_path(content) {
                        Some(path) => {
                            let Some(&(latest, _)) = latest_event.get(path) else {
                                continue;
                            };
                            if i >= latest {
                                continue;
                            }
                            if named_in_previous(path) {
                                "[Outdated failed diff removed]".to_string()
                            } else {
                                format!("[Outdated failed diff for '{path}' removed]")
                            }
                        }
                        None => continue,
                    };
                    *content = replacement;
                }
                _ => {}
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_result(path: &str, body: &str, id: &str) -> Message {
        Message::tool_result(
            id,
            format!("Opened file: '{path}' with line numbers for your information.\n\n{body}"),
        )
    }

    fn tool_use(name: &str, id: &str, input: Value) -> Message {
        Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }])
    }

    fn result_content(message: &Message) -> &str {
        match message.blocks().unwrap().first().unwrap() {
            ContentBlock::ToolResult { content, .. } => content,
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn older_read_collapses_newest_survives() {
        let messages = vec![
            Message::system("sys"),
            read_result("file.py", "```1:v1```", "toolu_1"),
            Message::user("keep going"),
            read_result("file.py", "```1:v2```", "toolu_2"),
        ];
        let deduped = remove_duplicate_file_reads(&messages);

        assert_eq!(deduped.len(), 4);
        assert_eq!(
            result_content(&deduped[1]),
            "[Outdated 'file.py' content removed]"
        );
        assert!(result_content(&deduped[3]).contains("v2"));
    }

    #[test]
    fn keyword_read_flavor_also_collapses() {
        let older = Message::tool_result(
            "toolu_1",
            "Opened file: 'lib.rs' and found multiple occurrences of 'foo'.\n\nsegment",
        );
        let newer = read_result("lib.rs", "```1:current```", "toolu_2");
        let deduped = remove_duplicate_file_reads(&[older, newer]);
        assert_eq!(
            result_content(&deduped[0]),
            "[Outdated 'lib.rs' content removed]"
        );
    }

    #[test]
    fn read_collapses_after_full_replace() {
        let messages = vec![
            read_result("app.py", "```1:old```", "toolu_1"),
            tool_use(
                REPLACE_TOOL,
                "toolu_2",
                json!({"file_path": "app.py", "file_content": "new"}),
            ),
        ];
        let deduped = remove_reads_before_replace(&messages);
        assert_eq!(result_content(&deduped[0]), "[Outdated content removed]");
    }

    #[test]
    fn latest_read_is_untouched_when_nothing_follows() {
        let messages = vec![read_result("app.py", "```1:current```", "toolu_1")];
        let deduped = deduplicate(&messages);
        assert!(result_content(&deduped[0]).contains("current"));
    }

    #[test]
    fn older_diff_attempt_loses_payload_newest_pair_keeps_it() {
        let failed = |id: &str| {
            Message::tool_result(
                id,
                "diff partially applied to the file: app.py. But, some changes were rejected. rej",
            )
        };
        let messages = vec![
            tool_use(
                APPLY_DIFF_TOOL,
                "toolu_1",
                json!({"file_path": "app.py", "diff": "first attempt"}),
            ),
            failed("toolu_1"),
            tool_use(
                APPLY_DIFF_TOOL,
                "toolu_2",
                json!({"file_path": "app.py", "diff": "second attempt"}),
            ),
            failed("toolu_2"),
        ];
        let deduped = remove_outdated_diff_attempts(&messages);

        let first_input = match deduped[0].blocks().unwrap().first().unwrap() {
            ContentBlock::ToolUse { input, .. } => input,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(first_input["diff"], "[Outdated diff input removed]");
        // Preceding message named app.py in its tool_use, so the short form.
        assert_eq!(result_content(&deduped[1]), "[Outdated failed diff removed]");

        let second_input = match deduped[2].blocks().unwrap().first().unwrap() {
            ContentBlock::ToolUse { input, .. } => input,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(second_input["diff"], "second attempt");
        assert!(result_content(&deduped[3]).contains("rejected"));
    }

    #[test]
    fn orphan_failed_result_names_its_path() {
        let messages = vec![
            Message::user("context"),
            Message::tool_result(
                "toolu_1",
                "diff partially applied to the file: util.py. But, some changes were rejected. rej",
            ),
            tool_use(
                APPLY_DIFF_TOOL,
                "toolu_2",
                json!({"file_path": "util.py", "diff": "retry"}),
            ),
        ];
        let deduped = remove_outdated_diff_attempts(&messages);
        assert_eq!(
            result_content(&deduped[1]),
            "[Outdated failed diff for 'util.py' removed]"
        );
    }

    #[test]
    fn successful_results_are_never_collapsed() {
        let success = Message::tool_result(
            "toolu_1",
            "diff applied to the file: app.py successfully by apply_diff_to_file().",
        );
        let later = tool_use(
            APPLY_DIFF_TOOL,
            "toolu_2",
            json!({"file_path": "app.py", "diff": "more"}),
        );
        let deduped = remove_outdated_diff_attempts(&[success.clone(), later]);
        assert_eq!(result_content(&deduped[0]), result_content(&success));
    }

    #[test]
    fn dedup_is_idempotent_and_preserves_shape() {
        let messages = vec![
            Message::system("sys"),
            read_result("a.py", "```1:v1```", "toolu_1"),
            tool_use(
                APPLY_DIFF_TOOL,
                "toolu_2",
                json!({"file_path": "a.py", "diff": "d1"}),
            ),
            Message::tool_result(
                "toolu_2",
                "diff partially applied to the file: a.py. But, some changes were rejected. rej",
            ),
            read_result("a.py", "```1:v2```", "toolu_3"),
            tool_use(
                APPLY_DIFF_TOOL,
                "toolu_4",
                json!({"file_path": "a.py", "diff": "d2"}),
            ),
        ];
        let once = deduplicate(&messages);
        let twice = deduplicate(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), messages.len());
        for (before, after) in messages.iter().zip(&once) {
            assert_eq!(before.role, after.role);
        }
    }

    #[test]
    fn malformed_markers_are_left_alone() {
        let odd = Message::tool_result("toolu_1", "Opened file: 'unterminated");
        let deduped = deduplicate(&[odd.clone(), Message::user("next")]);
        assert_eq!(result_content(&deduped[0]), result_content(&odd));
    }
}
