// src/tools/commit_ops.rs
// Committing tools: apply a unified diff, replace a whole file, delete, move.
//
// The success/partial/incorrect result strings of apply_diff_to_file are
// contracts shared with the compaction pass. Diff failures are always Ok
// strings: the model is expected to read them and retry with a fixed diff,
// and the target file stays untouched on anything short of a full apply.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{ToolContext, ToolExecutor};
use crate::diff::{apply_patch, correct_hunk_headers};
use crate::provider::ToolDescriptor;

const DIFF_FORMAT: &str = "The diff must be in unified format: '--- <path>' and '+++ <path>' markers ('/dev/null' when creating a file), hunk headers like '@@ -start,len +start,len @@', zero context lines, one hunk per change block, hunks ordered by start line, LF line endings.";

fn file_path_arg(args: &Value) -> Option<&str> {
    args.get("file_path").and_then(Value::as_str)
}

fn ensure_final_newline(content: &str) -> String {
    if content.is_empty() || content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{content}\n")
    }
}

/// Applies one file's unified diff to the repository.
pub struct ApplyDiffTool;

#[async_trait]
impl ToolExecutor for ApplyDiffTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "apply_diff_to_file".into(),
            description: format!("Applies a diff to a file in the repository. Must be called at least once to commit the changes, otherwise there is nothing to deliver. {DIFF_FORMAT}"),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The repository-relative path of the file to patch.",
                    },
                    "diff": {
                        "type": "string",
                        "description": "The unified diff to apply.",
                    },
                },
                "required": ["file_path", "diff"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(file_path) = file_path_arg(args) else {
            return Ok("Error: file_path is required.".into());
        };
        let Some(diff) = args.get("diff").and_then(Value::as_str) else {
            return Ok("Error: diff is required.".into());
        };
        if diff.contains("+++ /dev/null") {
            return Ok(format!(
                "Cannot delete files using apply_diff_to_file. Use the delete_file tool instead for file path: {file_path}"
            ));
        }

        let original = ctx.store.read(file_path).await?.unwrap_or_default();
        let corrected = correct_hunk_headers(diff);
        debug!(file_path, "applying diff");

        let outcome = match apply_patch(&original, &corrected) {
            Ok(outcome) => outcome,
            Err(err) => {
                return Ok(format!(
                    "diff format is incorrect. No changes were made to the file: {file_path}. Review the diff, correct it, and try again.\n\nerror:\n{err}\n\ndiff:\n{corrected}"
                ));
            }
        };

        if outcome.modified.is_empty() {
            if outcome.rejects.is_empty() {
                // Every hunk landed on content that already matches.
                return Ok(format!(
                    "Failed to apply patch because the diff is already applied. But it's OK, move on to the next fix!\n\ndiff:\n{corrected}"
                ));
            }
            return Ok(format!(
                "diff format is incorrect. No changes were made to the file: {file_path}. Review the diff, correct it, and try again.\n\nrejected hunks:\n{}",
                outcome.reject_text()
            ));
        }

        if !outcome.rejects.is_empty() {
            return Ok(format!(
                "diff partially applied to the file: {file_path}. But, some changes were rejected. Review rejected changes, modify the diff, and try again.\n\ndiff:\n{corrected}\n\nrejected hunks:\n{}",
                outcome.reject_text()
            ));
        }

        ctx.store.write(file_path, &outcome.modified).await?;
        Ok(format!(
            "diff applied to the file: {file_path} successfully by apply_diff_to_file()."
        ))
    }
}

/// Replaces a file's entire content. The efficient choice when most of a file
/// changes; a diff would be twice the file's size.
pub struct ReplaceFileTool;

#[async_trait]
impl ToolExecutor for ReplaceFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "replace_file_content".into(),
            description: "Replaces the content of a file in the repository directly. Ideal when the entire file or most lines need rewriting; for small changes a diff via apply_diff_to_file is more appropriate.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The repository-relative path of the file to replace.",
                    },
                    "file_content": {
                        "type": "string",
                        "description": "The new content to replace the existing file content with.",
                    },
                },
                "required": ["file_path", "file_content"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(file_path) = file_path_arg(args) else {
            return Ok("Error: file_path is required.".into());
        };
        let Some(file_content) = args.get("file_content").and_then(Value::as_str) else {
            return Ok("Error: file_content is required.".into());
        };
        let file_content = ensure_final_newline(file_content);
        ctx.store.write(file_path, &file_content).await?;
        Ok(format!(
            "Content replaced in the file: {file_path} successfully."
        ))
    }
}

/// Deletes a file.
pub struct DeleteFileTool;

#[async_trait]
impl ToolExecutor for DeleteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "delete_file".into(),
            description: "Deletes a file from the repository. Use this to remove unused or duplicate files that cause conflicts.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The repository-relative path of the file to delete.",
                    },
                },
                "required": ["file_path"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(file_path) = file_path_arg(args) else {
            return Ok("Error: file_path is required.".into());
        };
        if ctx.store.delete(file_path).await? {
            Ok(format!("Deleted the file: {file_path} successfully."))
        } else {
            Ok(format!(
                "Error: file '{file_path}' does not exist, so there is nothing to delete."
            ))
        }
    }
}

/// Moves/renames a file.
pub struct MoveFileTool;

#[async_trait]
impl ToolExecutor for MoveFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "move_file".into(),
            description: "Moves a file to a new location in the repository. Useful for resolving naming conflicts or improving code organization.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "old_file_path": {
                        "type": "string",
                        "description": "The current path of the file to be moved. For example, 'src/old_name.py'.",
                    },
                    "new_file_path": {
                        "type": "string",
                        "description": "The new path for the file. Must be different from old_file_path.",
                    },
                },
                "required": ["old_file_path", "new_file_path"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(old_file_path) = args.get("old_file_path").and_then(Value::as_str) else {
            return Ok("Error: old_file_path is required.".into());
        };
        let Some(new_file_path) = args.get("new_file_path").and_then(Value::as_str) else {
            return Ok("Error: new_file_path is required.".into());
        };
        if old_file_path == new_file_path {
            return Ok("Error: new_file_path must be different from old_file_path.".into());
        }
        if ctx.store.rename(old_file_path, new_file_path).await? {
            Ok(format!(
                "Moved the file from '{old_file_path}' to '{new_file_path}' successfully."
            ))
        } else {
            Ok(format!(
                "Error: file '{old_file_path}' does not exist, so it cannot be moved."
            ))
        }
    }
}
