// src/tools/mod.rs
// Tool registry and executors for the agent loop.
//
// The registry is built once at startup and looked up by name; a miss is a
// conversational error, not a crash. Executors return `Ok` strings for
// expected/business failures ("Error: ..."), which flow back into the
// conversation so the model can correct itself. Only infrastructure
// failures are `Err`.

mod commit_ops;
mod file_ops;
mod local_store;

pub use commit_ops::{ApplyDiffTool, DeleteFileTool, MoveFileTool, ReplaceFileTool};
pub use file_ops::{FileContentTool, FileTreeTool, SearchRepoTool};
pub use local_store::LocalFileStore;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::provider::ToolDescriptor;

/// The repository being edited, behind the seam the host application owns.
/// Paths are repo-relative.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// File content, or None when the path is missing or is a directory.
    async fn read(&self, path: &str) -> Result<Option<String>>;

    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Returns false when there was nothing to delete.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Returns false when the source does not exist.
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;

    /// Entries of a directory (empty string = repo root), or None when the
    /// path is not a directory.
    async fn list_dir(&self, dir: &str) -> Result<Option<Vec<String>>>;

    /// Repo-relative paths of files whose content contains `query`.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// Where human-readable progress goes between agent steps. The host wires
/// this to its issue/PR comment surface; the core only supplies the text.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn update_comment(&self, body: &str) -> Result<()>;
}

/// Sink that drops progress on the floor, for tests and headless runs.
#[derive(Debug, Default)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn update_comment(&self, _body: &str) -> Result<()> {
        Ok(())
    }
}

/// Invocation context injected into every tool execution alongside the
/// model-supplied arguments.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn FileStore>,
    pub progress: Arc<dyn ProgressSink>,
    pub repo: String,
    pub branch: String,
    pub usage_id: Option<i64>,
}

impl ToolContext {
    pub fn new(store: Arc<dyn FileStore>, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            store,
            progress,
            repo: String::new(),
            branch: String::new(),
            usage_id: None,
        }
    }
}

/// A named tool the model can invoke.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String>;
}

/// Registry of tool executors, built once at startup. Registration validates
/// strict descriptors so schema contract violations fail the build, not a
/// conversation.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in workspace tools.
    pub fn with_builtin_tools() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(FileContentTool))?;
        registry.register(Arc::new(FileTreeTool))?;
        registry.register(Arc::new(SearchRepoTool))?;
        registry.register(Arc::new(ApplyDiffTool))?;
        registry.register(Arc::new(ReplaceFileTool))?;
        registry.register(Arc::new(DeleteFileTool))?;
        registry.register(Arc::new(MoveFileTool))?;
        registry.register(Arc::new(UpdateCommentTool))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) -> Result<()> {
        let descriptor = tool.descriptor();
        descriptor.validate()?;
        anyhow::ensure!(
            !self.tools.contains_key(&descriptor.name),
            "tool '{}' is already registered",
            descriptor.name
        );
        self.tools.insert(descriptor.name, tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors for a mode's toolset, in the given order. Names without a
    /// registered executor (host-supplied tools not wired in) are skipped.
    pub fn descriptors(&self, names: &[&str]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name).map(|tool| tool.descriptor()))
            .collect()
    }
}

/// Forwards a model-authored progress note to the progress sink.
pub struct UpdateCommentTool;

#[async_trait]
impl ToolExecutor for UpdateCommentTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "update_progress_comment".into(),
            description: "Posts a short human-readable progress update to the issue comment so the requester can follow along.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "body": {
                        "type": "string",
                        "description": "The progress text to post. Keep it to a sentence or two.",
                    },
                },
                "required": ["body"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(body) = args.get("body").and_then(Value::as_str) else {
            return Ok("Error: body is required.".into());
        };
        ctx.progress.update_comment(body).await?;
        Ok("Comment updated successfully.".into())
    }
}
