// src/tools/file_ops.rs
// Read-only repository tools: file content, directory tree, content search.
//
// The result strings here are contracts: the "Opened file: '<path>'" marker
// families are what the compaction pass keys on to collapse superseded reads.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ToolContext, ToolExecutor};
use crate::provider::ToolDescriptor;

/// Lines of context shown around a requested line number or keyword match.
const WINDOW: usize = 50;

fn detect_line_break(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Opens a file and returns its content with line numbers, optionally
/// windowed around a line number or a keyword.
pub struct FileContentTool;

impl FileContentTool {
    fn render(path: &str, content: &str, line_number: Option<i64>, keyword: Option<&str>) -> String {
        let line_break = detect_line_break(content);
        let lines: Vec<&str> = content.split(line_break).collect();
        let width = lines.len().to_string().len();
        let numbered: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>width$}:{line}", i + 1))
            .collect();

        if let Some(keyword) = keyword {
            let mut segments = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                if !line.contains(keyword) {
                    continue;
                }
                let start = i.saturating_sub(WINDOW);
                let end = (i + WINDOW).min(lines.len().saturating_sub(1));
                let segment = numbered[start..=end].join(line_break);
                segments.push(format!(
                    "```{path}#L{}-L{}\n{segment}\n```",
                    start + 1,
                    end + 1
                ));
            }
            if segments.is_empty() {
                return format!("Keyword '{keyword}' not found in the file '{path}'.");
            }
            return format!(
                "Opened file: '{path}' and found multiple occurrences of '{keyword}'.\n\n{}",
                segments.join("\n\n\u{2022}\n\u{2022}\n\u{2022}\n\n")
            );
        }

        let mut path_with_lines = path.to_string();
        let mut window = numbered.as_slice();
        if let Some(line_number) = line_number {
            if line_number > 1 && lines.len() > 100 {
                let last = lines.len() - 1;
                let line_number = (line_number as usize).min(last);
                let start = line_number.saturating_sub(WINDOW);
                let end = (line_number + WINDOW).min(last);
                window = &numbered[start..=end];
                path_with_lines = format!("{path}#L{}-L{}", start + 1, end + 1);
            }
        }
        format!(
            "Opened file: '{path}' with line numbers for your information.\n\n```{path_with_lines}\n{}\n```",
            window.join(line_break)
        )
    }
}

#[async_trait]
impl ToolExecutor for FileContentTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_file_content".into(),
            description: "Fetches the content of a file from the repository when you think you need to inspect or modify it. NEVER call this on the same file more than once. Only open files that are likely to require modification or verification.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The repository-relative file path. For example, 'src/main.py'.",
                    },
                    "line_number": {
                        "type": "integer",
                        "description": "If you already know the line number of interest, use this. The surrounding lines will be retrieved.",
                    },
                    "keyword": {
                        "type": "string",
                        "description": "A keyword to locate in the file. Exact matches only.",
                    },
                },
                "required": ["file_path"],
            }),
            strict: false,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(file_path) = args.get("file_path").and_then(Value::as_str) else {
            return Ok("Error: file_path is required.".into());
        };
        // Models occasionally send line numbers as strings.
        let line_number = match args.get("line_number") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => match s.parse::<i64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return Ok(format!(
                        "Error: line_number '{s}' is not a valid integer."
                    ))
                }
            },
            _ => None,
        };
        let keyword = args.get("keyword").and_then(Value::as_str);
        if line_number.is_some() && keyword.is_some() {
            return Ok("Error: You can only specify either line_number or keyword, not both.".into());
        }

        match ctx.store.read(file_path).await? {
            Some(content) => Ok(Self::render(file_path, &content, line_number, keyword)),
            None => {
                // The model sends directory paths here often enough to answer
                // with a listing instead of an error.
                if let Some(entries) = ctx.store.list_dir(file_path).await? {
                    return Ok(format!(
                        "Searched directory '{file_path}' and found: {}",
                        serde_json::to_string(&entries)?
                    ));
                }
                Ok(format!(
                    "get_file_content failed: '{file_path}' was not found in the repository. Check the file path, correct it, and try again."
                ))
            }
        }
    }
}

/// Lists files and directories at a path, like `ls`.
pub struct FileTreeTool;

#[async_trait]
impl ToolExecutor for FileTreeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_file_tree_list".into(),
            description: "Lists files and directories at a specific directory path in the repository. Works like 'ls' - shows contents of the specified directory, or the root if no dir_path is given.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "dir_path": {
                        "type": "string",
                        "description": "Directory path to list. Use an empty string or omit for the root. Examples: 'src', 'tests/unit'.",
                    },
                },
            }),
            strict: false,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let dir_path = args.get("dir_path").and_then(Value::as_str).unwrap_or("");
        match ctx.store.list_dir(dir_path).await? {
            Some(entries) if !entries.is_empty() => Ok(entries
                .iter()
                .map(|entry| format!("- {entry}"))
                .collect::<Vec<_>>()
                .join("\n")),
            _ if dir_path.is_empty() => Ok("Root directory is empty or not found.".into()),
            _ => Ok(format!("Directory '{dir_path}' not found or is empty.")),
        }
    }
}

/// Repository-wide content search.
pub struct SearchRepoTool;

#[async_trait]
impl ToolExecutor for SearchRepoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_file_contents".into(),
            description: "Search for a keyword across the repository to identify files and sections that need correcting. Especially useful after changing a definition, since its usages live elsewhere. Search from as many angles as possible.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A single identifier to search for: a variable, function, or class name. Exact substring match.",
                    },
                },
                "required": ["query"],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return Ok("Error: query is required.".into());
        };
        let paths = ctx.store.search(query).await?;
        if paths.is_empty() {
            return Ok(format!("0 files found for the search query '{query}'."));
        }
        let listing: Vec<String> = paths.iter().map(|path| format!("- {path}")).collect();
        Ok(format!(
            "{} files found for the search query '{query}':\n{}",
            paths.len(),
            listing.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{FileStore, NullProgressSink, ToolContext};
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapStore {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl FileStore for MapStore {
        async fn read(&self, path: &str) -> Result<Option<String>> {
            Ok(self.files.get(path).cloned())
        }

        async fn write(&self, _path: &str, _content: &str) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }

        async fn rename(&self, _from: &str, _to: &str) -> Result<bool> {
            Ok(false)
        }

        async fn list_dir(&self, dir: &str) -> Result<Option<Vec<String>>> {
            if dir == "src" {
                return Ok(Some(vec!["main.py".into(), "util.py".into()]));
            }
            Ok(None)
        }

        async fn search(&self, query: &str) -> Result<Vec<String>> {
            let mut hits: Vec<String> = self
                .files
                .iter()
                .filter(|(_, content)| content.contains(query))
                .map(|(path, _)| path.clone())
                .collect();
            hits.sort();
            Ok(hits)
        }
    }

    fn context() -> ToolContext {
        let mut files = HashMap::new();
        files.insert(
            "src/main.py".to_string(),
            "import os\n\ndef main():\n    print('hi')\n".to_string(),
        );
        ToolContext::new(
            Arc::new(MapStore { files }),
            Arc::new(NullProgressSink),
        )
    }

    #[tokio::test]
    async fn reads_file_with_line_numbers() {
        let result = FileContentTool
            .execute(&json!({"file_path": "src/main.py"}), &context())
            .await
            .unwrap();
        assert!(result.starts_with(
            "Opened file: 'src/main.py' with line numbers for your information."
        ));
        assert!(result.contains("1:import os"));
        assert!(result.contains("3:def main():"));
    }

    #[tokio::test]
    async fn keyword_window_uses_occurrence_marker() {
        let result = FileContentTool
            .execute(
                &json!({"file_path": "src/main.py", "keyword": "print"}),
                &context(),
            )
            .await
            .unwrap();
        assert!(result
            .starts_with("Opened file: 'src/main.py' and found multiple occurrences of 'print'."));
    }

    #[tokio::test]
    async fn keyword_and_line_number_are_mutually_exclusive() {
        let result = FileContentTool
            .execute(
                &json!({"file_path": "src/main.py", "keyword": "x", "line_number": 2}),
                &context(),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            "Error: You can only specify either line_number or keyword, not both."
        );
    }

    #[tokio::test]
    async fn directory_path_returns_listing() {
        let result = FileContentTool
            .execute(&json!({"file_path": "src"}), &context())
            .await
            .unwrap();
        assert!(result.starts_with("Searched directory 'src' and found:"));
        assert!(result.contains("main.py"));
    }

    #[tokio::test]
    async fn missing_file_asks_for_corrected_path() {
        let result = FileContentTool
            .execute(&json!({"file_path": "nope.py"}), &context())
            .await
            .unwrap();
        assert!(result.contains("'nope.py' was not found"));
    }

    #[tokio::test]
    async fn tree_listing_and_missing_directory() {
        let listed = FileTreeTool
            .execute(&json!({"dir_path": "src"}), &context())
            .await
            .unwrap();
        assert_eq!(listed, "- main.py\n- util.py");

        let missing = FileTreeTool
            .execute(&json!({"dir_path": "nope"}), &context())
            .await
            .unwrap();
        assert_eq!(missing, "Directory 'nope' not found or is empty.");
    }

    #[tokio::test]
    async fn search_reports_count_and_paths() {
        let found = SearchRepoTool
            .execute(&json!({"query": "print"}), &context())
            .await
            .unwrap();
        assert_eq!(
            found,
            "1 files found for the search query 'print':\n- src/main.py"
        );

        let none = SearchRepoTool
            .execute(&json!({"query": "zzz"}), &context())
            .await
            .unwrap();
        assert_eq!(none, "0 files found for the search query 'zzz'.");
    }
}
