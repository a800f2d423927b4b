// src/tools/local_store.rs
// FileStore over a local checkout. This is what the CLI binary edits; server
// deployments wire their own remote-content store through the same trait.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;

use super::FileStore;

/// Directories never surfaced to the agent.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__"];

/// Files larger than this are skipped during content search.
const SEARCH_MAX_BYTES: u64 = 512 * 1024;

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        anyhow::ensure!(
            !relative.is_absolute()
                && !relative
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir)),
            "path '{path}' escapes the repository root"
        );
        Ok(self.root.join(relative))
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if !SKIPPED_DIRS.contains(&name.as_ref()) {
                    Self::walk(&path, out);
                }
            } else {
                out.push(path);
            }
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match fs::metadata(&full).await {
            Err(_) => Ok(None),
            Ok(metadata) if metadata.is_dir() => Ok(None),
            Ok(_) => Ok(Some(fs::read_to_string(&full).await?)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, content).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.resolve(from)?;
        if fs::metadata(&source).await.is_err() {
            return Ok(false);
        }
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await?;
        Ok(true)
    }

    async fn list_dir(&self, dir: &str) -> Result<Option<Vec<String>>> {
        let full = self.resolve(dir)?;
        match fs::metadata(&full).await {
            Err(_) => Ok(None),
            Ok(metadata) if !metadata.is_dir() => Ok(None),
            Ok(_) => {
                let mut entries = Vec::new();
                let mut dir_entries = fs::read_dir(&full).await?;
                while let Some(entry) = dir_entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if SKIPPED_DIRS.contains(&name.as_str()) {
                        continue;
                    }
                    if entry.file_type().await?.is_dir() {
                        entries.push(format!("{name}/"));
                    } else {
                        entries.push(name);
                    }
                }
                entries.sort();
                Ok(Some(entries))
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let query = query.to_string();
        // Blocking walk + read off the async runtime.
        let hits = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            Self::walk(&root, &mut files);
            let mut hits: Vec<String> = files
                .into_iter()
                .filter(|path| {
                    std::fs::metadata(path)
                        .map(|m| m.len() <= SEARCH_MAX_BYTES)
                        .unwrap_or(false)
                })
                .filter(|path| {
                    std::fs::read_to_string(path)
                        .map(|content| content.contains(&query))
                        .unwrap_or(false)
                })
                .filter_map(|path| {
                    path.strip_prefix(&root)
                        .ok()
                        .map(|p| p.to_string_lossy().to_string())
                })
                .collect();
            hits.sort();
            hits
        })
        .await?;
        Ok(hits)
    }
}
