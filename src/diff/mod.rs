// src/diff/mod.rs
// Unified-diff parsing and splitting for the patches the model emits.
//
// The wire format is the narrow dialect the system prompt asks for: `--- ` /
// `+++ ` file markers (`/dev/null` for create/delete), `@@ -a,b +c,d @@`
// hunk headers, hunks ascending by start line, LF line endings. Models get
// the counts wrong constantly, so `correct_hunk_headers` recounts before
// anything is applied.

mod patch;

pub use patch::{apply_patch, PatchOutcome};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DiffError;

static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

/// One contiguous change block. `lines` keeps the raw prefixed lines
/// (` `, `+`, `-`) in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hunk {
    pub original_start: usize,
    pub original_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<String>,
}

impl Hunk {
    /// Lines expected in the original text (context + deletions).
    pub fn before(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|line| !line.starts_with('+') && !line.starts_with('\\'))
            .map(|line| payload(line))
            .collect()
    }

    /// Lines present in the patched text (context + additions).
    pub fn after(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|line| !line.starts_with('-') && !line.starts_with('\\'))
            .map(|line| payload(line))
            .collect()
    }

    /// Rej-style rendering for failure reports.
    pub fn render(&self) -> String {
        let mut text = format!(
            "@@ -{},{} +{},{} @@\n",
            self.original_start, self.original_len, self.new_start, self.new_len
        );
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// One file's worth of diff.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffFile {
    pub original_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
    /// A `\ No newline at end of file` marker closed the new side.
    pub no_newline_at_end: bool,
}

fn payload(line: &str) -> &str {
    match line.as_bytes().first() {
        Some(b' ') | Some(b'+') | Some(b'-') => &line[1..],
        _ => line,
    }
}

fn marker_path(line: &str, marker: &str) -> Option<String> {
    let rest = line.strip_prefix(marker)?;
    // Strip tab-separated metadata (timestamps) some diff producers append.
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}

/// First `+++ <path>` marker in the diff. The target path of a one-file diff.
pub fn extract_file_name(diff_text: &str) -> Result<String, DiffError> {
    diff_text
        .lines()
        .find_map(|line| marker_path(line, "+++ "))
        .ok_or_else(|| DiffError::Malformed("no '+++ <path>' marker found".into()))
}

/// Splits a multi-file diff bundle into per-file segments at each line-anchored
/// `--- ` boundary. Text before the first boundary (prose, code fences) is
/// dropped; hunks stay with their file.
pub fn split_diffs(diff_text: &str) -> Vec<String> {
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut segments: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for (i, line) in lines.iter().enumerate() {
        // A deletion of a line starting "-- " also renders as "--- ", so a
        // boundary requires the companion "+++ " marker on the next line.
        let is_boundary = line.starts_with("--- ")
            && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "));
        if is_boundary {
            if let Some(segment) = current.take() {
                segments.push(segment.join("\n"));
            }
            current = Some(vec![line]);
        } else if let Some(segment) = current.as_mut() {
            segment.push(line);
        }
    }
    if let Some(segment) = current {
        segments.push(segment.join("\n"));
    }
    segments
}

/// Splits a bundle and parses every segment into its typed form.
pub fn split_diff_files(diff_text: &str) -> Result<Vec<DiffFile>, DiffError> {
    split_diffs(diff_text).iter().map(|s| parse_diff(s)).collect()
}

/// Parses one file's diff into its typed form.
pub fn parse_diff(diff_text: &str) -> Result<DiffFile, DiffError> {
    let mut lines = diff_text.lines();

    let mut original_path = None;
    let mut new_path = None;
    for line in lines.by_ref() {
        if original_path.is_none() {
            if let Some(path) = marker_path(line, "--- ") {
                original_path = Some(path);
            }
            continue;
        }
        if let Some(path) = marker_path(line, "+++ ") {
            new_path = Some(path);
            break;
        }
        return Err(DiffError::Malformed(format!(
            "expected '+++ <path>' after '--- ', found: {line}"
        )));
    }
    let original_path =
        original_path.ok_or_else(|| DiffError::Malformed("no '--- <path>' marker found".into()))?;
    let new_path =
        new_path.ok_or_else(|| DiffError::Malformed("no '+++ <path>' marker found".into()))?;

    let mut hunks: Vec<Hunk> = Vec::new();
    let mut no_newline_at_end = false;
    for line in lines {
        if let Some(captures) = HUNK_HEADER.captures(line) {
            let number = |i: usize, default: usize| {
                captures
                    .get(i)
                    .map_or(Ok(default), |m| m.as_str().parse::<usize>())
                    .map_err(|_| DiffError::Malformed(format!("bad hunk header: {line}")))
            };
            hunks.push(Hunk {
                original_start: number(1, 0)?,
                original_len: number(2, 1)?,
                new_start: number(3, 0)?,
                new_len: number(4, 1)?,
                lines: Vec::new(),
            });
            continue;
        }
        if line.starts_with("@@") {
            return Err(DiffError::Malformed(format!("bad hunk header: {line}")));
        }
        let Some(hunk) = hunks.last_mut() else {
            return Err(DiffError::Malformed(format!(
                "diff content before first hunk header: {line}"
            )));
        };
        if line.starts_with('\\') {
            // "\ No newline at end of file" applies to the new side when it
            // follows an addition or context line.
            if hunk
                .lines
                .last()
                .is_some_and(|last| !last.starts_with('-'))
            {
                no_newline_at_end = true;
            }
            continue;
        }
        hunk.lines.push(line.to_string());
    }

    if hunks.is_empty() {
        return Err(DiffError::Malformed("diff contains no hunks".into()));
    }

    Ok(DiffFile {
        original_path,
        new_path,
        hunks,
        no_newline_at_end,
    })
}

/// Rewrites every hunk header with the actual `-`/`+` line counts found in the
/// hunk body. Zero-context diffs make the counts exactly the removed/added
/// line totals.
pub fn correct_hunk_headers(diff_text: &str) -> String {
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut updated: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let Some(captures) = HUNK_HEADER.captures(line) else {
            updated.push(line.to_string());
            i += 1;
            continue;
        };

        let original_start: usize = captures[1].parse().unwrap_or(0);
        let new_start: usize = captures[3].parse().unwrap_or(0);
        i += 1;

        let body_start = i;
        let mut removed = 0usize;
        let mut added = 0usize;
        while i < lines.len() && !lines[i].starts_with("@@") {
            if lines[i].starts_with('+') {
                added += 1;
            }
            if lines[i].starts_with('-') {
                removed += 1;
            }
            i += 1;
        }

        updated.push(format!(
            "@@ -{original_start},{removed} +{new_start},{added} @@"
        ));
        updated.extend(lines[body_start..i].iter().map(|l| l.to_string()));
    }

    updated.join("\n")
}
