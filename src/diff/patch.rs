// src/diff/patch.rs
// Forward-only application of one file's unified diff to its original text.
//
// Mirrors `patch -u --forward` behavior: each hunk anchors at its stated line
// first, then searches forward for its context before being rejected. Applied
// hunks mutate the text; rejected hunks are reported rej-style so the model
// can revise the diff. CRLF originals are normalized for matching and
// restored on output.

use super::{parse_diff, DiffFile, Hunk};
use crate::error::DiffError;

/// Result of applying a diff: the patched text plus any rejected hunks.
/// `modified` is the empty string when no change results. That is the
/// caller's nothing-to-commit signal, not an error.
#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    pub modified: String,
    pub rejects: Vec<String>,
}

impl PatchOutcome {
    pub fn fully_applied(&self) -> bool {
        self.rejects.is_empty() && !self.modified.is_empty()
    }

    /// Rejected hunks joined into one rej-style report.
    pub fn reject_text(&self) -> String {
        self.rejects.join("\n")
    }
}

pub fn apply_patch(original_text: &str, diff_text: &str) -> Result<PatchOutcome, DiffError> {
    let file = parse_diff(diff_text)?;

    // Hunks must ascend by original start line; anything else is a diff the
    // model needs to rewrite, not something to reorder silently.
    for pair in file.hunks.windows(2) {
        if pair[1].original_start < pair[0].original_start {
            return Err(DiffError::ApplyFailed(format!(
                "hunks out of order: line {} follows line {}",
                pair[1].original_start, pair[0].original_start
            )));
        }
    }

    if original_text.is_empty() {
        return Ok(build_new_file(&file));
    }

    let line_break = if original_text.contains("\r\n") { "\r\n" } else { "\n" };
    let normalized = original_text.replace("\r\n", "\n").replace('\r', "\n");
    let had_final_newline = normalized.ends_with('\n');
    let body = normalized.strip_suffix('\n').unwrap_or(&normalized);
    let original_lines: Vec<&str> = body.split('\n').collect();

    let mut output: Vec<String> = Vec::new();
    let mut rejects: Vec<String> = Vec::new();
    let mut cursor = 0usize;
    let mut applied = 0usize;

    for hunk in &file.hunks {
        let before = hunk.before();
        match locate(&original_lines, &before, hunk, cursor) {
            Some(position) => {
                output.extend(original_lines[cursor..position].iter().map(|l| l.to_string()));
                output.extend(hunk.after().iter().map(|l| l.to_string()));
                cursor = position + before.len();
                applied += 1;
            }
            None => rejects.push(hunk.render()),
        }
    }
    output.extend(original_lines[cursor..].iter().map(|l| l.to_string()));

    if applied == 0 {
        return Ok(PatchOutcome {
            modified: String::new(),
            rejects,
        });
    }

    let ends_with_newline = if file.no_newline_at_end {
        false
    } else {
        had_final_newline
    };
    let mut modified = output.join("\n");
    if ends_with_newline && !modified.is_empty() {
        modified.push('\n');
    }
    if line_break == "\r\n" {
        modified = modified.replace('\n', "\r\n");
    }

    // No net change is the nothing-to-commit signal.
    if modified == original_text {
        modified = String::new();
    }

    Ok(PatchOutcome { modified, rejects })
}

/// Position of the hunk's before-block in the original, or None when it
/// matches nowhere at or past the previous hunk's end.
fn locate(original: &[&str], before: &[&str], hunk: &Hunk, cursor: usize) -> Option<usize> {
    if before.is_empty() {
        // Pure insertion: `@@ -N,0 +M,k @@` inserts after line N.
        let position = hunk.original_start.min(original.len());
        return (position >= cursor).then_some(position);
    }

    let expected = hunk.original_start.saturating_sub(1);
    if expected >= cursor && matches_at(original, before, expected) {
        return Some(expected);
    }
    (cursor..=original.len().saturating_sub(before.len()))
        .find(|&position| matches_at(original, before, position))
}

fn matches_at(original: &[&str], before: &[&str], position: usize) -> bool {
    position + before.len() <= original.len()
        && before
            .iter()
            .zip(&original[position..])
            .all(|(want, have)| want == have)
}

/// Creation diff applied to an empty original: the content is the new-side
/// payload of every hunk.
fn build_new_file(file: &DiffFile) -> PatchOutcome {
    let lines: Vec<&str> = file.hunks.iter().flat_map(|hunk| hunk.after()).collect();
    if lines.is_empty() {
        return PatchOutcome::default();
    }
    let mut modified = lines.join("\n");
    if !file.no_newline_at_end {
        modified.push('\n');
    }
    PatchOutcome {
        modified,
        rejects: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_single_replacement() {
        let original = "fn main() {\n    println!(\"hi\");\n}\n";
        let diff = "--- a/main.rs\n+++ b/main.rs\n@@ -2,1 +2,1 @@\n-    println!(\"hi\");\n+    println!(\"hello\");\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert!(outcome.fully_applied());
        assert_eq!(outcome.modified, "fn main() {\n    println!(\"hello\");\n}\n");
    }

    #[test]
    fn creates_new_file_from_empty_original() {
        let diff = "--- /dev/null\n+++ b/new.py\n@@ -0,0 +1,2 @@\n+import os\n+print(os.getcwd())\n";
        let outcome = apply_patch("", diff).unwrap();
        assert_eq!(outcome.modified, "import os\nprint(os.getcwd())\n");
        assert!(outcome.rejects.is_empty());
    }

    #[test]
    fn hunk_applies_at_offset_position() {
        // Header says line 2 but the content moved down one line.
        let original = "extra\na\nb\nc\n";
        let diff = "--- a/f\n+++ b/f\n@@ -2,1 +2,1 @@\n-b\n+B\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "extra\na\nB\nc\n");
    }

    #[test]
    fn unmatched_hunk_is_rejected_others_apply() {
        let original = "one\ntwo\nthree\n";
        let diff = concat!(
            "--- a/f\n+++ b/f\n",
            "@@ -1,1 +1,1 @@\n-one\n+ONE\n",
            "@@ -9,1 +9,1 @@\n-missing\n+present\n",
        );
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "ONE\ntwo\nthree\n");
        assert_eq!(outcome.rejects.len(), 1);
        assert!(outcome.reject_text().contains("-missing"));
    }

    #[test]
    fn nothing_applies_yields_empty_modified() {
        let original = "alpha\n";
        let diff = "--- a/f\n+++ b/f\n@@ -1,1 +1,1 @@\n-beta\n+gamma\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "");
        assert_eq!(outcome.rejects.len(), 1);
    }

    #[test]
    fn out_of_order_hunks_fail() {
        let diff = concat!(
            "--- a/f\n+++ b/f\n",
            "@@ -5,1 +5,1 @@\n-e\n+E\n",
            "@@ -1,1 +1,1 @@\n-a\n+A\n",
        );
        let err = apply_patch("a\nb\nc\nd\ne\n", diff).unwrap_err();
        assert!(matches!(err, DiffError::ApplyFailed(_)));
    }

    #[test]
    fn no_net_change_returns_empty_string() {
        let original = "same\n";
        let diff = "--- a/f\n+++ b/f\n@@ -1,1 +1,1 @@\n-same\n+same\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "");
        assert!(outcome.rejects.is_empty());
    }

    #[test]
    fn crlf_original_round_trips() {
        let original = "a\r\nb\r\n";
        let diff = "--- a/f\n+++ b/f\n@@ -2,1 +2,1 @@\n-b\n+B\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "a\r\nB\r\n");
    }

    #[test]
    fn insertion_hunk_with_zero_original_len() {
        let original = "a\nc\n";
        let diff = "--- a/f\n+++ b/f\n@@ -1,0 +2,1 @@\n+b\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.modified, "a\nb\nc\n");
    }
}
