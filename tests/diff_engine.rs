// tests/diff_engine.rs
// Diff engine properties, including the left-inverse round trip: a diff
// generated from A→B, applied to A, reproduces B exactly.

use autoforge::diff::{apply_patch, correct_hunk_headers, extract_file_name, split_diffs};
use similar::TextDiff;

/// Unified diff of A→B with zero context lines, the wire format the model
/// is asked to emit.
fn diff_of(a: &str, b: &str) -> String {
    TextDiff::from_lines(a, b)
        .unified_diff()
        .context_radius(0)
        .header("a/file", "b/file")
        .to_string()
}

#[test]
fn applying_generated_diff_reproduces_target() {
    let a = "fn main() {\n    let x = 1;\n    let y = 2;\n    println!(\"{}\", x + y);\n}\n";
    let b = "fn main() {\n    let x = 1;\n    let y = 3;\n    let z = 4;\n    println!(\"{}\", x + y + z);\n}\n";

    let diff = diff_of(a, b);
    let outcome = apply_patch(a, &diff).unwrap();
    assert!(outcome.rejects.is_empty(), "rejects: {:?}", outcome.rejects);
    assert_eq!(outcome.modified, b);
}

#[test]
fn round_trip_with_multiple_distant_hunks() {
    let a: String = (1..=40).map(|i| format!("line {i}\n")).collect();
    let mut b_lines: Vec<String> = (1..=40).map(|i| format!("line {i}")).collect();
    b_lines[2] = "line three".to_string();
    b_lines[20] = "line twenty-one".to_string();
    b_lines.push("line 41".to_string());
    let b = b_lines.join("\n") + "\n";

    let diff = diff_of(&a, &b);
    let outcome = apply_patch(&a, &diff).unwrap();
    assert!(outcome.rejects.is_empty());
    assert_eq!(outcome.modified, b);
}

#[test]
fn round_trip_preserves_crlf_endings() {
    let a = "alpha\r\nbeta\r\ngamma\r\n";
    let b = "alpha\r\nBETA\r\ngamma\r\n";

    // The model emits LF diffs even for CRLF files.
    let diff = diff_of(&a.replace("\r\n", "\n"), &b.replace("\r\n", "\n"));
    let outcome = apply_patch(a, &diff).unwrap();
    assert_eq!(outcome.modified, b);
}

#[test]
fn split_then_apply_multi_file_bundle() {
    let bundle = concat!(
        "--- a/first.py\n+++ b/first.py\n@@ -1,1 +1,1 @@\n-one\n+ONE\n",
        "--- a/second.py\n+++ b/second.py\n@@ -2,1 +2,1 @@\n-dos\n+TWO\n",
    );
    let segments = split_diffs(bundle);
    assert_eq!(segments.len(), 2);

    assert_eq!(extract_file_name(&segments[0]).unwrap(), "b/first.py");
    assert_eq!(extract_file_name(&segments[1]).unwrap(), "b/second.py");

    let first = apply_patch("one\ntwo\n", &segments[0]).unwrap();
    assert_eq!(first.modified, "ONE\ntwo\n");
    let second = apply_patch("uno\ndos\n", &segments[1]).unwrap();
    assert_eq!(second.modified, "uno\nTWO\n");
}

#[test]
fn header_correction_rescues_model_miscounts() {
    let original = "a\nb\nc\nd\n";
    // The model claims the hunk spans 9 lines; it spans 2.
    let sloppy = "--- a/f\n+++ b/f\n@@ -2,9 +2,9 @@\n-b\n-c\n+B\n+C\n";
    let outcome = apply_patch(original, &correct_hunk_headers(sloppy)).unwrap();
    assert!(outcome.rejects.is_empty());
    assert_eq!(outcome.modified, "a\nB\nC\nd\n");
}

#[test]
fn new_file_round_trip() {
    let b = "import sys\n\nprint(sys.argv)\n";
    let diff = TextDiff::from_lines("", b)
        .unified_diff()
        .context_radius(0)
        .header("/dev/null", "b/new.py")
        .to_string();
    let outcome = apply_patch("", &diff).unwrap();
    assert_eq!(outcome.modified, b);
}
