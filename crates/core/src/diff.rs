//! Character-level correction diff.
//!
//! Used to render a grammar correction as a "before" view (kept + removed
//! characters) and an "after" view (kept + added characters).

use serde::{Deserialize, Serialize};

/// The kind of edit a segment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// A run of consecutive characters sharing the same edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub op: DiffOp,
    pub text: String,
}

impl Segment {
    fn new(op: DiffOp, ch: char) -> Self {
        Self {
            op,
            text: ch.to_string(),
        }
    }
}

/// Computes a minimal edit script turning `original` into `corrected`.
///
/// Builds the full longest-common-subsequence table (O(n·m) time and space),
/// walks it emitting one operation per character, then merges adjacent
/// operations of the same kind. When an insertion and a deletion are equally
/// good the insertion is taken first.
pub fn diff_chars(original: &str, corrected: &str) -> Vec<Segment> {
    let a: Vec<char> = original.chars().collect();
    let b: Vec<char> = corrected.chars().collect();
    let (n, m) = (a.len(), b.len());

    // lcs[i * width + j] = LCS length of a[i..] and b[j..].
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut script: Vec<Segment> = Vec::new();
    let mut push = |op: DiffOp, ch: char| match script.last_mut() {
        Some(last) if last.op == op => last.text.push(ch),
        _ => script.push(Segment::new(op, ch)),
    };

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            push(DiffOp::Equal, a[i]);
            i += 1;
            j += 1;
        } else if lcs[i * width + j + 1] >= lcs[(i + 1) * width + j] {
            push(DiffOp::Insert, b[j]);
            j += 1;
        } else {
            push(DiffOp::Delete, a[i]);
            i += 1;
        }
    }
    for &ch in &b[j..] {
        push(DiffOp::Insert, ch);
    }
    for &ch in &a[i..] {
        push(DiffOp::Delete, ch);
    }

    script
}

/// Reassembles the original string (equal + delete segments).
pub fn before_text(script: &[Segment]) -> String {
    collect_text(script, DiffOp::Delete)
}

/// Reassembles the corrected string (equal + insert segments).
pub fn after_text(script: &[Segment]) -> String {
    collect_text(script, DiffOp::Insert)
}

fn collect_text(script: &[Segment], side: DiffOp) -> String {
    script
        .iter()
        .filter(|s| s.op == DiffOp::Equal || s.op == side)
        .map(|s| s.text.as_str())
        .collect()
}
