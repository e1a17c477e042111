//! Line-oriented patch application.
//!
//! The default [`PatchMode::Forgiving`] engine treats the diff as one continuous
//! edit stream against a single advancing cursor and ignores hunk headers, so it
//! tolerates model-written diffs with wrong offsets. It never fails, but a
//! multi-hunk diff whose hunks are not contiguous in the source misapplies past
//! the first hunk. [`PatchMode::HunkAware`] positions hunks by their headers and
//! verifies context instead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    #[default]
    Forgiving,
    HunkAware,
}

impl PatchMode {
    pub fn from_setting(s: &str) -> Option<Self> {
        match s {
            "forgiving" => Some(PatchMode::Forgiving),
            "hunk" | "hunk_aware" => Some(PatchMode::HunkAware),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Malformed hunk header: {0}")]
    BadHeader(String),
    #[error("Diff contains no hunks")]
    NoHunks,
    #[error("Hunk at line {line} starts before the end of the previous hunk")]
    OutOfOrder { line: usize },
    #[error("Line {line}: expected {expected:?}, found {found:?}")]
    Mismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },
    #[error("Unexpected line inside hunk: {0:?}")]
    UnexpectedLine(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffLine<'a> {
    Insert(&'a str),
    Delete(&'a str),
    Context(&'a str),
    HunkHeader(&'a str),
    FileHeader,
    Other(&'a str),
}

fn classify(line: &str) -> DiffLine<'_> {
    if line.starts_with("+++") || line.starts_with("---") || line.starts_with("diff") {
        DiffLine::FileHeader
    } else {
        classify_body(line)
    }
}

// Inside a hunk, `--- x` deletes the line `-- x`.
fn classify_body(line: &str) -> DiffLine<'_> {
    if line.starts_with("@@") {
        DiffLine::HunkHeader(line)
    } else if let Some(rest) = line.strip_prefix('+') {
        DiffLine::Insert(rest)
    } else if let Some(rest) = line.strip_prefix('-') {
        DiffLine::Delete(rest)
    } else if let Some(rest) = line.strip_prefix(' ') {
        DiffLine::Context(rest)
    } else {
        DiffLine::Other(line)
    }
}

/// Forgiving single-pass merge of `diff` into `original`. Inputs are not modified.
pub fn apply_patch<O, D>(original: &[O], diff: &[D]) -> Vec<String>
where
    O: AsRef<str>,
    D: AsRef<str>,
{
    let mut out = Vec::with_capacity(original.len() + diff.len());
    let mut cursor = 0usize;

    for line in diff {
        match classify(line.as_ref()) {
            DiffLine::Insert(text) => out.push(text.to_string()),
            DiffLine::Delete(_) => cursor += 1,
            DiffLine::Context(text) => {
                out.push(text.to_string());
                cursor += 1;
            }
            DiffLine::HunkHeader(_) | DiffLine::FileHeader => {}
            DiffLine::Other(_) => {
                // Unmarked lines pass one original line through, while any remain.
                if let Some(orig) = original.get(cursor) {
                    out.push(orig.as_ref().to_string());
                    cursor += 1;
                }
            }
        }
    }

    if cursor < original.len() {
        out.extend(original[cursor..].iter().map(|l| l.as_ref().to_string()));
    }
    out
}

/// Hunk-aware application: each `@@ -start,len +start,len` header positions its
/// hunk, and context and deleted lines must match the original. While the
/// header's line counts are not used up, every line is hunk body.
pub fn apply_patch_strict<O, D>(original: &[O], diff: &[D]) -> Result<Vec<String>, PatchError>
where
    O: AsRef<str>,
    D: AsRef<str>,
{
    let mut out = Vec::with_capacity(original.len() + diff.len());
    let mut cursor = 0usize;
    let mut in_hunk = false;
    let mut old_left = 0usize;
    let mut new_left = 0usize;

    let expect = |cursor: usize, text: &str| -> Result<(), PatchError> {
        let found = original.get(cursor).map(|l| l.as_ref());
        if found == Some(text) {
            Ok(())
        } else {
            Err(PatchError::Mismatch {
                line: cursor + 1,
                expected: text.to_string(),
                found: found.map(str::to_string),
            })
        }
    };

    for line in diff {
        let line = line.as_ref();
        let kind = if old_left > 0 || new_left > 0 { classify_body(line) } else { classify(line) };
        match kind {
            DiffLine::Insert(_) => new_left = new_left.saturating_sub(1),
            DiffLine::Delete(_) => old_left = old_left.saturating_sub(1),
            DiffLine::Context(_) | DiffLine::Other("") => {
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
            }
            _ => {}
        }
        match kind {
            DiffLine::HunkHeader(header) => {
                let HunkRange { start, len, new_len } = parse_hunk_header(header)?;
                let target = if len == 0 { start } else { start.saturating_sub(1) };
                if target < cursor {
                    return Err(PatchError::OutOfOrder { line: start });
                }
                if target > original.len() {
                    return Err(PatchError::Mismatch { line: start, expected: String::new(), found: None });
                }
                out.extend(original[cursor..target].iter().map(|l| l.as_ref().to_string()));
                cursor = target;
                in_hunk = true;
                old_left = len;
                new_left = new_len;
            }
            DiffLine::FileHeader => {}
            _ if !in_hunk => {}
            DiffLine::Insert(text) => out.push(text.to_string()),
            DiffLine::Delete(text) => {
                expect(cursor, text)?;
                cursor += 1;
            }
            DiffLine::Context(text) => {
                expect(cursor, text)?;
                out.push(text.to_string());
                cursor += 1;
            }
            // Editors often strip the single space off blank context lines.
            DiffLine::Other("") => {
                if cursor < original.len() {
                    expect(cursor, "")?;
                    out.push(String::new());
                    cursor += 1;
                }
            }
            DiffLine::Other(marker) if marker.starts_with('\\') => {}
            DiffLine::Other(other) => return Err(PatchError::UnexpectedLine(other.to_string())),
        }
    }

    if !in_hunk {
        return Err(PatchError::NoHunks);
    }
    if cursor < original.len() {
        out.extend(original[cursor..].iter().map(|l| l.as_ref().to_string()));
    }
    Ok(out)
}

/// Applies `diff` to `original` text, splitting and joining on `\n`.
pub fn apply_patch_text(original: &str, diff: &str, mode: PatchMode) -> Result<String, PatchError> {
    let lines: Vec<&str> = original.split('\n').collect();
    let diff_lines: Vec<&str> = diff.split('\n').collect();
    let result = match mode {
        PatchMode::Forgiving => apply_patch(&lines, &diff_lines),
        PatchMode::HunkAware => apply_patch_strict(&lines, &diff_lines)?,
    };
    Ok(result.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HunkRange {
    start: usize,
    len: usize,
    new_len: usize,
}

// "@@ -12,3 +12,4 @@ fn foo" -> start 12, len 3, new_len 4. A missing length
// means 1; a missing `+` range leaves the new length unknown (0).
fn parse_hunk_header(header: &str) -> Result<HunkRange, PatchError> {
    let bad = || PatchError::BadHeader(header.to_string());
    let parts: Vec<&str> = header.trim_start_matches('@').split_whitespace().collect();

    let old = parts.iter().find(|part| part.starts_with('-')).ok_or_else(bad)?;
    let (start, len) = parse_range(&old[1..]).ok_or_else(bad)?;
    let new_len = match parts.iter().find(|part| part.starts_with('+')) {
        Some(new) => parse_range(&new[1..]).ok_or_else(bad)?.1,
        None => 0,
    };
    Ok(HunkRange { start, len, new_len })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let mut parts = range.splitn(2, ',');
    let start = parts.next()?.parse().ok()?;
    let len = match parts.next() {
        Some(l) => l.parse().ok()?,
        None => 1,
    };
    Some((start, len))
}
