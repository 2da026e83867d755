//! Extraction of file-change proposals from model replies.
//!
//! The wire format is a marker line followed by an optional fenced block:
//!
//! ````text
//! # FILEPATH: src/app.py
//! ```python
//! print("hello")
//! ```
//! ````
//!
//! The scanner works in three steps per block: find a marker line, consume an
//! optional opening fence, then take content up to the closing fence, the next
//! marker line, or the end of the text. Each step is a separate function so
//! the edge cases can be exercised in isolation.

use std::fs;

use scribe_types::{ChangeProposal, ProposalBatch};
use tracing::{debug, info, warn};

use crate::ToolError;
use crate::sandbox::ProjectSandbox;

const MARKER_KEYWORD: &str = "FILEPATH";
const FENCE: &str = "```";
const IDENTIFIER_TRIM: &[char] = &['\'', '"', '`', ' '];

/// One marker block as it appears in the reply, before any normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlock<'a> {
    /// Position among all markers in the reply, starting at zero.
    pub ordinal: usize,
    /// Rest of the marker line after the colon.
    pub identifier: &'a str,
    /// Text between the opening fence (or marker line) and the terminator.
    pub content: &'a str,
}

struct Marker<'a> {
    identifier: &'a str,
    /// Byte offset just past the marker line's newline.
    body_start: usize,
}

fn skip_horizontal_space(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
        pos += 1;
    }
    pos
}

/// Parse a marker whose `#` sits at `hash`.
fn marker_at(text: &str, hash: usize) -> Option<Marker<'_>> {
    let mut pos = skip_horizontal_space(text, hash + 1);
    let keyword = text.get(pos..pos + MARKER_KEYWORD.len())?;
    if !keyword.eq_ignore_ascii_case(MARKER_KEYWORD) {
        return None;
    }
    pos = skip_horizontal_space(text, pos + MARKER_KEYWORD.len());
    if text.as_bytes().get(pos) != Some(&b':') {
        return None;
    }
    let identifier_start = pos + 1;
    let line_end = identifier_start + text[identifier_start..].find('\n')?;
    Some(Marker {
        identifier: &text[identifier_start..line_end],
        body_start: line_end + 1,
    })
}

/// First marker at or after `from`.
fn next_marker(text: &str, from: usize) -> Option<(usize, Marker<'_>)> {
    let mut search = from;
    while let Some(offset) = text.get(search..)?.find('#') {
        let hash = search + offset;
        if let Some(marker) = marker_at(text, hash) {
            return Some((hash, marker));
        }
        search = hash + 1;
    }
    None
}

/// Start of the first line at or after `from` that is itself a marker line.
fn next_marker_line(text: &str, from: usize) -> Option<usize> {
    let mut line_start = from;
    loop {
        let hash = skip_horizontal_space(text, line_start);
        if text.as_bytes().get(hash) == Some(&b'#') && marker_at(text, hash).is_some() {
            return Some(line_start);
        }
        line_start += text.get(line_start..)?.find('\n')? + 1;
    }
}

/// Consume an opening fence with an optional language tag.
///
/// Returns the offset where content starts, or `None` when no fence opens here.
fn skip_opening_fence(text: &str, pos: usize) -> Option<usize> {
    let after_ticks = text.get(pos..)?.strip_prefix(FENCE)?;
    let tag_len = after_ticks
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-')))
        .unwrap_or(after_ticks.len());
    after_ticks[tag_len..]
        .starts_with('\n')
        .then_some(pos + FENCE.len() + tag_len + 1)
}

/// Find where content starting at `start` ends and where scanning resumes.
fn content_end(text: &str, start: usize, fenced: bool) -> (usize, usize) {
    if fenced && text[start..].starts_with(FENCE) {
        return (start, start + FENCE.len());
    }
    let closing = text[start..]
        .find("\n```")
        .map(|offset| start + offset);
    let marker_line = next_marker_line(text, start);
    match (closing, marker_line) {
        (Some(fence), Some(marker)) if marker <= fence => (marker, marker),
        (Some(fence), _) => (fence, fence + 1 + FENCE.len()),
        (None, Some(marker)) => (marker, marker),
        (None, None) => (text.len(), text.len()),
    }
}

/// Split a reply into raw marker blocks.
#[must_use]
pub fn scan_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some((_, marker)) = next_marker(text, cursor) {
        let opened = skip_opening_fence(text, marker.body_start);
        let start = opened.unwrap_or(marker.body_start);
        let (end, resume) = content_end(text, start, opened.is_some());
        blocks.push(RawBlock {
            ordinal: blocks.len(),
            identifier: marker.identifier,
            content: &text[start..end],
        });
        cursor = resume;
    }
    blocks
}

/// Trim whitespace and quoting from a marker path; backslashes become `/`.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .trim_matches(IDENTIFIER_TRIM)
        .to_string()
}

/// Strip a dangling fence, surrounding blank lines, and `\r` line endings.
#[must_use]
pub fn normalize_content(raw: &str) -> String {
    let without_fence = raw
        .strip_suffix("\n```")
        .or_else(|| raw.strip_suffix(FENCE))
        .unwrap_or(raw);
    let unified = without_fence.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => {
            let mut body = lines[first..=last].join("\n");
            let trimmed_len = body.trim_end().len();
            body.truncate(trimmed_len);
            body
        }
        _ => String::new(),
    }
}

/// A proposal dropped because its target failed the sandbox check.
#[derive(Debug)]
pub struct RejectedProposal {
    pub identifier: String,
    pub error: ToolError,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub batch: ProposalBatch,
    pub rejected: Vec<RejectedProposal>,
    /// Markers whose path was empty after trimming.
    pub empty_identifiers: usize,
}

impl ParseOutcome {
    /// The batch, or `None` when nothing actionable was found.
    #[must_use]
    pub fn into_batch(self) -> Option<ProposalBatch> {
        (!self.batch.is_empty()).then_some(self.batch)
    }
}

/// Turns model replies into sandboxed [`ChangeProposal`]s.
pub struct ChangeParser<'a> {
    sandbox: &'a ProjectSandbox,
}

impl<'a> ChangeParser<'a> {
    #[must_use]
    pub fn new(sandbox: &'a ProjectSandbox) -> Self {
        Self { sandbox }
    }

    #[must_use]
    pub fn parse(&self, response: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        for block in scan_blocks(response) {
            let identifier = normalize_identifier(block.identifier);
            if identifier.is_empty() {
                warn!(ordinal = block.ordinal, "Empty file path in change marker; skipping");
                outcome.empty_identifiers += 1;
                continue;
            }

            let target = match self.sandbox.resolve(&identifier) {
                Ok(target) => target,
                Err(error) => {
                    warn!(ordinal = block.ordinal, %identifier, "Rejected change proposal: {error}");
                    outcome.rejected.push(RejectedProposal { identifier, error });
                    continue;
                }
            };
            debug!(
                ordinal = block.ordinal,
                %identifier,
                resolution = ?target.resolution,
                path = %target.path.display(),
                "Resolved change target"
            );

            let is_new = !fs::exists(&target.path).unwrap_or(false);
            let content = normalize_content(block.content);
            info!(
                ordinal = block.ordinal,
                path = %target.path.display(),
                is_new,
                chars = content.chars().count(),
                "Parsed change proposal"
            );

            let key = ProposalBatch::key_for(&identifier, block.ordinal);
            outcome.batch.insert(
                key,
                ChangeProposal {
                    source_identifier: identifier,
                    target_path: target.path,
                    content,
                    is_new,
                },
            );
        }

        if outcome.batch.is_empty() {
            info!("No parsable file changes found in reply");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::DenialReason;

    #[test]
    fn scans_fenced_blocks_with_language_tags() {
        let text = "intro\n# FILEPATH: src/a.py\n```python\nprint(1)\n```\ntrailer";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].identifier, " src/a.py");
        assert_eq!(blocks[0].content, "print(1)");
    }

    #[test]
    fn marker_tolerates_case_and_spacing() {
        let blocks = scan_blocks("#filepath :  a.txt\nhello\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(normalize_identifier(blocks[0].identifier), "a.txt");
    }

    #[test]
    fn missing_closing_fence_runs_to_end() {
        let blocks = scan_blocks("# FILEPATH: a.py\n```\nline1\nline2");
        assert_eq!(blocks[0].content, "line1\nline2");
    }

    #[test]
    fn unfenced_content_stops_at_next_marker() {
        let text = "# FILEPATH: a.txt\nalpha\n# FILEPATH: b.txt\nbeta\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "alpha\n");
        assert_eq!(blocks[1].content, "beta\n");
        assert_eq!(blocks[1].ordinal, 1);
    }

    #[test]
    fn empty_fenced_block() {
        let blocks = scan_blocks("# FILEPATH: empty.txt\n```\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "");
    }

    #[test]
    fn marker_without_newline_is_ignored() {
        assert!(scan_blocks("text # FILEPATH: dangling.py").is_empty());
        assert!(scan_blocks("# heading\nno markers").is_empty());
    }

    #[test]
    fn fence_with_trailing_text_is_content() {
        let blocks = scan_blocks("# FILEPATH: a.md\n``` not a tag\nbody\n```");
        assert_eq!(blocks[0].content, "``` not a tag\nbody");
    }

    #[test]
    fn identifier_quotes_and_backslashes_are_normalized() {
        assert_eq!(normalize_identifier(" `src\\win\\a.py` "), "src/win/a.py");
        assert_eq!(normalize_identifier("'quoted.py'"), "quoted.py");
        assert_eq!(normalize_identifier(" \"\" "), "");
    }

    #[test]
    fn content_normalization() {
        assert_eq!(normalize_content("\n\n  body\r\nmore\r\n\n```"), "  body\nmore");
        assert_eq!(normalize_content("x\n```"), "x");
        assert_eq!(normalize_content("   \n\n"), "");
    }

    #[test]
    fn parse_keeps_valid_and_drops_escaping_proposals() {
        let sandbox = ProjectSandbox::new("/proj");
        let parser = ChangeParser::new(&sandbox);
        let text = "# FILEPATH: src/a.py\n```python\nprint(1)\n```\n# FILEPATH: ../evil.py\n```\nrm -rf /\n```";

        let outcome = parser.parse(text);

        assert_eq!(outcome.batch.len(), 1);
        let proposal = outcome.batch.get("src/a.py_0").expect("valid proposal");
        assert_eq!(proposal.target_path, PathBuf::from("/proj/src/a.py"));
        assert_eq!(proposal.content, "print(1)");
        assert!(proposal.is_new);

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].identifier, "../evil.py");
        assert!(matches!(
            outcome.rejected[0].error,
            ToolError::SandboxViolation(DenialReason::PathOutsideSandbox { .. })
        ));
    }

    #[test]
    fn duplicate_identifiers_get_distinct_keys() {
        let sandbox = ProjectSandbox::new("/proj");
        let parser = ChangeParser::new(&sandbox);
        let text = "# FILEPATH: a.py\n```\none\n```\n# FILEPATH: a.py\n```\ntwo\n```";

        let batch = parser.parse(text).into_batch().expect("two proposals");
        assert_eq!(batch.keys(), vec!["a.py_0", "a.py_1"]);
    }

    #[test]
    fn empty_identifier_consumes_an_ordinal() {
        let sandbox = ProjectSandbox::new("/proj");
        let parser = ChangeParser::new(&sandbox);
        let text = "# FILEPATH: ``\n```\nx\n```\n# FILEPATH: b.py\n```\ny\n```";

        let outcome = parser.parse(text);
        assert_eq!(outcome.empty_identifiers, 1);
        assert_eq!(outcome.batch.keys(), vec!["b.py_1"]);
    }

    #[test]
    fn no_markers_yields_none() {
        let sandbox = ProjectSandbox::new("/proj");
        let parser = ChangeParser::new(&sandbox);
        assert!(parser.parse("Just an explanation.").into_batch().is_none());
    }

    #[test]
    fn existing_target_is_not_new() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("here.py"), "x = 1\n").expect("write");
        let sandbox = ProjectSandbox::new(dir.path());
        let parser = ChangeParser::new(&sandbox);

        let batch = parser
            .parse("# FILEPATH: here.py\n```\nx = 2\n```\n# FILEPATH: there.py\n```\ny\n```")
            .into_batch()
            .expect("batch");
        assert!(!batch.get("here.py_0").expect("here").is_new);
        assert!(batch.get("there.py_1").expect("there").is_new);
    }
}
