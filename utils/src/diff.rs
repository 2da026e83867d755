//! Unified diff rendering and no-op detection.

use similar::TextDiff;

/// Convert `\r\n` and lone `\r` to `\n`.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Whether `proposed` would leave `current` unchanged, line for line.
///
/// Line endings and a trailing newline are ignored; the apply step always
/// writes `\n` endings.
#[must_use]
pub fn is_textually_identical(current: &str, proposed: &str) -> bool {
    let current = normalize_line_endings(current);
    let proposed = normalize_line_endings(proposed);
    current.lines().eq(proposed.lines())
}

/// Unified diff with `a/` and `b/` headers and three lines of context.
///
/// Returns `None` when the two texts have no line differences.
#[must_use]
pub fn unified_diff(path: &str, old: &str, new: &str) -> Option<String> {
    if is_textually_identical(old, new) {
        return None;
    }
    let old = normalize_line_endings(old);
    let new = normalize_line_endings(new);
    let diff = TextDiff::from_lines(old.as_str(), new.as_str());
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .missing_newline_hint(false)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_ignores_crlf_and_trailing_newline() {
        assert!(is_textually_identical("a\r\nb\r\n", "a\nb"));
        assert!(is_textually_identical("", ""));
        assert!(!is_textually_identical("a\nb", "a\nc"));
        assert!(!is_textually_identical("a\n\nb", "a\nb"));
    }

    #[test]
    fn unified_diff_has_headers_and_hunks() {
        let diff = unified_diff("src/app.py", "one\ntwo\nthree\n", "one\nTWO\nthree")
            .expect("texts differ");
        assert!(diff.contains("--- a/src/app.py"));
        assert!(diff.contains("+++ b/src/app.py"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+TWO"));
        assert!(diff.contains("@@"));
    }

    #[test]
    fn unified_diff_none_when_only_line_endings_differ() {
        assert_eq!(unified_diff("a.txt", "x\r\ny\r\n", "x\ny"), None);
    }
}
