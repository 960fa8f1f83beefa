//! Best-effort token heuristics over simulation failure lines.

use std::sync::LazyLock;

use regex::Regex;

const MAX_SIGNALS: usize = 8;

const STOP_WORDS: &[&str] = &[
    "case", "fail", "pass", "assert", "exp", "got", "should", "be", "after", "cycles", "at", "t",
];

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\b").expect("identifier regex"));
static SHOULD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bshould\s+.*$").expect("should regex"));
static EXPECTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexpected\s+.*$").expect("expected regex"));

/// Identifiers in first-appearance order, minus stop-words and one-char tokens.
pub fn extract_signals(text: &str) -> Vec<String> {
    let mut signals: Vec<String> = Vec::new();
    for token in IDENT_RE.find_iter(text).map(|m| m.as_str()) {
        if token.len() <= 1 || STOP_WORDS.contains(&token.to_ascii_lowercase().as_str()) {
            continue;
        }
        if signals.iter().any(|seen| seen == token) {
            continue;
        }
        signals.push(token.to_string());
        if signals.len() == MAX_SIGNALS {
            break;
        }
    }
    signals
}

/// The first clause starting with `should` (else `expected`), to end of line.
pub fn extract_expected_behavior(text: &str) -> Option<String> {
    SHOULD_RE
        .find(text)
        .or_else(|| EXPECTED_RE.find(text))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_skip_stop_words_and_short_tokens() {
        let signals = extract_signals("CASE c1 FAIL: shift_ena should be 0 after 4 cycles at t=3");
        assert_eq!(signals, vec!["c1", "shift_ena"]);
    }

    #[test]
    fn signals_are_unique_and_capped() {
        let signals = extract_signals("a1 a2 a3 a1 a4 a5 a6 a7 a8 a9 a10");
        assert_eq!(
            signals,
            vec!["a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8"]
        );
    }

    #[test]
    fn expected_behavior_prefers_should_clause() {
        assert_eq!(
            extract_expected_behavior("Sample 4 mismatch: out should be 1"),
            Some("should be 1".to_string())
        );
        assert_eq!(
            extract_expected_behavior("q mismatch: expected 3, got=2"),
            Some("expected 3, got=2".to_string())
        );
        assert_eq!(extract_expected_behavior("FAIL: q wrong"), None);
    }

    #[test]
    fn expected_behavior_needs_word_boundary() {
        assert_eq!(extract_expected_behavior("unexpected reset"), None);
    }
}
