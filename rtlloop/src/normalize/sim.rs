//! Simulation log matchers.
//!
//! A standardized mismatch summary (`Mismatches: N ...` or
//! `Total mismatched samples is N ...`) is authoritative when present. Only
//! logs without one fall through to the per-line failure heuristics.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::FailedCase;
use crate::normalize::signals::{extract_expected_behavior, extract_signals};

static SUMMARY_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)Mismatches?\s*:\s*(\d+)").expect("mismatch summary regex"),
        Regex::new(r"(?i)Total\s+mismatched\s+samples\s+is\s+(\d+)")
            .expect("mismatched samples regex"),
    ]
});
static SAMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Sample\s+(?P<idx>\d+)\s+mismatch\s*:\s*(?P<msg>.*)$").expect("sample regex")
});
static CASE_FAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)CASE\s+(?P<name>\S+)\s+FAIL\s*:\s*(?P<msg>.*)$").expect("case fail regex")
});
static ASSERT_FAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ASSERT\s+FAIL\s*:\s*(?P<msg>.*)$").expect("assert fail regex")
});
static ZERO_MISMATCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mismatch(?:es)?\s*:\s*0\b").expect("zero mismatch regex"));

const FAILURE_VOCABULARY: &[&str] = &[" fail", "fail:", "error:", "mismatch", "expected", "got="];

fn failed_case(case: Option<String>, message: &str, line: &str) -> FailedCase {
    FailedCase {
        case,
        message: message.trim().to_string(),
        signals: extract_signals(line),
        expected_behavior: extract_expected_behavior(line),
        raw: line.trim().to_string(),
    }
}

/// The reported mismatch total, if the log carries a standardized summary.
pub fn mismatch_count(run_log: &str) -> Option<u64> {
    SUMMARY_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(run_log)
            .and_then(|caps| caps[1].parse::<u64>().ok())
    })
}

/// Per-sample mismatch line (`Sample 4 mismatch: ...`).
pub fn match_sample_line(line: &str) -> Option<FailedCase> {
    let caps = SAMPLE_RE.captures(line)?;
    Some(failed_case(
        Some(format!("sample_{}", &caps["idx"])),
        &caps["msg"],
        line,
    ))
}

/// Whether a line explicitly reports zero mismatches.
pub fn states_zero_mismatches(line: &str) -> bool {
    line.to_ascii_lowercase().contains("no mismatches") || ZERO_MISMATCH_RE.is_match(line)
}

/// Case/assert markers first, then generic failure vocabulary.
pub fn match_failure_line(line: &str) -> Option<FailedCase> {
    if states_zero_mismatches(line) {
        return None;
    }
    if let Some(caps) = CASE_FAIL_RE.captures(line) {
        return Some(failed_case(
            Some(caps["name"].to_string()),
            &caps["msg"],
            line,
        ));
    }
    if let Some(caps) = ASSERT_FAIL_RE.captures(line) {
        return Some(failed_case(None, &caps["msg"], line));
    }
    let lower = line.to_ascii_lowercase();
    if FAILURE_VOCABULARY.iter().any(|word| lower.contains(word)) {
        return Some(failed_case(None, line, line));
    }
    None
}

/// Extract failed cases from the run-phase log.
pub fn parse_failed_cases(run_log: &str) -> Vec<FailedCase> {
    if let Some(total) = mismatch_count(run_log) {
        if total == 0 {
            return Vec::new();
        }
        let mut failed = vec![FailedCase {
            case: Some("mismatch_total".to_string()),
            message: format!("Mismatches reported: {total}"),
            signals: Vec::new(),
            expected_behavior: None,
            raw: format!("mismatch_total={total}"),
        }];
        failed.extend(run_log.lines().filter_map(match_sample_line));
        return failed;
    }

    let mut seen = HashSet::new();
    run_log
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(match_failure_line)
        .filter(|case| seen.insert(case.raw.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mismatch_summary_suppresses_all_noise() {
        let log = "\
CASE reset FAIL: q should be 0
ERROR: something looked wrong
Mismatches: 0 in 20 samples
";
        assert_eq!(mismatch_count(log), Some(0));
        assert!(parse_failed_cases(log).is_empty());
    }

    #[test]
    fn nonzero_summary_emits_total_plus_samples() {
        let log = "\
Sample 4 mismatch: out should be 1
Sample 4 mismatch: out should be 1
Hint: Output 'out' has mismatches.
Mismatches: 3 in 20 samples
";
        let cases = parse_failed_cases(log);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].case.as_deref(), Some("mismatch_total"));
        assert_eq!(cases[0].message, "Mismatches reported: 3");
        assert_eq!(cases[0].raw, "mismatch_total=3");
        for sample in &cases[1..] {
            assert_eq!(sample.case.as_deref(), Some("sample_4"));
            assert_eq!(sample.message, "out should be 1");
            assert_eq!(sample.expected_behavior.as_deref(), Some("should be 1"));
            assert!(sample.signals.contains(&"out".to_string()));
        }
    }

    #[test]
    fn total_mismatched_samples_form_is_recognized() {
        let log = "Hint: Total mismatched samples is 2 out of 50 samples\n";
        assert_eq!(mismatch_count(log), Some(2));
        let cases = parse_failed_cases(log);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].raw, "mismatch_total=2");
    }

    #[test]
    fn heuristics_apply_without_summary() {
        let log = "\
CASE add_overflow FAIL: sum should be 0
ASSERT FAIL: valid expected high
q mismatch at t=40, got=1
info: all other checks fine
";
        let cases = parse_failed_cases(log);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].case.as_deref(), Some("add_overflow"));
        assert_eq!(cases[0].message, "sum should be 0");
        assert_eq!(cases[0].expected_behavior.as_deref(), Some("should be 0"));
        assert_eq!(cases[1].case, None);
        assert_eq!(cases[1].message, "valid expected high");
        assert_eq!(cases[1].expected_behavior.as_deref(), Some("expected high"));
        assert_eq!(cases[2].message, "q mismatch at t=40, got=1");
    }

    #[test]
    fn duplicate_raw_lines_collapse() {
        let log = "FAIL: q stuck\nFAIL: q stuck\n  FAIL: q stuck  \n";
        let cases = parse_failed_cases(log);
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn zero_mismatch_lines_are_excluded_from_heuristics() {
        assert!(states_zero_mismatches("No mismatches found"));
        assert!(match_failure_line("No mismatches found, expected behavior").is_none());
        assert!(match_failure_line("PASS all cases").is_none());
    }

    #[test]
    fn clean_log_has_no_failed_cases() {
        assert!(parse_failed_cases("PASS\nSimulation finished at 100ns\n").is_empty());
    }
}
