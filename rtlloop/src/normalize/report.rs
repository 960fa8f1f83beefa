//! Lint report and raw lint log matchers.
//!
//! Structured report lines are tried against a small ordered set of
//! location-tagged patterns; the first match wins. When no structured report
//! yields a record, the raw log is scanned with a looser pattern that
//! tolerates interleaved tool chatter.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::types::{Issue, Severity};

static REPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Error: msg (file:line)
        r"^(?P<sev>Error|Fatal|Warning)\s*:\s*(?P<msg>.*?)\s*\((?P<file>.*?):(?P<line>\d+)\)\s*$",
        // file:line: Error: msg
        r"^(?P<file>.*?):(?P<line>\d+)\s*:\s*(?P<sev>Error|Fatal|Warning)\s*:\s*(?P<msg>.*)$",
        // Error: msg - file:line
        r"^(?P<sev>Error|Fatal|Warning)\s*:\s*(?P<msg>.*?)\s*-\s*(?P<file>.*?):(?P<line>\d+)\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("report pattern"))
    .collect()
});

static LOG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<sev>Error|Fatal|Warning).*?(?P<file>[^ \t:()]+?\.(?:v|sv)):(?P<line>\d+)")
        .expect("log pattern")
});

fn located_issue(caps: &Captures<'_>, message: String) -> Issue {
    let severity = Severity::parse(&caps["sev"]).unwrap_or(Severity::Error);
    let line = caps["line"].parse::<u32>().ok();
    Issue::new(severity, message).at(caps["file"].trim(), line)
}

fn has_severity_prefix(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ["error", "fatal", "warning"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Match one trimmed report line against the location-tagged patterns.
pub fn match_report_line(line: &str) -> Option<Issue> {
    REPORT_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(line)
            .map(|caps| located_issue(&caps, caps["msg"].to_string()))
    })
}

/// Parse a dedicated error/warning export.
///
/// Unmatched lines that start with a severity word become location-less
/// `Error` issues; everything else is ignored.
pub fn parse_report(text: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(issue) = match_report_line(line) {
            issues.push(issue);
        } else if has_severity_prefix(line) {
            issues.push(Issue::new(Severity::Error, line));
        }
    }
    issues
}

/// Scan raw combined tool output for `severity ... file.v:line` mentions.
pub fn scan_log(raw_log: &str) -> Vec<Issue> {
    raw_log
        .lines()
        .filter_map(|line| {
            LOG_PATTERN
                .captures(line)
                .map(|caps| located_issue(&caps, line.trim().to_string()))
        })
        .collect()
}

/// Full review fallback chain: structured reports first, raw log otherwise.
pub fn normalize_review(reports: &[&str], raw_log: &str) -> Vec<Issue> {
    let issues: Vec<Issue> = reports.iter().flat_map(|text| parse_report(text)).collect();
    if !issues.is_empty() {
        return issues;
    }
    scan_log(raw_log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Location;

    fn location(issue: &Issue) -> Option<(String, Option<u32>)> {
        issue
            .location
            .as_ref()
            .map(|Location { file, line }| (file.clone(), *line))
    }

    #[test]
    fn report_patterns_extract_locations() {
        let text = "\
Error: undriven net q (rtl/top.v:12)
rtl/alu.v:7: Warning: width mismatch
Fatal: missing module foo - rtl/top.v:30
";
        let issues = parse_report(text);
        assert_eq!(issues.len(), 3);

        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].message, "undriven net q");
        assert_eq!(location(&issues[0]), Some(("rtl/top.v".into(), Some(12))));

        assert_eq!(issues[1].severity, Severity::Warning);
        assert_eq!(issues[1].message, "width mismatch");
        assert_eq!(location(&issues[1]), Some(("rtl/alu.v".into(), Some(7))));

        assert_eq!(issues[2].severity, Severity::Fatal);
        assert_eq!(issues[2].message, "missing module foo");
        assert_eq!(location(&issues[2]), Some(("rtl/top.v".into(), Some(30))));
    }

    #[test]
    fn unmatched_severity_lines_become_bare_errors() {
        let issues = parse_report("warning something odd happened\nrandom chatter\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].message, "warning something odd happened");
        assert!(issues[0].location.is_none());
    }

    #[test]
    fn log_scan_tolerates_chatter() {
        let log = "\
[spyglass] starting goal lint/lint_rtl
  [7] ERROR   W123  rtl/top.v:44 signal never assigned
info: done
";
        let issues = scan_log(log);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(location(&issues[0]), Some(("rtl/top.v".into(), Some(44))));
        assert!(issues[0].message.starts_with("[7] ERROR"));
    }

    #[test]
    fn raw_log_is_fallback_only() {
        let report = "Error: bad (a.v:1)";
        let log = "Error in b.v:2";
        let issues = normalize_review(&[report], log);
        assert_eq!(issues.len(), 1);
        assert_eq!(location(&issues[0]), Some(("a.v".into(), Some(1))));

        let issues = normalize_review(&["", "\n"], log);
        assert_eq!(issues.len(), 1);
        assert_eq!(location(&issues[0]), Some(("b.v".into(), Some(2))));
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        assert!(normalize_review(&[], "").is_empty());
    }
}
