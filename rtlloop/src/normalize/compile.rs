//! Compiler output matcher.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Issue, Severity};

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.*?):(?P<line>\d+):\s*(?:error|ERROR)\s*:\s*(?P<msg>.*)$")
        .expect("compile error regex")
});
static SYNTAX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<file>.*?):(?P<line>\d+):\s*(?P<msg>syntax error.*)$")
        .expect("syntax error regex")
});

/// Match one trimmed compiler line.
///
/// `file:line: error: msg` and `file:line: syntax error...` carry a location;
/// any other line mentioning `error` becomes a location-less issue.
pub fn match_compile_line(line: &str) -> Option<Issue> {
    for pattern in [&*ERROR_RE, &*SYNTAX_RE] {
        if let Some(caps) = pattern.captures(line) {
            let line_no = caps["line"].parse::<u32>().ok();
            return Some(
                Issue::new(Severity::Error, caps["msg"].trim()).at(&caps["file"], line_no),
            );
        }
    }
    if line.to_ascii_lowercase().contains("error") {
        return Some(Issue::new(Severity::Error, line));
    }
    None
}

/// Extract compile errors from the compile-phase log.
pub fn parse_compile_errors(compile_log: &str) -> Vec<Issue> {
    compile_log
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(match_compile_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_errors_are_extracted() {
        let log = "\
rtl/top.v:12: error: Unknown module type: addr
rtl/top.v:20: syntax error
rtl/top.v:21: Syntax error in continuous assignment
";
        let issues = parse_compile_errors(log);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].message, "Unknown module type: addr");
        assert_eq!(issues[0].line_location(), Some(("rtl/top.v", 12)));
        assert_eq!(issues[1].message, "syntax error");
        assert_eq!(issues[1].line_location(), Some(("rtl/top.v", 20)));
        assert_eq!(
            issues[2].message,
            "Syntax error in continuous assignment"
        );
    }

    #[test]
    fn other_error_lines_are_kept_without_location() {
        let issues = parse_compile_errors("2 error(s) during elaboration.\nall good here\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "2 error(s) during elaboration.");
        assert!(issues[0].location.is_none());
        assert!(issues.iter().all(|i| i.severity == Severity::Error));
    }

    #[test]
    fn clean_log_has_no_errors() {
        assert!(parse_compile_errors("\nwarning: implicit wire\n").is_empty());
    }
}
