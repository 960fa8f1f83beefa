//! Normalization of heterogeneous tool output into [`Issue`] and
//! [`FailedCase`] records.
//!
//! Each matcher is a pure function from text to zero or more records. Matchers
//! never fail: text without recognizable structure yields no records, and the
//! stage executors inject a generic record when a tool failed silently.
//!
//! [`Issue`]: crate::core::types::Issue
//! [`FailedCase`]: crate::core::types::FailedCase

pub mod compile;
pub mod context;
pub mod report;
pub mod signals;
pub mod sim;

/// Take the last `limit` lines of `text`.
pub fn tail_lines(text: &str, limit: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(limit);
    lines[start..].iter().map(|line| line.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), vec!["b", "c"]);
        assert_eq!(tail_lines("a", 5), vec!["a"]);
        assert!(tail_lines("", 3).is_empty());
        assert!(tail_lines("a\nb", 0).is_empty());
    }
}
