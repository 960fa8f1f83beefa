//! Pass/fail determination for gated stages.
//!
//! An exit code of `None` means the process did not exit normally (signal,
//! timeout, or the phase never ran) and always counts as failure.

use crate::core::types::{FailedCase, Issue, Severity};

fn exited_cleanly(exit_code: Option<i32>) -> bool {
    exit_code == Some(0)
}

/// Review passes iff the lint exited 0 and no `Error`/`Fatal` issue remains.
pub fn review_passed(exit_code: Option<i32>, issues: &[Issue]) -> bool {
    exited_cleanly(exit_code) && !issues.iter().any(|issue| issue.severity.is_blocking())
}

/// Compilation passes iff the compiler exited 0 and reported no errors.
pub fn compile_passed(exit_code: Option<i32>, compile_errors: &[Issue]) -> bool {
    exited_cleanly(exit_code) && compile_errors.is_empty()
}

/// Verify passes iff compilation passed, the simulation exited 0, and no case failed.
pub fn verify_passed(
    compile_exit: Option<i32>,
    compile_errors: &[Issue],
    run_exit: Option<i32>,
    failed_cases: &[FailedCase],
) -> bool {
    compile_passed(compile_exit, compile_errors) && exited_cleanly(run_exit) && failed_cases.is_empty()
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated)".to_string(),
    }
}

/// Prepend a generic error when `tool` failed but nothing blocking was extracted.
pub fn ensure_failure_issue(tool: &str, exit_code: Option<i32>, issues: &mut Vec<Issue>) {
    if exited_cleanly(exit_code) || issues.iter().any(|issue| issue.severity.is_blocking()) {
        return;
    }
    issues.insert(
        0,
        Issue::new(
            Severity::Error,
            format!(
                "{tool} command returned non-zero exit code: {}",
                describe_exit(exit_code)
            ),
        ),
    );
}

/// Add a generic failed case when the simulation failed but no case was extracted.
pub fn ensure_failure_case(exit_code: Option<i32>, failed_cases: &mut Vec<FailedCase>) {
    if exited_cleanly(exit_code) || !failed_cases.is_empty() {
        return;
    }
    let message = format!(
        "simulation exited with non-zero code: {}",
        describe_exit(exit_code)
    );
    failed_cases.push(FailedCase {
        case: None,
        raw: message.clone(),
        message,
        signals: Vec::new(),
        expected_behavior: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> Issue {
        Issue::new(severity, "finding")
    }

    fn case() -> FailedCase {
        FailedCase {
            case: Some("c1".to_string()),
            message: "bad".to_string(),
            signals: Vec::new(),
            expected_behavior: None,
            raw: "CASE c1 FAIL: bad".to_string(),
        }
    }

    #[test]
    fn review_verdict_matches_definition_for_all_combinations() {
        let severities = [
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Fatal,
        ];
        let exits = [Some(0), Some(1), Some(-1), None];
        for exit in exits {
            for mask in 0u8..16 {
                let issues: Vec<Issue> = severities
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, sev)| issue(*sev))
                    .collect();
                let expected = exit == Some(0)
                    && !issues
                        .iter()
                        .any(|i| matches!(i.severity, Severity::Error | Severity::Fatal));
                assert_eq!(
                    review_passed(exit, &issues),
                    expected,
                    "exit={exit:?} mask={mask}"
                );
            }
        }
    }

    #[test]
    fn verify_verdict_matches_definition_for_all_combinations() {
        let exits = [Some(0), Some(2), None];
        for compile_exit in exits {
            for run_exit in exits {
                for n_errors in 0..2 {
                    for n_cases in 0..2 {
                        let errors = vec![issue(Severity::Error); n_errors];
                        let cases = vec![case(); n_cases];
                        let expected = compile_exit == Some(0)
                            && run_exit == Some(0)
                            && n_errors == 0
                            && n_cases == 0;
                        assert_eq!(
                            verify_passed(compile_exit, &errors, run_exit, &cases),
                            expected
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn warnings_alone_do_not_fail_review() {
        assert!(review_passed(Some(0), &[issue(Severity::Warning)]));
    }

    #[test]
    fn nonzero_exit_without_errors_injects_issue() {
        let mut issues = vec![issue(Severity::Warning)];
        ensure_failure_issue("lint", Some(2), &mut issues);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(issues[0].message.contains("non-zero exit code: 2"));
    }

    #[test]
    fn nonzero_exit_with_errors_is_left_alone() {
        let mut issues = vec![issue(Severity::Fatal)];
        ensure_failure_issue("lint", Some(1), &mut issues);
        assert_eq!(issues.len(), 1);

        let mut clean = Vec::new();
        ensure_failure_issue("lint", Some(0), &mut clean);
        assert!(clean.is_empty());
    }

    #[test]
    fn failed_simulation_without_cases_injects_case() {
        let mut cases = Vec::new();
        ensure_failure_case(None, &mut cases);
        assert_eq!(cases.len(), 1);
        assert!(cases[0].message.contains("terminated"));

        let mut existing = vec![case()];
        ensure_failure_case(Some(1), &mut existing);
        assert_eq!(existing.len(), 1);
    }
}
