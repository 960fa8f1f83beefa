//! Review stage: lint the current sources and normalize the findings.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::state::RunState;
use crate::core::types::{Findings, Reason, StageFeedback, Transition};
use crate::core::verdict::{ensure_failure_issue, review_passed};
use crate::errors::FlowError;
use crate::io::filelist::merge_unique;
use crate::io::reviewer::{ReviewRequest, Reviewer};
use crate::io::run_log::write_review_log;
use crate::normalize::context::attach_context;
use crate::normalize::report::normalize_review;
use crate::normalize::tail_lines;
use crate::stages::{StageContext, StageRun, read_optional_filelist};

#[instrument(skip_all, fields(round = state.round()))]
pub fn run_review<R: Reviewer>(
    reviewer: &R,
    state: &RunState,
    ctx: &StageContext<'_>,
) -> Result<StageRun> {
    let config = ctx.config;
    let listed = read_optional_filelist(&config.resolve(&config.project.rtl_flist))?;
    let files = merge_unique(listed, state.sources().paths());
    if files.is_empty() {
        return Err(FlowError::tool(format!(
            "no RTL files to review: {} is empty and no sources have been generated",
            config.project.rtl_flist.display()
        ))
        .into());
    }

    let request = ReviewRequest {
        files,
        top_module: config.project.top_module.clone(),
        flist_path: ctx.paths.review_flist(),
        report_path: ctx.paths.review_report(),
        workdir: ctx.root().to_path_buf(),
    };
    let output = reviewer.review(&request)?;

    let reports: Vec<&str> = output.report.iter().map(String::as_str).collect();
    let mut issues = normalize_review(&reports, &output.raw_log);
    attach_context(&mut issues, ctx.root(), config.context_radius_lines);
    ensure_failure_issue("lint", output.exit_code, &mut issues);
    let passed = review_passed(output.exit_code, &issues);
    issues.truncate(config.review.max_issues);

    let mut artifacts = BTreeMap::new();
    if output.report.is_some() {
        artifacts.insert("report".to_string(), request.report_path.clone());
    }
    match write_review_log(ctx.paths, &output.raw_log) {
        Ok(path) => {
            artifacts.insert("raw_log".to_string(), path);
        }
        Err(err) => warn!(err = %format!("{err:#}"), "failed to write review log"),
    }

    let feedback = StageFeedback {
        passed,
        skipped: None,
        findings: Findings::Review { issues },
        raw_log_tail: tail_lines(&output.raw_log, config.review.raw_tail_lines),
        artifacts,
    };
    info!(
        passed,
        errors = feedback.error_count(),
        warnings = feedback.warning_count(),
        "review finished"
    );
    let transition = if passed {
        Transition::advance(Reason::SyntaxOk)
    } else {
        Transition::retry(Reason::SyntaxFail)
    };
    Ok(StageRun {
        feedback,
        transition,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::state::ArtifactSet;
    use crate::core::types::{Outcome, Severity};
    use crate::io::reviewer::ReviewOutput;
    use crate::io::run_log::RunPaths;
    use crate::test_support::{ScriptedReviewer, TestProject, lint_clean, lint_error};

    fn state_with_top() -> RunState {
        let mut state = RunState::new(3);
        state.set_artifacts(ArtifactSet::new(vec![PathBuf::from("rtl/top.v")]));
        state
    }

    fn run(project: &TestProject, reviewer: &ScriptedReviewer, state: &RunState) -> Result<StageRun> {
        let config = project.config();
        let paths = RunPaths::new(&config.out_dir());
        let ctx = StageContext {
            config: &config,
            paths: &paths,
            spec: "",
        };
        run_review(reviewer, state, &ctx)
    }

    #[test]
    fn clean_lint_advances() {
        let project = TestProject::new().expect("project");
        let reviewer = ScriptedReviewer::new(vec![Ok(lint_clean())]);
        let run = run(&project, &reviewer, &state_with_top()).expect("review");
        assert!(run.feedback.passed);
        assert_eq!(run.transition, Transition::advance(Reason::SyntaxOk));
        assert!(run.feedback.artifacts.contains_key("raw_log"));
        assert!(project.exists("build/review/review.log"));
        reviewer.assert_drained();
    }

    #[test]
    fn located_errors_carry_context_and_retry() {
        let project = TestProject::new().expect("project");
        project
            .write("rtl/top.v", "module top(input a, output q);\n  wire q;\nendmodule\n")
            .expect("write");
        let reviewer = ScriptedReviewer::new(vec![Ok(lint_error())]);
        let run = run(&project, &reviewer, &state_with_top()).expect("review");

        assert!(!run.feedback.passed);
        assert_eq!(run.transition.outcome, Outcome::Retry);
        assert_eq!(run.transition.reason, Reason::SyntaxFail);
        let issues = run.feedback.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line_location(), Some(("rtl/top.v", 2)));
        assert_eq!(
            issues[0].context,
            vec![
                "1: module top(input a, output q);",
                "2:   wire q;",
                "3: endmodule"
            ]
        );
        assert!(run.feedback.artifacts.contains_key("report"));
    }

    #[test]
    fn silent_failure_gets_synthetic_issue() {
        let project = TestProject::new().expect("project");
        let reviewer = ScriptedReviewer::new(vec![Ok(ReviewOutput {
            exit_code: Some(2),
            report: None,
            raw_log: "license checkout failed\n".to_string(),
        })]);
        let run = run(&project, &reviewer, &state_with_top()).expect("review");
        assert!(!run.feedback.passed);
        assert_eq!(run.feedback.error_count(), 1);
        assert_eq!(
            run.feedback.issues()[0].message,
            "lint command returned non-zero exit code: 2"
        );
        assert_eq!(run.feedback.raw_log_tail, vec!["license checkout failed"]);
    }

    #[test]
    fn warnings_alone_pass() {
        let project = TestProject::new().expect("project");
        let reviewer = ScriptedReviewer::new(vec![Ok(ReviewOutput {
            exit_code: Some(0),
            report: Some("rtl/top.v:1: Warning: unused input b\n".to_string()),
            raw_log: String::new(),
        })]);
        let run = run(&project, &reviewer, &state_with_top()).expect("review");
        assert!(run.feedback.passed);
        assert_eq!(run.feedback.warning_count(), 1);
        assert_eq!(run.feedback.issues()[0].severity, Severity::Warning);
    }

    #[test]
    fn file_list_merges_flist_and_artifacts() {
        let project = TestProject::new().expect("project");
        project.write("rtl.f", "rtl/pkg.sv\nrtl/top.v\n").expect("write");
        let reviewer = ScriptedReviewer::new(vec![Ok(lint_clean())]);
        let mut state = RunState::new(3);
        state.set_artifacts(ArtifactSet::new(vec![
            PathBuf::from("rtl/top.v"),
            PathBuf::from("rtl/alu.v"),
        ]));
        run(&project, &reviewer, &state).expect("review");
        let request = &reviewer.requests()[0];
        assert_eq!(
            request.files,
            vec![
                PathBuf::from("rtl/pkg.sv"),
                PathBuf::from("rtl/top.v"),
                PathBuf::from("rtl/alu.v")
            ]
        );
        assert_eq!(request.top_module, "top");
    }

    #[test]
    fn nothing_to_review_is_tool_error() {
        let project = TestProject::new().expect("project");
        let reviewer = ScriptedReviewer::new(Vec::new());
        let err = run(&project, &reviewer, &RunState::new(3)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ToolInvocation(_))
        ));
        assert_eq!(reviewer.calls(), 0);
    }
}
