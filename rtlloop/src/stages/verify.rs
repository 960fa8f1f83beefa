//! Verify stage: compile with the testbench, simulate, and extract mismatches.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::state::RunState;
use crate::core::types::{Findings, Reason, SkipReason, Stage, StageFeedback, Transition};
use crate::core::verdict::{compile_passed, ensure_failure_case, ensure_failure_issue, verify_passed};
use crate::errors::FlowError;
use crate::io::filelist::{merge_unique, read_filelist};
use crate::io::run_log::{VerifyLogs, write_verify_logs};
use crate::io::verifier::{Verifier, VerifyRequest};
use crate::normalize::compile::parse_compile_errors;
use crate::normalize::context::attach_context;
use crate::normalize::sim::parse_failed_cases;
use crate::normalize::tail_lines;
use crate::stages::{StageContext, StageRun, read_optional_filelist};

/// Why Verify may not run yet, if anything.
///
/// Missing review feedback always gates; a failed review gates only when
/// `require_review_passed` is set.
pub fn verify_gate(state: &RunState, require_review_passed: bool) -> Option<SkipReason> {
    match state.review_feedback() {
        None => Some(SkipReason::MissingReviewFeedback),
        Some(review) if require_review_passed && !review.passed => Some(SkipReason::ReviewFailed),
        Some(_) => None,
    }
}

fn write_list(path: &Path, files: &[PathBuf]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut body = files
        .iter()
        .map(|file| file.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    body.push('\n');
    fs::write(path, body).with_context(|| format!("write {}", path.display()))
}

fn build_request(state: &RunState, ctx: &StageContext<'_>) -> Result<VerifyRequest> {
    let project = &ctx.config.project;
    let rtl_flist = project.verify_rtl_flist.as_ref().unwrap_or(&project.rtl_flist);
    let listed = read_optional_filelist(&ctx.config.resolve(rtl_flist))?;
    let rtl_files = merge_unique(listed, state.sources().paths());
    if rtl_files.is_empty() {
        return Err(FlowError::tool(format!(
            "no RTL files to verify: {} is empty and no sources have been generated",
            rtl_flist.display()
        ))
        .into());
    }

    let tb_flist_path = ctx.config.resolve(&project.tb_flist);
    if !tb_flist_path.is_file() {
        return Err(FlowError::tool(format!(
            "missing testbench file list {}",
            tb_flist_path.display()
        ))
        .into());
    }
    let tb_files = read_filelist(&tb_flist_path).map_err(|err| FlowError::tool(format!("{err:#}")))?;

    let rtl_flist_path = ctx.paths.verify_dir.join("rtl.f");
    write_list(&rtl_flist_path, &rtl_files).map_err(|err| FlowError::tool(format!("{err:#}")))?;
    Ok(VerifyRequest {
        rtl_files,
        tb_files,
        tb_top: project.tb_top.clone(),
        rtl_flist_path,
        tb_flist_path,
        workdir: ctx.root().to_path_buf(),
        out_dir: ctx.paths.verify_dir.clone(),
    })
}

#[instrument(skip_all, fields(round = state.round()))]
pub fn run_verify<V: Verifier>(
    verifier: &V,
    state: &RunState,
    ctx: &StageContext<'_>,
) -> Result<StageRun> {
    let config = ctx.config;
    if let Some(skip) = verify_gate(state, config.require_review_passed) {
        info!(reason = %skip.reason(), "verify gated");
        return Ok(StageRun {
            feedback: StageFeedback::skipped(Stage::Verify, skip),
            transition: Transition::retry(skip.reason()),
        });
    }

    let request = build_request(state, ctx)?;
    let output = verifier.verify(&request)?;

    let mut compile_errors = parse_compile_errors(&output.compile.log);
    attach_context(&mut compile_errors, ctx.root(), config.context_radius_lines);
    ensure_failure_issue("compile", output.compile.exit_code, &mut compile_errors);
    let compiled = compile_passed(output.compile.exit_code, &compile_errors);

    let run_exit = output.run.as_ref().and_then(|run| run.exit_code);
    let mut failed_cases = Vec::new();
    if compiled {
        let run_log = output.run.as_ref().map(|run| run.log.as_str()).unwrap_or("");
        failed_cases = parse_failed_cases(run_log);
        ensure_failure_case(run_exit, &mut failed_cases);
    }
    let passed = verify_passed(output.compile.exit_code, &compile_errors, run_exit, &failed_cases);
    compile_errors.truncate(config.verify.max_errors);
    failed_cases.truncate(config.verify.max_failed_cases);

    let run_log = output.run.as_ref().map(|run| run.log.as_str());
    let tail_source = match run_log {
        Some(log) if !log.trim().is_empty() => log,
        _ => output.compile.log.as_str(),
    };
    let raw_log_tail = tail_lines(tail_source, config.verify.raw_tail_lines);

    let artifacts = match write_verify_logs(
        ctx.paths,
        &VerifyLogs {
            compile_log: &output.compile.log,
            run_log,
            compile_errors: &compile_errors,
            failed_cases: &failed_cases,
        },
    ) {
        Ok(written) => written,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "failed to write verify logs");
            Default::default()
        }
    };

    info!(
        passed,
        compiled,
        compile_errors = compile_errors.len(),
        failed_cases = failed_cases.len(),
        "verify finished"
    );
    let transition = if passed {
        Transition::advance(Reason::VerifyOk)
    } else {
        Transition::retry(Reason::VerifyFail)
    };
    Ok(StageRun {
        feedback: StageFeedback {
            passed,
            skipped: None,
            findings: Findings::Verify {
                compile_passed: compiled,
                compile_errors,
                failed_cases,
            },
            raw_log_tail,
            artifacts,
        },
        transition,
    })
}
