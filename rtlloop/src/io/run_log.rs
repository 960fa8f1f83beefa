//! Run artifacts under `<out_dir>/`: the stage summary and raw tool logs.
//!
//! These are postmortem aids only. Nothing here is read back by the
//! orchestrator, and a failed summary write never changes a run's outcome.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::types::{FailedCase, GenerationMode, Issue, Outcome, Stage};

/// One line of `flow/summary.jsonl`, written per stage invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub round: u32,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    pub outcome: Outcome,
    pub reason: String,
    pub review_attempts: u32,
    pub verify_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_summary: Option<String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, PathBuf>,
}

/// Stable artifact layout below the configured output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub summary_path: PathBuf,
    pub generate_dir: PathBuf,
    pub review_dir: PathBuf,
    pub verify_dir: PathBuf,
}

impl RunPaths {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            summary_path: out_dir.join("flow").join("summary.jsonl"),
            generate_dir: out_dir.join("generate"),
            review_dir: out_dir.join("review"),
            verify_dir: out_dir.join("verify"),
        }
    }

    pub fn generate_raw(&self) -> PathBuf {
        self.generate_dir.join("response.raw.json")
    }

    pub fn generate_notes(&self) -> PathBuf {
        self.generate_dir.join("notes.txt")
    }

    pub fn review_flist(&self) -> PathBuf {
        self.review_dir.join("review.f")
    }

    pub fn review_report(&self) -> PathBuf {
        self.review_dir.join("report.txt")
    }

    pub fn review_log(&self) -> PathBuf {
        self.review_dir.join("review.log")
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Append one JSON line to the summary file.
pub fn append_stage_record(path: &Path, record: &StageRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(record).context("serialize stage record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

/// Advisory variant of [`append_stage_record`]: failures are logged and dropped.
pub fn record_stage(path: &Path, record: &StageRecord) {
    if let Err(err) = append_stage_record(path, record) {
        warn!(path = %path.display(), err = %format!("{err:#}"), "failed to write run summary");
    }
}

pub fn read_stage_records(path: &Path) -> Result<Vec<StageRecord>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}

/// Write the generator's raw output and notes from the latest Generate.
///
/// Empty inputs remove the file left by an earlier round, so both files
/// always describe the same response.
pub fn write_generate_logs(paths: &RunPaths, raw: &str, notes: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut written = BTreeMap::new();
    for (name, path, contents) in [
        ("raw_response", paths.generate_raw(), raw),
        ("notes", paths.generate_notes(), notes),
    ] {
        if contents.trim().is_empty() {
            if path.exists() {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            }
            continue;
        }
        write_text(&path, contents)?;
        written.insert(name.to_string(), path);
    }
    Ok(written)
}

pub fn write_review_log(paths: &RunPaths, raw_log: &str) -> Result<PathBuf> {
    let path = paths.review_log();
    write_text(&path, raw_log)?;
    Ok(path)
}

/// Raw and condensed logs of one Verify invocation.
pub struct VerifyLogs<'a> {
    pub compile_log: &'a str,
    pub run_log: Option<&'a str>,
    pub compile_errors: &'a [Issue],
    pub failed_cases: &'a [FailedCase],
}

fn compile_error_line(issue: &Issue) -> String {
    match &issue.location {
        Some(location) => match location.line {
            Some(line) => format!("{}:{line} {}", location.file, issue.message),
            None => format!("{} {}", location.file, issue.message),
        },
        None => issue.message.clone(),
    }
}

/// Write `compile.log`, `run.log`, `compile_error.log` and `mismatch_case.log`.
///
/// Returns the written paths keyed by artifact name.
pub fn write_verify_logs(paths: &RunPaths, logs: &VerifyLogs<'_>) -> Result<BTreeMap<String, PathBuf>> {
    let dir = &paths.verify_dir;
    let mut written = BTreeMap::new();

    let compile_path = dir.join("compile.log");
    write_text(&compile_path, logs.compile_log)?;
    written.insert("compile_log".to_string(), compile_path);

    if let Some(run_log) = logs.run_log {
        let run_path = dir.join("run.log");
        write_text(&run_path, run_log)?;
        written.insert("run_log".to_string(), run_path);
    }

    let mut errors = logs
        .compile_errors
        .iter()
        .map(compile_error_line)
        .collect::<Vec<_>>()
        .join("\n");
    errors.push('\n');
    let errors_path = dir.join("compile_error.log");
    write_text(&errors_path, errors.trim_start_matches('\n'))?;
    written.insert("compile_errors".to_string(), errors_path);

    let mut cases = logs
        .failed_cases
        .iter()
        .map(|case| {
            format!(
                "{}: {}",
                case.case.as_deref().unwrap_or("<unknown>"),
                case.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    cases.push('\n');
    let cases_path = dir.join("mismatch_case.log");
    write_text(&cases_path, cases.trim_start_matches('\n'))?;
    written.insert("mismatch_cases".to_string(), cases_path);

    Ok(written)
}
