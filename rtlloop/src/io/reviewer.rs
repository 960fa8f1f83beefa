//! Review collaborator: a lint tool run over the current sources.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::errors::FlowError;
use crate::io::process::{Limits, expand_placeholders, program_name, run_tool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Sources to lint, relative to `workdir`.
    pub files: Vec<PathBuf>,
    pub top_module: String,
    /// Where the file list handed to the tool is written.
    pub flist_path: PathBuf,
    /// Where the tool may export a structured report.
    pub report_path: PathBuf,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewOutput {
    pub exit_code: Option<i32>,
    /// Structured error/warning export, when the tool produced one.
    pub report: Option<String>,
    pub raw_log: String,
}

pub trait Reviewer {
    fn review(&self, request: &ReviewRequest) -> Result<ReviewOutput>;
}

/// Reviewer backed by a configured lint command.
///
/// Placeholders: `{top}`, `{flist}`, `{report}`, `{workdir}`.
#[derive(Debug, Clone)]
pub struct CommandReviewer {
    pub argv: Vec<String>,
    pub limits: Limits,
}

fn write_filelist(request: &ReviewRequest) -> Result<()> {
    if let Some(parent) = request.flist_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut body = request
        .files
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    body.push('\n');
    fs::write(&request.flist_path, body)
        .with_context(|| format!("write {}", request.flist_path.display()))
}

impl Reviewer for CommandReviewer {
    #[instrument(skip_all, fields(top = %request.top_module, files = request.files.len()))]
    fn review(&self, request: &ReviewRequest) -> Result<ReviewOutput> {
        write_filelist(request).map_err(|err| FlowError::tool(format!("{err:#}")))?;
        if request.report_path.exists() {
            fs::remove_file(&request.report_path)
                .with_context(|| format!("remove stale {}", request.report_path.display()))?;
        }

        let argv = expand_placeholders(
            &self.argv,
            &[
                ("top", request.top_module.clone()),
                ("flist", request.flist_path.display().to_string()),
                ("report", request.report_path.display().to_string()),
                ("workdir", request.workdir.display().to_string()),
            ],
        );
        info!(program = program_name(&argv), "starting lint");
        let output = run_tool(&argv, &request.workdir, None, self.limits)
            .map_err(|err| FlowError::tool(format!("lint: {err:#}")))?;
        if output.timed_out {
            warn!("lint timed out");
        }

        let report = match fs::read(&request.report_path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => None,
        };
        debug!(exit_code = ?output.exit_code, has_report = report.is_some(), "lint finished");
        Ok(ReviewOutput {
            exit_code: output.exit_code,
            report,
            raw_log: output.combined_log(),
        })
    }
}
