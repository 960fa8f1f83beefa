//! Stage executors.
//!
//! Each executor wraps one collaborator call, normalizes its output into
//! [`StageFeedback`], and proposes a [`Transition`]. Executors read the
//! [`RunState`](crate::core::state::RunState) but never mutate it; attempt
//! counting and the round guard belong to the orchestrator.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::{StageFeedback, Transition};
use crate::errors::FlowError;
use crate::io::config::FlowConfig;
use crate::io::filelist::read_filelist;
use crate::io::run_log::RunPaths;

pub mod generate;
pub mod review;
pub mod verify;

/// Read-only inputs shared by every executor.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a FlowConfig,
    pub paths: &'a RunPaths,
    pub spec: &'a str,
}

impl StageContext<'_> {
    pub fn root(&self) -> &Path {
        &self.config.project.root
    }
}

/// Result of a gated stage (Review or Verify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub feedback: StageFeedback,
    pub transition: Transition,
}

/// Entries of an optional file list; a missing list yields nothing.
pub(crate) fn read_optional_filelist(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_filelist(path).map_err(|err| FlowError::tool(format!("{err:#}")).into())
}
