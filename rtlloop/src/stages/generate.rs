//! Generate stage: ask the generator for files and write them under the root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::paths::validate_generated_path;
use crate::core::state::{ArtifactSet, RunState};
use crate::core::types::{GenerationMode, Reason, Transition};
use crate::errors::FlowError;
use crate::io::generator::{GenerateRequest, GeneratedFile, Generator};
use crate::io::prompt::{PromptInputs, render_generate_prompt};
use crate::io::run_log::write_generate_logs;
use crate::stages::StageContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRun {
    pub mode: GenerationMode,
    /// Written paths in proposal order, relative to the project root.
    pub artifacts: ArtifactSet,
    pub edit_summary: String,
    /// Raw response and notes files, keyed by artifact name.
    pub logs: BTreeMap<String, PathBuf>,
    pub transition: Transition,
}

/// Patch once any gated stage has produced feedback.
pub fn generation_mode(state: &RunState) -> GenerationMode {
    if state.has_feedback() {
        GenerationMode::Patch
    } else {
        GenerationMode::Generate
    }
}

fn collect_sources(root: &Path, dir: &Path, allowed: &[String], out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("read dir entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_sources(root, &path, allowed, out)?;
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| allowed.iter().any(|a| a.trim_start_matches('.') == ext));
        if matches && let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

/// Sources under `source_dir` with an allowed extension, sorted, relative to `root`.
pub fn discover_sources(root: &Path, source_dir: &Path, allowed: &[String]) -> Result<Vec<PathBuf>> {
    let dir = root.join(source_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    collect_sources(root, &dir, allowed, &mut found)?;
    found.sort();
    Ok(found)
}

/// Check that `rel` still lands under `root` once symlinks are resolved.
///
/// The deepest existing ancestor of the target (or the target itself) is
/// canonicalized, so a symlinked directory pointing elsewhere is caught
/// before anything is created.
fn ensure_resolves_within(root: &Path, rel: &Path) -> Result<(), String> {
    let canonical_root = root
        .canonicalize()
        .map_err(|err| format!("resolve project root {}: {err}", root.display()))?;
    let target = root.join(rel);
    let existing = target
        .ancestors()
        .find(|candidate| candidate.exists())
        .unwrap_or(root);
    let resolved = existing
        .canonicalize()
        .map_err(|err| format!("resolve {}: {err}", existing.display()))?;
    if resolved.starts_with(&canonical_root) {
        Ok(())
    } else {
        Err(format!(
            "path escapes project root via {}: {}",
            resolved.display(),
            rel.display()
        ))
    }
}

/// Validate every proposed path; nothing is written unless all pass.
fn validate_proposal<'a>(
    files: &'a [GeneratedFile],
    ctx: &StageContext<'_>,
) -> Result<Vec<(PathBuf, &'a str)>> {
    let policy = ctx.config.path_policy();
    let mut accepted = Vec::with_capacity(files.len());
    for file in files {
        if file.path.trim().is_empty() {
            debug!("skipping generated file with empty path");
            continue;
        }
        let rel = validate_generated_path(&file.path, &policy).map_err(FlowError::Validation)?;
        ensure_resolves_within(ctx.root(), &rel).map_err(FlowError::Validation)?;
        accepted.push((rel, file.content.as_str()));
    }
    Ok(accepted)
}

pub fn edit_summary(mode: GenerationMode, written: &[PathBuf], notes: &str) -> String {
    let tag = match mode {
        GenerationMode::Generate => "gen",
        GenerationMode::Patch => "fix",
    };
    let updated = if written.is_empty() {
        "(no files updated)".to_string()
    } else {
        written
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let notes = notes.trim();
    let notes = if notes.is_empty() { "(no notes)" } else { notes };
    format!("[generate:{tag}] updated: {updated}; notes: {notes}")
}

#[instrument(skip_all, fields(round = state.round()))]
pub fn run_generate<G: Generator>(
    generator: &G,
    state: &RunState,
    ctx: &StageContext<'_>,
) -> Result<GenerateRun> {
    let config = ctx.config;
    let mode = generation_mode(state);
    let existing_files = if state.sources().is_empty() {
        discover_sources(
            ctx.root(),
            &config.project.source_dir,
            &config.project.allowed_extensions,
        )?
    } else {
        state.sources().paths().to_vec()
    };

    let prompt = render_generate_prompt(&PromptInputs {
        spec: ctx.spec,
        mode,
        root: ctx.root(),
        existing_files: &existing_files,
        max_context_files: config.generate.max_context_files,
        allowed_extensions: &config.project.allowed_extensions,
        strict_json: config.generate.strict_json,
        review_feedback: state.review_feedback(),
        verify_feedback: state.verify_feedback(),
    })
    .context("render generation prompt")?;

    let request = GenerateRequest {
        spec: ctx.spec.to_string(),
        mode,
        existing_files,
        review_feedback: state.review_feedback().cloned(),
        verify_feedback: state.verify_feedback().cloned(),
        prompt,
    };
    let response = generator.generate(&request)?;
    let accepted = validate_proposal(&response.files, ctx)?;

    let mut written = Vec::with_capacity(accepted.len());
    for (rel, content) in accepted {
        let path = ctx.root().join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        written.push(rel);
    }

    let logs = write_generate_logs(ctx.paths, &response.raw, &response.notes).unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "failed to write generator logs");
        BTreeMap::new()
    });

    let edit_summary = edit_summary(mode, &written, &response.notes);
    info!(files = written.len(), ?mode, "generation applied");
    Ok(GenerateRun {
        mode,
        artifacts: ArtifactSet::new(written),
        edit_summary,
        logs,
        transition: Transition::advance(Reason::Generated),
    })
}
