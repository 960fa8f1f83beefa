//! Generation prompt rendering.
//!
//! Feedback from the last Review and Verify runs is flattened into short
//! bullet summaries so the generator sees locations, context and failing cases
//! without the raw tool logs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{GenerationMode, Issue, StageFeedback};

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");

/// Entries listed per feedback category.
const MAX_SUMMARY_ENTRIES: usize = 50;
/// Context lines shown under each review issue.
const MAX_CONTEXT_LINES: usize = 8;

#[derive(Debug, Clone, Serialize)]
struct FileContent {
    path: String,
    content: String,
}

/// Everything the generation prompt is rendered from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub spec: &'a str,
    pub mode: GenerationMode,
    pub root: &'a Path,
    /// Relative paths listed in the prompt; the first `max_context_files`
    /// are also inlined.
    pub existing_files: &'a [PathBuf],
    pub max_context_files: usize,
    pub allowed_extensions: &'a [String],
    pub strict_json: bool,
    pub review_feedback: Option<&'a StageFeedback>,
    pub verify_feedback: Option<&'a StageFeedback>,
}

fn describe_location(issue: &Issue) -> String {
    match &issue.location {
        Some(location) => match location.line {
            Some(line) => format!("{}:{line} ", location.file),
            None => format!("{} ", location.file),
        },
        None => String::new(),
    }
}

/// Bullet summary of review feedback.
pub fn summarize_review(feedback: &StageFeedback) -> String {
    if feedback.passed {
        return "- No syntax/lint errors.".to_string();
    }
    let mut lines = Vec::new();
    if let Some(skip) = feedback.skipped {
        lines.push(format!("- Review skipped: {}", skip.reason()));
    }
    for issue in feedback.issues().iter().take(MAX_SUMMARY_ENTRIES) {
        lines.push(format!(
            "- {}: {}{}",
            issue.severity,
            describe_location(issue),
            issue.message
        ));
        lines.extend(
            issue
                .context
                .iter()
                .take(MAX_CONTEXT_LINES)
                .map(|line| format!("    {line}")),
        );
    }
    lines.join("\n")
}

/// Bullet summary of verify feedback.
pub fn summarize_verify(feedback: &StageFeedback) -> String {
    if feedback.passed {
        return "- All test cases passed.".to_string();
    }
    let mut lines = Vec::new();
    if let Some(skip) = feedback.skipped {
        lines.push(format!("- Verify skipped: {}", skip.reason()));
    }
    for error in feedback.issues().iter().take(MAX_SUMMARY_ENTRIES) {
        lines.push(format!(
            "- COMPILE_ERROR: {}{}",
            describe_location(error),
            error.message
        ));
    }
    for case in feedback.failed_cases().iter().take(MAX_SUMMARY_ENTRIES) {
        lines.push(format!(
            "- FAIL_CASE: {} {}",
            case.case.as_deref().unwrap_or("<unknown>"),
            case.message
        ));
    }
    lines.join("\n")
}

fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.trim_start_matches('.') == ext))
}

fn read_contents(input: &PromptInputs<'_>) -> Vec<FileContent> {
    input
        .existing_files
        .iter()
        .take(input.max_context_files)
        .filter(|rel| has_allowed_extension(rel, input.allowed_extensions))
        .filter_map(|rel| match fs::read(input.root.join(rel)) {
            Ok(bytes) => Some(FileContent {
                path: rel.display().to_string(),
                content: String::from_utf8_lossy(&bytes).trim_end().to_string(),
            }),
            Err(err) => {
                debug!(path = %rel.display(), err = %err, "skipping unreadable context file");
                None
            }
        })
        .collect()
}

/// Render the generation prompt.
pub fn render_generate_prompt(input: &PromptInputs<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("generate", GENERATE_TEMPLATE)?;

    let existing: Vec<String> = input
        .existing_files
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let rendered = env.get_template("generate")?.render(context! {
        strict_json => input.strict_json,
        mode => input.mode,
        spec => input.spec.trim(),
        existing_files => existing,
        contents => read_contents(input),
        review_summary => input.review_feedback.map(summarize_review),
        verify_summary => input.verify_feedback.map(summarize_verify),
    })?;
    Ok(rendered)
}
