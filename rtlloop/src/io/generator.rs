//! Generate collaborator: the agent that proposes source files.
//!
//! The [`Generator`] trait decouples the Generate stage from the backend
//! (currently any command that reads a prompt on stdin and prints JSON).
//! Tests use scripted generators that return queued responses.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{GenerationMode, StageFeedback};
use crate::errors::FlowError;
use crate::io::process::{Limits, run_tool};
use crate::normalize::tail_lines;

const RESPONSE_SCHEMA: &str = include_str!("../../schemas/generate_response.schema.json");

/// Input handed to a generator.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub spec: String,
    pub mode: GenerationMode,
    /// Existing source paths, relative to the project root.
    pub existing_files: Vec<PathBuf>,
    pub review_feedback: Option<StageFeedback>,
    pub verify_feedback: Option<StageFeedback>,
    /// Fully rendered prompt text.
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Proposed files in write order plus free-text notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub notes: String,
    /// Generator output exactly as received, kept for postmortems.
    #[serde(skip)]
    pub raw: String,
}

/// Abstraction over generation backends.
pub trait Generator {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}

/// Generator that pipes the prompt to a configured command.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub limits: Limits,
    pub strict_json: bool,
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(mode = ?request.mode))]
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        info!(workdir = %self.workdir.display(), "starting generator");
        let output = run_tool(
            &self.argv,
            &self.workdir,
            Some(request.prompt.as_bytes()),
            self.limits,
        )
        .map_err(|err| FlowError::tool(format!("generator: {err:#}")))?;

        if output.timed_out {
            warn!("generator timed out");
            return Err(FlowError::tool(format!(
                "generator timed out after {}s",
                self.limits.timeout.as_secs()
            ))
            .into());
        }
        if output.exit_code != Some(0) {
            let tail = tail_lines(&output.combined_log(), 20).join("\n");
            warn!(exit_code = ?output.exit_code, "generator failed");
            return Err(FlowError::tool(format!(
                "generator exited with {:?}: {tail}",
                output.exit_code
            ))
            .into());
        }

        let response = parse_response(&output.stdout_text(), self.strict_json)?;
        debug!(files = response.files.len(), "parsed generator response");
        Ok(response)
    }
}

/// The first `{ ... }` block of `text`, from the first `{` to the last `}`.
fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(RESPONSE_SCHEMA).context("parse generate response schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {err}"))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(FlowError::validation(format!(
            "generator response does not match schema: {}",
            messages.join("; ")
        ))
        .into());
    }
    Ok(())
}

/// Parse generator stdout into a response.
///
/// Strict mode requires the whole output to be one JSON object; lenient mode
/// uses the first `{...}` block. Every failure is a [`FlowError::Validation`].
pub fn parse_response(text: &str, strict: bool) -> Result<GenerateResponse> {
    let candidate = if strict {
        text.trim()
    } else {
        extract_json_block(text)
            .ok_or_else(|| FlowError::validation("generator output contains no JSON object"))?
    };
    let value: Value = serde_json::from_str(candidate)
        .map_err(|err| FlowError::validation(format!("generator output is not valid JSON: {err}")))?;
    validate_schema(&value)?;
    let mut response: GenerateResponse = serde_json::from_value(value)
        .map_err(|err| FlowError::validation(format!("generator response shape: {err}")))?;
    response.raw = text.to_string();
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_error(err: &anyhow::Error) -> &FlowError {
        err.downcast_ref::<FlowError>().expect("flow error")
    }

    #[test]
    fn strict_parse_accepts_plain_json() {
        let text = r#"{"files":[{"path":"rtl/top.v","content":"module top; endmodule\n"}],"notes":"first cut"}"#;
        let response = parse_response(text, true).expect("parse");
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].path, "rtl/top.v");
        assert_eq!(response.notes, "first cut");
    }

    #[test]
    fn strict_parse_rejects_surrounding_chatter() {
        let text = "Here you go:\n{\"files\":[]}\n";
        let err = parse_response(text, true).unwrap_err();
        assert!(matches!(flow_error(&err), FlowError::Validation(_)));
        let response = parse_response(text, false).expect("lenient parse");
        assert!(response.files.is_empty());
        assert_eq!(response.notes, "");
    }

    #[test]
    fn schema_violations_are_validation_errors() {
        let err = parse_response(r#"{"files":[{"path":"a.v"}]}"#, true).unwrap_err();
        let FlowError::Validation(detail) = flow_error(&err) else {
            panic!("expected validation error");
        };
        assert!(detail.contains("schema"));

        let err = parse_response(r#"{"notes":"no files"}"#, true).unwrap_err();
        assert!(matches!(flow_error(&err), FlowError::Validation(_)));
    }

    #[test]
    fn lenient_parse_without_object_fails() {
        let err = parse_response("sorry, cannot help", false).unwrap_err();
        assert!(matches!(flow_error(&err), FlowError::Validation(_)));
    }

    #[test]
    fn command_generator_reads_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = CommandGenerator {
            argv: vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"files":[{"path":"rtl/a.v","content":"x"}]}'"#.to_string(),
            ],
            workdir: temp.path().to_path_buf(),
            limits: Limits::new(10, 4096),
            strict_json: true,
        };
        let request = GenerateRequest {
            spec: "adder".to_string(),
            mode: GenerationMode::Generate,
            existing_files: Vec::new(),
            review_feedback: None,
            verify_feedback: None,
            prompt: "write an adder".to_string(),
        };
        let response = generator.generate(&request).expect("generate");
        assert_eq!(response.files[0].path, "rtl/a.v");
        assert_eq!(
            response.raw,
            "{\"files\":[{\"path\":\"rtl/a.v\",\"content\":\"x\"}]}\n"
        );
    }

    #[test]
    fn command_generator_failure_is_tool_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = CommandGenerator {
            argv: vec!["sh".to_string(), "-c".to_string(), "echo boom; exit 1".to_string()],
            workdir: temp.path().to_path_buf(),
            limits: Limits::new(10, 4096),
            strict_json: true,
        };
        let request = GenerateRequest {
            spec: String::new(),
            mode: GenerationMode::Patch,
            existing_files: Vec::new(),
            review_feedback: None,
            verify_feedback: None,
            prompt: String::new(),
        };
        let err = generator.generate(&request).unwrap_err();
        let FlowError::ToolInvocation(detail) = flow_error(&err) else {
            panic!("expected tool error");
        };
        assert!(detail.contains("boom"));
    }
}
