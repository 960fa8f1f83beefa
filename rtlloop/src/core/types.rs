//! Shared deterministic types for the flow core.
//!
//! These types define stable contracts between the orchestrator, the stage
//! executors and the normalizers. They carry no I/O and serialize to a stable
//! JSON shape so feedback can be recorded and replayed without loss.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A state of the flow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Review,
    Verify,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Review => "review",
            Stage::Verify => "verify",
            Stage::Done => "done",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Done
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome kind proposed by a stage executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Advance,
    Retry,
    Abort,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Advance => "advance",
            Outcome::Retry => "retry",
            Outcome::Abort => "abort",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Generate wrote its proposal.
    Generated,
    /// Review found no error-level issues.
    SyntaxOk,
    /// Review found error-level issues.
    SyntaxFail,
    /// Verify compiled and simulated without mismatches.
    VerifyOk,
    /// Verify hit compile errors or behavioral mismatches.
    VerifyFail,
    ReviewFailLimitReached,
    VerifyFailLimitReached,
    MaxRoundsReached,
    /// Verify was gated because no review feedback exists.
    MissingReviewFeedback,
    /// Verify was gated because review did not pass.
    ReviewFailed,
    /// A collaborator broke its contract (unsafe path, malformed response).
    ContractViolation(String),
    /// A collaborator could not be invoked or lacked required input.
    ToolFailure(String),
}

impl Reason {
    /// Stable reason code, without any attached detail.
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Generated => "generated",
            Reason::SyntaxOk => "syntax_ok",
            Reason::SyntaxFail => "syntax_fail",
            Reason::VerifyOk => "verify_ok",
            Reason::VerifyFail => "verify_fail",
            Reason::ReviewFailLimitReached => "review_fail_limit_reached",
            Reason::VerifyFailLimitReached => "verify_fail_limit_reached",
            Reason::MaxRoundsReached => "max_rounds_reached",
            Reason::MissingReviewFeedback => "missing_review_feedback",
            Reason::ReviewFailed => "review_failed",
            Reason::ContractViolation(_) => "contract_violation",
            Reason::ToolFailure(_) => "tool_failure",
        }
    }

    /// The abort reason for an exhausted attempt counter of `stage`.
    pub fn fail_limit(stage: Stage) -> Option<Reason> {
        match stage {
            Stage::Review => Some(Reason::ReviewFailLimitReached),
            Stage::Verify => Some(Reason::VerifyFailLimitReached),
            Stage::Generate | Stage::Done => None,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ContractViolation(detail) | Reason::ToolFailure(detail) => {
                write!(f, "{}: {}", self.code(), detail)
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Tagged result of one stage invocation. The orchestrator is the only consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub outcome: Outcome,
    pub reason: Reason,
}

impl Transition {
    pub fn advance(reason: Reason) -> Self {
        Self {
            outcome: Outcome::Advance,
            reason,
        }
    }

    pub fn retry(reason: Reason) -> Self {
        Self {
            outcome: Outcome::Retry,
            reason,
        }
    }

    pub fn abort(reason: Reason) -> Self {
        Self {
            outcome: Outcome::Abort,
            reason,
        }
    }
}

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Parse a severity word case-insensitively (`error`, `WARNING`, ...).
    pub fn parse(word: &str) -> Option<Severity> {
        match word.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "fatal" => Some(Severity::Fatal),
            _ => None,
        }
    }

    /// `Error` and `Fatal` block a stage from passing.
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

/// Source location of a finding. `line` is 1-indexed when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: Option<u32>,
}

/// One normalized lint or compile finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
    pub rule_id: Option<String>,
    /// Surrounding source lines rendered as `"<lineno>: <text>"`.
    #[serde(default)]
    pub context: Vec<String>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            location: None,
            message: message.into(),
            rule_id: None,
            context: Vec::new(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.location = Some(Location {
            file: file.into(),
            line,
        });
        self
    }

    /// File and line when the issue points at a concrete source line.
    pub fn line_location(&self) -> Option<(&str, u32)> {
        let location = self.location.as_ref()?;
        let line = location.line?;
        if location.file.is_empty() || line == 0 {
            return None;
        }
        Some((location.file.as_str(), line))
    }
}

/// One normalized simulation mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCase {
    pub case: Option<String>,
    pub message: String,
    #[serde(default)]
    pub signals: Vec<String>,
    pub expected_behavior: Option<String>,
    pub raw: String,
}

/// Why a stage produced feedback without running its collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingReviewFeedback,
    ReviewFailed,
    MaxRoundsReached,
}

impl SkipReason {
    pub fn reason(self) -> Reason {
        match self {
            SkipReason::MissingReviewFeedback => Reason::MissingReviewFeedback,
            SkipReason::ReviewFailed => Reason::ReviewFailed,
            SkipReason::MaxRoundsReached => Reason::MaxRoundsReached,
        }
    }
}

/// Stage-specific findings carried by [`StageFeedback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum Findings {
    Review {
        issues: Vec<Issue>,
    },
    Verify {
        compile_passed: bool,
        compile_errors: Vec<Issue>,
        failed_cases: Vec<FailedCase>,
    },
}

/// Uniform pass/fail + findings contract handed from a stage to the
/// orchestrator and, transitively, to the next Generate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFeedback {
    pub passed: bool,
    pub skipped: Option<SkipReason>,
    pub findings: Findings,
    /// Bounded tail of the raw tool log, for human debugging.
    pub raw_log_tail: Vec<String>,
    /// Named paths to raw logs and reports.
    pub artifacts: BTreeMap<String, PathBuf>,
}

impl StageFeedback {
    /// Well-formed failed feedback for a stage whose collaborator did not run.
    pub fn skipped(stage: Stage, reason: SkipReason) -> Self {
        let findings = match stage {
            Stage::Verify => Findings::Verify {
                compile_passed: false,
                compile_errors: Vec::new(),
                failed_cases: Vec::new(),
            },
            _ => Findings::Review { issues: Vec::new() },
        };
        Self {
            passed: false,
            skipped: Some(reason),
            findings,
            raw_log_tail: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn issues(&self) -> &[Issue] {
        match &self.findings {
            Findings::Review { issues } => issues,
            Findings::Verify { compile_errors, .. } => compile_errors,
        }
    }

    pub fn failed_cases(&self) -> &[FailedCase] {
        match &self.findings {
            Findings::Review { .. } => &[],
            Findings::Verify { failed_cases, .. } => failed_cases,
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues()
            .iter()
            .filter(|issue| issue.severity.is_blocking())
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues()
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .count()
    }
}

/// Whether a Generate call creates files from scratch or patches after feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Generate,
    Patch,
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Verify advanced to `Done`.
    Succeeded,
    /// An attempt or round ceiling terminated the run.
    Failed,
    /// A collaborator failure or contract violation stopped the run.
    Aborted,
}
