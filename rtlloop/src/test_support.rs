//! Test-only collaborators and project fixtures.
//!
//! Scripted collaborators pop queued results in order and record every
//! request they receive. Running out of script is an error, so a test that
//! calls a collaborator more often than expected fails loudly.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::errors::FlowError;
use crate::io::config::FlowConfig;
use crate::io::generator::{GenerateRequest, GenerateResponse, GeneratedFile, Generator};
use crate::io::reviewer::{ReviewOutput, ReviewRequest, Reviewer};
use crate::io::verifier::{PhaseOutput, VerifyOutput, VerifyRequest, Verifier};

struct Script<Req, Resp> {
    name: &'static str,
    queue: RefCell<VecDeque<Result<Resp, FlowError>>>,
    requests: RefCell<Vec<Req>>,
}

impl<Req: Clone, Resp> Script<Req, Resp> {
    fn new(name: &'static str, steps: Vec<Result<Resp, FlowError>>) -> Self {
        Self {
            name,
            queue: RefCell::new(steps.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn next(&self, request: &Req) -> Result<Resp> {
        self.requests.borrow_mut().push(request.clone());
        match self.queue.borrow_mut().pop_front() {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(err)) => Err(err.into()),
            None => Err(anyhow!("scripted {} exhausted", self.name)),
        }
    }

    fn assert_drained(&self) {
        let left = self.queue.borrow().len();
        assert_eq!(left, 0, "scripted {} has {left} unused steps", self.name);
    }
}

pub struct ScriptedGenerator(Script<GenerateRequest, GenerateResponse>);

impl ScriptedGenerator {
    pub fn new(steps: Vec<Result<GenerateResponse, FlowError>>) -> Self {
        Self(Script::new("generator", steps))
    }

    /// The same response `times` times.
    pub fn repeat(response: GenerateResponse, times: usize) -> Self {
        Self::new(vec![Ok(response); times])
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.0.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.0.requests.borrow().len()
    }

    pub fn assert_drained(&self) {
        self.0.assert_drained();
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.0.next(request)
    }
}

pub struct ScriptedReviewer(Script<ReviewRequest, ReviewOutput>);

impl ScriptedReviewer {
    pub fn new(steps: Vec<Result<ReviewOutput, FlowError>>) -> Self {
        Self(Script::new("reviewer", steps))
    }

    pub fn repeat(output: ReviewOutput, times: usize) -> Self {
        Self::new(vec![Ok(output); times])
    }

    pub fn requests(&self) -> Vec<ReviewRequest> {
        self.0.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.0.requests.borrow().len()
    }

    pub fn assert_drained(&self) {
        self.0.assert_drained();
    }
}

impl Reviewer for ScriptedReviewer {
    fn review(&self, request: &ReviewRequest) -> Result<ReviewOutput> {
        self.0.next(request)
    }
}

pub struct ScriptedVerifier(Script<VerifyRequest, VerifyOutput>);

impl ScriptedVerifier {
    pub fn new(steps: Vec<Result<VerifyOutput, FlowError>>) -> Self {
        Self(Script::new("verifier", steps))
    }

    pub fn repeat(output: VerifyOutput, times: usize) -> Self {
        Self::new(vec![Ok(output); times])
    }

    pub fn requests(&self) -> Vec<VerifyRequest> {
        self.0.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.0.requests.borrow().len()
    }

    pub fn assert_drained(&self) {
        self.0.assert_drained();
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutput> {
        self.0.next(request)
    }
}

/// A response as a generator would print it, `raw` included.
pub fn generated(files: &[(&str, &str)], notes: &str) -> GenerateResponse {
    let mut response = GenerateResponse {
        files: files
            .iter()
            .map(|(path, content)| GeneratedFile {
                path: path.to_string(),
                content: content.to_string(),
            })
            .collect(),
        notes: notes.to_string(),
        raw: String::new(),
    };
    response.raw = serde_json::to_string(&response).unwrap_or_default();
    response
}

/// A one-file response writing `rtl/top.v`.
pub fn top_module() -> GenerateResponse {
    generated(&[("rtl/top.v", "module top(input a, output q);\n  assign q = a;\nendmodule\n")], "")
}

pub fn lint_clean() -> ReviewOutput {
    ReviewOutput {
        exit_code: Some(0),
        report: None,
        raw_log: "lint finished: 0 errors\n".to_string(),
    }
}

/// A failing lint run with one located error in `rtl/top.v`.
pub fn lint_error() -> ReviewOutput {
    ReviewOutput {
        exit_code: Some(1),
        report: Some("Error: undriven signal q (rtl/top.v:2)\n".to_string()),
        raw_log: "lint finished: 1 error\n".to_string(),
    }
}

pub fn sim_pass() -> VerifyOutput {
    VerifyOutput {
        compile: PhaseOutput {
            exit_code: Some(0),
            log: String::new(),
        },
        run: Some(PhaseOutput {
            exit_code: Some(0),
            log: "Mismatches: 0 in 20 samples\n".to_string(),
        }),
    }
}

pub fn sim_mismatch() -> VerifyOutput {
    VerifyOutput {
        compile: PhaseOutput {
            exit_code: Some(0),
            log: String::new(),
        },
        run: Some(PhaseOutput {
            exit_code: Some(0),
            log: "Sample 4 mismatch: out should be 1\nMismatches: 1 in 20 samples\n".to_string(),
        }),
    }
}

pub fn compile_error() -> VerifyOutput {
    VerifyOutput {
        compile: PhaseOutput {
            exit_code: Some(1),
            log: "rtl/top.v:2: syntax error\n".to_string(),
        },
        run: None,
    }
}

/// Temporary project with file lists, a testbench and a matching config.
pub struct TestProject {
    temp: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let project = Self { temp };
        project.write("rtl.f", "# design sources\n")?;
        project.write("tb.f", "tb/tb_top.v\n")?;
        project.write(
            "tb/tb_top.v",
            "module tb_top;\n  top dut();\nendmodule\n",
        )?;
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Default config rooted at this project.
    pub fn config(&self) -> FlowConfig {
        let mut config = FlowConfig::default();
        config.project.root = self.path().to_path_buf();
        config
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path().join(rel).exists()
    }
}
