//! Dataset batches for `rtlloop batch`.
//!
//! A dataset directory holds `problems.txt` (one case name per line) and,
//! per case, `<case>_prompt[.txt]`, `<case>_ref{.sv,.v,}` and
//! `<case>_test{.sv,.v,}`. Each case is staged into a shared project root as
//! `TopModule.v` (the design under test), `RefModule<ext>` and `tb<ext>`,
//! run through [`run_flow`], and its final design, raw generator output and
//! notes are copied into the results directory. A failing case is logged
//! and the batch moves on.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::{Reason, RunStatus};
use crate::io::config::FlowConfig;
use crate::io::generator::Generator;
use crate::io::reviewer::Reviewer;
use crate::io::run_log::RunPaths;
use crate::io::verifier::Verifier;
use crate::orchestrator::{RunReport, run_flow};

pub const PROBLEMS_FILE_NAME: &str = "problems.txt";
pub const DUT_MODULE: &str = "TopModule";
pub const DUT_FILE: &str = "TopModule.v";
pub const REVIEW_FLIST: &str = "rtl_review.f";
pub const VERIFY_FLIST: &str = "rtl_verify.f";
pub const TB_FLIST: &str = "tb.f";

/// Input files of one dataset case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCase {
    pub name: String,
    pub prompt: PathBuf,
    pub reference: PathBuf,
    pub testbench: PathBuf,
}

/// Where a batch reads cases from and writes results to.
#[derive(Debug, Clone)]
pub struct BatchLayout {
    pub dataset_root: PathBuf,
    pub project_root: PathBuf,
    pub results_root: PathBuf,
    pub tb_top: String,
}

/// Outcome of one case, as printed in the batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub case: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_invocations: Option<u32>,
    /// Copy of the final design under `results_root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dut: Option<PathBuf>,
    /// Set when the case could not be staged or run at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    fn finished(case: &str, report: &RunReport, dut: Option<PathBuf>) -> Self {
        Self {
            case: case.to_string(),
            status: Some(report.status),
            reason: Some(report.reason.clone()),
            generate_invocations: Some(report.generate_invocations),
            dut,
            error: None,
        }
    }

    fn errored(case: &str, err: &anyhow::Error) -> Self {
        Self {
            case: case.to_string(),
            status: None,
            reason: None,
            generate_invocations: None,
            dut: None,
            error: Some(format!("{err:#}")),
        }
    }
}

/// Non-blank, trimmed case names. An empty list is an error.
pub fn read_problems(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cases: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if cases.is_empty() {
        bail!("no cases found in {}", path.display());
    }
    Ok(cases)
}

fn find_first(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

pub fn resolve_case_files(dataset_root: &Path, case: &str) -> Result<BatchCase> {
    let prompt = find_first(dataset_root, &[format!("{case}_prompt"), format!("{case}_prompt.txt")]);
    let reference = find_first(
        dataset_root,
        &[format!("{case}_ref.sv"), format!("{case}_ref.v"), format!("{case}_ref")],
    );
    let testbench = find_first(
        dataset_root,
        &[format!("{case}_test.sv"), format!("{case}_test.v"), format!("{case}_test")],
    );

    match (prompt, reference, testbench) {
        (Some(prompt), Some(reference), Some(testbench)) => Ok(BatchCase {
            name: case.to_string(),
            prompt,
            reference,
            testbench,
        }),
        (prompt, reference, testbench) => {
            let missing: Vec<&str> = [
                ("prompt", prompt.is_none()),
                ("ref", reference.is_none()),
                ("test", testbench.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            Err(anyhow!("case {case}: missing files: {}", missing.join(", ")))
        }
    }
}

/// `.sv` / `.v` of a dataset file, or nothing for an extension-less one.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

fn write_flist(path: &Path, entries: &[&str]) -> Result<()> {
    let mut contents = entries.join("\n");
    contents.push('\n');
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Stage a case into `project_root`, overwriting the previous case.
///
/// The design is reset to an empty `TopModule.v`, the reference and
/// testbench are copied in, the three file lists are rewritten and the
/// previous run's artifacts under `out_dir` are removed.
pub fn prepare_case(case: &BatchCase, config: &FlowConfig) -> Result<()> {
    let root = &config.project.root;
    fs::create_dir_all(root).with_context(|| format!("create directory {}", root.display()))?;

    let out_dir = config.out_dir();
    if out_dir.exists() {
        fs::remove_dir_all(&out_dir)
            .with_context(|| format!("clear {}", out_dir.display()))?;
    }

    let dut = root.join(DUT_FILE);
    fs::write(&dut, "").with_context(|| format!("reset {}", dut.display()))?;

    let reference = format!("RefModule{}", dotted_extension(&case.reference));
    let testbench = format!("tb{}", dotted_extension(&case.testbench));
    for (src, name) in [(&case.reference, &reference), (&case.testbench, &testbench)] {
        let dest = root.join(name);
        fs::copy(src, &dest)
            .with_context(|| format!("copy {} to {}", src.display(), dest.display()))?;
    }

    write_flist(&root.join(REVIEW_FLIST), &[DUT_FILE])?;
    write_flist(&root.join(VERIFY_FLIST), &[DUT_FILE, &reference])?;
    write_flist(&root.join(TB_FLIST), &[&testbench])?;
    Ok(())
}

/// `base` pointed at the staged project.
///
/// Review lints the design alone; Verify compiles it together with the
/// reference model. Discovery looks at `rtl/`, which the staged project
/// never has, so the reference is not offered to the generator as an
/// existing source.
pub fn case_config(base: &FlowConfig, project_root: &Path, tb_top: &str) -> FlowConfig {
    let mut config = base.clone();
    config.project.root = project_root.to_path_buf();
    config.project.source_dir = PathBuf::from("rtl");
    config.project.rtl_flist = PathBuf::from(REVIEW_FLIST);
    config.project.verify_rtl_flist = Some(PathBuf::from(VERIFY_FLIST));
    config.project.tb_flist = PathBuf::from(TB_FLIST);
    config.project.top_module = DUT_MODULE.to_string();
    config.project.tb_top = tb_top.to_string();
    config
}

/// Copy `src` to `dest` if it exists.
fn keep_artifact(src: &Path, dest: PathBuf) -> Result<Option<PathBuf>> {
    if !src.exists() {
        return Ok(None);
    }
    fs::copy(src, &dest)
        .with_context(|| format!("copy {} to {}", src.display(), dest.display()))?;
    Ok(Some(dest))
}

/// Stage, run and collect one case.
pub fn run_case<G: Generator, R: Reviewer, V: Verifier>(
    case: &BatchCase,
    base: &FlowConfig,
    layout: &BatchLayout,
    generator: &G,
    reviewer: &R,
    verifier: &V,
) -> Result<CaseResult> {
    let spec = fs::read_to_string(&case.prompt)
        .with_context(|| format!("read prompt {}", case.prompt.display()))?;
    let config = case_config(base, &layout.project_root, &layout.tb_top);
    prepare_case(case, &config)?;
    fs::create_dir_all(&layout.results_root)
        .with_context(|| format!("create directory {}", layout.results_root.display()))?;

    let report = run_flow(&config, &spec, generator, reviewer, verifier)?;

    let results = &layout.results_root;
    let dut = keep_artifact(
        &config.project.root.join(DUT_FILE),
        results.join(format!("{}.v", case.name)),
    )?;
    let paths = RunPaths::new(&config.out_dir());
    keep_artifact(&paths.generate_raw(), results.join(format!("{}.raw.json", case.name)))?;
    keep_artifact(&paths.generate_notes(), results.join(format!("{}.notes.txt", case.name)))?;

    info!(case = %case.name, status = ?report.status, reason = %report.reason, "case finished");
    Ok(CaseResult::finished(&case.name, &report, dut))
}

/// Run every case in order. A case that fails to stage or run is recorded
/// with its error and does not stop the batch.
pub fn run_batch<G: Generator, R: Reviewer, V: Verifier, F: FnMut(usize, usize, &CaseResult)>(
    cases: &[String],
    base: &FlowConfig,
    layout: &BatchLayout,
    generator: &G,
    reviewer: &R,
    verifier: &V,
    mut on_case: F,
) -> Vec<CaseResult> {
    let mut results = Vec::with_capacity(cases.len());
    for (idx, name) in cases.iter().enumerate() {
        let outcome = resolve_case_files(&layout.dataset_root, name)
            .and_then(|case| run_case(&case, base, layout, generator, reviewer, verifier));
        let result = outcome.unwrap_or_else(|err| {
            warn!(case = %name, err = %format!("{err:#}"), "case failed");
            CaseResult::errored(name, &err)
        });
        on_case(idx + 1, cases.len(), &result);
        results.push(result);
    }
    results
}
