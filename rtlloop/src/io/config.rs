//! Flow configuration stored in `rtlloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::attempts::DEFAULT_MAX_FAIL_ATTEMPTS;
use crate::core::paths::PathPolicy;

pub const CONFIG_FILE_NAME: &str = "rtlloop.toml";

/// Flow configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to the defaults
/// below, which mirror a small iverilog-based project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    /// Round ceiling: the run aborts once the round counter exceeds this.
    pub max_rounds: u32,

    /// Attempt ceiling: consecutive failures of one gated stage before abort.
    pub max_fail_attempts: u32,

    /// Lines of source shown before and after a located issue.
    pub context_radius_lines: usize,

    /// Skip Verify unless the last Review passed.
    pub require_review_passed: bool,

    pub project: ProjectConfig,
    pub generate: GenerateConfig,
    pub review: ReviewConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root; generated paths are relative to it and may not leave it.
    pub root: PathBuf,
    /// Directory scanned for existing sources before the first generation.
    pub source_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    /// RTL file list used by Review (and by Verify unless overridden).
    pub rtl_flist: PathBuf,
    /// RTL file list for Verify when it differs (e.g. includes a reference model).
    pub verify_rtl_flist: Option<PathBuf>,
    pub tb_flist: PathBuf,
    pub top_module: String,
    pub tb_top: String,
    /// Artifact directory, relative to `root`.
    pub out_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            source_dir: PathBuf::from("rtl"),
            allowed_extensions: vec![".v".to_string(), ".sv".to_string()],
            rtl_flist: PathBuf::from("rtl.f"),
            verify_rtl_flist: None,
            tb_flist: PathBuf::from("tb.f"),
            top_module: "top".to_string(),
            tb_top: "tb_top".to_string(),
            out_dir: PathBuf::from("build"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerateConfig {
    /// Generator command; receives the prompt on stdin and prints JSON.
    pub command: Vec<String>,
    /// Require the whole response to be JSON (otherwise the first `{...}` block is used).
    pub strict_json: bool,
    pub forbid_testbench_edits: bool,
    /// Existing files whose contents are included in the prompt.
    pub max_context_files: usize,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            strict_json: true,
            forbid_testbench_edits: true,
            max_context_files: 32,
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Lint command. Placeholders: `{top}`, `{flist}`, `{report}`, `{workdir}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewConfig {
    pub command: Vec<String>,
    pub max_issues: usize,
    pub raw_tail_lines: usize,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "verilator".to_string(),
                "--lint-only".to_string(),
                "-Wall".to_string(),
                "--top-module".to_string(),
                "{top}".to_string(),
                "-f".to_string(),
                "{flist}".to_string(),
            ],
            max_issues: 200,
            raw_tail_lines: 120,
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Compile and run commands. Placeholders: `{tb_top}`, `{rtl_flist}`,
/// `{tb_flist}`, `{sim}`, `{workdir}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    pub compile_command: Vec<String>,
    pub run_command: Vec<String>,
    pub max_errors: usize,
    pub max_failed_cases: usize,
    pub raw_tail_lines: usize,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            compile_command: [
                "iverilog",
                "-g2012",
                "-Wall",
                "-o",
                "{sim}",
                "-s",
                "{tb_top}",
                "-f",
                "{rtl_flist}",
                "-f",
                "{tb_flist}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            run_command: vec!["vvp".to_string(), "{sim}".to_string()],
            max_errors: 200,
            max_failed_cases: 200,
            raw_tail_lines: 200,
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_fail_attempts: DEFAULT_MAX_FAIL_ATTEMPTS,
            context_radius_lines: 2,
            require_review_passed: true,
            project: ProjectConfig::default(),
            generate: GenerateConfig::default(),
            review: ReviewConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

fn require_command(name: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

impl FlowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.max_fail_attempts == 0 {
            return Err(anyhow!("max_fail_attempts must be > 0"));
        }
        if self.project.allowed_extensions.is_empty() {
            return Err(anyhow!("project.allowed_extensions must not be empty"));
        }
        if let Some(bad) = self
            .project
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(anyhow!(
                "project.allowed_extensions entries must look like '.v' (got '{bad}')"
            ));
        }
        if self.project.top_module.trim().is_empty() || self.project.tb_top.trim().is_empty() {
            return Err(anyhow!("project.top_module and project.tb_top must be set"));
        }
        require_command("generate.command", &self.generate.command)?;
        require_command("review.command", &self.review.command)?;
        require_command("verify.compile_command", &self.verify.compile_command)?;
        require_command("verify.run_command", &self.verify.run_command)?;
        if self.review.max_issues == 0
            || self.verify.max_errors == 0
            || self.verify.max_failed_cases == 0
        {
            return Err(anyhow!("finding limits must be > 0"));
        }
        if self.review.raw_tail_lines == 0 || self.verify.raw_tail_lines == 0 {
            return Err(anyhow!("raw_tail_lines must be > 0"));
        }
        for (name, secs, limit) in [
            (
                "generate",
                self.generate.timeout_secs,
                self.generate.output_limit_bytes,
            ),
            (
                "review",
                self.review.timeout_secs,
                self.review.output_limit_bytes,
            ),
            (
                "verify",
                self.verify.timeout_secs,
                self.verify.output_limit_bytes,
            ),
        ] {
            if secs == 0 {
                return Err(anyhow!("{name}.timeout_secs must be > 0"));
            }
            if limit == 0 {
                return Err(anyhow!("{name}.output_limit_bytes must be > 0"));
            }
        }
        Ok(())
    }

    /// Path policy applied to generated files.
    pub fn path_policy(&self) -> PathPolicy {
        PathPolicy {
            allowed_extensions: self.project.allowed_extensions.clone(),
            forbid_testbench_edits: self.generate.forbid_testbench_edits,
        }
    }

    /// Resolve `path` against the project root unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project.root.join(path)
        }
    }

    pub fn out_dir(&self) -> PathBuf {
        self.resolve(&self.project.out_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FlowConfig::default()`.
pub fn load_config(path: &Path) -> Result<FlowConfig> {
    if !path.exists() {
        let cfg = FlowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FlowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FlowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
