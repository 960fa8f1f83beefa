//! Verify collaborator: compile the design with its testbench, then simulate.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::errors::FlowError;
use crate::io::process::{Limits, expand_placeholders, program_name, run_tool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub rtl_files: Vec<PathBuf>,
    pub tb_files: Vec<PathBuf>,
    pub tb_top: String,
    pub rtl_flist_path: PathBuf,
    pub tb_flist_path: PathBuf,
    pub workdir: PathBuf,
    /// Directory for the compiled simulation image and phase logs.
    pub out_dir: PathBuf,
}

/// Exit code and combined log of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutput {
    pub exit_code: Option<i32>,
    pub log: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOutput {
    pub compile: PhaseOutput,
    /// `None` when compilation did not succeed.
    pub run: Option<PhaseOutput>,
}

pub trait Verifier {
    fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutput>;
}

/// Verifier backed by configured compile and run commands.
///
/// Placeholders: `{tb_top}`, `{rtl_flist}`, `{tb_flist}`, `{sim}`, `{workdir}`.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    pub compile_argv: Vec<String>,
    pub run_argv: Vec<String>,
    pub limits: Limits,
}

impl CommandVerifier {
    fn phase(&self, argv: &[String], request: &VerifyRequest, label: &str) -> Result<PhaseOutput> {
        let sim = request.out_dir.join("sim.out");
        let argv = expand_placeholders(
            argv,
            &[
                ("tb_top", request.tb_top.clone()),
                ("rtl_flist", request.rtl_flist_path.display().to_string()),
                ("tb_flist", request.tb_flist_path.display().to_string()),
                ("sim", sim.display().to_string()),
                ("workdir", request.workdir.display().to_string()),
            ],
        );
        info!(phase = label, program = program_name(&argv), "starting verify phase");
        let output = run_tool(&argv, &request.workdir, None, self.limits)
            .map_err(|err| FlowError::tool(format!("{label}: {err:#}")))?;
        debug!(phase = label, exit_code = ?output.exit_code, "verify phase finished");
        Ok(PhaseOutput {
            exit_code: output.exit_code,
            log: output.combined_log(),
        })
    }
}

impl Verifier for CommandVerifier {
    #[instrument(skip_all, fields(tb_top = %request.tb_top))]
    fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutput> {
        fs::create_dir_all(&request.out_dir)
            .with_context(|| format!("create directory {}", request.out_dir.display()))?;
        let compile = self.phase(&self.compile_argv, request, "compile")?;
        if compile.exit_code != Some(0) {
            return Ok(VerifyOutput { compile, run: None });
        }
        let run = self.phase(&self.run_argv, request, "simulate")?;
        Ok(VerifyOutput {
            compile,
            run: Some(run),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(root: &std::path::Path) -> VerifyRequest {
        VerifyRequest {
            rtl_files: vec![PathBuf::from("rtl/top.v")],
            tb_files: vec![PathBuf::from("tb/tb_top.v")],
            tb_top: "tb_top".to_string(),
            rtl_flist_path: root.join("rtl.f"),
            tb_flist_path: root.join("tb.f"),
            workdir: root.to_path_buf(),
            out_dir: root.join("build/verify"),
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn run_phase_follows_successful_compile() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verifier = CommandVerifier {
            compile_argv: sh("echo compiled {tb_top} > {sim}"),
            run_argv: sh("cat {sim}; echo 'Mismatches: 0 in 4 samples'"),
            limits: Limits::new(10, 4096),
        };
        let output = verifier.verify(&request(temp.path())).expect("verify");
        assert_eq!(output.compile.exit_code, Some(0));
        let run = output.run.expect("run phase");
        assert_eq!(run.exit_code, Some(0));
        assert!(run.log.contains("compiled tb_top"));
        assert!(run.log.contains("Mismatches: 0"));
    }

    #[test]
    fn failed_compile_skips_run_phase() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verifier = CommandVerifier {
            compile_argv: sh("echo 'rtl/top.v:3: syntax error' 1>&2; exit 2"),
            run_argv: sh("echo should not run"),
            limits: Limits::new(10, 4096),
        };
        let output = verifier.verify(&request(temp.path())).expect("verify");
        assert_eq!(output.compile.exit_code, Some(2));
        assert!(output.compile.log.contains("syntax error"));
        assert!(output.run.is_none());
    }

    #[test]
    fn empty_compile_command_is_tool_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verifier = CommandVerifier {
            compile_argv: Vec::new(),
            run_argv: sh("echo unused"),
            limits: Limits::new(10, 4096),
        };
        let err = verifier.verify(&request(temp.path())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ToolInvocation(_))
        ));
    }
}
