//! Bounded child-process execution for the external tools.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Time and output bounds for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Limits {
    pub fn new(timeout_secs: u64, output_limit_bytes: usize) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            output_limit_bytes,
        }
    }
}

/// Captured tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal or the timeout.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout then stderr, with truncation and timeout notices appended.
    pub fn combined_log(&self) -> String {
        let mut log = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !log.is_empty() && !log.ends_with('\n') {
                log.push('\n');
            }
            log.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stdout_truncated > 0 {
            log.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            log.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            log.push_str("\n[command timed out]\n");
        }
        log
    }
}

/// Build a `Command` from an argv vector, running in `cwd`.
pub fn build_command(argv: &[String], cwd: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must be a non-empty array"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd);
    Ok(cmd)
}

/// Replace `{name}` placeholders in every argument.
pub fn expand_placeholders(argv: &[String], values: &[(&str, String)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            values.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

/// Run `argv` with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is drained concurrently while the child runs; bytes beyond
/// `output_limit_bytes` are counted and discarded.
#[instrument(skip_all, fields(program = program_name(argv), timeout_secs = limits.timeout.as_secs()))]
pub fn run_tool(argv: &[String], cwd: &Path, stdin: Option<&[u8]>, limits: Limits) -> Result<ToolOutput> {
    let mut cmd = build_command(argv, cwd)?;
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!(cwd = %cwd.display(), "spawning tool");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn tool");
            return Err(err).with_context(|| format!("spawn {}", program_name(argv)));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = limits.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_limited(stderr, limit));

    // Fed from its own thread so a tool that never reads cannot stall the timeout.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || {
                // Dropping the handle at the end closes the pipe.
                if let Err(err) = child_stdin.write_all(&input) {
                    warn!(err = %err, "tool closed stdin before reading the full input");
                }
            }))
        }
        None => None,
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(limits.timeout).context("wait for tool")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = limits.timeout.as_secs(), "tool timed out, killing");
            timed_out = true;
            child.kill().context("kill tool")?;
            child.wait().context("wait tool after kill")?
        }
    };

    if let Some(handle) = stdin_handle
        && handle.join().is_err()
    {
        warn!("stdin writer thread panicked");
    }
    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "tool output truncated");
    }

    let exit_code = if timed_out { None } else { status.code() };
    debug!(?exit_code, timed_out, "tool finished");
    Ok(ToolOutput {
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// First argv element, for log and error messages.
pub fn program_name(argv: &[String]) -> &str {
    argv.first().map(String::as_str).unwrap_or("<empty>")
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }
    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_exit_code_and_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = run_tool(
            &sh("echo out; echo err 1>&2; exit 3"),
            temp.path(),
            None,
            Limits::new(10, 1024),
        )
        .expect("run");
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.combined_log(), "out\nerr\n");
        assert!(!out.timed_out);
    }

    #[test]
    fn stdin_is_forwarded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = run_tool(&sh("cat"), temp.path(), Some(b"prompt"), Limits::new(10, 1024))
            .expect("run");
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout_text(), "prompt");
    }

    #[test]
    fn output_beyond_limit_is_truncated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = run_tool(&sh("printf 0123456789"), temp.path(), None, Limits::new(10, 4))
            .expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
        assert!(out.combined_log().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn timeout_kills_and_reports_no_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = Limits {
            timeout: Duration::from_millis(200),
            output_limit_bytes: 1024,
        };
        let out = run_tool(&sh("exec sleep 5"), temp.path(), None, limits).expect("run");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(out.combined_log().contains("timed out"));
    }

    #[test]
    fn unread_stdin_does_not_outlive_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = Limits {
            timeout: Duration::from_millis(200),
            output_limit_bytes: 1024,
        };
        // Far larger than any pipe buffer; the tool never reads it.
        let prompt = vec![b'x'; 4 * 1024 * 1024];
        let started = std::time::Instant::now();
        let out = run_tool(&sh("exec sleep 5"), temp.path(), Some(&prompt), limits).expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn placeholders_expand_inside_arguments() {
        let argv = vec![
            "lint".to_string(),
            "--top={top}".to_string(),
            "-f".to_string(),
            "{flist}".to_string(),
            "{unknown}".to_string(),
        ];
        let expanded = expand_placeholders(
            &argv,
            &[("top", "alu".to_string()), ("flist", "build/review.f".to_string())],
        );
        assert_eq!(expanded, ["lint", "--top=alu", "-f", "build/review.f", "{unknown}"]);
    }

    #[test]
    fn missing_program_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["definitely-not-a-real-tool-xyz".to_string()];
        assert!(run_tool(&argv, temp.path(), None, Limits::new(1, 16)).is_err());
        assert!(build_command(&[], temp.path()).is_err());
        assert!(run_tool(&[], temp.path(), None, Limits::new(1, 16)).is_err());
        assert_eq!(program_name(&[]), "<empty>");
    }
}
