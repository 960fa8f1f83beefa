//! `rtlloop`: drive an RTL generate/review/verify loop from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use rtlloop::batch::{BatchLayout, PROBLEMS_FILE_NAME, read_problems, run_batch};
use rtlloop::exit_codes;
use rtlloop::io::config::{CONFIG_FILE_NAME, FlowConfig, load_config, write_config};
use rtlloop::io::generator::CommandGenerator;
use rtlloop::io::process::Limits;
use rtlloop::io::reviewer::CommandReviewer;
use rtlloop::io::verifier::CommandVerifier;
use rtlloop::normalize::compile::parse_compile_errors;
use rtlloop::normalize::report::normalize_review;
use rtlloop::normalize::sim::parse_failed_cases;
use rtlloop::orchestrator::run_flow;

#[derive(Parser)]
#[command(
    name = "rtlloop",
    version,
    about = "Generate, lint and simulate RTL until it passes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full loop for a natural-language spec and print the run report.
    Run {
        /// Specification file handed to the generator.
        #[arg(long)]
        spec: PathBuf,
        /// Config file (defaults to `<root>/rtlloop.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Run every case of a dataset and print a per-case summary.
    Batch {
        /// Directory with `problems.txt` and the per-case prompt/ref/test files.
        #[arg(long)]
        dataset_root: PathBuf,
        /// Case list (defaults to `<dataset-root>/problems.txt`).
        #[arg(long)]
        problems: Option<PathBuf>,
        /// Working project, overwritten for every case.
        #[arg(long)]
        project_root: PathBuf,
        /// Where the final design, raw output and notes of each case go.
        #[arg(long)]
        results_root: PathBuf,
        /// Testbench top module.
        #[arg(long, default_value = "tb")]
        tb_top: String,
        /// Base config for tools and limits (project paths are overridden).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a default `rtlloop.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Normalize a tool log and print the records as JSON.
    Normalize {
        kind: LogKind,
        log: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogKind {
    /// Lint output (structured report lines or raw chatter).
    Review,
    /// Compiler output.
    Compile,
    /// Simulation output.
    Sim,
}

fn main() {
    rtlloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { spec, config, root } => cmd_run(&spec, config.as_deref(), &root),
        Command::Batch {
            dataset_root,
            problems,
            project_root,
            results_root,
            tb_top,
            config,
        } => {
            let problems = problems.unwrap_or_else(|| dataset_root.join(PROBLEMS_FILE_NAME));
            let layout = BatchLayout {
                dataset_root,
                project_root,
                results_root,
                tb_top,
            };
            cmd_batch(&layout, &problems, config.as_deref())
        }
        Command::Init { force, root } => cmd_init(&root, force),
        Command::Normalize { kind, log } => cmd_normalize(kind, &log),
    }
}

fn load_project_config(config_path: Option<&Path>, root: &Path) -> Result<FlowConfig> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    let mut config = load_config(&path)?;
    config.project.root = root.join(&config.project.root);
    Ok(config)
}

fn collaborators(config: &FlowConfig) -> (CommandGenerator, CommandReviewer, CommandVerifier) {
    let generator = CommandGenerator {
        argv: config.generate.command.clone(),
        workdir: config.project.root.clone(),
        limits: Limits::new(
            config.generate.timeout_secs,
            config.generate.output_limit_bytes,
        ),
        strict_json: config.generate.strict_json,
    };
    let reviewer = CommandReviewer {
        argv: config.review.command.clone(),
        limits: Limits::new(config.review.timeout_secs, config.review.output_limit_bytes),
    };
    let verifier = CommandVerifier {
        compile_argv: config.verify.compile_command.clone(),
        run_argv: config.verify.run_command.clone(),
        limits: Limits::new(config.verify.timeout_secs, config.verify.output_limit_bytes),
    };
    (generator, reviewer, verifier)
}

fn cmd_run(spec_path: &Path, config_path: Option<&Path>, root: &Path) -> Result<i32> {
    let spec = fs::read_to_string(spec_path)
        .with_context(|| format!("read spec {}", spec_path.display()))?;
    if spec.trim().is_empty() {
        bail!("spec {} is empty", spec_path.display());
    }
    let config = load_project_config(config_path, root)?;
    let (generator, reviewer, verifier) = collaborators(&config);

    let report = run_flow(&config, &spec, &generator, &reviewer, &verifier)?;
    print_json(&report)?;
    Ok(exit_codes::for_status(report.status))
}

fn cmd_batch(layout: &BatchLayout, problems: &Path, config_path: Option<&Path>) -> Result<i32> {
    let cases = read_problems(problems)?;
    let mut base = match config_path {
        Some(path) => load_config(path)?,
        None => FlowConfig::default(),
    };
    base.project.root = layout.project_root.clone();
    let (generator, reviewer, verifier) = collaborators(&base);

    let results = run_batch(&cases, &base, layout, &generator, &reviewer, &verifier, |idx, total, result| {
        let outcome = match (&result.reason, &result.error) {
            (Some(reason), _) => reason.to_string(),
            (None, Some(err)) => format!("error: {err}"),
            (None, None) => "unknown".to_string(),
        };
        eprintln!("[{idx}/{total}] {}: {outcome}", result.case);
    });
    print_json(&results)?;
    Ok(exit_codes::OK)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &FlowConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_normalize(kind: LogKind, log_path: &Path) -> Result<i32> {
    let bytes = fs::read(log_path).with_context(|| format!("read {}", log_path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    match kind {
        LogKind::Review => print_json(&normalize_review(&[&*text], &text))?,
        LogKind::Compile => print_json(&parse_compile_errors(&text))?,
        LogKind::Sim => print_json(&parse_failed_cases(&text))?,
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
