//! pipewright CLI entry point.
//!
//! Usage:
//!   pipewright count <command...>          # command | CountLines
//!   pipewright capture <command...>        # command | CaptureText
//!   pipewright lines <command...>          # command | CaptureLines
//!   pipewright mounts [--command-layout]   # mount table | MountFilter
//!   pipewright pipe <cmd> -- <cmd> ...     # external stages only

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use pipewright_kernel::filters::{CaptureLines, CaptureText, CountLines, MountFilter, MountLayout};
use pipewright_kernel::{Chain, EngineConfig, Stage};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();
    let rest = args.get(2..).unwrap_or_default();

    match args.get(1).map(|s| s.as_str()) {
        None | Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("pipewright {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("count") => run_count(rest),
        Some("capture") => run_capture(rest),
        Some("lines") => run_lines(rest),
        Some("mounts") => run_mounts(rest),
        Some("pipe") => run_pipe(rest),

        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'pipewright --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"pipewright v{}

Usage:
  pipewright count <command...>          Count the lines a command prints
  pipewright capture <command...>        Capture a command's output and echo it
  pipewright lines <command...>          Capture a command's output line by line
  pipewright mounts [--command-layout]   List mounted block and network filesystems
  pipewright pipe <cmd> -- <cmd> ...     Run shell commands as one pipeline

Options:
  -h, --help                             Show this help
  -V, --version                          Show version

Configuration is read from the platform config dir (pipewright/engine.toml).
Set RUST_LOG=pipewright_kernel=debug to trace stage startup and exit.

Examples:
  pipewright count ls /etc
  pipewright capture 'uname -a'
  pipewright mounts --command-layout
  pipewright pipe 'seq 100' -- 'grep 7' -- 'wc -l'
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Run `chain` on a fresh runtime with the loaded config; return its status.
fn execute(chain: Chain) -> Result<(Chain, i32)> {
    let config = EngineConfig::load().context("Failed to load engine config")?;
    let mut chain = chain.with_config(config);
    let pipeline = chain.to_string();

    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let status = rt
        .block_on(chain.execute())
        .with_context(|| format!("Pipeline failed: {pipeline}"))?
        .exit_status()
        .unwrap_or(0);
    Ok((chain, status))
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}

fn command_stage(args: &[String], what: &str) -> Result<Stage> {
    if args.is_empty() {
        bail!("{what} requires a command");
    }
    Ok(Stage::cmd(args))
}

fn run_count(args: &[String]) -> Result<ExitCode> {
    let chain = command_stage(args, "count")? | Stage::filter(CountLines::default());
    // CountLines is last, so it prints its own count.
    let (_, status) = execute(chain)?;
    Ok(exit_code(status))
}

fn run_capture(args: &[String]) -> Result<ExitCode> {
    let chain = command_stage(args, "capture")? | Stage::filter(CaptureText::default());
    let (chain, status) = execute(chain)?;

    let text = chain
        .filter::<CaptureText>()
        .map(|c| c.text())
        .unwrap_or_default();
    println!("captured {} bytes", text.len());
    print!("{text}");
    Ok(exit_code(status))
}

fn run_lines(args: &[String]) -> Result<ExitCode> {
    let chain = command_stage(args, "lines")? | Stage::lines(CaptureLines::default());
    let (chain, status) = execute(chain)?;

    if let Some(capture) = chain.filter::<CaptureLines>() {
        for (i, line) in capture.lines().iter().enumerate() {
            println!("{:>6}  {}", i + 1, line.trim_end_matches(['\n', '\r']));
        }
    }
    Ok(exit_code(status))
}

fn run_mounts(args: &[String]) -> Result<ExitCode> {
    let (source, layout) = match args.first().map(|s| s.as_str()) {
        None => ("cat /proc/mounts", MountLayout::Table),
        Some("--command-layout") => ("mount", MountLayout::Command),
        Some(other) => bail!("mounts: unknown option {other}"),
    };

    let chain = Stage::sh(source)
        | Stage::lines(MountFilter::new(layout))
        | Stage::filter(CaptureText::default());
    let (chain, status) = execute(chain)?;

    if let Some(filter) = chain.find::<MountFilter>() {
        for mount in filter.mounts() {
            println!(
                "{:<24} {:<24} {:<8} {}",
                mount.device, mount.mountpoint, mount.fs_type, mount.options
            );
        }
    }
    Ok(exit_code(status))
}

fn run_pipe(args: &[String]) -> Result<ExitCode> {
    let mut segments = args.split(|a| a == "--").filter(|s| !s.is_empty());
    let first = segments.next().context("pipe requires at least one command")?;

    let chain = segments.fold(Chain::from(Stage::cmd(first)), |chain, seg| {
        chain | Stage::cmd(seg)
    });
    tracing::debug!(pipeline = %chain, "running pipe");

    let (_, status) = execute(chain)?;
    Ok(exit_code(status))
}
