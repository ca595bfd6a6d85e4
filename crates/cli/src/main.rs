mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use lathe_lib::consts::APP_NAME;
use lathe_lib::session::SessionOptions;

use cmd::{Invocation, cmd_build, cmd_list, cmd_watch, locate_buildfile};

/// lathe - Incremental build orchestrator
#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Configurations (or aliases) to build
  configs: Vec<String>,

  /// Ignore build logs and run every command
  #[arg(short = 'B', long)]
  rebuild: bool,

  /// Change to this directory before doing anything
  #[arg(short = 'C', long, value_name = "DIR")]
  directory: Option<PathBuf>,

  /// Buildfile to read instead of searching for buildfile.json
  #[arg(short, long, value_name = "FILE")]
  file: Option<PathBuf>,

  /// Number of commands to run at once (default: twice the number of CPUs)
  #[arg(short, long, value_name = "N")]
  jobs: Option<usize>,

  /// Report every directory created and every command finished
  #[arg(short, long)]
  verbose: bool,

  /// Rebuild whenever a source or the buildfile changes
  #[arg(short, long)]
  watch: bool,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Some(dir) = &cli.directory {
    std::env::set_current_dir(dir).with_context(|| format!("Failed to change to directory {}", dir.display()))?;
  }
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let buildfile = locate_buildfile(&cwd, cli.file.as_deref())?;
  let buildfile = dunce::canonicalize(&buildfile).with_context(|| format!("Failed to resolve {}", buildfile.display()))?;

  if cli.configs.is_empty() {
    println!("{}", Cli::command().render_usage());
    cmd_list(&buildfile)?;
    return Ok(ExitCode::FAILURE);
  }

  let invocation = Invocation {
    buildfile,
    configs: cli.configs,
    options: SessionOptions {
      rebuild: cli.rebuild,
      verbose: cli.verbose,
      ..SessionOptions::from_env()
    },
    jobs: cli.jobs.unwrap_or_else(default_jobs),
    root: cwd,
  };

  if cli.watch {
    cmd_watch(&invocation)?;
    return Ok(ExitCode::SUCCESS);
  }

  if cmd_build(&invocation)? {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::FAILURE)
  }
}

fn default_jobs() -> usize {
  std::thread::available_parallelism().map_or(1, |n| n.get()) * 2
}
