//! Implementation of a plain `lathe <CONFIG>...` run.
//!
//! Every requested configuration is built by its own session, one after the
//! other. A failing session does not stop the ones after it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use lathe_lib::buildfile::Buildfile;
use lathe_lib::config::{find_config, host_architecture, host_platform};
use lathe_lib::consts::{BUILD_DIR, DEFAULT_BUILDFILE};
use lathe_lib::session::{BuildSession, SessionError, SessionOptions};

use crate::output;

/// Everything one run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub buildfile: PathBuf,
  pub configs: Vec<String>,
  pub options: SessionOptions,
  pub jobs: usize,
  /// Directory diagnostics are shown relative to.
  pub root: PathBuf,
}

/// Result of building every requested configuration once.
#[derive(Debug, Default)]
pub struct BuildSummary {
  pub errors: usize,
  pub watch_paths: Vec<PathBuf>,
}

impl Invocation {
  /// Directory holding every configuration's outputs.
  pub fn build_dir(&self) -> PathBuf {
    self
      .buildfile
      .parent()
      .map(|dir| dir.join(BUILD_DIR))
      .unwrap_or_else(|| PathBuf::from(BUILD_DIR))
  }

  /// Load the buildfile and build every requested configuration.
  ///
  /// The buildfile is read again on every call so edits are picked up in watch mode.
  pub async fn run(&self) -> Result<BuildSummary> {
    let buildfile = Buildfile::load(&self.buildfile)
      .with_context(|| format!("Failed to load {}", self.buildfile.display()))?;

    let mut summary = BuildSummary::default();
    for name in &self.configs {
      let (target, config) = find_config(&buildfile.targets, name, &buildfile.context)?;
      let mut session = BuildSession::new(target, &config, self.options.clone())
        .with_context(|| format!("Failed to prepare {}", config.name))?;

      output::print_header(&config.name);
      let started = Instant::now();
      let result = session
        .start(|progress| output::print_progress(&progress), self.jobs)
        .await;

      for diagnostic in session.diagnostics() {
        output::print_diagnostic(diagnostic, session.root(), &self.root);
      }
      for error in session.errors() {
        if !matches!(error, SessionError::Diagnostic(_)) {
          output::print_error(&error.to_string());
        }
      }

      match result {
        Ok(()) => info!(config = %config.name, elapsed = %output::format_duration(started.elapsed()), "built"),
        Err(failed) => summary.errors += failed.errors,
      }
      summary.watch_paths.extend(session.watch_paths());
    }

    summary.watch_paths.sort();
    summary.watch_paths.dedup();
    Ok(summary)
  }
}

/// Find the buildfile to load.
///
/// An explicit `file` is resolved against `cwd`. Otherwise `buildfile.json` is
/// searched for in `cwd` and then in each of its parents.
pub fn locate_buildfile(cwd: &Path, file: Option<&Path>) -> Result<PathBuf> {
  if let Some(file) = file {
    let path = cwd.join(file);
    if !path.is_file() {
      bail!("Buildfile not found: {}", path.display());
    }
    return Ok(path);
  }

  let found = cwd
    .ancestors()
    .map(|dir| dir.join(DEFAULT_BUILDFILE))
    .find(|candidate| candidate.is_file())
    .with_context(|| format!("No {} in {} or any parent directory", DEFAULT_BUILDFILE, cwd.display()))?;
  debug!(path = %found.display(), "found buildfile");
  Ok(found)
}

/// Build every configuration once.
///
/// Returns `true` if no session reported errors.
pub fn cmd_build(invocation: &Invocation) -> Result<bool> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(invocation.run())?;

  output::print_success("DONE");
  if summary.errors > 0 {
    output::print_error(&format!("{} error(s)", summary.errors));
  }
  Ok(summary.errors == 0)
}

/// Print every configuration the buildfile can build.
pub fn cmd_list(buildfile: &Path) -> Result<()> {
  let buildfile = Buildfile::load(buildfile).with_context(|| format!("Failed to load {}", buildfile.display()))?;

  if let (Some(platform), Some(architecture)) = (host_platform(), host_architecture()) {
    println!();
    println!("Host: {}.{}", platform, architecture);
  }

  println!();
  println!("Configurations:");
  for line in output::format_config_list(&buildfile.config_names()) {
    println!("  {}", line);
  }
  Ok(())
}
