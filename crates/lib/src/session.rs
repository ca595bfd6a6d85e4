//! Build sessions: one incremental build of one configuration.
//!
//! A session owns all mutable build state (batches, source registry, the new
//! build log, diagnostics and errors). Only subprocesses run concurrently;
//! their results come back to the session through the [`Scheduler`] and are
//! applied one at a time.
//!
//! # Sequence
//!
//! 1. Drop tasks made redundant by the previous build log (unless rebuilding)
//! 2. Create missing output directories
//! 3. Run the batches, deepest first, feeding each result through its digest
//! 4. Verify no source changed while the session ran
//! 5. Persist the new build log
//!
//! Steps 4 and 5 run even if step 2 or 3 failed.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::build::{Batch, BuildLog, BuildLogError, ProductionGraph, ProductionSpec, Task, prune_redundant_tasks};
use crate::config::{BuildConfig, BuildTarget, ConfigError};
use crate::consts::SHELL_ENV;
use crate::digest::{Diagnostic, DigestOutput};
use crate::execute::{ExecuteError, run_command};
use crate::scheduler::{JobFuture, JobHandler, Scheduler, SchedulerError};
use crate::util::fs::ensure_dir;

/// Caller-controlled behavior of a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
  /// Ignore the previous build log and run every task.
  pub rebuild: bool,
  /// Report directory creation and task completion through the progress callback.
  pub verbose: bool,
  /// Shell used to run commands instead of the platform default.
  pub shell: Option<String>,
}

impl SessionOptions {
  /// Default options, taking the shell from `LATHE_SHELL` when set.
  pub fn from_env() -> Self {
    Self {
      shell: std::env::var(SHELL_ENV).ok().filter(|shell| !shell.is_empty()),
      ..Self::default()
    }
  }
}

/// One progress report: `description` at `step` of `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
  pub description: String,
  pub step: usize,
  pub total: usize,
}

impl Progress {
  fn new(description: impl Into<String>, step: usize, total: usize) -> Self {
    Self {
      description: description.into(),
      step,
      total,
    }
  }
}

/// An entry in a session's error list.
#[derive(Debug, Error)]
pub enum SessionError {
  /// A digest reported an error-severity diagnostic.
  #[error("{0}")]
  Diagnostic(Diagnostic),

  /// A tracked source was modified while the session ran.
  #[error("source changed during build: {}", path.display())]
  Integrity { path: PathBuf },

  #[error(transparent)]
  BuildLog(#[from] BuildLogError),

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{source}")]
  Execute {
    command: String,
    #[source]
    source: ExecuteError,
  },

  #[error(transparent)]
  Scheduler(#[from] SchedulerError),
}

/// Returned by [`BuildSession::start`] when the error list is not empty.
#[derive(Debug, Error)]
#[error("{name} failed with {errors} error(s)")]
pub struct SessionFailed {
  pub name: String,
  pub errors: usize,
}

/// Stops the scheduler once the session's error list is non-empty.
#[derive(Debug)]
enum Halt {
  Failed,
  Scheduler(SchedulerError),
}

impl From<SchedulerError> for Halt {
  fn from(err: SchedulerError) -> Self {
    Halt::Scheduler(err)
  }
}

/// An incremental build of one production tree.
#[derive(Debug)]
pub struct BuildSession {
  name: String,
  origin: Option<PathBuf>,
  build_log_path: PathBuf,
  options: SessionOptions,
  graph: ProductionGraph,
  diagnostics: Vec<Diagnostic>,
  errors: Vec<SessionError>,
  executed: Vec<String>,
}

impl BuildSession {
  /// Prepare a session building `config` of `target`.
  ///
  /// The product is evaluated here, so configuration errors surface before
  /// anything runs.
  pub fn new(target: &BuildTarget, config: &BuildConfig, options: SessionOptions) -> Result<Self, ConfigError> {
    let spec = target.product(config)?.evaluate(config)?;
    let session = Self::from_spec(&config.name, &target.dirname, config.build_log_path(), &spec, options)
      .with_origin(&target.filename);
    Ok(session)
  }

  /// Prepare a session building `spec` in `root`.
  ///
  /// Commands run in `root`, and relative paths (including `build_log_path`)
  /// are resolved against it.
  pub fn from_spec(
    name: impl Into<String>,
    root: impl Into<PathBuf>,
    build_log_path: impl Into<PathBuf>,
    spec: &ProductionSpec,
    options: SessionOptions,
  ) -> Self {
    let name = name.into();
    let graph = ProductionGraph::build(root, spec);
    debug!(session = %name, tasks = graph.task_count(), "prepared session");

    Self {
      name,
      origin: None,
      build_log_path: build_log_path.into(),
      options,
      graph,
      diagnostics: Vec::new(),
      errors: Vec::new(),
      executed: Vec::new(),
    }
  }

  /// File the production tree was declared in; it is watched alongside the sources.
  pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn root(&self) -> &Path {
    self.graph.root()
  }

  /// Every diagnostic reported so far, tagged with its command.
  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn errors(&self) -> &[SessionError] {
    &self.errors
  }

  /// Commands that ran, in completion order.
  pub fn executed_commands(&self) -> &[String] {
    &self.executed
  }

  /// Tasks still scheduled to run.
  pub fn pending_tasks(&self) -> usize {
    self.graph.task_count()
  }

  /// Directories to watch for changes: the parent of every tracked source, plus the origin file.
  pub fn watch_paths(&self) -> Vec<PathBuf> {
    let mut paths: BTreeSet<PathBuf> = self
      .graph
      .sources()
      .iter()
      .filter_map(|(path, _)| self.graph.resolve(path).parent().map(Path::to_path_buf))
      .collect();
    if let Some(origin) = &self.origin {
      paths.insert(origin.clone());
    }
    paths.into_iter().collect()
  }

  /// Run the session.
  ///
  /// `on_progress` is called for every task started, and when verbose for
  /// every directory created and every task finished. At most `parallelism`
  /// commands run at once.
  ///
  /// # Errors
  ///
  /// [`SessionFailed`] if anything was added to [`BuildSession::errors`].
  pub async fn start<P>(&mut self, mut on_progress: P, parallelism: usize) -> Result<(), SessionFailed>
  where
    P: FnMut(Progress),
  {
    info!(session = %self.name, parallelism, "starting build session");

    self.discard_redundant_tasks();

    let verbose = self.options.verbose;
    let build_dirs: Vec<PathBuf> = self.graph.build_dirs().iter().cloned().collect();
    let steps = self.graph.task_count() + if verbose { build_dirs.len() } else { 0 };
    let mut step = 0;

    let scheduler = Scheduler::new(parallelism);

    let mut dirs = DirHandler {
      root: self.graph.root().to_path_buf(),
      verbose,
      steps,
      step: &mut step,
      progress: &mut on_progress,
      errors: &mut self.errors,
    };
    let created = scheduler.run([build_dirs], &mut dirs).await;
    self.record_halt(created);

    if self.errors.is_empty() {
      let batches = self.graph.take_batches();
      info!(session = %self.name, batches = batches.len(), tasks = self.graph.task_count(), "running batches");

      let mut tasks = TaskHandler {
        root: self.graph.root().to_path_buf(),
        shell: self.options.shell.clone(),
        verbose,
        steps,
        step: &mut step,
        progress: &mut on_progress,
        graph: &mut self.graph,
        diagnostics: &mut self.diagnostics,
        errors: &mut self.errors,
        executed: &mut self.executed,
      };
      let ran = scheduler.run(batches.into_iter().map(Batch::into_values), &mut tasks).await;
      self.record_halt(ran);
    }

    self.recheck_source_timestamps();
    self.write_build_log();

    if self.errors.is_empty() {
      info!(session = %self.name, executed = self.executed.len(), "build session complete");
      Ok(())
    } else {
      error!(session = %self.name, errors = self.errors.len(), "build session failed");
      Err(SessionFailed {
        name: self.name.clone(),
        errors: self.errors.len(),
      })
    }
  }

  fn record_halt(&mut self, result: Result<(), Halt>) {
    if let Err(Halt::Scheduler(err)) = result {
      error!(session = %self.name, error = %err, "scheduler stopped");
      self.errors.push(SessionError::Scheduler(err));
    }
  }

  fn build_log_location(&self) -> PathBuf {
    self.graph.resolve(&self.build_log_path)
  }

  fn discard_redundant_tasks(&mut self) {
    if self.options.rebuild {
      info!(session = %self.name, "rebuilding everything");
      return;
    }

    let path = self.build_log_location();
    match BuildLog::load(&path) {
      Ok(Some(prior)) => {
        prune_redundant_tasks(&prior, &mut self.graph);
      }
      Ok(None) => info!(session = %self.name, path = %path.display(), "no build log, building everything"),
      Err(e) => warn!(session = %self.name, error = %e, "ignoring unreadable build log, building everything"),
    }
  }

  fn recheck_source_timestamps(&mut self) {
    for path in self.graph.sources().changed() {
      error!(session = %self.name, path = %path.display(), "source changed during build");
      self.errors.push(SessionError::Integrity { path });
    }
  }

  fn write_build_log(&mut self) {
    self.graph.stamp_sources();
    let path = self.build_log_location();
    if let Err(e) = self.graph.build_log().save(&path) {
      error!(session = %self.name, error = %e, "failed to write build log");
      self.errors.push(e.into());
    }
  }
}

struct DirHandler<'a, P> {
  root: PathBuf,
  verbose: bool,
  steps: usize,
  step: &'a mut usize,
  progress: &'a mut P,
  errors: &'a mut Vec<SessionError>,
}

impl<P: FnMut(Progress)> JobHandler<PathBuf> for DirHandler<'_, P> {
  type Output = (PathBuf, io::Result<bool>);
  type Error = Halt;

  fn start(&mut self, dir: PathBuf) -> JobFuture<Self::Output> {
    let full = self.root.join(&dir);
    Box::pin(async move {
      let created = ensure_dir(&full).await;
      (dir, created)
    })
  }

  fn complete(&mut self, (dir, created): Self::Output) -> Result<(), Halt> {
    match created {
      Ok(true) => {
        debug!(dir = %dir.display(), "created output directory");
        if self.verbose {
          *self.step += 1;
          (self.progress)(Progress::new(format!("create {}", dir.display()), *self.step, self.steps));
        }
        Ok(())
      }
      Ok(false) => Ok(()),
      Err(source) => {
        error!(dir = %dir.display(), error = %source, "failed to create output directory");
        self.errors.push(SessionError::CreateDir { path: dir, source });
        Err(Halt::Failed)
      }
    }
  }
}

/// A task's result, handed back from its job.
struct Finished {
  task: Task,
  step: usize,
  outcome: Result<DigestOutput, ExecuteError>,
}

struct TaskHandler<'a, P> {
  root: PathBuf,
  shell: Option<String>,
  verbose: bool,
  steps: usize,
  step: &'a mut usize,
  progress: &'a mut P,
  graph: &'a mut ProductionGraph,
  diagnostics: &'a mut Vec<Diagnostic>,
  errors: &'a mut Vec<SessionError>,
  executed: &'a mut Vec<String>,
}

impl<P: FnMut(Progress)> JobHandler<Task> for TaskHandler<'_, P> {
  type Output = Finished;
  type Error = Halt;

  fn start(&mut self, task: Task) -> JobFuture<Finished> {
    *self.step += 1;
    let step = *self.step;
    (self.progress)(Progress::new(task.name.clone(), step, self.steps));

    let root = self.root.clone();
    let shell = self.shell.clone();
    Box::pin(async move {
      let outcome = run_command(&task.command, &root, shell.as_deref())
        .await
        .map(|output| task.digest.digest(&output.status, &output.stdout, &output.stderr));
      Finished { task, step, outcome }
    })
  }

  fn complete(&mut self, finished: Finished) -> Result<(), Halt> {
    let Finished { task, step, outcome } = finished;
    if self.verbose {
      (self.progress)(Progress::new(format!("DONE: {}", task.name), step, self.steps));
    }
    self.executed.push(task.command.clone());

    let digest = match outcome {
      Ok(digest) => digest,
      Err(source) => {
        error!(command = %task.command, error = %source, "failed to execute task");
        self.errors.push(SessionError::Execute {
          command: task.command,
          source,
        });
        return Err(Halt::Failed);
      }
    };

    for dependency in &digest.dependencies {
      self.graph.add_source(dependency, Some(&task.output));
    }
    debug!(
      command = %task.command,
      dependencies = digest.dependencies.len(),
      diagnostics = digest.diagnostics.len(),
      "task finished"
    );

    let mut failed = false;
    for mut diagnostic in digest.diagnostics {
      diagnostic.command = Some(task.command.clone());
      if diagnostic.is_error() {
        failed = true;
        self.errors.push(SessionError::Diagnostic(diagnostic.clone()));
      }
      self.diagnostics.push(diagnostic);
    }

    if failed { Err(Halt::Failed) } else { Ok(()) }
  }
}
