//! Bounded-concurrency execution over sequential groups of independent jobs.
//!
//! Groups run strictly one after another: group N+1 is not started until every
//! job of group N has completed. Inside a group at most `parallelism` jobs are
//! in flight; each completion immediately frees a slot for the next job.
//!
//! Jobs are split in two halves through [`JobHandler`]:
//! - `start` turns a job into a `'static` future that runs on the tokio runtime
//!   (typically a subprocess)
//! - `complete` consumes the future's output back on the calling task, so it may
//!   freely mutate state owned by the caller without locking
//!
//! A failed `complete` (or an external [`CancelFlag::cancel`]) stops new jobs
//! from being launched. Jobs already in flight are awaited and their outputs are
//! still handed to `complete`, then the first failure is returned. Running jobs
//! are never aborted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

/// Errors raised by the scheduler itself, as opposed to job failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
  /// A spawned job panicked or was aborted.
  #[error("job did not complete: {0}")]
  Join(#[from] JoinError),

  /// Execution was cancelled through the shared [`CancelFlag`].
  #[error("execution cancelled")]
  Cancelled,
}

/// Shared fail-fast flag.
///
/// Cloning yields a handle to the same flag, so a flag can be handed to another
/// task (e.g. a signal handler) to stop a running scheduler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// A job's future, spawned onto the runtime.
pub type JobFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The two halves of a job, see the module documentation.
pub trait JobHandler<J> {
  /// Value produced by a job's future.
  type Output: Send + 'static;

  /// Failure reported by `complete`.
  type Error: From<SchedulerError>;

  /// Launch a job. Called on the scheduler's task right before spawning.
  fn start(&mut self, job: J) -> JobFuture<Self::Output>;

  /// Consume a finished job's output. Returning an error triggers fail-fast.
  fn complete(&mut self, output: Self::Output) -> Result<(), Self::Error>;
}

/// Executes groups of jobs with bounded parallelism.
///
/// A scheduler carries one [`CancelFlag`]; once any job fails the flag stays set
/// and later calls to [`Scheduler::run`] return [`SchedulerError::Cancelled`]
/// immediately. Use one scheduler per build session.
#[derive(Debug, Clone)]
pub struct Scheduler {
  parallelism: usize,
  cancel: CancelFlag,
}

impl Scheduler {
  /// Create a scheduler running at most `parallelism` jobs at once (minimum 1).
  pub fn new(parallelism: usize) -> Self {
    Self {
      parallelism: parallelism.max(1),
      cancel: CancelFlag::new(),
    }
  }

  /// Share an existing cancellation flag instead of a private one.
  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn cancel_flag(&self) -> CancelFlag {
    self.cancel.clone()
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  /// Run every group in order.
  ///
  /// Returns the first failure reported by the handler, or
  /// [`SchedulerError::Cancelled`] if the flag was raised externally.
  pub async fn run<G, I, J, H>(&self, groups: G, handler: &mut H) -> Result<(), H::Error>
  where
    G: IntoIterator<Item = I>,
    I: IntoIterator<Item = J>,
    H: JobHandler<J>,
  {
    for (index, group) in groups.into_iter().enumerate() {
      if self.cancel.is_cancelled() {
        return Err(SchedulerError::Cancelled.into());
      }
      debug!(group = index, "starting group");
      self.run_group(group, handler).await?;
    }

    Ok(())
  }

  async fn run_group<I, J, H>(&self, group: I, handler: &mut H) -> Result<(), H::Error>
  where
    I: IntoIterator<Item = J>,
    H: JobHandler<J>,
  {
    let mut pending = group.into_iter();
    let mut in_flight = JoinSet::new();
    let mut failure: Option<H::Error> = None;

    loop {
      while !self.cancel.is_cancelled() && in_flight.len() < self.parallelism {
        let Some(job) = pending.next() else {
          break;
        };
        in_flight.spawn(handler.start(job));
      }

      let Some(joined) = in_flight.join_next().await else {
        break;
      };

      let outcome = match joined {
        Ok(output) => handler.complete(output),
        Err(e) => Err(SchedulerError::Join(e).into()),
      };

      if let Err(err) = outcome {
        self.cancel.cancel();
        if failure.is_none() {
          debug!(in_flight = in_flight.len(), "job failed, draining group");
          failure = Some(err);
        }
      }
    }

    match failure {
      Some(err) => Err(err),
      None if self.cancel.is_cancelled() => Err(SchedulerError::Cancelled.into()),
      None => Ok(()),
    }
  }
}
