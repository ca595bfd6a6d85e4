//! Implementation of `lathe --watch`.
//!
//! Builds once, then waits for a change under any session's watch paths and
//! builds again. Build failures are reported but never end the loop.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tracing::{debug, warn};

use super::build::Invocation;
use crate::output;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Build, then rebuild on every change, forever.
pub fn cmd_watch(invocation: &Invocation) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let build_dir = invocation.build_dir();
  let mut watch_paths = vec![invocation.buildfile.clone()];

  loop {
    match rt.block_on(invocation.run()) {
      Ok(summary) => {
        output::print_success("DONE");
        if summary.errors > 0 {
          output::print_error(&format!("{} error(s)", summary.errors));
        }
        watch_paths = summary.watch_paths;
        if !watch_paths.contains(&invocation.buildfile) {
          watch_paths.push(invocation.buildfile.clone());
        }
      }
      Err(err) => output::print_error(&format!("{:#}", err)),
    }

    wait_for_change(&watch_paths, &build_dir)?;
  }
}

/// Block until something in `paths` is created, modified or removed.
///
/// Events under `build_dir` are ignored, since every session writes there.
fn wait_for_change(paths: &[PathBuf], build_dir: &Path) -> Result<()> {
  let (tx, rx) = channel();
  let mut debouncer = new_debouncer(DEBOUNCE, None, tx).context("Failed to start file watcher")?;

  let mut watched = 0;
  for path in paths {
    match debouncer.watch(path, RecursiveMode::NonRecursive) {
      Ok(()) => watched += 1,
      Err(e) => warn!(path = %path.display(), error = %e, "cannot watch path"),
    }
  }
  output::print_info(&format!("watching {} path(s) for changes", watched));

  next_change(&rx, build_dir)
}

fn next_change(rx: &Receiver<DebounceEventResult>, build_dir: &Path) -> Result<()> {
  loop {
    let events = match rx.recv().context("File watcher stopped")? {
      Ok(events) => events,
      Err(errors) => {
        for e in errors {
          output::print_warning(&format!("watch error: {}", e));
        }
        continue;
      }
    };

    let changed: Vec<&PathBuf> = events
      .iter()
      .filter(|de| {
        matches!(
          de.event.kind,
          EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
        )
      })
      .flat_map(|de| &de.event.paths)
      .filter(|path| !path.starts_with(build_dir))
      .collect();

    if let Some(path) = changed.first() {
      debug!(path = %path.display(), changes = changed.len(), "change detected");
      return Ok(());
    }
  }
}
