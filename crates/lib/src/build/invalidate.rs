//! Incremental invalidation against the previous session's build log.
//!
//! Every command recorded in the prior log starts out redundant. A path that
//! disappeared, or whose recorded timestamp no longer matches, knocks out its
//! own command and, transitively, the command of every output consuming it.
//! Those outputs are deleted so a half-updated tree is never mistaken for a
//! finished one.
//!
//! Dependencies discovered by a previous session are not declared in the
//! production tree. While unchanged they are carried forward into the new
//! build log and the source registry so they keep guarding their outputs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::graph::ProductionGraph;
use super::log::BuildLog;
use crate::util::fs::{modified_time, remove_stale_output};

/// Commands from `prior` whose inputs are all unchanged.
///
/// Mutates `graph` only to carry forward unchanged discovered dependencies, and
/// the filesystem only to delete outputs of invalidated commands.
pub fn redundant_commands(prior: &BuildLog, graph: &mut ProductionGraph) -> BTreeSet<String> {
  let mut invalidation = Invalidation {
    prior,
    root: graph.root().to_path_buf(),
    redundant: prior.commands().map(str::to_string).collect(),
    visited: BTreeSet::new(),
  };

  for (path, entry) in prior.iter() {
    let Some(current) = modified_time(&graph.resolve(path)) else {
      debug!(path = %path.display(), "path is missing");
      invalidation.invalidate(path);
      continue;
    };

    let Some(recorded) = entry.timestamp else {
      continue;
    };

    if current != recorded {
      debug!(path = %path.display(), %recorded, %current, "path was modified");
      invalidation.invalidate(path);
      continue;
    }

    if !graph.sources().contains(path) {
      debug!(path = %path.display(), "carrying forward discovered dependency");
      graph.sources_mut().insert(path.clone(), Some(recorded));
      graph.build_log_mut().insert(path.clone(), entry.clone());
    }
  }

  invalidation.redundant
}

/// Drop every task whose command is redundant against `prior`. Returns the number of tasks removed.
pub fn prune_redundant_tasks(prior: &BuildLog, graph: &mut ProductionGraph) -> usize {
  let redundant = redundant_commands(prior, graph);
  let removed = graph.discard_commands(&redundant);
  info!(redundant = redundant.len(), removed, remaining = graph.task_count(), "pruned up-to-date tasks");
  removed
}

struct Invalidation<'a> {
  prior: &'a BuildLog,
  root: PathBuf,
  redundant: BTreeSet<String>,
  visited: BTreeSet<PathBuf>,
}

impl Invalidation<'_> {
  fn invalidate(&mut self, path: &Path) {
    if !self.visited.insert(path.to_path_buf()) {
      return;
    }
    let Some(entry) = self.prior.get(path) else {
      return;
    };

    if let Some(command) = &entry.command {
      self.redundant.remove(command);
    }

    for output in entry.outputs() {
      if let Err(e) = remove_stale_output(&self.root.join(output)) {
        warn!(output = %output.display(), error = %e, "failed to remove stale output");
      }
      self.invalidate(output);
    }
  }
}
