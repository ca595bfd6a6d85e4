//! Flattening a production tree into ordered batches.
//!
//! Productions nested at depth `d` become tasks in batch `d`; the batch list is
//! reversed at the end so index 0 holds the deepest productions. Depth stands in
//! for topological order, which is only valid because the tree is a tree.
//!
//! While walking, every edge is recorded in a fresh [`BuildLog`]: sources get an
//! entry with no command, outputs get their producing command, and each path
//! lists the outputs that consume it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::log::BuildLog;
use super::types::{Batch, ProductionSpec, Task};
use crate::util::fs::{Timestamp, modified_time};

/// Modification times of every source known to a session.
///
/// A timestamp is captured the first time a path is seen and never refreshed,
/// so it can be compared against the file at the end of the session.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
  root: PathBuf,
  timestamps: BTreeMap<PathBuf, Option<Timestamp>>,
}

impl SourceRegistry {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      timestamps: BTreeMap::new(),
    }
  }

  /// Register `path`, capturing its current modification time if it is new.
  pub fn track(&mut self, path: &Path) {
    if !self.timestamps.contains_key(path) {
      let timestamp = modified_time(&self.root.join(path));
      self.timestamps.insert(path.to_path_buf(), timestamp);
    }
  }

  /// Register `path` with a known timestamp, replacing any captured one.
  pub fn insert(&mut self, path: PathBuf, timestamp: Option<Timestamp>) {
    self.timestamps.insert(path, timestamp);
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.timestamps.contains_key(path)
  }

  pub fn timestamp(&self, path: &Path) -> Option<Timestamp> {
    self.timestamps.get(path).copied().flatten()
  }

  pub fn len(&self) -> usize {
    self.timestamps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timestamps.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, Option<Timestamp>)> {
    self.timestamps.iter().map(|(path, timestamp)| (path, *timestamp))
  }

  /// Sources whose modification time no longer matches the captured one.
  pub fn changed(&self) -> Vec<PathBuf> {
    self
      .timestamps
      .iter()
      .filter(|(path, timestamp)| modified_time(&self.root.join(path)) != **timestamp)
      .map(|(path, _)| path.clone())
      .collect()
  }
}

/// Batches, sources and the fresh build log derived from one production tree.
///
/// Relative paths are resolved against `root` whenever the filesystem is
/// consulted; they are stored exactly as declared.
#[derive(Debug, Clone)]
pub struct ProductionGraph {
  root: PathBuf,
  batches: Vec<Batch>,
  sources: SourceRegistry,
  build_log: BuildLog,
  build_dirs: BTreeSet<PathBuf>,
  task_count: usize,
}

impl ProductionGraph {
  /// Flatten `spec` into batches.
  pub fn build(root: impl Into<PathBuf>, spec: &ProductionSpec) -> Self {
    let root = root.into();
    let mut graph = Self {
      sources: SourceRegistry::new(root.clone()),
      root,
      batches: Vec::new(),
      build_log: BuildLog::new(),
      build_dirs: BTreeSet::new(),
      task_count: 0,
    };

    graph.parse(None, spec, 0);
    graph.batches.reverse();

    debug!(
      batches = graph.batches.len(),
      tasks = graph.task_count,
      sources = graph.sources.len(),
      "built production graph"
    );

    graph
  }

  fn parse(&mut self, output: Option<&Path>, spec: &ProductionSpec, depth: usize) {
    for (path, production) in spec {
      let Some(production) = production else {
        self.add_source(path, output);
        continue;
      };

      if self.batches.len() <= depth {
        self.batches.resize_with(depth + 1, Batch::new);
      }
      self.parse(Some(path), &production.sources, depth + 1);

      if !self.batches[depth].contains_key(&production.command) {
        self.batches[depth].insert(production.command.clone(), Task::from_production(path, production));
        self.task_count += 1;
      }

      if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !self.root.join(dir).is_dir() {
          self.build_dirs.insert(dir.to_path_buf());
        }
      }

      self.add_output(path, output, Some(&production.command));
    }
  }

  /// Record `source` as an input of `output`, capturing its timestamp on first sight.
  pub fn add_source(&mut self, source: &Path, output: Option<&Path>) {
    self.sources.track(source);
    self.add_output(source, output, None);
  }

  /// Record `path` as an input of `output` and set the command producing `path`.
  pub fn add_output(&mut self, path: &Path, output: Option<&Path>, command: Option<&str>) {
    let entry = self.build_log.entry(path);
    if let Some(output) = output {
      entry.add_output(output);
    }
    entry.command = command.map(str::to_string);
  }

  /// Remove every task whose command is in `commands`. Returns the number removed.
  pub fn discard_commands(&mut self, commands: &BTreeSet<String>) -> usize {
    let mut removed = 0;
    for batch in &mut self.batches {
      batch.retain(|command, _| {
        let redundant = commands.contains(command);
        removed += usize::from(redundant);
        !redundant
      });
    }
    self.task_count -= removed;
    removed
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Absolute location of a graph path.
  pub fn resolve(&self, path: &Path) -> PathBuf {
    self.root.join(path)
  }

  pub fn batches(&self) -> &[Batch] {
    &self.batches
  }

  pub fn sources(&self) -> &SourceRegistry {
    &self.sources
  }

  pub fn sources_mut(&mut self) -> &mut SourceRegistry {
    &mut self.sources
  }

  pub fn build_log(&self) -> &BuildLog {
    &self.build_log
  }

  pub fn build_log_mut(&mut self) -> &mut BuildLog {
    &mut self.build_log
  }

  /// Output directories that did not exist when the graph was built.
  pub fn build_dirs(&self) -> &BTreeSet<PathBuf> {
    &self.build_dirs
  }

  /// Tasks still scheduled across all batches.
  pub fn task_count(&self) -> usize {
    self.task_count
  }

  /// Copy every source's captured timestamp into the build log.
  pub fn stamp_sources(&mut self) {
    self.build_log.stamp_sources(self.sources.iter());
  }

  /// Hand the batches over for execution, leaving none behind.
  pub(crate) fn take_batches(&mut self) -> Vec<Batch> {
    std::mem::take(&mut self.batches)
  }
}
