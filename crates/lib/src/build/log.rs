//! The build log: what the previous session learned about every path.
//!
//! Stored as pretty-printed JSON at `<cachedir>/.buildlog`. Keys are paths as
//! they appear in the production tree; values record a source's modification
//! time, an output's producing command, and the outputs that consume a path.
//!
//! Entries are written sources first, then outputs, each block sorted
//! case-insensitively.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::util::fs::Timestamp;

#[derive(Debug, Error)]
pub enum BuildLogError {
  #[error("failed to read build log {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse build log {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize build log: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write build log {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// What is known about one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLogEntry {
  /// Modification time, recorded for sources only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<Timestamp>,

  /// Command producing this path; absent for sources.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,

  /// Paths produced from this one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outputs: Option<Vec<PathBuf>>,
}

impl BuildLogEntry {
  pub fn is_source(&self) -> bool {
    self.command.is_none()
  }

  pub fn outputs(&self) -> &[PathBuf] {
    self.outputs.as_deref().unwrap_or_default()
  }

  /// Record `output` as a consumer of this path, once.
  pub fn add_output(&mut self, output: &Path) {
    let outputs = self.outputs.get_or_insert_with(Vec::new);
    if !outputs.iter().any(|o| o == output) {
      outputs.push(output.to_path_buf());
    }
  }
}

/// Path to entry mapping persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BuildLog {
  entries: BTreeMap<PathBuf, BuildLogEntry>,
}

impl BuildLog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load a build log.
  ///
  /// Returns `Ok(None)` if the file doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, BuildLogError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(BuildLogError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let log: BuildLog = serde_json::from_str(&content).map_err(|source| BuildLogError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), entries = log.len(), "loaded build log");

    Ok(Some(log))
  }

  /// Save the build log in source/output order.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self, path: &Path) -> Result<(), BuildLogError> {
    let write_err = |source| BuildLogError::Write {
      path: path.to_path_buf(),
      source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let content = self.to_json()?;
    fs::write(&temp_path, &content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;
    debug!(path = %path.display(), entries = self.len(), "saved build log");

    Ok(())
  }

  /// Serialize in source/output order.
  pub fn to_json(&self) -> Result<String, BuildLogError> {
    serde_json::to_string_pretty(self).map_err(BuildLogError::Serialize)
  }

  pub fn get(&self, path: &Path) -> Option<&BuildLogEntry> {
    self.entries.get(path)
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.entries.contains_key(path)
  }

  /// Entry for `path`, created empty if missing.
  pub fn entry(&mut self, path: &Path) -> &mut BuildLogEntry {
    self.entries.entry(path.to_path_buf()).or_default()
  }

  pub fn insert(&mut self, path: PathBuf, entry: BuildLogEntry) {
    self.entries.insert(path, entry);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &BuildLogEntry)> {
    self.entries.iter()
  }

  /// Every command recorded in the log.
  pub fn commands(&self) -> impl Iterator<Item = &str> {
    self.entries.values().filter_map(|e| e.command.as_deref())
  }

  /// Copy each source's timestamp into its entry.
  pub fn stamp_sources<'a>(&mut self, sources: impl IntoIterator<Item = (&'a PathBuf, Option<Timestamp>)>) {
    for (path, timestamp) in sources {
      self.entry(path).timestamp = timestamp;
    }
  }

  /// Entries in persisted order: sources, then outputs, each sorted case-insensitively.
  pub fn ordered(&self) -> Vec<(&PathBuf, &BuildLogEntry)> {
    let mut entries: Vec<_> = self.entries.iter().collect();
    entries.sort_by(|(a_path, a), (b_path, b)| {
      b.is_source()
        .cmp(&a.is_source())
        .then_with(|| case_insensitive_key(a_path).cmp(&case_insensitive_key(b_path)))
        .then_with(|| a_path.cmp(b_path))
    });
    entries
  }
}

impl Serialize for BuildLog {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (path, entry) in self.ordered() {
      map.serialize_entry(path, entry)?;
    }
    map.end()
  }
}

fn case_insensitive_key(path: &Path) -> String {
  path.to_string_lossy().to_lowercase()
}
