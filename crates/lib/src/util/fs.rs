//! Filesystem probes.
//!
//! Every path the build engine tracks is compared by modification time. A path
//! that cannot be stat'ed has no timestamp, which the invalidation pass treats
//! the same as a deleted file.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Modification time of a path, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl std::fmt::Display for Timestamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Read the modification time of `path`.
///
/// Returns `None` if the path does not exist or its metadata is unreadable.
pub fn modified_time(path: &Path) -> Option<Timestamp> {
  let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
  let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
  Some(Timestamp(since_epoch.as_nanos() as u64))
}

/// Create `dir` and its parents.
///
/// Returns `true` if the directory had to be created, `false` if it already existed.
pub async fn ensure_dir(dir: &Path) -> io::Result<bool> {
  match tokio::fs::metadata(dir).await {
    Ok(meta) if meta.is_dir() => Ok(false),
    _ => {
      tokio::fs::create_dir_all(dir).await?;
      Ok(true)
    }
  }
}

/// Remove an output that is about to be regenerated.
///
/// A missing file is not an error.
pub fn remove_stale_output(path: &Path) -> io::Result<()> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Express `path` relative to `base`, inserting `..` components as needed.
///
/// Both paths are expected to be absolute (or both relative to the same
/// directory). When they share no prefix at all, `path` is returned unchanged.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
  let base: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
  let target: Vec<Component> = path.components().filter(|c| *c != Component::CurDir).collect();

  let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
  if common == 0 && path.has_root() {
    return path.to_path_buf();
  }

  let mut relative = PathBuf::new();
  for _ in common..base.len() {
    relative.push("..");
  }
  for component in &target[common..] {
    relative.push(component.as_os_str());
  }

  if relative.as_os_str().is_empty() {
    PathBuf::from(".")
  } else {
    relative
  }
}
