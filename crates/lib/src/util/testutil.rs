//! Test utilities for lathe-lib.
//!
//! Cross-platform helpers for tests that build small production trees out of
//! shell commands and need to control file modification times.

use std::path::Path;
use std::time::{Duration, SystemTime};

/// Returns a command that copies `from` into `to`.
#[cfg(unix)]
pub fn copy_cmd(from: &str, to: &str) -> String {
  format!("cat {} > {}", from, to)
}

#[cfg(windows)]
pub fn copy_cmd(from: &str, to: &str) -> String {
  format!("Get-Content {} | Set-Content {}", from, to)
}

/// Write `content` to `path` and pin its modification time to `secs` after the epoch.
pub fn write_with_mtime(path: &Path, content: &str, secs: u64) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
  set_mtime(path, secs);
}

/// Pin the modification time of `path` to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
  let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
  filetime::set_file_mtime(path, filetime::FileTime::from_system_time(time)).unwrap();
}
