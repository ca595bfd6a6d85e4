//! Shared test helpers for CLI integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated project directory holding a buildfile and its sources.
pub struct TestEnv {
  pub temp: TempDir,
  pub buildfile: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file.
  ///
  /// Copies the fixture to `buildfile.json` and writes the sources it expects.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    std::fs::write(&env.buildfile, fixture_content(name)).unwrap();
    env.write_file("main.c", "int main;\n");
    env.write_file("util.c", "int util;\n");
    env
  }

  /// Create an empty project directory.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let buildfile = temp.path().join("buildfile.json");
    Self { temp, buildfile }
  }

  /// Project root, canonicalized so it compares equal to paths the binary prints.
  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path)).unwrap()
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Pin a file's modification time to `secs` after the epoch.
  pub fn set_mtime(&self, relative_path: &str, secs: i64) {
    filetime::set_file_mtime(self.path(relative_path), filetime::FileTime::from_unix_time(secs, 0)).unwrap();
  }

  /// Get a Command for the lathe binary running inside the project root.
  ///
  /// `LATHE_SHELL` and `RUST_LOG` are cleared so the caller's environment cannot leak in.
  pub fn lathe_cmd(&self) -> Command {
    self.lathe_cmd_in(self.temp.path())
  }

  pub fn lathe_cmd_in(&self, dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("lathe");
    cmd.current_dir(dir);
    cmd.env_remove("LATHE_SHELL");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

/// Configuration built by the `hello` alias of the `hello.json` fixture.
pub const HELLO_CONFIG: &str = "hello.app.linux.x86_64";

/// Output directory of [`HELLO_CONFIG`], relative to the project root.
pub const HELLO_BUILD_DIR: &str = "build/hello.app.linux.x86_64";
