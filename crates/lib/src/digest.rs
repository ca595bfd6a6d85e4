//! Task digests: turning a command's raw result into knowledge.
//!
//! After a task's command exits, its status, stdout and stderr are handed to the
//! task's [`Digest`]. The digest reports the dependencies the command discovered
//! (e.g. headers read by a compiler) and any [`Diagnostic`]s. The build engine
//! never looks at the exit status itself: a task fails only when its digest
//! reports an error-severity diagnostic.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::execute::CommandStatus;

/// Severity of a [`Diagnostic`]. Defaults to [`Severity::Error`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  #[default]
  Error,
  Warning,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Error => "error",
      Severity::Warning => "warning",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A located or unlocated message produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<PathBuf>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line: Option<u32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub column: Option<u32>,

  #[serde(default)]
  pub status: Severity,

  pub message: String,

  /// Command that produced this diagnostic, filled in by the session.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
}

impl Diagnostic {
  /// A diagnostic with the default (error) severity.
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      file: None,
      line: None,
      column: None,
      status: Severity::default(),
      message: message.into(),
      command: None,
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self::new(message).with_status(Severity::Error)
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self::new(message).with_status(Severity::Warning)
  }

  pub fn with_status(mut self, status: Severity) -> Self {
    self.status = status;
    self
  }

  /// Attach a source location.
  pub fn at(mut self, file: impl Into<PathBuf>, line: Option<u32>, column: Option<u32>) -> Self {
    self.file = Some(file.into());
    self.line = line;
    self.column = column;
    self
  }

  pub fn is_error(&self) -> bool {
    self.status == Severity::Error
  }

  /// Render as `file:line:column: status: message`.
  ///
  /// A relative `file` is taken to be relative to `dir`, the directory the
  /// command ran in. The file is shown relative to `root`.
  pub fn render(&self, dir: &Path, root: &Path) -> String {
    let mut text = String::new();
    if let Some(file) = &self.file {
      let file = dir.join(file);
      let shown = if file.is_absolute() {
        crate::util::fs::relative_path(root, &file)
      } else {
        file
      };
      text.push_str(&format!("{}:", shown.display()));
      if let Some(line) = self.line {
        text.push_str(&format!("{}:", line));
        if let Some(column) = self.column {
          text.push_str(&format!("{}:", column));
        }
      }
      text.push(' ');
    }
    text.push_str(&format!("{}: {}", self.status, self.message));
    text
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render(Path::new(""), Path::new("")))
  }
}

/// What a digest learned from one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestOutput {
  #[serde(default)]
  pub dependencies: Vec<PathBuf>,

  #[serde(default)]
  pub diagnostics: Vec<Diagnostic>,
}

/// Toolchain-specific interpretation of a command's result.
pub trait Digest: Send + Sync {
  fn digest(&self, status: &CommandStatus, stdout: &str, stderr: &str) -> DigestOutput;
}

impl<F> Digest for F
where
  F: Fn(&CommandStatus, &str, &str) -> DigestOutput + Send + Sync,
{
  fn digest(&self, status: &CommandStatus, stdout: &str, stderr: &str) -> DigestOutput {
    self(status, stdout, stderr)
  }
}

/// Reports a failed command as a single error diagnostic.
///
/// The message is stderr if present, then stdout, then a generic exit-code line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitStatusDigest;

impl Digest for ExitStatusDigest {
  fn digest(&self, status: &CommandStatus, stdout: &str, stderr: &str) -> DigestOutput {
    DigestOutput {
      dependencies: Vec::new(),
      diagnostics: status_diagnostics(status, stdout, stderr),
    }
  }
}

/// Accepts any result; never reports anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreDigest;

impl Digest for IgnoreDigest {
  fn digest(&self, _status: &CommandStatus, _stdout: &str, _stderr: &str) -> DigestOutput {
    DigestOutput::default()
  }
}

/// Reads a Make-style dependency file written by the command (`cc -MMD`).
///
/// The first two entries (the object and the primary source) are discarded,
/// the remainder are reported as discovered dependencies. The dependency file
/// is removed once consumed. Failures are reported like [`ExitStatusDigest`].
#[derive(Debug, Clone)]
pub struct DepfileDigest {
  depfile: PathBuf,
}

impl DepfileDigest {
  pub fn new(depfile: impl Into<PathBuf>) -> Self {
    Self { depfile: depfile.into() }
  }

  pub fn depfile(&self) -> &Path {
    &self.depfile
  }
}

impl Digest for DepfileDigest {
  fn digest(&self, status: &CommandStatus, stdout: &str, stderr: &str) -> DigestOutput {
    let dependencies = match std::fs::read_to_string(&self.depfile) {
      Ok(contents) => {
        if let Err(e) = std::fs::remove_file(&self.depfile) {
          warn!(depfile = %self.depfile.display(), error = %e, "failed to remove dependency file");
        }
        parse_depfile(&contents).into_iter().skip(2).collect()
      }
      Err(_) => Vec::new(),
    };

    DigestOutput {
      dependencies,
      diagnostics: status_diagnostics(status, stdout, stderr),
    }
  }
}

fn status_diagnostics(status: &CommandStatus, stdout: &str, stderr: &str) -> Vec<Diagnostic> {
  if status.success() {
    return Vec::new();
  }

  let message = if !stderr.is_empty() {
    stderr.to_string()
  } else if !stdout.is_empty() {
    stdout.to_string()
  } else {
    format!("command {}", status)
  };

  vec![Diagnostic::error(message)]
}

/// Split a Make-style dependency file into its path entries.
///
/// The `target:` separator is dropped, `\` line continuations are joined and
/// `\ ` escapes a space inside a path.
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
  let mut entries = Vec::new();
  let mut current = String::new();
  let mut chars = contents.chars().peekable();

  let flush = |current: &mut String, entries: &mut Vec<PathBuf>| {
    if current.is_empty() {
      return;
    }
    let entry = std::mem::take(current);
    let entry = entry.strip_suffix(':').map(str::to_string).unwrap_or(entry);
    if !entry.is_empty() {
      entries.push(PathBuf::from(entry));
    }
  };

  while let Some(ch) = chars.next() {
    match ch {
      '\\' => match chars.peek() {
        Some(' ') => {
          current.push(' ');
          chars.next();
        }
        Some('\n') => {
          chars.next();
          flush(&mut current, &mut entries);
        }
        Some('\r') => {
          chars.next();
          if chars.peek() == Some(&'\n') {
            chars.next();
          }
          flush(&mut current, &mut entries);
        }
        _ => current.push('\\'),
      },
      ' ' | '\t' | '\n' | '\r' => flush(&mut current, &mut entries),
      _ => current.push(ch),
    }
  }
  flush(&mut current, &mut entries);

  entries
}
