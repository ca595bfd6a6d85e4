//! CLI output formatting utilities.
//!
//! Progress lines and the final summary go to stdout; errors, warnings and
//! diagnostics go to stderr. Colors are only used when the stream supports them.

use std::path::Path;
use std::time::Duration;

use lathe_lib::digest::{Diagnostic, Severity};
use lathe_lib::session::Progress;
use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// `(step/total) description`, with `step` right-aligned to the width of `total`.
pub fn format_progress(progress: &Progress) -> String {
  let width = progress.total.to_string().len();
  format!(
    "({:>width$}/{}) {}",
    progress.step,
    progress.total,
    progress.description,
    width = width
  )
}

/// One line per configuration: `name` or `alias → name`.
pub fn format_config_list(configs: &[(String, Option<String>)]) -> Vec<String> {
  configs
    .iter()
    .map(|(name, target)| match target {
      Some(target) => format!("{} {} {}", name, symbols::ARROW, target),
      None => name.clone(),
    })
    .collect()
}

pub fn format_duration(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(rounded).to_string()
}

pub fn print_header(name: &str) {
  println!("{}", name.if_supports_color(Stream::Stdout, |s| s.bold()));
}

pub fn print_progress(progress: &Progress) {
  println!("{}", format_progress(progress));
}

pub fn print_diagnostic(diagnostic: &Diagnostic, dir: &Path, root: &Path) {
  let line = diagnostic.render(dir, root);
  match diagnostic.status {
    Severity::Error => eprintln!("{}", line.if_supports_color(Stream::Stderr, |s| s.red())),
    Severity::Warning => eprintln!("{}", line.if_supports_color(Stream::Stderr, |s| s.yellow())),
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}
