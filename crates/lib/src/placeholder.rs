//! Placeholder parsing and substitution for buildfile templates.
//!
//! Buildfile productions are templates: output paths, names, commands and
//! depfile paths reference values of the build configuration they are
//! instantiated for.
//!
//! # Placeholder Format
//!
//! - `$${key}` - the configuration value named `key` (`builddir`, `platform`,
//!   a target property, ...)
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `${CC}` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use lathe_lib::placeholder::{parse, Segment};
//!
//! let segments = parse("$${builddir}/app:$HOME").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder("builddir".to_string()),
//!     Segment::Literal("/app:$HOME".to_string()),
//! ]);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// The key of a value to be resolved
  Placeholder(String),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("empty placeholder at position {0}")]
  Empty(usize),

  #[error("unknown configuration key '{0}'")]
  Unresolved(String),
}

/// Source of placeholder values.
pub trait Resolver {
  /// Resolve the value named `key`.
  fn resolve(&self, key: &str) -> Result<&str, PlaceholderError>;
}

impl Resolver for BTreeMap<String, String> {
  fn resolve(&self, key: &str) -> Result<&str, PlaceholderError> {
    self
      .get(key)
      .map(String::as_str)
      .ok_or_else(|| PlaceholderError::Unresolved(key.to_string()))
  }
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or names no key.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();

            match chars.peek() {
              Some((_, '{')) => {
                // $$${ -> $${
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut key = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              key.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            let key = key.trim();
            if key.is_empty() {
              return Err(PlaceholderError::Empty(pos));
            }
            segments.push(Segment::Placeholder(key.to_string()));
          }
          _ => literal.push_str("$$"),
        }
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any placeholder cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(key) => result.push_str(resolver.resolve(key)?),
    }
  }

  Ok(result)
}
