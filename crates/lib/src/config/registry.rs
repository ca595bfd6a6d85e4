use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ConfigError;

#[derive(Debug, Clone)]
struct Registered<T> {
  value: T,
  origin: Option<PathBuf>,
}

/// Named definitions that can be added but never replaced or removed.
///
/// Each definition remembers the file it came from so a conflicting
/// redefinition can name both places.
#[derive(Debug, Clone)]
pub struct Registry<T> {
  kind: &'static str,
  entries: BTreeMap<String, Registered<T>>,
}

impl<T> Registry<T> {
  /// An empty registry; `kind` names the definitions in errors (`targets`, `platforms`, ...).
  pub fn new(kind: &'static str) -> Self {
    Self {
      kind,
      entries: BTreeMap::new(),
    }
  }

  /// A registry holding built-in definitions, which have no origin file.
  pub(crate) fn with_builtins(kind: &'static str, builtins: impl IntoIterator<Item = (String, T)>) -> Self {
    let entries = builtins
      .into_iter()
      .map(|(name, value)| (name, Registered { value, origin: None }))
      .collect();
    Self { kind, entries }
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  /// Add `value` under `name`.
  ///
  /// # Errors
  ///
  /// [`ConfigError::AlreadyExists`] if `name` is already registered.
  pub fn register(&mut self, name: impl Into<String>, value: T, origin: Option<&Path>) -> Result<(), ConfigError> {
    let name = name.into();
    if let Some(existing) = self.entries.get(&name) {
      return Err(ConfigError::AlreadyExists {
        kind: self.kind,
        name,
        defined_in: describe_origin(existing.origin.as_deref()),
        redefined_in: describe_origin(origin),
      });
    }

    self.entries.insert(
      name,
      Registered {
        value,
        origin: origin.map(Path::to_path_buf),
      },
    );
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&T> {
    self.entries.get(name).map(|r| &r.value)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  /// File the definition of `name` came from; `None` for built-in definitions.
  pub fn origin(&self, name: &str) -> Option<&Path> {
    self.entries.get(name).and_then(|r| r.origin.as_deref())
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
    self.entries.iter().map(|(name, r)| (name.as_str(), &r.value))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

fn describe_origin(origin: Option<&Path>) -> String {
  match origin {
    Some(path) => path.display().to_string(),
    None => "<built-in>".to_string(),
  }
}
