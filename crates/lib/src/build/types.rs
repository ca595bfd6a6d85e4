use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{BuildConfig, ConfigError};
use crate::digest::{Digest, ExitStatusDigest};

/// Nested production tree: output (or source) path to the production generating it.
///
/// `None` marks the path as a source.
pub type ProductionSpec = BTreeMap<PathBuf, Option<Production>>;

/// A declared output: the command generating it and the inputs it reads.
#[derive(Clone)]
pub struct Production {
  pub name: Option<String>,
  pub command: String,
  pub sources: ProductionSpec,
  pub digest: Arc<dyn Digest>,
}

impl Production {
  /// A production with no inputs, reported through [`ExitStatusDigest`].
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      name: None,
      command: command.into(),
      sources: ProductionSpec::new(),
      digest: Arc::new(ExitStatusDigest),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Declare a plain source input.
  pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
    self.sources.insert(path.into(), None);
    self
  }

  /// Declare an input that is itself produced.
  pub fn input(mut self, path: impl Into<PathBuf>, production: Production) -> Self {
    self.sources.insert(path.into(), Some(production));
    self
  }

  pub fn with_digest(mut self, digest: impl Digest + 'static) -> Self {
    self.digest = Arc::new(digest);
    self
  }
}

impl fmt::Debug for Production {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Production")
      .field("name", &self.name)
      .field("command", &self.command)
      .field("sources", &self.sources)
      .finish_non_exhaustive()
  }
}

/// Resolves a product's production tree for one build configuration.
pub type ProductFn = dyn Fn(&BuildConfig) -> Result<ProductionSpec, ConfigError> + Send + Sync;

/// A product of a build target: a fixed production tree, or one derived from the configuration.
#[derive(Clone)]
pub enum Product {
  Spec(ProductionSpec),
  Deferred(Arc<ProductFn>),
}

impl Product {
  pub fn deferred<F>(f: F) -> Self
  where
    F: Fn(&BuildConfig) -> Result<ProductionSpec, ConfigError> + Send + Sync + 'static,
  {
    Product::Deferred(Arc::new(f))
  }

  /// Produce the production tree for `config`.
  pub fn evaluate(&self, config: &BuildConfig) -> Result<ProductionSpec, ConfigError> {
    match self {
      Product::Spec(spec) => Ok(spec.clone()),
      Product::Deferred(f) => f(config),
    }
  }
}

impl From<ProductionSpec> for Product {
  fn from(spec: ProductionSpec) -> Self {
    Product::Spec(spec)
  }
}

impl fmt::Debug for Product {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Product::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
      Product::Deferred(_) => f.write_str("Deferred(..)"),
    }
  }
}

/// The executable unit derived from a production, identified by its command.
#[derive(Clone)]
pub struct Task {
  pub name: String,
  pub output: PathBuf,
  pub command: String,
  pub digest: Arc<dyn Digest>,
}

impl Task {
  pub(crate) fn from_production(output: &Path, production: &Production) -> Self {
    Self {
      name: production.name.clone().unwrap_or_else(|| production.command.clone()),
      output: output.to_path_buf(),
      command: production.command.clone(),
      digest: production.digest.clone(),
    }
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("name", &self.name)
      .field("output", &self.output)
      .field("command", &self.command)
      .finish_non_exhaustive()
  }
}

/// Tasks at one depth of the production tree, keyed by command.
pub type Batch = BTreeMap<String, Task>;
