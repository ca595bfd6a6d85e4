//! JSON buildfile loading.
//!
//! A buildfile declares targets (and optionally extra platforms and
//! architectures) and may include further buildfiles by name or through glob
//! patterns, resolved relative to the including file. A named include must
//! exist. Every file is read once, however many times it is included.
//!
//! Products are templates: their output paths, names, commands, depfile paths
//! and source globs contain `$${key}` placeholders that are resolved against
//! the build configuration when a session evaluates the product. Globs match
//! case-insensitively.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::MatchOptions;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::build::{Product, Production, ProductionSpec};
use crate::config::{Architecture, BuildConfig, BuildTarget, ConfigContext, ConfigError, Platform, Properties, Registry};
use crate::digest::{DepfileDigest, IgnoreDigest};
use crate::placeholder::substitute;

#[derive(Debug, Error)]
pub enum BuildfileError {
  #[error("failed to read buildfile {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse buildfile {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid include pattern '{pattern}' in {path}: {source}")]
  Pattern {
    path: PathBuf,
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("failed to expand include pattern in {path}: {source}")]
  Glob {
    path: PathBuf,
    #[source]
    source: glob::GlobError,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildfileDef {
  #[serde(default)]
  include: Vec<String>,

  #[serde(default)]
  platforms: BTreeMap<String, Platform>,

  #[serde(default)]
  architectures: BTreeMap<String, Architecture>,

  #[serde(default)]
  targets: BTreeMap<String, TargetDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetDef {
  #[serde(default)]
  aliases: BTreeMap<String, String>,

  #[serde(default)]
  config: Properties,

  #[serde(default)]
  platforms: Option<Vec<String>>,

  #[serde(default)]
  variants: BTreeMap<String, Properties>,

  #[serde(default)]
  products: BTreeMap<String, SpecDef>,
}

type SpecDef = BTreeMap<String, Option<ProductionDef>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductionDef {
  #[serde(default)]
  name: Option<String>,

  command: String,

  #[serde(default)]
  sources: SpecDef,

  /// Patterns relative to the target directory; every match becomes a source.
  #[serde(default)]
  glob: Vec<String>,

  #[serde(default)]
  digest: DigestDef,
}

/// How a buildfile production's result is interpreted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DigestDef {
  /// Nonzero exit status is an error.
  #[default]
  Status,
  /// Nothing is ever reported.
  Ignore,
  /// Read discovered dependencies from a Make-style depfile.
  Depfile(String),
}

/// Targets and configuration context loaded from a buildfile and its includes.
#[derive(Debug, Clone)]
pub struct Buildfile {
  pub targets: Registry<BuildTarget>,
  pub context: ConfigContext,
  /// Every file that was read, in load order.
  pub files: Vec<PathBuf>,
}

impl Buildfile {
  /// Load `path` and everything it includes.
  ///
  /// Build and cache directories are placed under `build/` next to `path`.
  pub fn load(path: &Path) -> Result<Self, BuildfileError> {
    let path = canonicalize(path)?;
    let project_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut buildfile = Buildfile {
      targets: Registry::new("targets"),
      context: ConfigContext::new(&project_dir),
      files: Vec::new(),
    };
    let mut visited = BTreeSet::new();
    buildfile.load_file(&path, &mut visited)?;

    info!(
      path = %path.display(),
      files = buildfile.files.len(),
      targets = buildfile.targets.len(),
      "loaded buildfile"
    );
    Ok(buildfile)
  }

  fn load_file(&mut self, path: &Path, visited: &mut BTreeSet<PathBuf>) -> Result<(), BuildfileError> {
    if !visited.insert(path.to_path_buf()) {
      debug!(path = %path.display(), "buildfile already loaded");
      return Ok(());
    }

    let content = std::fs::read_to_string(path).map_err(|source| BuildfileError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let def: BuildfileDef = serde_json::from_str(&content).map_err(|source| BuildfileError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    self.files.push(path.to_path_buf());

    let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for pattern in &def.include {
      for include in expand_include(path, &dirname, pattern)? {
        self.load_file(&canonicalize(&include)?, visited)?;
      }
    }

    for (name, architecture) in def.architectures {
      self.context.architectures.register(name, architecture, Some(path))?;
    }
    for (name, platform) in def.platforms {
      self.context.platforms.register(name, platform, Some(path))?;
    }
    for (name, target) in def.targets {
      let target = build_target(&name, path, target);
      self.targets.register(name, target, Some(path))?;
    }

    Ok(())
  }

  /// Every configuration name (and alias) this buildfile can build.
  ///
  /// Aliases come first as `(alias, Some(full name))`, then full names as `(name, None)`.
  pub fn config_names(&self) -> Vec<(String, Option<String>)> {
    let mut names = Vec::new();
    for (_, target) in self.targets.iter() {
      for (alias, config) in &target.aliases {
        names.push((alias.clone(), Some(config.clone())));
      }
    }
    for (_, target) in self.targets.iter() {
      names.extend(target.config_names(&self.context).into_iter().map(|name| (name, None)));
    }
    names
  }
}

fn canonicalize(path: &Path) -> Result<PathBuf, BuildfileError> {
  dunce::canonicalize(path).map_err(|source| BuildfileError::Read {
    path: path.to_path_buf(),
    source,
  })
}

fn match_options() -> MatchOptions {
  MatchOptions {
    case_sensitive: false,
    ..MatchOptions::new()
  }
}

fn is_pattern(pattern: &str) -> bool {
  pattern.contains(['*', '?', '['])
}

fn expand_include(path: &Path, dirname: &Path, pattern: &str) -> Result<Vec<PathBuf>, BuildfileError> {
  let full_pattern = dirname.join(pattern);
  if !is_pattern(pattern) {
    return Ok(vec![full_pattern]);
  }
  let full_pattern = full_pattern.to_string_lossy();

  let entries = glob::glob_with(&full_pattern, match_options()).map_err(|source| BuildfileError::Pattern {
    path: path.to_path_buf(),
    pattern: pattern.to_string(),
    source,
  })?;

  let mut includes = entries
    .collect::<Result<Vec<_>, _>>()
    .map_err(|source| BuildfileError::Glob {
      path: path.to_path_buf(),
      source,
    })?;
  includes.sort();
  Ok(includes)
}

fn build_target(name: &str, filename: &Path, def: TargetDef) -> BuildTarget {
  let mut target = BuildTarget::new(name, filename);
  target.aliases = def.aliases;
  target.properties = def.config;
  target.platforms = def.platforms;
  target.variants = def.variants;

  for (product_name, spec) in def.products {
    let dirname = target.dirname.clone();
    let spec = Arc::new(spec);
    let product = Product::deferred(move |config: &BuildConfig| instantiate(&spec, config, &dirname));
    target.products.insert(product_name, product);
  }

  target
}

/// Resolve a production template against `config`.
fn instantiate(spec: &SpecDef, config: &BuildConfig, dirname: &Path) -> Result<ProductionSpec, ConfigError> {
  let resolve = |template: &str| {
    substitute(template, config).map_err(|source| ConfigError::Placeholder {
      context: format!("in '{}' for {}", template, config.name),
      source,
    })
  };

  let mut productions = ProductionSpec::new();
  for (path, def) in spec {
    let path = PathBuf::from(resolve(path)?);
    let Some(def) = def else {
      productions.insert(path, None);
      continue;
    };

    let mut production = Production::new(resolve(&def.command)?);
    if let Some(name) = &def.name {
      production = production.named(resolve(name)?);
    }
    production.sources = instantiate(&def.sources, config, dirname)?;
    for pattern in &def.glob {
      let pattern = resolve(pattern)?;
      let sources = glob_sources(&pattern, dirname).map_err(|message| ConfigError::InvalidProduct {
        config: config.name.clone(),
        message,
      })?;
      for source in sources {
        production.sources.entry(source).or_insert(None);
      }
    }
    production = match &def.digest {
      DigestDef::Status => production,
      DigestDef::Ignore => production.with_digest(IgnoreDigest),
      DigestDef::Depfile(depfile) => production.with_digest(DepfileDigest::new(dirname.join(resolve(depfile)?))),
    };

    productions.insert(path, Some(production));
  }

  Ok(productions)
}

/// Paths matching `pattern` under `dirname`, relative to `dirname`.
fn glob_sources(pattern: &str, dirname: &Path) -> Result<Vec<PathBuf>, String> {
  let full_pattern = dirname.join(pattern);
  let entries = glob::glob_with(&full_pattern.to_string_lossy(), match_options())
    .map_err(|err| format!("invalid source pattern '{}': {}", pattern, err))?;

  let mut sources = Vec::new();
  for entry in entries {
    let source = entry.map_err(|err| format!("failed to expand source pattern '{}': {}", pattern, err))?;
    let source = source.strip_prefix(dirname).map(Path::to_path_buf).unwrap_or(source);
    debug!(pattern = %pattern, source = %source.display(), "matched source");
    sources.push(source);
  }
  Ok(sources)
}
