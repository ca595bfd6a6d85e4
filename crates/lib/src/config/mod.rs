//! Build targets and build-configuration resolution.
//!
//! A build configuration is one combination of target, product, platform,
//! architecture and (optionally) variant, named
//! `target.product.platform.architecture[.variant]`. Resolving a name yields a
//! [`BuildConfig`] whose properties merge everything the combination
//! contributes.
//!
//! Registries are ordinary values carried in a [`ConfigContext`]; nothing here
//! is global.

mod platform;
mod registry;
mod target;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{BUILD_DIR, BUILD_LOG_FILENAME, CACHE_DIR};
use crate::placeholder::{PlaceholderError, Resolver};

pub use platform::{
  Architecture, Platform, Properties, default_architectures, default_platforms, host_architecture, host_platform,
};
pub use registry::Registry;
pub use target::{BuildTarget, find_config};

/// Errors in target definitions and configuration names.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot replace {kind}.{name}\n    defined here: {defined_in}\n    redefined here: {redefined_in}")]
  AlreadyExists {
    kind: &'static str,
    name: String,
    defined_in: String,
    redefined_in: String,
  },

  #[error("duplicate key '{key}' in configuration {config}")]
  DuplicateKey { config: String, key: String },

  #[error("unknown configuration: {0}")]
  UnknownConfig(String),

  #[error("unknown product '{product}' in target {target}")]
  UnknownProduct { target: String, product: String },

  #[error("unknown platform: {0}")]
  UnknownPlatform(String),

  #[error("unknown architecture '{architecture}' for platform {platform}")]
  UnknownArchitecture { platform: String, architecture: String },

  #[error("unknown variant '{variant}' in target {target}")]
  UnknownVariant { target: String, variant: String },

  #[error("{context}: {source}")]
  Placeholder {
    context: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("invalid product for {config}: {message}")]
  InvalidProduct { config: String, message: String },
}

/// Everything configuration resolution needs besides the targets themselves.
#[derive(Debug, Clone)]
pub struct ConfigContext {
  pub platforms: Registry<Platform>,
  pub architectures: Registry<Architecture>,
  /// Absolute directory holding every configuration's build directory.
  pub builddir: PathBuf,
  /// Absolute directory holding every configuration's cache directory.
  pub cachedir: PathBuf,
}

impl ConfigContext {
  /// Built-in platforms and architectures, building under `<project_dir>/build`.
  pub fn new(project_dir: &Path) -> Self {
    let builddir = project_dir.join(BUILD_DIR);
    Self {
      platforms: default_platforms(),
      architectures: default_architectures(),
      cachedir: builddir.join(CACHE_DIR),
      builddir,
    }
  }
}

/// One resolved build configuration.
///
/// `builddir` and `cachedir` are relative to the target's directory, which is
/// where the target's commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
  pub name: String,
  pub target: String,
  pub product: String,
  pub platform: String,
  pub architecture: String,
  pub variant: Option<String>,
  pub builddir: PathBuf,
  pub cachedir: PathBuf,
  pub properties: Properties,
}

/// Keys every configuration defines itself; properties may not redefine them.
pub const BUILTIN_KEYS: &[&str] = &[
  "name",
  "target",
  "product",
  "platform",
  "architecture",
  "variant",
  "builddir",
  "cachedir",
];

impl BuildConfig {
  /// Look up a configuration value: a built-in key or a merged property.
  pub fn get(&self, key: &str) -> Option<&str> {
    match key {
      "name" => Some(&self.name),
      "target" => Some(&self.target),
      "product" => Some(&self.product),
      "platform" => Some(&self.platform),
      "architecture" => Some(&self.architecture),
      "variant" => self.variant.as_deref(),
      "builddir" => self.builddir.to_str(),
      "cachedir" => self.cachedir.to_str(),
      _ => self.properties.get(key).map(String::as_str),
    }
  }

  /// Location of the build log, relative to the target's directory.
  pub fn build_log_path(&self) -> PathBuf {
    self.cachedir.join(BUILD_LOG_FILENAME)
  }

  /// Merge `properties` into this configuration.
  ///
  /// `name` keys are skipped.
  ///
  /// # Errors
  ///
  /// [`ConfigError::DuplicateKey`] if a key is already defined.
  pub(crate) fn merge(&mut self, properties: &Properties) -> Result<(), ConfigError> {
    for (key, value) in properties {
      if key == "name" {
        continue;
      }
      if BUILTIN_KEYS.contains(&key.as_str()) || self.properties.contains_key(key) {
        return Err(ConfigError::DuplicateKey {
          config: self.name.clone(),
          key: key.clone(),
        });
      }
      self.properties.insert(key.clone(), value.clone());
    }
    Ok(())
  }
}

impl Resolver for BuildConfig {
  fn resolve(&self, key: &str) -> Result<&str, PlaceholderError> {
    self.get(key).ok_or_else(|| PlaceholderError::Unresolved(key.to_string()))
  }
}
