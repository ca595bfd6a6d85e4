use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::platform::Properties;
use super::registry::Registry;
use super::{BuildConfig, ConfigContext, ConfigError};
use crate::build::Product;
use crate::util::fs::relative_path;

/// A named set of products and the platforms, architectures and variants to build them for.
#[derive(Debug, Clone)]
pub struct BuildTarget {
  pub name: String,
  /// Buildfile defining this target.
  pub filename: PathBuf,
  /// Directory of `filename`; the target's commands run here.
  pub dirname: PathBuf,
  /// Short names for full configuration names.
  pub aliases: BTreeMap<String, String>,
  pub properties: Properties,
  pub products: BTreeMap<String, Product>,
  /// Platforms to build for; every registered platform when `None`.
  pub platforms: Option<Vec<String>>,
  pub variants: BTreeMap<String, Properties>,
}

impl BuildTarget {
  pub fn new(name: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
    let filename = filename.into();
    let dirname = filename.parent().map(Path::to_path_buf).unwrap_or_default();
    Self {
      name: name.into(),
      filename,
      dirname,
      aliases: BTreeMap::new(),
      properties: Properties::new(),
      products: BTreeMap::new(),
      platforms: None,
      variants: BTreeMap::new(),
    }
  }

  pub fn with_product(mut self, name: impl Into<String>, product: impl Into<Product>) -> Self {
    self.products.insert(name.into(), product.into());
    self
  }

  pub fn with_alias(mut self, alias: impl Into<String>, config: impl Into<String>) -> Self {
    self.aliases.insert(alias.into(), config.into());
    self
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.platforms = Some(platforms.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_variant(mut self, name: impl Into<String>, properties: Properties) -> Self {
    self.variants.insert(name.into(), properties);
    self
  }

  fn platform_names<'a>(&'a self, context: &'a ConfigContext) -> Vec<&'a str> {
    match &self.platforms {
      Some(platforms) => platforms.iter().map(String::as_str).collect(),
      None => context.platforms.names().collect(),
    }
  }

  /// Every configuration name this target can build, in definition order.
  pub fn config_names(&self, context: &ConfigContext) -> Vec<String> {
    let mut names = Vec::new();
    for product in self.products.keys() {
      for platform_name in self.platform_names(context) {
        let Some(platform) = context.platforms.get(platform_name) else {
          continue;
        };
        for architecture in &platform.architectures {
          let base = format!("{}.{}.{}.{}", self.name, product, platform_name, architecture);
          if self.variants.is_empty() {
            names.push(base);
          } else {
            names.extend(self.variants.keys().map(|variant| format!("{}.{}", base, variant)));
          }
        }
      }
    }
    names
  }

  /// Resolve a full configuration name of this target.
  ///
  /// # Errors
  ///
  /// Fails if any component of the name is unknown to this target or the
  /// context, or if merging properties defines a key twice.
  pub fn resolve(&self, config_name: &str, context: &ConfigContext) -> Result<BuildConfig, ConfigError> {
    let unknown = || ConfigError::UnknownConfig(config_name.to_string());

    let parts: Vec<&str> = config_name.split('.').collect();
    let (product, platform_name, architecture_name, variant_name) = match parts.as_slice() {
      [target, product, platform, architecture] if *target == self.name => (*product, *platform, *architecture, None),
      [target, product, platform, architecture, variant] if *target == self.name => {
        (*product, *platform, *architecture, Some(*variant))
      }
      _ => return Err(unknown()),
    };

    if !self.products.contains_key(product) {
      return Err(ConfigError::UnknownProduct {
        target: self.name.clone(),
        product: product.to_string(),
      });
    }

    let platform = context
      .platforms
      .get(platform_name)
      .filter(|_| self.platform_names(context).contains(&platform_name))
      .ok_or_else(|| ConfigError::UnknownPlatform(platform_name.to_string()))?;

    let architecture = context
      .architectures
      .get(architecture_name)
      .filter(|_| platform.supports(architecture_name))
      .ok_or_else(|| ConfigError::UnknownArchitecture {
        platform: platform_name.to_string(),
        architecture: architecture_name.to_string(),
      })?;

    let variant = match (variant_name, self.variants.is_empty()) {
      (None, true) => None,
      (Some(name), false) => {
        let properties = self.variants.get(name).ok_or_else(|| ConfigError::UnknownVariant {
          target: self.name.clone(),
          variant: name.to_string(),
        })?;
        Some((name, properties))
      }
      _ => return Err(unknown()),
    };

    let mut config = BuildConfig {
      name: config_name.to_string(),
      target: self.name.clone(),
      product: product.to_string(),
      platform: platform_name.to_string(),
      architecture: architecture_name.to_string(),
      variant: variant.map(|(name, _)| name.to_string()),
      builddir: relative_path(&self.dirname, &context.builddir).join(config_name),
      cachedir: relative_path(&self.dirname, &context.cachedir).join(config_name),
      properties: Properties::new(),
    };

    config.merge(&self.properties)?;
    config.merge(&platform.properties)?;
    config.merge(&architecture.properties)?;
    if let Some((_, properties)) = variant {
      config.merge(properties)?;
    }

    debug!(config = %config.name, builddir = %config.builddir.display(), "resolved build configuration");
    Ok(config)
  }

  /// The product a resolved configuration builds.
  pub fn product(&self, config: &BuildConfig) -> Result<&Product, ConfigError> {
    self.products.get(&config.product).ok_or_else(|| ConfigError::UnknownProduct {
      target: self.name.clone(),
      product: config.product.clone(),
    })
  }
}

/// Resolve a configuration name or alias across all `targets`.
pub fn find_config<'a>(
  targets: &'a Registry<BuildTarget>,
  name: &str,
  context: &ConfigContext,
) -> Result<(&'a BuildTarget, BuildConfig), ConfigError> {
  let full_name = targets
    .iter()
    .find_map(|(_, target)| target.aliases.get(name))
    .map(String::as_str)
    .unwrap_or(name);

  let target_name = full_name.split('.').next().unwrap_or_default();
  let target = targets
    .get(target_name)
    .ok_or_else(|| ConfigError::UnknownConfig(name.to_string()))?;

  let config = target.resolve(full_name, context)?;
  Ok((target, config))
}
