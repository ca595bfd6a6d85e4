//! Platforms, architectures and host detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::registry::Registry;

/// Configuration values contributed by a platform, architecture, target or variant.
pub type Properties = BTreeMap<String, String>;

/// A CPU architecture a platform can be built for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
  #[serde(default, flatten)]
  pub properties: Properties,
}

/// An operating system family and the architectures it supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
  pub architectures: Vec<String>,

  #[serde(default, flatten)]
  pub properties: Properties,
}

impl Platform {
  pub fn new<I, S>(architectures: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      architectures: architectures.into_iter().map(Into::into).collect(),
      properties: Properties::new(),
    }
  }

  pub fn supports(&self, architecture: &str) -> bool {
    self.architectures.iter().any(|a| a == architecture)
  }
}

const ARCHITECTURES: &[&str] = &[
  "arm", "arm64", "mips", "mipsel", "ppc", "ppc64", "s390", "s390x", "x86", "x86_64",
];

const MOBILE_AND_DESKTOP: &[&str] = &["arm", "arm64", "x86", "x86_64"];

/// The built-in architectures.
pub fn default_architectures() -> Registry<Architecture> {
  Registry::with_builtins(
    "architectures",
    ARCHITECTURES.iter().map(|name| (name.to_string(), Architecture::default())),
  )
}

/// The built-in platforms.
pub fn default_platforms() -> Registry<Platform> {
  let builtins: [(&str, &[&str]); 5] = [
    ("android", MOBILE_AND_DESKTOP),
    ("ios", MOBILE_AND_DESKTOP),
    ("macos", &["x86", "x86_64"]),
    ("windows", MOBILE_AND_DESKTOP),
    ("linux", ARCHITECTURES),
  ];
  Registry::with_builtins(
    "platforms",
    builtins
      .into_iter()
      .map(|(name, architectures)| (name.to_string(), Platform::new(architectures.iter().copied()))),
  )
}

/// Detect the platform this process runs on.
///
/// Returns `None` if the OS has no platform name.
pub fn host_platform() -> Option<&'static str> {
  platform_name(std::env::consts::OS)
}

/// Detect the architecture this process runs on.
///
/// Returns `None` if the CPU has no architecture name.
pub fn host_architecture() -> Option<&'static str> {
  architecture_name(std::env::consts::ARCH)
}

fn platform_name(os: &str) -> Option<&'static str> {
  match os {
    "android" => Some("android"),
    "ios" => Some("ios"),
    "macos" => Some("macos"),
    "windows" => Some("windows"),
    "linux" => Some("linux"),
    "freebsd" => Some("freebsd"),
    "openbsd" => Some("openbsd"),
    _ => None,
  }
}

fn architecture_name(arch: &str) -> Option<&'static str> {
  match arch {
    "arm" => Some("arm"),
    "aarch64" => Some("arm64"),
    "mips" => Some("mips"),
    "powerpc" => Some("ppc"),
    "powerpc64" => Some("ppc64"),
    "s390x" => Some("s390x"),
    "x86" => Some("x86"),
    "x86_64" => Some("x86_64"),
    _ => None,
  }
}
