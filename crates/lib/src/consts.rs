//! Names and locations shared across the crate.

/// Application name, used for the environment variable prefix.
pub const APP_NAME: &str = "lathe";

/// Buildfile searched for when none is given on the command line.
pub const DEFAULT_BUILDFILE: &str = "buildfile.json";

/// Directory (next to the buildfile) that receives build outputs.
pub const BUILD_DIR: &str = "build";

/// Directory inside [`BUILD_DIR`] that holds per-configuration caches.
pub const CACHE_DIR: &str = ".cache";

/// File name of the persisted build log inside a configuration's cache directory.
pub const BUILD_LOG_FILENAME: &str = ".buildlog";

/// Environment variable overriding the shell used to run commands.
pub const SHELL_ENV: &str = "LATHE_SHELL";
