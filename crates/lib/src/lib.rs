//! lathe-lib: incremental build orchestration.
//!
//! A product is a tree of productions: output paths mapped to the shell
//! command that generates them and the inputs they read. This crate turns that
//! tree into batches of commands, skips the ones a previous build already
//! brought up to date, runs the rest with bounded parallelism and records what
//! it learned in a build log for next time.
//!
//! - [`buildfile`]: JSON buildfiles declaring targets, platforms and architectures
//! - [`config`]: targets, registries and build-configuration resolution
//! - [`build`]: production trees, the production graph, build log and invalidation
//! - [`digest`]: turning command results into diagnostics and discovered dependencies
//! - [`session`]: one incremental build of one configuration
//! - [`scheduler`]: bounded-parallel execution of job groups
//! - [`execute`]: running shell commands

pub mod build;
pub mod buildfile;
pub mod config;
pub mod consts;
pub mod digest;
pub mod execute;
pub mod placeholder;
pub mod scheduler;
pub mod session;
pub mod util;
