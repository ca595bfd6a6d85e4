//! CLI integration tests: the `lathe` binary run against temporary projects.

mod common;

#[cfg(unix)]
mod build_tests;
