//! Shared utilities.
//!
//! Filesystem probes used by the graph builder, the invalidation pass and the
//! session, plus test helpers.

pub mod fs;

#[cfg(test)]
pub mod testutil;
