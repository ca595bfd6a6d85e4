//! Production graph, build log and incremental invalidation.
//!
//! A product's production tree is flattened into batches, one per tree depth,
//! ordered so the deepest productions run first. The build log from the
//! previous session is then used to drop every task whose inputs are unchanged.
//!
//! # Submodules
//!
//! - [`graph`] - Flattening production trees into batches
//! - [`log`] - The persisted build log
//! - [`invalidate`] - Deciding which commands can be skipped

pub mod graph;
pub mod invalidate;
pub mod log;
mod types;

pub use graph::{ProductionGraph, SourceRegistry};
pub use invalidate::{prune_redundant_tasks, redundant_commands};
pub use log::{BuildLog, BuildLogEntry, BuildLogError};
pub use types::*;
