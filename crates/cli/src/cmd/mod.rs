mod build;
mod watch;

pub use build::{Invocation, cmd_build, cmd_list, locate_buildfile};
pub use watch::cmd_watch;
