//! Library integration tests: whole sessions run against a temporary project.


#[cfg(unix)]
mod session_tests;
