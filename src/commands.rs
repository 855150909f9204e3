//! Commands for the testpeer CLI.

/// Command for running the test server.
pub mod serve;
