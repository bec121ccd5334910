//! # spinup
//!
//! Local development environment orchestration. Each project gets a local
//! domain (`<name>.test`) routed through nginx to its port, a set of shell
//! commands started together, and project variables substituted into those
//! commands.
//!
//! - [`core::synchronizer::Synchronizer`] keeps the database, the proxy
//!   configs and the hosts file consistent through every mutation.
//! - [`core::runner::Runner`] runs a project's commands concurrently until
//!   they exit or the user interrupts.

/// Command-line front end: argument routing, handlers and terminal output.
pub mod cli;
/// Names, file names and fixed values shared across the crate.
pub mod constants;
/// Configuration, persistence, synchronization and the command runner.
pub mod core;
/// Plain data records stored in the database.
pub mod models;
/// Hosts file, proxy configs, privileged file access and processes.
pub mod system;
