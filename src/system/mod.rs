//! # System Interaction Layer
//!
//! Everything that touches the machine outside the database: the shared
//! hosts file, the reverse proxy's config directory, privileged file writes
//! and the processes of a running project.
//!
//! ## Modules
//!
//! - **`files`**: file writes and commands behind one trait, performed
//!   directly or through `sudo` depending on the configured mode.
//! - **`hosts`**: the marker-delimited region of the hosts file owned by spinup.
//! - **`proxy`**: one nginx `server` block per project.
//! - **`process_group`**: spawning a command as its own process group and
//!   terminating the whole group.
//! - **`executor`**: launching a command line with labeled, line-buffered output.
//! - **`signals`**: stop requests and forwarding of OS interrupts into them.

/// Labeled command output.
pub mod executor;
/// Direct or elevated file access.
pub mod files;
/// Hosts file region manager.
pub mod hosts;
/// Process groups and their termination.
pub mod process_group;
/// nginx config files.
pub mod proxy;
/// Stop requests and OS signal forwarding.
pub mod signals;
