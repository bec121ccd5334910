// src/cli/handlers/mod.rs

//! One module per top-level action.

/// `spinup command ...`
pub mod command;
/// Helpers shared by the handlers.
pub mod commons;
/// `spinup domain-alias ...`
pub mod domain_alias;
/// `spinup init`
pub mod init;
/// `spinup project ...`
pub mod project;
/// `spinup run` and the bare `spinup <project>` shortcut.
pub mod run;
/// `spinup variable ...`
pub mod variable;
