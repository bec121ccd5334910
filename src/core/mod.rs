// src/core/mod.rs

//! Configuration, persistence and the operations built on them.

/// Layered configuration: defaults, `config.toml` and environment.
pub mod config_loader;
/// SQLite implementation of the repository.
pub mod database;
/// Errors of synchronized operations and their categories.
pub mod error;
/// User-facing result of a management operation.
pub mod outcome;
/// Path expansion and directory validation.
pub mod paths;
/// Storage trait for projects, commands, variables and aliases.
pub mod repository;
/// Compensation stack for multi-store mutations.
pub mod rollback;
/// Concurrent execution of a project's commands.
pub mod runner;
/// Keeps the database, proxy configs and hosts file consistent.
pub mod synchronizer;
/// `{{name}}` placeholder substitution.
pub mod template;
