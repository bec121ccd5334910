// src/core/repository.rs

//! Data access contract for projects, commands, variables and domain aliases.
//!
//! Implementations are plain CRUD. Cross-store rules (hostname uniqueness
//! against the hosts file, proxy configs) live in the synchronizer.

use crate::models::{ClaimedHostname, Command, DomainAlias, NewProject, Project, Variable};
use std::path::Path;
use thiserror::Error;

/// Failure of a repository call.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Any other SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[source] rusqlite::Error),
    /// The database file could not be opened.
    #[error("Could not open database '{path}': {source}")]
    Open {
        /// Database file path.
        path: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    #[error(
        "Database schema version {found} is newer than this version of spinup supports ({supported}). Please upgrade."
    )]
    /// The file was written by a newer spinup.
    SchemaTooNew {
        /// Version stored in the file.
        found: i64,
        /// Highest version this build knows.
        supported: i64,
    },
    /// A migration step failed and was rolled back.
    #[error("Migration to schema version {version} failed: {source}")]
    Migration {
        /// Schema version being migrated to.
        version: i64,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// A unique or foreign-key constraint rejected the write.
    #[error("Constraint violated: {0}")]
    Conflict(String),
    /// The row to change does not exist.
    #[error("{0} not found in the database.")]
    NotFound(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(message.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => Self::Sqlite(e),
        }
    }
}

/// Result of a repository call.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Storage for projects, commands, variables and domain aliases.
pub trait Repository: Send + std::fmt::Debug {
    // --- Projects ---
    /// All projects, ordered by name.
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    /// The project with its commands, variables and aliases.
    fn get_project(&self, name: &str) -> RepoResult<Option<Project>>;
    /// Name of the project listening on `port`, if any.
    fn project_with_port(&self, port: u16) -> RepoResult<Option<String>>;
    /// Inserts the row and its command associations atomically.
    fn create_project(&self, project: &NewProject) -> RepoResult<Project>;
    /// Sets the port and replaces the command associations atomically.
    fn update_project(&self, name: &str, port: u16, command_ids: &[i64]) -> RepoResult<()>;
    /// Renames the project and sets its new primary domain.
    fn rename_project(&self, old: &str, new: &str, new_domain: &str) -> RepoResult<()>;
    /// Sets or clears the working directory.
    fn set_project_dir(&self, name: &str, dir: Option<&Path>) -> RepoResult<()>;
    /// Deletes the row; variables, aliases and associations go with it.
    fn delete_project(&self, name: &str) -> RepoResult<()>;
    /// Associates an existing command with the project.
    fn add_project_command(&self, project_id: i64, command_id: i64) -> RepoResult<()>;
    /// Returns `false` if the association did not exist.
    fn remove_project_command(&self, project_id: i64, command_id: i64) -> RepoResult<bool>;

    // --- Commands ---
    /// All commands, ordered by name.
    fn list_commands(&self) -> RepoResult<Vec<Command>>;
    /// The command called `name`, if any.
    fn get_command(&self, name: &str) -> RepoResult<Option<Command>>;
    /// Inserts a command template.
    fn create_command(&self, name: &str, command: &str) -> RepoResult<Command>;
    /// Renames a command; project associations follow.
    fn rename_command(&self, old: &str, new: &str) -> RepoResult<()>;
    /// Replaces the template of a command.
    fn edit_command(&self, name: &str, command: &str) -> RepoResult<()>;
    /// Deletes the command and its project associations.
    fn delete_command(&self, name: &str) -> RepoResult<()>;

    // --- Variables ---
    /// Inserts a variable for the project.
    fn create_variable(&self, project_id: i64, name: &str, value: &str) -> RepoResult<Variable>;
    /// Returns `false` if the variable did not exist.
    fn delete_variable(&self, project_id: i64, name: &str) -> RepoResult<bool>;

    // --- Domain aliases ---
    /// Inserts an alias for the project.
    fn create_domain_alias(&self, project_id: i64, value: &str) -> RepoResult<DomainAlias>;
    /// Returns `false` if the alias did not exist.
    fn delete_domain_alias(&self, project_id: i64, value: &str) -> RepoResult<bool>;

    /// Every primary domain and alias currently stored.
    fn claimed_hostnames(&self) -> RepoResult<Vec<ClaimedHostname>>;
}
