// src/core/error.rs

use crate::core::config_loader::ConfigError;
use crate::core::paths::PathError;
use crate::core::repository::RepositoryError;
use crate::system::hosts::HostsError;
use crate::system::proxy::ProxyError;
use std::io;
use thiserror::Error;

/// Coarse classification used by front ends to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input: duplicate names, ports or hostnames, unknown references, bad directories.
    Validation,
    /// Filesystem, database or privilege failures.
    Resource,
    /// A store does not look the way the others say it should.
    Consistency,
    /// A subprocess could not be started.
    Process,
}

/// Failure of a synchronized operation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No project has this name.
    #[error("Project '{0}' not found.")]
    ProjectNotFound(String),
    /// A project with this name already exists.
    #[error("Project '{0}' already exists.")]
    ProjectExists(String),
    /// Another project listens on the port.
    #[error("Port {port} is already used by project '{project}'.")]
    PortInUse {
        /// The requested port.
        port: u16,
        /// Current owner of the port.
        project: String,
    },
    /// The hostname is some project's domain or alias already.
    #[error("Hostname '{hostname}' is already used as the {usage} of project '{project}'.")]
    HostnameTaken {
        /// The requested hostname.
        hostname: String,
        /// `"domain"` or `"alias"`.
        usage: &'static str,
        /// Current owner of the hostname.
        project: String,
    },
    /// Names that match no stored command.
    #[error("Unknown command(s): {}.", .0.join(", "))]
    UnknownCommands(Vec<String>),
    /// No command has this name.
    #[error("Command '{0}' not found.")]
    CommandNotFound(String),
    /// A command with this name already exists.
    #[error("Command '{0}' already exists.")]
    CommandExists(String),
    /// The project already references the command.
    #[error("Command '{command}' is already added to project '{project}'.")]
    CommandAlreadyAdded {
        /// Command name.
        command: String,
        /// Project name.
        project: String,
    },
    /// The project already has a variable with this name.
    #[error("Variable '{name}' already exists for project '{project}'.")]
    VariableExists {
        /// Variable name.
        name: String,
        /// Project name.
        project: String,
    },
    /// The project has no variable with this name.
    #[error("Variable '{name}' not found for project '{project}'.")]
    VariableNotFound {
        /// Variable name.
        name: String,
        /// Project name.
        project: String,
    },
    /// The name collides with a built-in placeholder.
    #[error("'{0}' is reserved and cannot be used as a variable name.")]
    ReservedVariable(String),
    /// The project has no such alias.
    #[error("Domain alias '{alias}' not found for project '{project}'.")]
    AliasNotFound {
        /// Alias hostname.
        alias: String,
        /// Project name.
        project: String,
    },
    /// The project has no working directory.
    #[error("Directory of project '{0}' is not set.")]
    DirNotSet(String),
    /// The path does not name an existing directory.
    #[error("'{0}' is not an existing directory.")]
    InvalidDir(String),
    /// A name, port, hostname or template failed validation.
    #[error("Invalid {what} '{value}'.")]
    InvalidInput {
        /// What was being validated, e.g. `"port"`.
        what: &'static str,
        /// The rejected value.
        value: String,
    },
    /// The current directory could not be read.
    #[error("Could not determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),
    /// Elevated file access is unavailable.
    #[error("this command requires sudo")]
    Privileges(#[source] io::Error),
    /// Hosts file failure.
    #[error(transparent)]
    Hosts(#[from] HostsError),
    /// Proxy config failure.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    /// Database failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Path resolution failure.
    #[error(transparent)]
    Path(#[from] PathError),
    /// The operation failed and undoing its earlier steps failed too.
    #[error("{source} Rollback incomplete: {}.", .failures.join("; "))]
    RollbackIncomplete {
        /// The failure that triggered the rollback.
        source: Box<SyncError>,
        /// One `"<step>: <error>"` entry per failed compensation.
        failures: Vec<String>,
    },
}

impl SyncError {
    /// How a front end should present this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProjectNotFound(_)
            | Self::ProjectExists(_)
            | Self::PortInUse { .. }
            | Self::HostnameTaken { .. }
            | Self::UnknownCommands(_)
            | Self::CommandNotFound(_)
            | Self::CommandExists(_)
            | Self::CommandAlreadyAdded { .. }
            | Self::VariableExists { .. }
            | Self::VariableNotFound { .. }
            | Self::ReservedVariable(_)
            | Self::AliasNotFound { .. }
            | Self::DirNotSet(_)
            | Self::InvalidDir(_)
            | Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::CurrentDir(_) | Self::Privileges(_) | Self::Config(_) | Self::Path(_) => {
                ErrorCategory::Resource
            }
            Self::Hosts(e) => match e {
                HostsError::EmptyHost | HostsError::InvalidHost(_) => ErrorCategory::Validation,
                HostsError::SectionNotFound { .. }
                | HostsError::DuplicateEntry(_)
                | HostsError::EntryNotFound(_) => ErrorCategory::Consistency,
                HostsError::Backup { .. } | HostsError::Io { .. } => ErrorCategory::Resource,
            },
            Self::Proxy(e) => match e {
                ProxyError::Io { .. } => ErrorCategory::Resource,
                ProxyError::AlreadyExists(_)
                | ProxyError::NotFound(_)
                | ProxyError::ServerNameNotFound(_)
                | ProxyError::AliasExists { .. }
                | ProxyError::AliasNotFound { .. } => ErrorCategory::Consistency,
            },
            Self::Repository(e) => match e {
                RepositoryError::Conflict(_) => ErrorCategory::Validation,
                RepositoryError::NotFound(_) => ErrorCategory::Consistency,
                _ => ErrorCategory::Resource,
            },
            Self::RollbackIncomplete { source, .. } => source.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            SyncError::ProjectExists("app".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            SyncError::from(HostsError::SectionNotFound {
                program: "spinup".into()
            })
            .category(),
            ErrorCategory::Consistency
        );
        assert_eq!(
            SyncError::Privileges(io::Error::other("no")).category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_rollback_incomplete_keeps_original_first() {
        let err = SyncError::RollbackIncomplete {
            source: Box::new(SyncError::ProjectExists("app".into())),
            failures: vec!["remove proxy config: denied".into()],
        };

        assert!(err.to_string().starts_with("Project 'app' already exists."));
        assert!(err.to_string().contains("remove proxy config: denied"));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
