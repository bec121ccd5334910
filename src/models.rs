// src/models.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// --- STORED ENTITIES ---
// Rows of the relational store, as the repository hands them out.

/// A reusable, named shell-command template.
///
/// The template may contain `{{port}}`, `{{domain}}` and `{{<variable>}}`
/// placeholders that are filled in from the project it runs for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Row id.
    pub id: i64,
    /// Unique name, used on the command line.
    pub name: String,
    /// The template.
    pub command: String,
}

/// A per-project key/value substituted into command templates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Row id.
    pub id: i64,
    /// Placeholder name, unique per project.
    pub name: String,
    /// Substituted value.
    pub value: String,
    /// Owning project.
    pub project_id: i64,
}

/// An additional hostname routed to a project, besides its primary domain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DomainAlias {
    /// Row id.
    pub id: i64,
    /// The hostname.
    pub value: String,
    /// Owning project.
    pub project_id: i64,
}

/// The bare `projects` row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    /// Row id.
    pub id: i64,
    /// Unique project name.
    pub name: String,
    /// Primary domain, `<name>.<tld>`.
    pub domain: String,
    /// Port the proxy forwards to.
    pub port: u16,
    /// Working directory of the project's commands.
    pub dir: Option<PathBuf>,
}

/// A project together with everything it owns.
///
/// This is always read fresh from the repository; nothing caches it between
/// operations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Row id.
    pub id: i64,
    /// Unique project name.
    pub name: String,
    /// Primary domain, `<name>.<tld>`.
    pub domain: String,
    /// Port the proxy forwards to. Unique across projects.
    pub port: u16,
    /// Working directory of the project's commands; the caller's when unset.
    pub dir: Option<PathBuf>,
    /// Associated commands, ordered by name.
    pub commands: Vec<Command>,
    /// Variables, ordered by name.
    pub variables: Vec<Variable>,
    /// Aliases in insertion order.
    pub domain_aliases: Vec<DomainAlias>,
}

impl Project {
    /// Builds the full view from a row and its owned collections.
    pub fn from_record(
        record: ProjectRecord,
        commands: Vec<Command>,
        variables: Vec<Variable>,
        domain_aliases: Vec<DomainAlias>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            domain: record.domain,
            port: record.port,
            dir: record.dir,
            commands,
            variables,
            domain_aliases,
        }
    }

    /// Every hostname this project claims: its primary domain first, then its aliases.
    pub fn hostnames(&self) -> Vec<&str> {
        std::iter::once(self.domain.as_str())
            .chain(self.domain_aliases.iter().map(|a| a.value.as_str()))
            .collect()
    }

    /// Names of the associated commands.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    /// The variable called `name`, if set.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// True if `value` is one of this project's aliases.
    pub fn has_alias(&self, value: &str) -> bool {
        self.domain_aliases.iter().any(|a| a.value == value)
    }
}

// --- WRITE MODELS ---

/// Everything needed to insert a new project row with its command associations.
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Project name.
    pub name: String,
    /// Primary domain.
    pub domain: String,
    /// Proxied port.
    pub port: u16,
    /// Optional working directory.
    pub dir: Option<PathBuf>,
    /// Commands to associate.
    pub command_ids: Vec<i64>,
}

/// A hostname claimed by some project, either as its domain or as an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedHostname {
    /// The hostname.
    pub hostname: String,
    /// Project that claims it.
    pub project_name: String,
    /// True for an alias, false for a primary domain.
    pub is_alias: bool,
}
