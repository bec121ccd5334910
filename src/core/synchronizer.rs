// src/core/synchronizer.rs

//! # Project State Synchronizer
//!
//! Drives the three backing stores (the database, the proxy config directory
//! and the managed hosts region) through every project mutation and keeps
//! them consistent:
//!
//! - every stored project has exactly one `<name>.conf`;
//! - its domain and each of its aliases has exactly one hosts entry;
//! - no hostname is claimed twice, across domains and aliases of all projects.
//!
//! Stores are mutated one after another. Each completed step registers its
//! inverse on a [`Rollback`], so a failure part way through leaves the stores
//! as they were before the call. Nothing is cached: every operation reads the
//! current state from the repository first.

use crate::core::config_loader::Config;
use crate::core::database::SqliteRepository;
use crate::core::error::SyncError;
use crate::core::outcome::Outcome;
use crate::core::paths;
use crate::core::repository::Repository;
use crate::core::rollback::Rollback;
use crate::core::template::RESERVED_NAMES;
use crate::models::{Command, NewProject, Project};
use crate::system::files::{self, SystemFiles};
use crate::system::hosts::{HostsManager, InitStatus};
use crate::system::proxy::ProxyConfigManager;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$")
        .unwrap_or_else(|_| unreachable!("static name pattern"));
    static ref HOSTNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$")
        .unwrap_or_else(|_| unreachable!("static hostname pattern"));
}

type SyncResult<T> = Result<T, SyncError>;

/// The database, proxy configs and hosts region behind one API.
///
/// Mutations return an [`Outcome`] and undo their earlier steps when a later one fails.
#[derive(Debug)]
pub struct Synchronizer {
    config: Config,
    repo: Box<dyn Repository>,
    hosts: HostsManager,
    proxy: ProxyConfigManager,
    files: Arc<dyn SystemFiles>,
}

impl Synchronizer {
    /// Ensures the config directory exists, opens (and migrates) the database
    /// and wires the managers for `config.mode`.
    pub fn open(config: Config) -> SyncResult<Self> {
        paths::ensure_dir(&config.config_dir)?;
        let repo = SqliteRepository::open(&config.database_path)?;
        Ok(Self::new(config, Box::new(repo)))
    }

    /// Wires the managers for `config.mode` around an already open repository.
    pub fn new(config: Config, repo: Box<dyn Repository>) -> Self {
        let files = files::for_mode(config.mode);
        Self::with_files(config, repo, files)
    }

    /// Like [`Synchronizer::new`] with an explicit file access strategy.
    pub fn with_files(config: Config, repo: Box<dyn Repository>, files: Arc<dyn SystemFiles>) -> Self {
        let hosts = HostsManager::new(
            config.hosts_file.clone(),
            config.hosts_backup_dir.clone(),
            Arc::clone(&files),
        );
        let proxy = ProxyConfigManager::new(&config, Arc::clone(&files));
        Self {
            config,
            repo,
            hosts,
            proxy,
            files,
        }
    }

    /// The configuration the managers were built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying repository, for read-only callers such as the runner.
    pub fn repository(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// The hosts region manager.
    pub fn hosts(&self) -> &HostsManager {
        &self.hosts
    }

    /// The proxy config manager.
    pub fn proxy(&self) -> &ProxyConfigManager {
        &self.proxy
    }

    /// Fails unless system files can be written. Always passes in testing mode.
    pub fn require_privileges(&self) -> SyncResult<()> {
        if self.config.is_testing() {
            return Ok(());
        }
        self.files
            .ensure_privileges()
            .map_err(SyncError::Privileges)
    }

    // --- Setup ---

    /// Creates the config and proxy directories and the hosts region.
    /// Warns when already initialized.
    pub fn init(&self) -> Outcome {
        self.try_init().into()
    }

    fn try_init(&self) -> SyncResult<Outcome> {
        paths::ensure_dir(&self.config.config_dir)?;
        let proxy_dir_created = self.proxy.init()?;

        if self.hosts.init()? == InitStatus::AlreadyInitialized {
            return Ok(Outcome::warning("spinup is already initialized."));
        }

        let mut message = "Initialized spinup.".to_string();
        if proxy_dir_created && !self.config.is_testing() {
            message.push_str(&format!(
                "\nAdd the following line to the http block of your nginx config (usually /etc/nginx/nginx.conf), then reload nginx:\n\n    {}\n",
                self.proxy.include_directive()
            ));
        }
        Ok(Outcome::success(message))
    }

    // --- Queries ---

    /// All projects, ordered by name.
    pub fn list_projects(&self) -> SyncResult<Vec<Project>> {
        Ok(self.repo.list_projects()?)
    }

    /// The project called `name`.
    pub fn get_project(&self, name: &str) -> SyncResult<Project> {
        self.repo
            .get_project(name)?
            .ok_or_else(|| SyncError::ProjectNotFound(name.to_string()))
    }

    /// All commands, ordered by name.
    pub fn list_commands(&self) -> SyncResult<Vec<Command>> {
        Ok(self.repo.list_commands()?)
    }

    /// The command called `name`.
    pub fn get_command(&self, name: &str) -> SyncResult<Command> {
        self.repo
            .get_command(name)?
            .ok_or_else(|| SyncError::CommandNotFound(name.to_string()))
    }

    /// The working directory of a project. Fails if it was never set.
    pub fn get_project_dir(&self, name: &str) -> SyncResult<PathBuf> {
        self.get_project(name)?
            .dir
            .ok_or_else(|| SyncError::DirNotSet(name.to_string()))
    }

    // --- Project lifecycle ---

    /// Stores a project, writes its proxy config and adds its hosts entry.
    pub fn add_project(&self, name: &str, port: u16, command_names: &[String]) -> Outcome {
        self.try_add_project(name, port, command_names).into()
    }

    fn try_add_project(&self, name: &str, port: u16, command_names: &[String]) -> SyncResult<Outcome> {
        validate_name("project name", name)?;
        validate_port(port)?;
        let commands = self.resolve_commands(command_names)?;

        if self.repo.get_project(name)?.is_some() {
            return Err(SyncError::ProjectExists(name.to_string()));
        }
        self.ensure_port_free(port, None)?;
        let domain = self.config.domain_for(name);
        self.ensure_hostname_free(&domain)?;

        let mut rollback = Rollback::new("add project");

        rollback.run(self.proxy.add_config(name, &domain, port))?;
        rollback.push("remove proxy config", || Ok(self.proxy.remove_config(name)?));

        rollback.run(self.hosts.add_domain(&domain))?;
        rollback.push("remove hosts entry", || Ok(self.hosts.remove_domain(&domain)?));

        let new_project = NewProject {
            name: name.to_string(),
            domain: domain.clone(),
            port,
            dir: None,
            command_ids: commands.iter().map(|c| c.id).collect(),
        };
        rollback.run(self.repo.create_project(&new_project))?;
        rollback.commit();

        log::debug!("Added project '{}' on port {}", name, port);
        Ok(Outcome::success(format!(
            "Added project '{}' at http://{} (port {}).",
            name, domain, port
        )))
    }

    /// Deletes a project, its proxy config and the hosts entries of its
    /// domain and aliases. Artifacts that are already gone are skipped.
    pub fn remove_project(&self, name: &str) -> Outcome {
        self.try_remove_project(name).into()
    }

    fn try_remove_project(&self, name: &str) -> SyncResult<Outcome> {
        let project = self.get_project(name)?;
        let listed = self.hosts.domains()?;

        let mut rollback = Rollback::new("remove project");

        if self.proxy.exists(name) {
            let snapshot = self.proxy.read_snapshot(name)?;
            rollback.run(self.proxy.remove_config(name))?;
            rollback.push("restore proxy config", move || {
                Ok(self.proxy.restore_snapshot(name, &snapshot)?)
            });
        } else {
            log::warn!("Proxy config for '{}' is already gone", name);
        }

        for host in project.hostnames() {
            if !listed.iter().any(|h| h == host) {
                log::warn!("Hosts entry for '{}' is already gone", host);
                continue;
            }
            rollback.run(self.hosts.remove_domain(host))?;
            rollback.push("re-add hosts entry", move || Ok(self.hosts.add_domain(host)?));
        }

        rollback.run(self.repo.delete_project(name))?;
        rollback.commit();

        log::debug!("Removed project '{}'", name);
        Ok(Outcome::success(format!("Removed project '{}'.", name)))
    }

    /// Changes the port and replaces the command set.
    pub fn update_project(&self, name: &str, port: u16, command_names: &[String]) -> Outcome {
        self.try_update_project(name, port, command_names).into()
    }

    fn try_update_project(&self, name: &str, port: u16, command_names: &[String]) -> SyncResult<Outcome> {
        validate_port(port)?;
        let project = self.get_project(name)?;
        let commands = self.resolve_commands(command_names)?;
        self.ensure_port_free(port, Some(name))?;

        let snapshot = self.proxy.read_snapshot(name)?;
        let mut rollback = Rollback::new("update project");

        rollback.run(self.proxy.update_config(name, &project.domain, port))?;
        rollback.push("restore proxy config", || {
            Ok(self.proxy.restore_snapshot(name, &snapshot)?)
        });

        let ids: Vec<i64> = commands.iter().map(|c| c.id).collect();
        rollback.run(self.repo.update_project(name, port, &ids))?;
        rollback.commit();

        log::debug!("Updated project '{}'", name);
        Ok(Outcome::success(format!("Updated project '{}'.", name)))
    }

    /// Renames a project and moves its proxy config, primary domain and hosts entry.
    pub fn rename_project(&self, old: &str, new: &str) -> Outcome {
        self.try_rename_project(old, new).into()
    }

    fn try_rename_project(&self, old: &str, new: &str) -> SyncResult<Outcome> {
        validate_name("project name", new)?;
        let project = self.get_project(old)?;
        if old == new {
            return Ok(Outcome::info(format!("Project '{}' already has that name.", old)));
        }
        if self.repo.get_project(new)?.is_some() {
            return Err(SyncError::ProjectExists(new.to_string()));
        }
        let old_domain = project.domain;
        let new_domain = self.config.domain_for(new);
        self.ensure_hostname_free(&new_domain)?;

        let mut rollback = Rollback::new("rename project");

        rollback.run(self.proxy.rename_config(old, new))?;
        rollback.push("rename proxy config back", || {
            Ok(self.proxy.rename_config(new, old)?)
        });

        rollback.run(self.proxy.set_primary_host(new, &new_domain))?;
        rollback.push("restore server_name", || {
            Ok(self.proxy.set_primary_host(new, &old_domain)?)
        });

        if self.hosts.domains()?.iter().any(|h| h == &old_domain) {
            rollback.run(self.hosts.update_host(&old_domain, &new_domain))?;
            rollback.push("restore hosts entry", || {
                Ok(self.hosts.update_host(&new_domain, &old_domain)?)
            });
        } else {
            log::warn!("Hosts entry for '{}' is already gone, adding '{}'", old_domain, new_domain);
            rollback.run(self.hosts.add_domain(&new_domain))?;
            rollback.push("remove hosts entry", || Ok(self.hosts.remove_domain(&new_domain)?));
        }

        rollback.run(self.repo.rename_project(old, new, &new_domain))?;
        rollback.commit();

        log::debug!("Renamed project '{}' to '{}'", old, new);
        Ok(Outcome::success(format!(
            "Renamed project '{}' to '{}' (now at http://{}).",
            old, new, new_domain
        )))
    }

    /// Sets the working directory; the current directory when `dir` is `None`.
    pub fn set_project_dir(&self, name: &str, dir: Option<&Path>) -> Outcome {
        self.try_set_project_dir(name, dir).into()
    }

    fn try_set_project_dir(&self, name: &str, dir: Option<&Path>) -> SyncResult<Outcome> {
        self.get_project(name)?;
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => std::env::current_dir().map_err(SyncError::CurrentDir)?,
        };
        if !dir.is_dir() {
            return Err(SyncError::InvalidDir(dir.display().to_string()));
        }
        let dir = dunce::canonicalize(&dir)
            .map_err(|_| SyncError::InvalidDir(dir.display().to_string()))?;

        self.repo.set_project_dir(name, Some(&dir))?;
        log::debug!("Set dir of '{}' to {}", name, dir.display());
        Ok(Outcome::success(format!(
            "Set directory of project '{}' to '{}'.",
            name,
            dir.display()
        )))
    }

    // --- Project commands ---

    /// Associates an existing command with a project.
    pub fn add_command_to_project(&self, project: &str, command: &str) -> Outcome {
        self.try_add_command_to_project(project, command).into()
    }

    fn try_add_command_to_project(&self, project_name: &str, command_name: &str) -> SyncResult<Outcome> {
        let project = self.get_project(project_name)?;
        let command = self.get_command(command_name)?;
        if project.commands.iter().any(|c| c.id == command.id) {
            return Err(SyncError::CommandAlreadyAdded {
                command: command_name.to_string(),
                project: project_name.to_string(),
            });
        }
        self.repo.add_project_command(project.id, command.id)?;
        Ok(Outcome::success(format!(
            "Added command '{}' to project '{}'.",
            command_name, project_name
        )))
    }

    /// Drops the association of a command with a project.
    pub fn remove_command_from_project(&self, project: &str, command: &str) -> Outcome {
        self.try_remove_command_from_project(project, command).into()
    }

    fn try_remove_command_from_project(
        &self,
        project_name: &str,
        command_name: &str,
    ) -> SyncResult<Outcome> {
        let project = self.get_project(project_name)?;
        let command = self.get_command(command_name)?;
        if !self.repo.remove_project_command(project.id, command.id)? {
            return Ok(Outcome::info(format!(
                "Command '{}' is not part of project '{}'.",
                command_name, project_name
            )));
        }
        Ok(Outcome::success(format!(
            "Removed command '{}' from project '{}'.",
            command_name, project_name
        )))
    }

    // --- Domain aliases ---

    /// Adds an alias to the proxy config, the hosts region and the database.
    pub fn add_domain_alias(&self, project: &str, alias: &str) -> Outcome {
        self.try_add_domain_alias(project, alias).into()
    }

    fn try_add_domain_alias(&self, project_name: &str, alias: &str) -> SyncResult<Outcome> {
        validate_hostname(alias)?;
        let project = self.get_project(project_name)?;
        self.ensure_hostname_free(alias)?;

        let mut rollback = Rollback::new("add domain alias");

        rollback.run(self.proxy.add_domain_alias(project_name, alias))?;
        rollback.push("remove alias from proxy config", || {
            Ok(self.proxy.remove_domain_alias(project_name, alias)?)
        });

        rollback.run(self.hosts.add_domain(alias))?;
        rollback.push("remove hosts entry", || Ok(self.hosts.remove_domain(alias)?));

        rollback.run(self.repo.create_domain_alias(project.id, alias))?;
        rollback.commit();

        Ok(Outcome::success(format!(
            "Added domain alias '{}' to project '{}'.",
            alias, project_name
        )))
    }

    /// Removes an alias from every store. Artifacts that are already gone are skipped.
    pub fn remove_domain_alias(&self, project: &str, alias: &str) -> Outcome {
        self.try_remove_domain_alias(project, alias).into()
    }

    fn try_remove_domain_alias(&self, project_name: &str, alias: &str) -> SyncResult<Outcome> {
        let project = self.get_project(project_name)?;
        if !project.has_alias(alias) {
            return Err(SyncError::AliasNotFound {
                alias: alias.to_string(),
                project: project_name.to_string(),
            });
        }
        let listed = self.hosts.domains()?.iter().any(|h| h == alias);
        let served = self.proxy.exists(project_name)
            && self.proxy.server_names(project_name)?.iter().skip(1).any(|h| h == alias);

        let mut rollback = Rollback::new("remove domain alias");

        if served {
            rollback.run(self.proxy.remove_domain_alias(project_name, alias))?;
            rollback.push("re-add alias to proxy config", || {
                Ok(self.proxy.add_domain_alias(project_name, alias)?)
            });
        } else {
            log::warn!("Proxy config of '{}' no longer serves '{}'", project_name, alias);
        }

        if listed {
            rollback.run(self.hosts.remove_domain(alias))?;
            rollback.push("re-add hosts entry", || Ok(self.hosts.add_domain(alias)?));
        } else {
            log::warn!("Hosts entry for '{}' is already gone", alias);
        }

        rollback.run(self.repo.delete_domain_alias(project.id, alias))?;
        rollback.commit();

        Ok(Outcome::success(format!(
            "Removed domain alias '{}' from project '{}'.",
            alias, project_name
        )))
    }

    // --- Variables ---

    /// Adds a variable; built-in placeholder names are rejected.
    pub fn add_variable(&self, project: &str, name: &str, value: &str) -> Outcome {
        self.try_add_variable(project, name, value).into()
    }

    fn try_add_variable(&self, project_name: &str, name: &str, value: &str) -> SyncResult<Outcome> {
        validate_name("variable name", name)?;
        if RESERVED_NAMES.contains(&name) {
            return Err(SyncError::ReservedVariable(name.to_string()));
        }
        let project = self.get_project(project_name)?;
        if project.variable(name).is_some() {
            return Err(SyncError::VariableExists {
                name: name.to_string(),
                project: project_name.to_string(),
            });
        }
        self.repo.create_variable(project.id, name, value)?;
        Ok(Outcome::success(format!(
            "Added variable '{}' to project '{}'.",
            name, project_name
        )))
    }

    /// Removes a variable from a project.
    pub fn remove_variable(&self, project: &str, name: &str) -> Outcome {
        self.try_remove_variable(project, name).into()
    }

    fn try_remove_variable(&self, project_name: &str, name: &str) -> SyncResult<Outcome> {
        let project = self.get_project(project_name)?;
        let not_found = || SyncError::VariableNotFound {
            name: name.to_string(),
            project: project_name.to_string(),
        };
        if project.variable(name).is_none() {
            return Err(not_found());
        }
        if !self.repo.delete_variable(project.id, name)? {
            return Err(not_found());
        }
        Ok(Outcome::success(format!(
            "Removed variable '{}' from project '{}'.",
            name, project_name
        )))
    }

    // --- Command catalogue ---

    /// Stores a new command template.
    pub fn add_command(&self, name: &str, template: &str) -> Outcome {
        self.try_add_command(name, template).into()
    }

    fn try_add_command(&self, name: &str, template: &str) -> SyncResult<Outcome> {
        validate_name("command name", name)?;
        validate_template(template)?;
        if self.repo.get_command(name)?.is_some() {
            return Err(SyncError::CommandExists(name.to_string()));
        }
        self.repo.create_command(name, template)?;
        Ok(Outcome::success(format!("Added command '{}'.", name)))
    }

    /// Renames a command. Projects keep referencing it.
    pub fn rename_command(&self, old: &str, new: &str) -> Outcome {
        self.try_rename_command(old, new).into()
    }

    fn try_rename_command(&self, old: &str, new: &str) -> SyncResult<Outcome> {
        validate_name("command name", new)?;
        self.get_command(old)?;
        if old == new {
            return Ok(Outcome::info(format!("Command '{}' already has that name.", old)));
        }
        if self.repo.get_command(new)?.is_some() {
            return Err(SyncError::CommandExists(new.to_string()));
        }
        self.repo.rename_command(old, new)?;
        Ok(Outcome::success(format!(
            "Renamed command '{}' to '{}'.",
            old, new
        )))
    }

    /// Replaces a command's template.
    pub fn edit_command(&self, name: &str, template: &str) -> Outcome {
        self.try_edit_command(name, template).into()
    }

    fn try_edit_command(&self, name: &str, template: &str) -> SyncResult<Outcome> {
        validate_template(template)?;
        self.get_command(name)?;
        self.repo.edit_command(name, template)?;
        Ok(Outcome::success(format!("Updated command '{}'.", name)))
    }

    /// Deletes a command and its project associations.
    pub fn remove_command(&self, name: &str) -> Outcome {
        self.try_remove_command(name).into()
    }

    fn try_remove_command(&self, name: &str) -> SyncResult<Outcome> {
        self.get_command(name)?;
        self.repo.delete_command(name)?;
        Ok(Outcome::success(format!("Removed command '{}'.", name)))
    }

    // --- Helpers ---

    /// Looks up every name, reporting all unknown ones at once.
    fn resolve_commands(&self, names: &[String]) -> SyncResult<Vec<Command>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.repo.get_command(name)? {
                Some(command) => {
                    if !found.iter().any(|c: &Command| c.id == command.id) {
                        found.push(command);
                    }
                }
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(SyncError::UnknownCommands(missing))
        }
    }

    fn ensure_port_free(&self, port: u16, except: Option<&str>) -> SyncResult<()> {
        match self.repo.project_with_port(port)? {
            Some(owner) if Some(owner.as_str()) != except => {
                Err(SyncError::PortInUse { port, project: owner })
            }
            _ => Ok(()),
        }
    }

    fn ensure_hostname_free(&self, hostname: &str) -> SyncResult<()> {
        let claimed = self.repo.claimed_hostnames()?;
        match claimed
            .into_iter()
            .find(|c| c.hostname.eq_ignore_ascii_case(hostname))
        {
            Some(owner) => Err(SyncError::HostnameTaken {
                hostname: hostname.to_string(),
                usage: if owner.is_alias { "alias" } else { "domain" },
                project: owner.project_name,
            }),
            None => Ok(()),
        }
    }
}

fn validate_name(what: &'static str, value: &str) -> SyncResult<()> {
    if NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(SyncError::InvalidInput {
            what,
            value: value.to_string(),
        })
    }
}

fn validate_hostname(value: &str) -> SyncResult<()> {
    if HOSTNAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(SyncError::InvalidInput {
            what: "hostname",
            value: value.to_string(),
        })
    }
}

fn validate_port(port: u16) -> SyncResult<()> {
    if port == 0 {
        return Err(SyncError::InvalidInput {
            what: "port",
            value: port.to_string(),
        });
    }
    Ok(())
}

fn validate_template(template: &str) -> SyncResult<()> {
    if template.trim().is_empty() {
        return Err(SyncError::InvalidInput {
            what: "command",
            value: template.to_string(),
        });
    }
    Ok(())
}
