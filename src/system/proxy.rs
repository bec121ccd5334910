// src/system/proxy.rs

//! Reverse Proxy Config Manager.
//!
//! One nginx server block per project, stored as `<project>.conf` in the
//! configured directory. The only line ever edited after creation is the
//! `server_name` line, whose space-separated host list holds the primary
//! domain first and the project's aliases after it.

use crate::constants::{LOOPBACK_ADDRESS, PROXY_CONFIG_EXTENSION};
use crate::core::config_loader::Config;
use crate::system::files::SystemFiles;
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

lazy_static! {
    static ref SERVER_NAME_RE: Regex = Regex::new(r"server_name\s+([^;]*);")
        .unwrap_or_else(|_| unreachable!("static server_name pattern"));
}

/// Failure of a proxy config operation.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The target file exists already.
    #[error("Proxy config '{0}' already exists.")]
    AlreadyExists(String),
    /// The project has no config file.
    #[error("Proxy config '{0}' does not exist.")]
    NotFound(String),
    /// The file has no parsable `server_name` line.
    #[error("No server_name line found in '{0}'.")]
    ServerNameNotFound(String),
    /// The alias is already on the `server_name` line.
    #[error("'{alias}' is already listed in '{path}'.")]
    AliasExists {
        /// The alias.
        alias: String,
        /// Config file path.
        path: String,
    },
    /// The alias is not on the `server_name` line.
    #[error("'{alias}' is not an alias in '{path}'.")]
    AliasNotFound {
        /// The alias.
        alias: String,
        /// Config file path.
        path: String,
    },
    /// Reading or writing the file failed.
    #[error("Could not {action} proxy config '{path}': {source}")]
    Io {
        /// What was attempted, e.g. `"write"`.
        action: &'static str,
        /// File or directory path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

type ProxyResult<T> = Result<T, ProxyError>;

/// Reads and writes `<project>.conf` files and reloads the proxy after each change.
#[derive(Debug, Clone)]
pub struct ProxyConfigManager {
    config_dir: PathBuf,
    reload_command: Vec<String>,
    reload_enabled: bool,
    files: Arc<dyn SystemFiles>,
}

impl ProxyConfigManager {
    /// Builds the manager; reloads are disabled in testing mode.
    pub fn new(config: &Config, files: Arc<dyn SystemFiles>) -> Self {
        Self {
            config_dir: config.proxy_config_dir.clone(),
            reload_command: config.reload_command.clone(),
            reload_enabled: !config.is_testing(),
            files,
        }
    }

    /// Directory holding the generated configs.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the config file of project `name`.
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir
            .join(format!("{}.{}", name, PROXY_CONFIG_EXTENSION))
    }

    /// True if project `name` has a config file.
    pub fn exists(&self, name: &str) -> bool {
        self.files.exists(&self.config_path(name))
    }

    /// Ensures the config directory exists. Returns `true` when it had to be created.
    pub fn init(&self) -> ProxyResult<bool> {
        if self.files.exists(&self.config_dir) {
            return Ok(false);
        }
        self.files
            .create_dir_all(&self.config_dir)
            .map_err(|e| io_err("create", &self.config_dir, e))?;
        log::debug!("Created proxy config dir {}", self.config_dir.display());
        Ok(true)
    }

    /// The `include` line the operator has to add to the main proxy config once.
    pub fn include_directive(&self) -> String {
        format!(
            "include {};",
            self.config_dir
                .join(format!("*.{}", PROXY_CONFIG_EXTENSION))
                .display()
        )
    }

    /// Writes a new config for `domain` proxying to `port`.
    pub fn add_config(&self, name: &str, domain: &str, port: u16) -> ProxyResult<()> {
        let path = self.config_path(name);
        if self.files.exists(&path) {
            return Err(ProxyError::AlreadyExists(path.display().to_string()));
        }
        self.write(&path, &render(&[domain], port))?;
        log::debug!("Wrote proxy config {}", path.display());
        self.reload();
        Ok(())
    }

    /// Deletes the config of project `name`.
    pub fn remove_config(&self, name: &str) -> ProxyResult<()> {
        let path = self.require(name)?;
        self.files
            .remove(&path)
            .map_err(|e| io_err("remove", &path, e))?;
        log::debug!("Removed proxy config {}", path.display());
        self.reload();
        Ok(())
    }

    /// Rewrites the file in place with `domain` as primary host and `port` as
    /// upstream. Aliases already listed on the `server_name` line are kept.
    pub fn update_config(&self, name: &str, domain: &str, port: u16) -> ProxyResult<()> {
        let path = self.require(name)?;
        let mut hosts = self.server_names(name)?;
        match hosts.first_mut() {
            Some(primary) => *primary = domain.to_string(),
            None => hosts.push(domain.to_string()),
        }
        let refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
        self.write(&path, &render(&refs, port))?;
        log::debug!("Updated proxy config {}", path.display());
        self.reload();
        Ok(())
    }

    /// Moves `<old>.conf` to `<new>.conf` without touching its content.
    pub fn rename_config(&self, old: &str, new: &str) -> ProxyResult<()> {
        let from = self.require(old)?;
        let to = self.config_path(new);
        if self.files.exists(&to) {
            return Err(ProxyError::AlreadyExists(to.display().to_string()));
        }
        self.files
            .rename(&from, &to)
            .map_err(|e| io_err("rename", &from, e))?;
        log::debug!("Renamed proxy config {} -> {}", from.display(), to.display());
        self.reload();
        Ok(())
    }

    /// Replaces the primary host of the `server_name` line, keeping aliases.
    pub fn set_primary_host(&self, name: &str, domain: &str) -> ProxyResult<()> {
        self.edit_server_names(name, |hosts, _| {
            match hosts.first_mut() {
                Some(primary) => *primary = domain.to_string(),
                None => hosts.push(domain.to_string()),
            }
            Ok(())
        })
    }

    /// Appends `alias` to the `server_name` line.
    pub fn add_domain_alias(&self, name: &str, alias: &str) -> ProxyResult<()> {
        self.edit_server_names(name, |hosts, path| {
            if hosts.iter().any(|h| h == alias) {
                return Err(ProxyError::AliasExists {
                    alias: alias.to_string(),
                    path: path.to_string(),
                });
            }
            hosts.push(alias.to_string());
            Ok(())
        })
    }

    /// Drops `alias` from the `server_name` line.
    pub fn remove_domain_alias(&self, name: &str, alias: &str) -> ProxyResult<()> {
        self.edit_server_names(name, |hosts, path| {
            // Position 0 is the primary domain and is never removed here.
            let position = hosts
                .iter()
                .skip(1)
                .position(|h| h == alias)
                .map(|i| i + 1)
                .ok_or_else(|| ProxyError::AliasNotFound {
                    alias: alias.to_string(),
                    path: path.to_string(),
                })?;
            hosts.remove(position);
            Ok(())
        })
    }

    /// Hosts on the `server_name` line, primary domain first.
    pub fn server_names(&self, name: &str) -> ProxyResult<Vec<String>> {
        let path = self.require(name)?;
        let content = self.read(&path)?;
        parse_server_names(&content)
            .ok_or_else(|| ProxyError::ServerNameNotFound(path.display().to_string()))
    }

    /// Current file bytes, used to undo an in-place edit.
    pub fn read_snapshot(&self, name: &str) -> ProxyResult<String> {
        let path = self.require(name)?;
        self.read(&path)
    }

    /// Writes back bytes captured by [`Self::read_snapshot`], recreating the file if needed.
    pub fn restore_snapshot(&self, name: &str, content: &str) -> ProxyResult<()> {
        let path = self.config_path(name);
        self.write(&path, content)?;
        log::debug!("Restored proxy config {}", path.display());
        self.reload();
        Ok(())
    }

    // --- Helpers ---

    fn edit_server_names<F>(&self, name: &str, edit: F) -> ProxyResult<()>
    where
        F: FnOnce(&mut Vec<String>, &str) -> ProxyResult<()>,
    {
        let path = self.require(name)?;
        let display = path.display().to_string();
        let content = self.read(&path)?;

        let mut hosts = parse_server_names(&content)
            .ok_or_else(|| ProxyError::ServerNameNotFound(display.clone()))?;
        edit(&mut hosts, &display)?;

        let line = format!("server_name {};", hosts.join(" "));
        let new_content = SERVER_NAME_RE.replace(&content, regex::NoExpand(&line));
        self.write(&path, &new_content)?;
        log::debug!("Set server_name of {} to '{}'", display, hosts.join(" "));
        self.reload();
        Ok(())
    }

    fn require(&self, name: &str) -> ProxyResult<PathBuf> {
        let path = self.config_path(name);
        if self.files.exists(&path) {
            Ok(path)
        } else {
            Err(ProxyError::NotFound(path.display().to_string()))
        }
    }

    fn read(&self, path: &Path) -> ProxyResult<String> {
        self.files.read(path).map_err(|e| io_err("read", path, e))
    }

    fn write(&self, path: &Path, content: &str) -> ProxyResult<()> {
        self.files
            .write(path, content)
            .map_err(|e| io_err("write", path, e))
    }

    /// Asks the daemon to pick up changes. A failed reload leaves the files
    /// correct, so it is logged and not reported as a failure of the edit.
    fn reload(&self) {
        if !self.reload_enabled {
            return;
        }
        let Some((program, args)) = self.reload_command.split_first() else {
            return;
        };
        match self.files.run(program, args) {
            Ok(()) => log::debug!("Reloaded proxy daemon"),
            Err(e) => log::warn!("Proxy daemon reload failed: {}", e),
        }
    }
}

fn io_err(action: &'static str, path: &Path, source: io::Error) -> ProxyError {
    ProxyError::Io {
        action,
        path: path.display().to_string(),
        source,
    }
}

fn parse_server_names(content: &str) -> Option<Vec<String>> {
    let caps = SERVER_NAME_RE.captures(content)?;
    let list = caps.get(1)?.as_str();
    Some(list.split_whitespace().map(str::to_string).collect())
}

/// The server block for `hosts` (primary first) proxied to `port` on loopback.
pub fn render(hosts: &[&str], port: u16) -> String {
    format!(
        "server {{\n\
         \tlisten 80;\n\
         \n\
         \tserver_name {hosts};\n\
         \n\
         \tlocation / {{\n\
         \t\tproxy_pass http://{addr}:{port}/;\n\
         \t\tproxy_set_header Host $host;\n\
         \t\tproxy_set_header X-Real-IP $remote_addr;\n\
         \t\tproxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \t\tproxy_set_header X-Forwarded-Proto $scheme;\n\
         \t}}\n\
         }}\n",
        hosts = hosts.join(" "),
        addr = LOOPBACK_ADDRESS,
        port = port,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::files::DirectFiles;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn manager(dir: &TempDir) -> ProxyConfigManager {
        let config = Config::testing(dir.path());
        let proxy = ProxyConfigManager::new(&config, Arc::new(DirectFiles));
        proxy.init().unwrap();
        proxy
    }

    #[test]
    fn test_render_matches_expected_block() {
        let expected = "server {\n\tlisten 80;\n\n\tserver_name app.test api.app.test;\n\n\tlocation / {\n\t\tproxy_pass http://127.0.0.1:8080/;\n\t\tproxy_set_header Host $host;\n\t\tproxy_set_header X-Real-IP $remote_addr;\n\t\tproxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\t\tproxy_set_header X-Forwarded-Proto $scheme;\n\t}\n}\n";
        assert_eq!(render(&["app.test", "api.app.test"], 8080), expected);
    }

    #[test]
    fn test_init_reports_first_creation_only() {
        let dir = tempdir().unwrap();
        let config = Config::testing(dir.path());
        let proxy = ProxyConfigManager::new(&config, Arc::new(DirectFiles));

        assert!(proxy.init().unwrap());
        assert!(!proxy.init().unwrap());
        assert!(proxy.include_directive().ends_with("*.conf;"));
    }

    #[test]
    fn test_add_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);

        proxy.add_config("app", "app.test", 8080).unwrap();
        assert!(proxy.config_path("app").is_file());

        let err = proxy.add_config("app", "app.test", 9090).unwrap_err();
        assert!(matches!(err, ProxyError::AlreadyExists(_)));
        let content = fs::read_to_string(proxy.config_path("app")).unwrap();
        assert!(content.contains("127.0.0.1:8080"));
    }

    #[test]
    fn test_remove_missing_is_error() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);

        assert!(matches!(
            proxy.remove_config("ghost"),
            Err(ProxyError::NotFound(_))
        ));

        proxy.add_config("app", "app.test", 8080).unwrap();
        proxy.remove_config("app").unwrap();
        assert!(!proxy.exists("app"));
    }

    #[test]
    fn test_alias_edits_match_whole_hosts() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        proxy.add_config("app", "app.test", 8080).unwrap();

        proxy.add_domain_alias("app", "api.app.test").unwrap();
        proxy.add_domain_alias("app", "pp.test").unwrap();
        assert_eq!(
            proxy.server_names("app").unwrap(),
            vec!["app.test", "api.app.test", "pp.test"]
        );

        // "pp.test" is a substring of both other hosts; only the exact one goes.
        proxy.remove_domain_alias("app", "pp.test").unwrap();
        assert_eq!(
            proxy.server_names("app").unwrap(),
            vec!["app.test", "api.app.test"]
        );

        assert!(matches!(
            proxy.add_domain_alias("app", "api.app.test"),
            Err(ProxyError::AliasExists { .. })
        ));
        assert!(matches!(
            proxy.remove_domain_alias("app", "app.test"),
            Err(ProxyError::AliasNotFound { .. })
        ));
    }

    #[test]
    fn test_alias_add_then_remove_restores_file() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        proxy.add_config("app", "app.test", 8080).unwrap();
        let before = proxy.read_snapshot("app").unwrap();

        proxy.add_domain_alias("app", "www.app.test").unwrap();
        proxy.remove_domain_alias("app", "www.app.test").unwrap();

        assert_eq!(proxy.read_snapshot("app").unwrap(), before);
    }

    #[test]
    fn test_missing_server_name_is_consistency_error() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        fs::write(proxy.config_path("app"), "server {\n\tlisten 80;\n}\n").unwrap();

        assert!(matches!(
            proxy.add_domain_alias("app", "x.test"),
            Err(ProxyError::ServerNameNotFound(_))
        ));
    }

    #[test]
    fn test_update_rewrites_port_and_keeps_aliases() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        proxy.add_config("app", "app.test", 8080).unwrap();
        proxy.add_domain_alias("app", "api.app.test").unwrap();

        proxy.update_config("app", "app.test", 9090).unwrap();

        let content = proxy.read_snapshot("app").unwrap();
        assert_eq!(content, render(&["app.test", "api.app.test"], 9090));
    }

    #[test]
    fn test_rename_then_set_primary_host() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        proxy.add_config("app", "app.test", 8080).unwrap();
        proxy.add_config("web", "web.test", 8081).unwrap();
        proxy.add_domain_alias("app", "api.app.test").unwrap();

        assert!(matches!(
            proxy.rename_config("app", "web"),
            Err(ProxyError::AlreadyExists(_))
        ));

        proxy.rename_config("app", "site").unwrap();
        proxy.set_primary_host("site", "site.test").unwrap();

        assert!(!proxy.exists("app"));
        assert_eq!(
            proxy.server_names("site").unwrap(),
            vec!["site.test", "api.app.test"]
        );
    }

    #[test]
    fn test_restore_snapshot_recreates_removed_file() {
        let dir = tempdir().unwrap();
        let proxy = manager(&dir);
        proxy.add_config("app", "app.test", 8080).unwrap();
        let snapshot = proxy.read_snapshot("app").unwrap();

        proxy.remove_config("app").unwrap();
        proxy.restore_snapshot("app", &snapshot).unwrap();

        assert_eq!(proxy.read_snapshot("app").unwrap(), snapshot);
    }

    #[cfg(unix)]
    #[test]
    fn test_reload_failure_does_not_fail_the_edit() {
        let dir = tempdir().unwrap();
        let mut config = Config::testing(dir.path());
        config.mode = crate::core::config_loader::Mode::Privileged;
        config.reload_command = vec!["false".to_string()];
        let proxy = ProxyConfigManager::new(&config, Arc::new(DirectFiles));
        proxy.init().unwrap();

        proxy.add_config("app", "app.test", 8080).unwrap();
        assert!(proxy.exists("app"));
    }
}
