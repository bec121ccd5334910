//! # Config Loader
//!
//! Builds the constructor-time [`Config`] every store manager is created from.
//! Defaults come from [`paths`]; an optional `config.toml` in the config
//! directory overrides individual keys. Whether writes go through privilege
//! elevation and whether the proxy daemon is reloaded is decided here, once,
//! through [`Mode`], and never re-checked inside business logic.
use crate::{
    constants::{CONFIG_FILENAME, DATABASE_FILENAME, DEFAULT_TLD, HOSTS_BACKUP_DIRNAME},
    core::paths::{self, PathError},
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to build a [`Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config directory could not be resolved.
    #[error(transparent)]
    Path(#[from] PathError),
    /// `config.toml` exists but could not be read.
    #[error("Could not read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `config.toml` is not valid TOML or has unknown keys.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Parser error with location.
        #[source]
        source: toml::de::Error,
    },
    /// A `~` or `$VAR` in a path could not be expanded.
    #[error("Could not expand path '{value}': {message}")]
    Expand { value: String, message: String },
    /// The `tld` key is empty or contains whitespace.
    #[error("Invalid top-level domain '{0}'.")]
    InvalidTld(String),
}

/// How the managers touch system-owned files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Writes go through `sudo` and the proxy daemon is reloaded after each change.
    Privileged,
    /// Writes go directly to sandbox paths and the daemon is never reloaded.
    Testing,
}

/// The user-editable `config.toml`. Every key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    tld: Option<String>,
    hosts_file: Option<String>,
    hosts_backup_dir: Option<String>,
    proxy_config_dir: Option<String>,
    reload_command: Option<Vec<String>>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the database, `config.toml` and backups.
    pub config_dir: PathBuf,
    /// The SQLite database file.
    pub database_path: PathBuf,
    /// The system hosts file, `/etc/hosts` by default.
    pub hosts_file: PathBuf,
    /// Where a copy of the hosts file goes before each change.
    pub hosts_backup_dir: PathBuf,
    /// Directory of the generated nginx `server` blocks.
    pub proxy_config_dir: PathBuf,
    /// Program and arguments that reload the proxy daemon.
    pub reload_command: Vec<String>,
    /// Top-level domain of primary domains, without the dot.
    pub tld: String,
    /// Whether writes are elevated and the proxy daemon reloaded.
    pub mode: Mode,
}

impl Config {
    /// Loads the configuration for normal (privileged) operation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = paths::get_config_dir()?;
        Self::load_from(&config_dir, Mode::Privileged)
    }

    /// Loads defaults plus the optional `config.toml` found in `config_dir`.
    pub fn load_from(config_dir: &Path, mode: Mode) -> Result<Self, ConfigError> {
        let mut config = Self::defaults(config_dir, mode);

        let file_path = config_dir.join(CONFIG_FILENAME);
        if file_path.is_file() {
            log::debug!("Loading config overrides from {}", file_path.display());
            let content = fs::read_to_string(&file_path).map_err(|e| ConfigError::Read {
                path: file_path.display().to_string(),
                source: e,
            })?;
            let file_config: FileConfig =
                toml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: file_path.display().to_string(),
                    source: e,
                })?;
            config.apply(file_config)?;
        }

        Ok(config)
    }

    /// A self-contained sandbox rooted at `dir`: hosts file, backups and proxy
    /// configs all live below it, nothing is elevated and nothing is reloaded.
    pub fn testing(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            database_path: dir.join(DATABASE_FILENAME),
            hosts_file: dir.join("hosts"),
            hosts_backup_dir: dir.join(HOSTS_BACKUP_DIRNAME),
            proxy_config_dir: dir.join("nginx").join("conf.d"),
            reload_command: Vec::new(),
            tld: DEFAULT_TLD.to_string(),
            mode: Mode::Testing,
        }
    }

    fn defaults(config_dir: &Path, mode: Mode) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            database_path: config_dir.join(DATABASE_FILENAME),
            hosts_file: paths::default_hosts_file(),
            hosts_backup_dir: config_dir.join(HOSTS_BACKUP_DIRNAME),
            proxy_config_dir: paths::default_proxy_config_dir(),
            reload_command: paths::default_reload_command(),
            tld: DEFAULT_TLD.to_string(),
            mode,
        }
    }

    fn apply(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(tld) = file.tld {
            let tld = tld.trim_start_matches('.').to_string();
            if tld.is_empty() || tld.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidTld(tld));
            }
            self.tld = tld;
        }
        if let Some(p) = file.hosts_file {
            self.hosts_file = expand(&p)?;
        }
        if let Some(p) = file.hosts_backup_dir {
            self.hosts_backup_dir = expand(&p)?;
        }
        if let Some(p) = file.proxy_config_dir {
            self.proxy_config_dir = expand(&p)?;
        }
        if let Some(cmd) = file.reload_command {
            self.reload_command = cmd;
        }
        Ok(())
    }

    /// True in sandboxed test mode.
    pub fn is_testing(&self) -> bool {
        self.mode == Mode::Testing
    }

    /// The primary domain of a project called `name`.
    pub fn domain_for(&self, name: &str) -> String {
        format!("{}.{}", name, self.tld)
    }
}

/// Expands `~` and environment variables in a configured path.
fn expand(value: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(value).map_err(|e| ConfigError::Expand {
        value: value.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_testing_config_is_sandboxed() {
        let dir = tempdir().unwrap();
        let config = Config::testing(dir.path());

        assert!(config.is_testing());
        assert!(config.hosts_file.starts_with(dir.path()));
        assert!(config.proxy_config_dir.starts_with(dir.path()));
        assert!(config.reload_command.is_empty());
        assert_eq!(config.domain_for("app"), "app.test");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(dir.path(), Mode::Privileged).unwrap();

        assert_eq!(config.tld, DEFAULT_TLD);
        assert_eq!(config.database_path, dir.path().join(DATABASE_FILENAME));
        assert_eq!(config.hosts_file, paths::default_hosts_file());
    }

    #[test]
    fn test_load_applies_overrides() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            "tld = \".localhost\"\nproxy_config_dir = \"/opt/nginx/sites\"\nreload_command = [\"nginx\", \"-s\", \"reload\"]\n",
        )
        .unwrap();

        let config = Config::load_from(dir.path(), Mode::Privileged).unwrap();

        assert_eq!(config.tld, "localhost");
        assert_eq!(config.domain_for("app"), "app.localhost");
        assert_eq!(config.proxy_config_dir, PathBuf::from("/opt/nginx/sites"));
        assert_eq!(config.reload_command, vec!["nginx", "-s", "reload"]);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "colour = \"blue\"\n").unwrap();

        let result = Config::load_from(dir.path(), Mode::Privileged);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
