// src/core/paths.rs

use crate::constants::{CONFIG_DIR_ENV, PROGRAM_NAME};
use lazy_static::lazy_static;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref SPINUP_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Failure to locate or create the config directory.
#[derive(Error, Debug)]
pub enum PathError {
    /// The platform has no config directory for this user.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// The directory could not be created.
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        /// Directory that was being created.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Returns the path to the spinup configuration directory (`~/.config/spinup`
/// on Linux, the platform equivalent elsewhere). Creates it if it doesn't exist.
///
/// `SPINUP_CONFIG_DIR` takes precedence over the platform default.
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value instantly.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = SPINUP_CONFIG_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .ok_or(PathError::ConfigDirNotFound)?
            .join(PROGRAM_NAME),
    };

    ensure_dir(&config_path)?;

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Creates `path` (and its parents) if it is missing.
pub fn ensure_dir(path: &std::path::Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::ConfigDirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// The system hostname-resolution file.
pub fn default_hosts_file() -> PathBuf {
    if cfg!(target_os = "windows") {
        let system_root =
            std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string());
        PathBuf::from(system_root)
            .join("System32")
            .join("drivers")
            .join("etc")
            .join("hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// The directory the proxy daemon includes per-site configs from.
pub fn default_proxy_config_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("C:\\nginx\\conf\\conf.d")
    } else {
        PathBuf::from("/etc/nginx/conf.d")
    }
}

/// The command that asks the proxy daemon to reload its configuration.
pub fn default_reload_command() -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
    } else {
        vec![
            "systemctl".to_string(),
            "reload".to_string(),
            "nginx".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_creates_nested_directories() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a").join("b");

        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        // A second call on an existing directory is a no-op.
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn test_defaults_are_absolute() {
        assert!(default_hosts_file().is_absolute() || cfg!(target_os = "windows"));
        assert!(!default_reload_command().is_empty());
        assert!(default_proxy_config_dir().ends_with("conf.d"));
    }
}
