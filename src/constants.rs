// src/constants.rs

/// The program name. Used for the config directory, the database file and
/// the hosts-file markers.
pub const PROGRAM_NAME: &str = "spinup";

/// Top-level domain appended to a project name to form its primary domain.
pub const DEFAULT_TLD: &str = "test";

/// The name of the SQLite database file (inside the config directory).
pub const DATABASE_FILENAME: &str = "spinup.sqlite3";

/// The name of the optional user configuration file (inside the config directory).
pub const CONFIG_FILENAME: &str = "config.toml";

/// Environment variable that overrides the config directory location.
pub const CONFIG_DIR_ENV: &str = "SPINUP_CONFIG_DIR";

/// The name of the directory holding hosts-file backups (inside the config directory).
pub const HOSTS_BACKUP_DIRNAME: &str = "hosts_bak";

/// Loopback address every managed hostname resolves to.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Environment flag injected into every spawned command to force colored output.
pub const FORCE_COLOR_ENV: &str = "FORCE_COLOR";

/// Extension of the generated reverse-proxy config files.
pub const PROXY_CONFIG_EXTENSION: &str = "conf";
