// src/system/hosts.rs

//! Host Mapping Manager.
//!
//! Owns a marker-delimited region of the system hosts file:
//!
//! ```text
//! ### BEGIN_SPINUP_HOSTS
//! 127.0.0.1	app.test
//! 127.0.0.1	api.app.test
//! ### END_SPINUP_HOSTS
//! ```
//!
//! Everything outside the markers is left byte-for-byte untouched. Every
//! mutation copies the current file into the backup directory first and is
//! aborted if that copy fails.

use crate::constants::{LOOPBACK_ADDRESS, PROGRAM_NAME};
use crate::system::files::SystemFiles;
use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Failure of a hosts file operation.
#[derive(Error, Debug)]
pub enum HostsError {
    /// The hostname is empty.
    #[error("Hostname is empty.")]
    EmptyHost,
    /// The hostname contains whitespace or `#`.
    #[error("'{0}' is not a valid hostname.")]
    InvalidHost(String),
    /// The markers are missing or out of order.
    #[error("{program} hosts section not found")]
    SectionNotFound {
        /// Program name used in the markers.
        program: String,
    },
    /// The region already lists the hostname.
    #[error("Hostname '{0}' is already present in the hosts file.")]
    DuplicateEntry(String),
    /// The region does not list the hostname.
    #[error("Hostname '{0}' is not present in the hosts file.")]
    EntryNotFound(String),
    /// Copying the file to the backup directory failed. Nothing was written.
    #[error("Could not back up hosts file to '{path}': {source}")]
    Backup {
        /// Backup file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading or writing the hosts file failed.
    #[error("Could not {action} hosts file '{path}': {source}")]
    Io {
        /// What was attempted, e.g. `"read"`.
        action: &'static str,
        /// Hosts file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

type HostsResult<T> = Result<T, HostsError>;

/// Result of [`HostsManager::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// The region was added now.
    Initialized,
    /// Both markers were already present.
    AlreadyInitialized,
}

/// Byte offsets of the region body (between the two markers).
#[derive(Debug, Clone, Copy)]
struct Region {
    body_start: usize,
    body_end: usize,
}

/// Edits the spinup region of one hosts file, backing it up before every write.
#[derive(Debug, Clone)]
pub struct HostsManager {
    hosts_file: PathBuf,
    backup_dir: PathBuf,
    begin_marker: String,
    end_marker: String,
    files: Arc<dyn SystemFiles>,
}

impl HostsManager {
    /// Manages `hosts_file`, keeping backups in `backup_dir`.
    pub fn new(hosts_file: PathBuf, backup_dir: PathBuf, files: Arc<dyn SystemFiles>) -> Self {
        let program = PROGRAM_NAME.to_uppercase();
        Self {
            hosts_file,
            backup_dir,
            begin_marker: format!("### BEGIN_{}_HOSTS", program),
            end_marker: format!("### END_{}_HOSTS", program),
            files,
        }
    }

    /// Path of the managed file.
    pub fn hosts_file(&self) -> &Path {
        &self.hosts_file
    }

    /// Creates the file if needed and appends an empty marker region to it.
    /// Calling it on an already initialized file changes nothing.
    pub fn init(&self) -> HostsResult<InitStatus> {
        let existing = if self.files.exists(&self.hosts_file) {
            Some(self.read()?)
        } else {
            None
        };
        let content = existing.as_deref().unwrap_or("");

        let has_begin = content.contains(&self.begin_marker);
        let has_end = content.contains(&self.end_marker);
        if has_begin || has_end {
            // Both markers in order means initialized; anything else is a damaged region.
            self.locate(content)?;
            return Ok(InitStatus::AlreadyInitialized);
        }

        let mut new_content = content.trim_end().to_string();
        new_content.push_str("\n\n");
        new_content.push_str(&self.begin_marker);
        new_content.push('\n');
        new_content.push_str(&self.end_marker);
        new_content.push('\n');

        if existing.is_some() {
            self.backup()?;
        }
        self.write(&new_content)?;
        log::debug!("Initialized hosts section in {}", self.hosts_file.display());
        Ok(InitStatus::Initialized)
    }

    /// Adds `127.0.0.1<TAB><host>` as the last line of the managed region.
    pub fn add_domain(&self, host: &str) -> HostsResult<()> {
        validate_host(host)?;
        let content = self.read()?;
        let region = self.locate(&content)?;
        let entry = entry_line(host);

        let body = region_body(&content, region);
        if body_lines(body).any(|line| line == entry) {
            return Err(HostsError::DuplicateEntry(host.to_string()));
        }

        let mut new_body = body.to_string();
        if !new_body.ends_with('\n') {
            new_body.push('\n');
        }
        new_body.push_str(&entry);
        new_body.push('\n');

        self.commit(&content, region, &new_body)?;
        log::debug!("Added hosts entry for '{}'", host);
        Ok(())
    }

    /// Removes the entry for `host` from the region. Absent entries are a no-op.
    pub fn remove_domain(&self, host: &str) -> HostsResult<()> {
        if host.is_empty() {
            return Err(HostsError::EmptyHost);
        }
        let content = self.read()?;
        let region = self.locate(&content)?;
        let entry = entry_line(host);

        let body = region_body(&content, region);
        let new_body: String = body
            .split_inclusive('\n')
            .filter(|line| strip_eol(line) != entry)
            .collect();

        if new_body == body {
            log::debug!("No hosts entry for '{}', nothing to remove", host);
            return Ok(());
        }

        self.commit(&content, region, &new_body)?;
        log::debug!("Removed hosts entry for '{}'", host);
        Ok(())
    }

    /// Replaces the entry for `old` with one for `new`, keeping its position.
    pub fn update_host(&self, old: &str, new: &str) -> HostsResult<()> {
        if old.is_empty() || new.is_empty() {
            return Err(HostsError::EmptyHost);
        }
        validate_host(new)?;
        let content = self.read()?;
        let region = self.locate(&content)?;
        let old_entry = entry_line(old);
        let new_entry = entry_line(new);

        let body = region_body(&content, region);
        if old != new && body_lines(body).any(|line| line == new_entry) {
            return Err(HostsError::DuplicateEntry(new.to_string()));
        }

        let mut found = false;
        let new_body: String = body
            .split_inclusive('\n')
            .map(|line| {
                if strip_eol(line) == old_entry {
                    found = true;
                    line.replacen(&old_entry, &new_entry, 1)
                } else {
                    line.to_string()
                }
            })
            .collect();

        if !found {
            return Err(HostsError::EntryNotFound(old.to_string()));
        }

        self.commit(&content, region, &new_body)?;
        log::debug!("Renamed hosts entry '{}' to '{}'", old, new);
        Ok(())
    }

    /// Hostnames currently listed in the managed region, in file order.
    pub fn domains(&self) -> HostsResult<Vec<String>> {
        let content = self.read()?;
        let region = self.locate(&content)?;
        let prefix = format!("{}\t", LOOPBACK_ADDRESS);
        Ok(body_lines(region_body(&content, region))
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// The raw bytes between the two markers.
    #[cfg(test)]
    pub(crate) fn section(&self) -> HostsResult<String> {
        let content = self.read()?;
        let region = self.locate(&content)?;
        Ok(region_body(&content, region).to_string())
    }

    // --- Helpers ---

    fn locate(&self, content: &str) -> HostsResult<Region> {
        let not_found = || HostsError::SectionNotFound {
            program: PROGRAM_NAME.to_string(),
        };
        let begin = content.find(&self.begin_marker).ok_or_else(not_found)?;
        let end = content.find(&self.end_marker).ok_or_else(not_found)?;
        if begin >= end {
            return Err(not_found());
        }
        Ok(Region {
            body_start: begin + self.begin_marker.len(),
            body_end: end,
        })
    }

    fn commit(&self, content: &str, region: Region, new_body: &str) -> HostsResult<()> {
        let head = content.get(..region.body_start).unwrap_or_default();
        let tail = content.get(region.body_end..).unwrap_or_default();
        let new_content = format!("{}{}{}", head, new_body, tail);

        self.backup()?;
        self.write(&new_content)
    }

    fn backup(&self) -> HostsResult<()> {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let target = self.backup_target(&stamp);
        let to_err = |source| HostsError::Backup {
            path: target.display().to_string(),
            source,
        };

        self.files.create_dir_all(&self.backup_dir).map_err(to_err)?;
        self.files
            .copy(&self.hosts_file, &target)
            .map_err(to_err)?;
        log::trace!("Backed up hosts file to {}", target.display());
        Ok(())
    }

    /// `hosts_<stamp>.bak`, or the first free `hosts_<stamp>_<n>.bak` when
    /// that second already has a backup.
    fn backup_target(&self, stamp: &str) -> PathBuf {
        let first = self.backup_dir.join(format!("hosts_{}.bak", stamp));
        if !self.files.exists(&first) {
            return first;
        }
        (1u32..)
            .map(|n| self.backup_dir.join(format!("hosts_{}_{}.bak", stamp, n)))
            .find(|path| !self.files.exists(path))
            .unwrap_or(first)
    }

    fn read(&self) -> HostsResult<String> {
        self.files
            .read(&self.hosts_file)
            .map_err(|source| HostsError::Io {
                action: "read",
                path: self.hosts_file.display().to_string(),
                source,
            })
    }

    fn write(&self, content: &str) -> HostsResult<()> {
        self.files
            .write(&self.hosts_file, content)
            .map_err(|source| HostsError::Io {
                action: "write",
                path: self.hosts_file.display().to_string(),
                source,
            })
    }
}

fn validate_host(host: &str) -> HostsResult<()> {
    if host.is_empty() {
        return Err(HostsError::EmptyHost);
    }
    if host.chars().any(char::is_whitespace) || host.contains('#') {
        return Err(HostsError::InvalidHost(host.to_string()));
    }
    Ok(())
}

fn entry_line(host: &str) -> String {
    format!("{}\t{}", LOOPBACK_ADDRESS, host)
}

fn region_body(content: &str, region: Region) -> &str {
    content
        .get(region.body_start..region.body_end)
        .unwrap_or_default()
}

fn body_lines(body: &str) -> impl Iterator<Item = &str> {
    body.split_inclusive('\n').map(strip_eol)
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::files::DirectFiles;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn manager(dir: &TempDir) -> HostsManager {
        HostsManager::new(
            dir.path().join("hosts"),
            dir.path().join("hosts_bak"),
            Arc::new(DirectFiles),
        )
    }

    fn backup_count(dir: &TempDir) -> usize {
        fs::read_dir(dir.path().join("hosts_bak"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_init_creates_missing_file() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);

        assert_eq!(hosts.init().unwrap(), InitStatus::Initialized);

        let content = fs::read_to_string(hosts.hosts_file()).unwrap();
        assert_eq!(content, "\n\n### BEGIN_SPINUP_HOSTS\n### END_SPINUP_HOSTS\n");
    }

    #[test]
    fn test_init_appends_after_trimming_trailing_whitespace() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "127.0.0.1\tlocalhost\n\n\n  ").unwrap();

        hosts.init().unwrap();

        let content = fs::read_to_string(hosts.hosts_file()).unwrap();
        assert_eq!(
            content,
            "127.0.0.1\tlocalhost\n\n### BEGIN_SPINUP_HOSTS\n### END_SPINUP_HOSTS\n"
        );
        assert_eq!(backup_count(&dir), 1);
    }

    #[test]
    fn test_init_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "127.0.0.1\tlocalhost\n").unwrap();

        assert_eq!(hosts.init().unwrap(), InitStatus::Initialized);
        let after_first = fs::read_to_string(hosts.hosts_file()).unwrap();

        assert_eq!(hosts.init().unwrap(), InitStatus::AlreadyInitialized);
        let after_second = fs::read_to_string(hosts.hosts_file()).unwrap();

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_init_rejects_damaged_region() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "### END_SPINUP_HOSTS\n### BEGIN_SPINUP_HOSTS\n").unwrap();

        assert!(matches!(
            hosts.init(),
            Err(HostsError::SectionNotFound { .. })
        ));
    }

    #[test]
    fn test_add_then_remove_restores_region_bytes() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        hosts.add_domain("one.test").unwrap();
        hosts.add_domain("two.test").unwrap();

        let before = fs::read_to_string(hosts.hosts_file()).unwrap();

        hosts.add_domain("app.test").unwrap();
        assert_eq!(hosts.domains().unwrap(), vec!["one.test", "two.test", "app.test"]);

        hosts.remove_domain("app.test").unwrap();
        let after = fs::read_to_string(hosts.hosts_file()).unwrap();

        assert_eq!(before, after);
        assert_eq!(hosts.domains().unwrap(), vec!["one.test", "two.test"]);
    }

    #[test]
    fn test_add_rejects_duplicates_and_empty_hosts() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        hosts.add_domain("app.test").unwrap();

        assert!(matches!(
            hosts.add_domain("app.test"),
            Err(HostsError::DuplicateEntry(_))
        ));
        assert!(matches!(hosts.add_domain(""), Err(HostsError::EmptyHost)));
        assert!(matches!(
            hosts.add_domain("bad host"),
            Err(HostsError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_duplicate_guard_matches_whole_lines() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        hosts.add_domain("myapp.test").unwrap();

        // A suffix of an existing entry is a different hostname.
        hosts.add_domain("app.test").unwrap();
        hosts.remove_domain("app.test").unwrap();

        assert_eq!(hosts.domains().unwrap(), vec!["myapp.test"]);
    }

    #[test]
    fn test_entries_outside_region_are_untouched() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "127.0.0.1\tapp.test\n").unwrap();
        hosts.init().unwrap();

        // The same line outside the markers is not ours.
        hosts.add_domain("app.test").unwrap();
        hosts.remove_domain("app.test").unwrap();

        let content = fs::read_to_string(hosts.hosts_file()).unwrap();
        assert!(content.starts_with("127.0.0.1\tapp.test\n"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        let before = hosts.section().unwrap();

        hosts.remove_domain("ghost.test").unwrap();

        assert_eq!(hosts.section().unwrap(), before);
        assert!(matches!(hosts.remove_domain(""), Err(HostsError::EmptyHost)));
    }

    #[test]
    fn test_update_host_keeps_position() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        hosts.add_domain("a.test").unwrap();
        hosts.add_domain("b.test").unwrap();

        hosts.update_host("a.test", "c.test").unwrap();
        assert_eq!(hosts.domains().unwrap(), vec!["c.test", "b.test"]);

        assert!(matches!(
            hosts.update_host("missing.test", "d.test"),
            Err(HostsError::EntryNotFound(_))
        ));
        assert!(matches!(
            hosts.update_host("c.test", "b.test"),
            Err(HostsError::DuplicateEntry(_))
        ));
        assert!(matches!(
            hosts.update_host("", "x.test"),
            Err(HostsError::EmptyHost)
        ));
    }

    #[test]
    fn test_missing_section_is_typed_error() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "127.0.0.1\tlocalhost\n").unwrap();

        let err = hosts.add_domain("app.test").unwrap_err();
        assert!(matches!(err, HostsError::SectionNotFound { .. }));
        assert_eq!(err.to_string(), "spinup hosts section not found");
    }

    #[test]
    fn test_every_mutation_is_backed_up() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        fs::write(hosts.hosts_file(), "").unwrap();
        hosts.init().unwrap();
        hosts.add_domain("app.test").unwrap();

        assert_eq!(backup_count(&dir), 2);
    }

    #[test]
    fn test_backups_within_one_second_are_all_kept() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        hosts.init().unwrap();
        hosts.add_domain("one.test").unwrap();
        let before_second = fs::read_to_string(hosts.hosts_file()).unwrap();
        hosts.add_domain("two.test").unwrap();
        hosts.add_domain("three.test").unwrap();

        assert_eq!(backup_count(&dir), 3);
        let kept: Vec<String> = fs::read_dir(dir.path().join("hosts_bak"))
            .unwrap()
            .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        assert!(kept.contains(&before_second));
    }

    #[test]
    fn test_backup_target_skips_taken_names() {
        let dir = tempdir().unwrap();
        let hosts = manager(&dir);
        let backups = dir.path().join("hosts_bak");
        fs::create_dir_all(&backups).unwrap();

        assert_eq!(hosts.backup_target("stamp"), backups.join("hosts_stamp.bak"));
        fs::write(backups.join("hosts_stamp.bak"), "").unwrap();
        fs::write(backups.join("hosts_stamp_1.bak"), "").unwrap();

        assert_eq!(hosts.backup_target("stamp"), backups.join("hosts_stamp_2.bak"));
    }

    #[test]
    fn test_backup_failure_aborts_mutation() {
        let dir = tempdir().unwrap();
        let hosts_file = dir.path().join("hosts");
        // A regular file where the backup directory should be.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, "").unwrap();
        let hosts = HostsManager::new(hosts_file.clone(), blocked, Arc::new(DirectFiles));
        fs::write(&hosts_file, "\n\n### BEGIN_SPINUP_HOSTS\n### END_SPINUP_HOSTS\n").unwrap();

        let before = fs::read_to_string(&hosts_file).unwrap();
        assert!(matches!(
            hosts.add_domain("app.test"),
            Err(HostsError::Backup { .. })
        ));
        assert_eq!(fs::read_to_string(&hosts_file).unwrap(), before);
    }
}
