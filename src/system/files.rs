// src/system/files.rs

//! File operations on system-owned paths.
//!
//! The hosts file and the proxy config directory are usually owned by root.
//! [`ElevatedFiles`] routes every write through `sudo`, [`DirectFiles`] uses
//! `std::fs` and is what sandboxed (testing) configurations get. Callers pick
//! one at construction time with [`for_mode`].

use crate::core::config_loader::Mode;
use std::fmt::Debug;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::Arc;

/// Narrow interface over the filesystem operations the store managers need.
pub trait SystemFiles: Debug + Send + Sync {
    /// Reads the whole file. System files are world-readable, so no elevation.
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    /// True if something exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Replaces the file's contents, creating it if needed.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    /// Copies `from` to `to`, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Moves `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Deletes a file.
    fn remove(&self, path: &Path) -> io::Result<()>;
    /// Creates the directory and its missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Runs an auxiliary program (e.g. the proxy reload) with the same privileges as writes.
    fn run(&self, program: &str, args: &[String]) -> io::Result<()>;

    /// Verifies that writes will be permitted, prompting for credentials if needed.
    fn ensure_privileges(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Returns the implementation matching `mode`.
pub fn for_mode(mode: Mode) -> Arc<dyn SystemFiles> {
    match mode {
        Mode::Testing => Arc::new(DirectFiles),
        Mode::Privileged if cfg!(target_os = "windows") => Arc::new(DirectFiles),
        Mode::Privileged => Arc::new(ElevatedFiles),
    }
}

/// Plain `std::fs` access.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectFiles;

impl SystemFiles for DirectFiles {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn run(&self, program: &str, args: &[String]) -> io::Result<()> {
        run_checked(StdCommand::new(program).args(args), program)
    }
}

/// Every mutation is issued as `sudo <tool> ...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElevatedFiles;

impl ElevatedFiles {
    fn sudo(program: &str) -> StdCommand {
        let mut cmd = StdCommand::new("sudo");
        cmd.arg(program);
        cmd
    }
}

impl SystemFiles for ElevatedFiles {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut child = Self::sudo("tee")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        pipe_to(&mut child, contents.as_bytes(), &format!("sudo tee {}", path.display()))
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        run_checked(Self::sudo("cp").arg(from).arg(to), "sudo cp")
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        run_checked(Self::sudo("mv").arg(from).arg(to), "sudo mv")
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("'{}' does not exist", path.display()),
            ));
        }
        run_checked(Self::sudo("rm").arg(path), "sudo rm")
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        run_checked(Self::sudo("mkdir").arg("-p").arg(path), "sudo mkdir")
    }

    fn run(&self, program: &str, args: &[String]) -> io::Result<()> {
        run_checked(Self::sudo(program).args(args), program)
    }

    fn ensure_privileges(&self) -> io::Result<()> {
        run_checked(StdCommand::new("sudo").arg("-v"), "sudo -v")
            .map_err(|_| io::Error::new(ErrorKind::PermissionDenied, "this command requires sudo"))
    }
}

/// Writes `contents` to the child's stdin, closes it and always reaps the
/// child, even when the write fails.
fn pipe_to(child: &mut Child, contents: &[u8], label: &str) -> io::Result<()> {
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(contents),
        None => Ok(()),
    };
    let status = child.wait()?;
    written?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("'{}' exited with {}", label, status)))
    }
}

fn run_checked(cmd: &mut StdCommand, label: &str) -> io::Result<()> {
    let status = cmd.stdin(Stdio::inherit()).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("'{}' exited with {}", label, status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_direct_files_round_trip() {
        let dir = tempdir().unwrap();
        let files = DirectFiles;
        let nested = dir.path().join("a").join("b");
        let file = nested.join("x.conf");

        files.create_dir_all(&nested).unwrap();
        files.write(&file, "hello").unwrap();
        assert_eq!(files.read(&file).unwrap(), "hello");

        let copy = nested.join("y.conf");
        files.copy(&file, &copy).unwrap();
        assert!(files.exists(&copy));

        let moved = nested.join("z.conf");
        files.rename(&copy, &moved).unwrap();
        assert!(!files.exists(&copy));
        assert!(files.exists(&moved));

        files.remove(&moved).unwrap();
        assert!(!files.exists(&moved));
        assert!(files.remove(&moved).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_to_reaps_child_when_write_fails() {
        // `true` never reads, so a payload larger than the pipe buffer fails with EPIPE.
        let mut child = StdCommand::new("true")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        let payload = vec![b'x'; 1 << 20];

        let err = pipe_to(&mut child, &payload, "true").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_to_reports_failed_exit() {
        let mut child = StdCommand::new("sh")
            .args(["-c", "cat >/dev/null; exit 2"])
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();

        let err = pipe_to(&mut child, b"hello", "sh").unwrap_err();

        assert!(err.to_string().contains("'sh' exited with"));
    }

    #[test]
    fn test_testing_mode_never_elevates() {
        let files = for_mode(Mode::Testing);
        assert!(format!("{:?}", files).contains("DirectFiles"));
        assert!(files.ensure_privileges().is_ok());
    }
}
