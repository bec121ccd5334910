// src/system/process_group.rs

//! Start a command as the leader of its own process group and terminate the
//! whole group later. One implementation per OS, chosen at compile time.

use std::io;
use std::process::{Child, Command as StdCommand, ExitStatus};

/// Handle to a spawned command's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup {
    leader: u32,
}

impl ProcessGroup {
    /// Spawns `cmd` in a new process group.
    pub fn spawn(cmd: &mut StdCommand) -> io::Result<(Child, Self)> {
        platform::configure(cmd);
        let child = cmd.spawn()?;
        let group = Self { leader: child.id() };
        Ok((child, group))
    }

    /// Process id of the group leader, which is also the group id on Unix.
    pub fn id(&self) -> u32 {
        self.leader
    }

    /// Asks every process in the group to exit. A group that is already gone
    /// counts as terminated.
    pub fn terminate(&self) -> io::Result<()> {
        platform::terminate(self.leader)
    }
}

/// Whether `status` is what a process reports after being stopped by an
/// interrupt or termination request.
pub fn was_interrupted(status: &ExitStatus) -> bool {
    platform::was_interrupted(status)
}

#[cfg(unix)]
mod platform {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;
    use std::io;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::{Command as StdCommand, ExitStatus};

    pub(super) fn configure(cmd: &mut StdCommand) {
        // 0: the child's pid becomes the group id.
        cmd.process_group(0);
    }

    pub(super) fn terminate(leader: u32) -> io::Result<()> {
        let pgid = i32::try_from(leader)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match killpg(Pid::from_raw(pgid), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                log::debug!("Process group {} already exited", leader);
                Ok(())
            }
            Err(e) => Err(io::Error::from(e)),
        }
    }

    pub(super) fn was_interrupted(status: &ExitStatus) -> bool {
        let by_signal = matches!(
            status.signal(),
            Some(s) if s == Signal::SIGINT as i32 || s == Signal::SIGTERM as i32
        );
        by_signal || matches!(status.code(), Some(130 | 143))
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::os::windows::process::CommandExt;
    use std::process::{Command as StdCommand, ExitStatus, Stdio};

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    /// `STATUS_CONTROL_C_EXIT` as a signed exit code.
    const CONTROL_C_EXIT: i32 = -1_073_741_510;

    pub(super) fn configure(cmd: &mut StdCommand) {
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    pub(super) fn terminate(leader: u32) -> io::Result<()> {
        // Console processes ignore a plain close request, so the tree is ended with /F.
        let status = StdCommand::new("taskkill")
            .args(["/T", "/F", "/PID", &leader.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        // 128: no such process.
        if status.success() || status.code() == Some(128) {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "taskkill for process {} exited with {}",
                leader, status
            )))
        }
    }

    pub(super) fn was_interrupted(status: &ExitStatus) -> bool {
        // taskkill /F leaves exit code 1.
        matches!(status.code(), Some(CONTROL_C_EXIT | 1 | 130))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_terminate_stops_whole_group() {
        let mut cmd = StdCommand::new("sh");
        // The shell's own child must go down with it.
        cmd.args(["-c", "sleep 30 & wait"]);
        let (mut child, group) = ProcessGroup::spawn(&mut cmd).unwrap();

        group.terminate().unwrap();
        let status = child.wait().unwrap();

        assert!(was_interrupted(&status));
    }

    #[test]
    fn test_terminating_exited_group_is_ok() {
        let mut cmd = StdCommand::new("true");
        let (mut child, group) = ProcessGroup::spawn(&mut cmd).unwrap();
        child.wait().unwrap();

        assert!(group.terminate().is_ok());
    }

    #[test]
    fn test_plain_failure_is_not_an_interrupt() {
        let mut cmd = StdCommand::new("sh");
        cmd.args(["-c", "exit 3"]);
        let (mut child, _group) = ProcessGroup::spawn(&mut cmd).unwrap();

        assert!(!was_interrupted(&child.wait().unwrap()));
    }
}
