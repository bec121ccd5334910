// src/system/executor.rs

//! Launches one command line in its own process group with both output
//! streams drained by reader threads that prefix every line with the
//! command's name.

use crate::constants::FORCE_COLOR_ENV;
use crate::system::process_group::ProcessGroup;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Failure to launch a command line.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The line has unbalanced quotes.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    /// The line has no program.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The program could not be spawned.
    #[error("Command '{0}' could not be executed: {1}")]
    Spawn(String, #[source] io::Error),
}

/// A writer shared by every reader thread. Each prefixed line is written with
/// a single call while holding the lock, so lines never interleave mid-line.
pub type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wraps `writer` for sharing between reader threads.
pub fn sink<W: Write + Send + 'static>(writer: W) -> Sink {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// A running command and the threads draining its output.
#[derive(Debug)]
pub struct LabeledChild {
    name: String,
    child: Child,
    group: ProcessGroup,
    readers: Vec<JoinHandle<()>>,
}

impl LabeledChild {
    /// Command name used as the label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process group of the command.
    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    /// Waits for the process, then for its readers to drain the remaining output.
    pub fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                log::warn!("Output reader for '{}' panicked", self.name);
            }
        }
        status
    }
}

/// Spawns `command_line` as `name`. Output lines go to `out`/`err` as
/// `[name] line`.
pub fn spawn_labeled(
    name: &str,
    command_line: &str,
    cwd: Option<&Path>,
    out: &Sink,
    err: &Sink,
) -> Result<LabeledChild, ExecutionError> {
    let trimmed = command_line.trim();
    if trimmed.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let parts =
        shlex::split(trimmed).ok_or_else(|| ExecutionError::CommandParse(trimmed.to_string()))?;
    let Some((program, args)) = parts.split_first() else {
        return Err(ExecutionError::EmptyCommand);
    };

    let build = |program: &str, args: &[String]| {
        let mut cmd = StdCommand::new(program);
        cmd.args(args)
            .env(FORCE_COLOR_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dunce::simplified(dir));
        }
        cmd
    };

    // Fallback for Windows built-ins like `echo`: retry through `cmd /C`.
    let (mut child, group) = match ProcessGroup::spawn(&mut build(program.as_str(), args)) {
        Ok(spawned) => spawned,
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("'{}' not found, retrying with cmd /C", program);
            let shell_args = vec!["/C".to_string(), trimmed.to_string()];
            ProcessGroup::spawn(&mut build("cmd", shell_args.as_slice()))
                .map_err(|e| ExecutionError::Spawn(trimmed.to_string(), e))?
        }
        Err(e) => return Err(ExecutionError::Spawn(trimmed.to_string(), e)),
    };
    log::debug!("Started '{}' as process group {}", name, group.id());

    let prefix = format!("[{}]", name);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, prefix.clone(), Arc::clone(out)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, prefix, Arc::clone(err)));
    }

    Ok(LabeledChild {
        name: name.to_string(),
        child,
        group,
        readers,
    })
}

fn forward_lines<R: Read + Send + 'static>(
    stream: R,
    prefix: String,
    sink: Sink,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = format!("{} {}\n", prefix, text.trim_end_matches(['\n', '\r']));
                    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    if out.write_all(line.as_bytes()).and_then(|()| out.flush()).is_err() {
                        log::trace!("{} sink closed, dropping output", prefix);
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Error reading output of {}: {}", prefix, e);
                    break;
                }
            }
        }
    })
}
