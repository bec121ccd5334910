// src/core/runner.rs

//! # Concurrent Command Runner
//!
//! Runs every command of a project at once, each in its own process group,
//! with output lines labeled by command name. The run ends when all commands
//! have exited; an interrupt sends a termination request to every group that
//! is still alive and then waits for them like any other exit.
//!
//! Only a failure to start a process is an error of the run. A command
//! exiting non-zero, or exiting because it was interrupted, is reported but
//! does not affect its siblings.

use crate::core::error::ErrorCategory;
use crate::core::outcome::Outcome;
use crate::core::repository::{Repository, RepositoryError};
use crate::core::template;
use crate::system::executor::{self, LabeledChild, Sink};
use crate::system::process_group::{self, ProcessGroup};
use crate::system::signals::{self, SignalForwarder, StopEvent, StopHandle, StopListener};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use thiserror::Error;

/// Failure to resolve or start a run. Nothing has been spawned when one is returned.
#[derive(Error, Debug)]
pub enum RunError {
    /// No project has this name.
    #[error("Project '{0}' not found.")]
    ProjectNotFound(String),
    /// A requested command is not associated with the project.
    #[error("Command '{command}' is not part of project '{project}'.")]
    CommandNotFound {
        /// Requested command name.
        command: String,
        /// Project that lacks it.
        project: String,
    },
    /// The selection is empty.
    #[error("No commands configured for project '{0}'.")]
    NoCommands(String),
    /// Reading the project failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// The interrupt forwarder could not be installed.
    #[error("Could not listen for interrupts: {0}")]
    Signals(#[source] io::Error),
}

impl RunError {
    /// How a front end should present this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProjectNotFound(_) | Self::CommandNotFound { .. } | Self::NoCommands(_) => {
                ErrorCategory::Validation
            }
            Self::Repository(_) => ErrorCategory::Resource,
            Self::Signals(_) => ErrorCategory::Process,
        }
    }
}

/// A command with its template already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Command name, used as the output label.
    pub name: String,
    /// Expanded shell line.
    pub line: String,
}

/// Everything needed to launch a project, computed before any process starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Name of the project being run.
    pub project_name: String,
    /// Working directory; the caller's when `None`.
    pub dir: Option<PathBuf>,
    /// Commands to launch, in launch order.
    pub commands: Vec<ResolvedCommand>,
}

/// Builds the plan for `project_name`. With a non-empty `only`, just those
/// commands are included, in the given order.
pub fn resolve(
    repo: &dyn Repository,
    project_name: &str,
    only: &[String],
) -> Result<RunPlan, RunError> {
    let project = repo
        .get_project(project_name)?
        .ok_or_else(|| RunError::ProjectNotFound(project_name.to_string()))?;

    let selected: Vec<_> = if only.is_empty() {
        project.commands.iter().collect()
    } else {
        only.iter()
            .map(|name| {
                project
                    .commands
                    .iter()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| RunError::CommandNotFound {
                        command: name.clone(),
                        project: project_name.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?
    };

    if selected.is_empty() {
        return Err(RunError::NoCommands(project_name.to_string()));
    }

    let commands = selected
        .into_iter()
        .map(|c| ResolvedCommand {
            name: c.name.clone(),
            line: template::expand(&c.command, &project),
        })
        .collect();

    Ok(RunPlan {
        project_name: project.name.clone(),
        dir: project.dir.clone(),
        commands,
    })
}

/// How one command of a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandExit {
    /// Exited with status 0.
    Success,
    /// Exited non-zero on its own. `None` when no exit code is available.
    Failed(Option<i32>),
    /// Terminated by the stop request of the run.
    Interrupted,
    /// Could not be spawned; holds the reason.
    StartFailed(String),
}

/// The end of one command of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Command name.
    pub name: String,
    /// How it ended.
    pub exit: CommandExit,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Project that was run.
    pub project_name: String,
    /// One entry per planned command, in plan order.
    pub results: Vec<CommandResult>,
    /// True when the run ended because of a stop request.
    pub interrupted: bool,
}

impl RunReport {
    /// `(name, reason)` of every command that failed to start.
    pub fn start_failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|r| match &r.exit {
            CommandExit::StartFailed(msg) => Some((r.name.as_str(), msg.as_str())),
            _ => None,
        })
    }

    /// An error if any command failed to start, success otherwise.
    pub fn outcome(&self) -> Outcome {
        let failed_to_start: Vec<String> = self
            .start_failures()
            .map(|(name, msg)| format!("'{}' ({})", name, msg))
            .collect();
        if !failed_to_start.is_empty() {
            return Outcome::error(format!(
                "Failed to start {} of project '{}'.",
                failed_to_start.join(", "),
                self.project_name
            ));
        }

        let failed: Vec<String> = self
            .results
            .iter()
            .filter_map(|r| match r.exit {
                CommandExit::Failed(Some(code)) => Some(format!("'{}' exited with code {}", r.name, code)),
                CommandExit::Failed(None) => Some(format!("'{}' exited abnormally", r.name)),
                _ => None,
            })
            .collect();

        let mut message = if self.interrupted {
            format!("Stopped project '{}'.", self.project_name)
        } else {
            format!("Project '{}' finished.", self.project_name)
        };
        if !failed.is_empty() {
            message.push(' ');
            message.push_str(&failed.join(", "));
            message.push('.');
        }
        Outcome::success(message)
    }
}

/// Process groups of the current run.
#[derive(Debug, Default)]
struct Groups {
    active: Vec<ProcessGroup>,
    stopping: bool,
}

/// Runs plans one at a time against a shared pair of output sinks.
pub struct Runner {
    out: Sink,
    err: Sink,
    groups: Arc<Mutex<Groups>>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// A runner writing labeled output to `out` and diagnostics to `err`.
    pub fn new(out: Sink, err: Sink) -> Self {
        Self {
            out,
            err,
            groups: Arc::new(Mutex::new(Groups::default())),
        }
    }

    /// A runner writing to this process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(executor::sink(io::stdout()), executor::sink(io::stderr()))
    }

    /// Number of process groups currently supervised.
    pub fn active_group_count(&self) -> usize {
        self.lock_groups().active.len()
    }

    /// Resolves and runs `project_name` until its commands exit or the user
    /// interrupts (SIGINT/SIGTERM, Ctrl-C on Windows).
    pub fn run_project(
        &self,
        repo: &dyn Repository,
        project_name: &str,
        only: &[String],
    ) -> Result<RunReport, RunError> {
        let plan = resolve(repo, project_name, only)?;
        let (stop, listener) = signals::stop_channel();
        let _forwarder = SignalForwarder::install(stop.clone()).map_err(RunError::Signals)?;
        Ok(self.run_until_stopped(&plan, stop, listener))
    }

    /// Runs `plan` until every command has exited. `stop` must belong to
    /// `listener`; calling [`StopHandle::interrupt`] on any clone of it
    /// terminates the run.
    pub fn run_until_stopped(
        &self,
        plan: &RunPlan,
        stop: StopHandle,
        listener: StopListener,
    ) -> RunReport {
        *self.lock_groups() = Groups::default();
        log::debug!(
            "Running {} command(s) of '{}'",
            plan.commands.len(),
            plan.project_name
        );

        let (results, interrupted) = thread::scope(|scope| {
            let watcher = scope.spawn(move || match listener.wait() {
                StopEvent::Interrupt => {
                    self.status(&format!(
                        "Gracefully stopping project '{}'...",
                        plan.project_name
                    ));
                    self.stop_all();
                    true
                }
                StopEvent::Finished => false,
            });

            let launched: Vec<(String, Result<LabeledChild, String>)> = plan
                .commands
                .iter()
                .map(|command| (command.name.clone(), self.launch(plan, command)))
                .collect();

            let results: Vec<CommandResult> = launched
                .into_iter()
                .map(|(name, launch)| {
                    let exit = match launch {
                        Ok(child) => self.supervise(child),
                        Err(msg) => CommandExit::StartFailed(msg),
                    };
                    CommandResult { name, exit }
                })
                .collect();

            stop.finish();
            let interrupted = watcher.join().unwrap_or_else(|_| {
                log::warn!("Interrupt watcher panicked");
                false
            });
            (results, interrupted)
        });

        RunReport {
            project_name: plan.project_name.clone(),
            results,
            interrupted,
        }
    }

    fn launch(&self, plan: &RunPlan, command: &ResolvedCommand) -> Result<LabeledChild, String> {
        let child = executor::spawn_labeled(
            &command.name,
            &command.line,
            plan.dir.as_deref(),
            &self.out,
            &self.err,
        )
        .map_err(|e| {
            self.status(&format!("[{}] {}", command.name, e));
            e.to_string()
        })?;

        let group = child.group();
        let mut groups = self.lock_groups();
        if groups.stopping {
            // Started while an interrupt was being handled.
            if let Err(e) = group.terminate() {
                log::warn!("Could not stop '{}': {}", command.name, e);
            }
        } else {
            groups.active.push(group);
        }
        Ok(child)
    }

    fn supervise(&self, child: LabeledChild) -> CommandExit {
        let name = child.name().to_string();
        let group = child.group();
        let status = child.wait();
        let stopping = {
            let mut groups = self.lock_groups();
            groups.active.retain(|g| *g != group);
            groups.stopping
        };

        match status {
            Ok(s) if s.success() => CommandExit::Success,
            Ok(s) if stopping || process_group::was_interrupted(&s) => {
                log::debug!("'{}' stopped ({})", name, s);
                CommandExit::Interrupted
            }
            Ok(s) => CommandExit::Failed(s.code()),
            Err(e) => {
                log::warn!("Could not wait for '{}': {}", name, e);
                CommandExit::Failed(None)
            }
        }
    }

    fn stop_all(&self) {
        let mut groups = self.lock_groups();
        groups.stopping = true;
        for group in &groups.active {
            if let Err(e) = group.terminate() {
                log::warn!("Could not stop process group {}: {}", group.id(), e);
            }
        }
    }

    fn status(&self, message: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", message).and_then(|()| out.flush());
    }

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, Groups> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::SqliteRepository;
    use crate::models::NewProject;
    use crate::system::executor::test_support::Capture;
    use std::time::{Duration, Instant};

    fn repo_with_project(commands: &[(&str, &str)]) -> SqliteRepository {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let ids = commands
            .iter()
            .map(|(name, line)| repo.create_command(name, line).unwrap().id)
            .collect();
        let project = repo
            .create_project(&NewProject {
                name: "app".into(),
                domain: "app.test".into(),
                port: 8080,
                dir: None,
                command_ids: ids,
            })
            .unwrap();
        repo.create_variable(project.id, "foo", "bar").unwrap();
        repo
    }

    fn plan(commands: &[(&str, &str)]) -> RunPlan {
        RunPlan {
            project_name: "app".into(),
            dir: None,
            commands: commands
                .iter()
                .map(|(name, line)| ResolvedCommand {
                    name: name.to_string(),
                    line: line.to_string(),
                })
                .collect(),
        }
    }

    fn capture_runner() -> (Runner, Capture, Capture) {
        let out = Capture::default();
        let err = Capture::default();
        let runner = Runner::new(executor::sink(out.clone()), executor::sink(err.clone()));
        (runner, out, err)
    }

    #[test]
    fn test_resolve_expands_templates() {
        let repo = repo_with_project(&[(
            "serve",
            "run --port {{port}} --host {{domain}} --k {{foo}}",
        )]);

        let plan = resolve(&repo, "app", &[]).unwrap();

        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.commands[0].name, "serve");
        assert_eq!(plan.commands[0].line, "run --port 8080 --host app.test --k bar");
    }

    #[test]
    fn test_resolve_fails_fast() {
        let empty = repo_with_project(&[]);
        assert!(matches!(
            resolve(&empty, "app", &[]),
            Err(RunError::NoCommands(_))
        ));
        assert!(matches!(
            resolve(&empty, "ghost", &[]),
            Err(RunError::ProjectNotFound(_))
        ));

        let repo = repo_with_project(&[("serve", "npm run dev"), ("worker", "npm run worker")]);
        let only = vec!["worker".to_string()];
        let plan = resolve(&repo, "app", &only).unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.commands[0].name, "worker");

        let unknown = vec!["nope".to_string()];
        let err = resolve(&repo, "app", &unknown).unwrap_err();
        assert!(matches!(err, RunError::CommandNotFound { .. }));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_report_outcome() {
        let mut report = RunReport {
            project_name: "app".into(),
            results: vec![
                CommandResult {
                    name: "serve".into(),
                    exit: CommandExit::Interrupted,
                },
                CommandResult {
                    name: "worker".into(),
                    exit: CommandExit::Failed(Some(3)),
                },
            ],
            interrupted: true,
        };
        let outcome = report.outcome();
        assert!(!outcome.is_error());
        assert!(outcome.message.contains("'worker' exited with code 3"));

        report.results.push(CommandResult {
            name: "db".into(),
            exit: CommandExit::StartFailed("not found".into()),
        });
        assert!(report.outcome().is_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_to_completion() {
        let (runner, out, _err) = capture_runner();
        let (stop, listener) = signals::stop_channel();

        let report = runner.run_until_stopped(
            &plan(&[("a", "echo alpha"), ("b", "sh -c 'exit 4'")]),
            stop,
            listener,
        );

        assert!(!report.interrupted);
        assert_eq!(report.results[0].exit, CommandExit::Success);
        assert_eq!(report.results[1].exit, CommandExit::Failed(Some(4)));
        assert!(out.text().contains("[a] alpha\n"));
        assert_eq!(runner.active_group_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_failure_does_not_cancel_siblings() {
        let (runner, out, _err) = capture_runner();
        let (stop, listener) = signals::stop_channel();

        let report = runner.run_until_stopped(
            &plan(&[
                ("missing", "definitely-not-a-real-binary-1234"),
                ("ok", "echo fine"),
            ]),
            stop,
            listener,
        );

        assert!(matches!(report.results[0].exit, CommandExit::StartFailed(_)));
        assert_eq!(report.results[1].exit, CommandExit::Success);
        assert!(out.text().contains("[ok] fine\n"));
        assert!(report.outcome().is_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_stops_every_group() {
        let (runner, out, _err) = capture_runner();
        let (stop, listener) = signals::stop_channel();
        let remote = stop.clone();
        let plan = plan(&[("one", "sleep 30"), ("two", "sh -c 'sleep 30'")]);

        let report = thread::scope(|scope| {
            let run = scope.spawn(|| runner.run_until_stopped(&plan, stop, listener));

            let deadline = Instant::now() + Duration::from_secs(10);
            while runner.active_group_count() < 2 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            assert_eq!(runner.active_group_count(), 2);

            remote.interrupt();
            run.join().unwrap()
        });

        assert!(report.interrupted);
        assert!(
            report
                .results
                .iter()
                .all(|r| r.exit == CommandExit::Interrupted)
        );
        assert_eq!(runner.active_group_count(), 0);
        assert!(out.text().contains("Gracefully stopping project 'app'..."));
        assert!(!report.outcome().is_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_stops_run_project() {
        use nix::sys::signal::{Signal, raise};

        let repo = repo_with_project(&[("one", "sleep 30"), ("two", "sleep 30")]);
        let (runner, _out, _err) = capture_runner();
        let runner = &runner;

        let started = Instant::now();
        let report = thread::scope(|scope| {
            let run = scope.spawn(move || runner.run_project(&repo, "app", &[]));

            let deadline = Instant::now() + Duration::from_secs(10);
            while runner.active_group_count() < 2 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }

            raise(Signal::SIGTERM).unwrap();
            run.join().unwrap()
        })
        .unwrap();

        assert!(report.interrupted);
        assert!(started.elapsed() < Duration::from_secs(25));
        assert_eq!(runner.active_group_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_before_launch_still_returns() {
        let (runner, _out, _err) = capture_runner();
        let (stop, listener) = signals::stop_channel();
        stop.interrupt();

        let started = Instant::now();
        let report = runner.run_until_stopped(&plan(&[("one", "sleep 30")]), stop, listener);

        assert!(report.interrupted);
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(runner.active_group_count(), 0);
    }
}
