// src/core/rollback.rs

//! Compensation stack for multi-step mutations.
//!
//! Each completed step pushes the action that undoes it. On failure the
//! actions run newest-first and the original error is returned, wrapped in
//! [`SyncError::RollbackIncomplete`] if any compensation failed as well. On
//! success the stack is committed and nothing runs.

use crate::core::error::SyncError;

type Compensation<'a> = Box<dyn FnOnce() -> Result<(), SyncError> + 'a>;

/// Undo actions of the steps an operation has completed so far.
#[must_use = "call commit() on success or fail() on error"]
pub struct Rollback<'a> {
    operation: &'static str,
    steps: Vec<(&'static str, Compensation<'a>)>,
}

impl std::fmt::Debug for Rollback<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rollback")
            .field("operation", &self.operation)
            .field("steps", &self.steps.iter().map(|(l, _)| *l).collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> Rollback<'a> {
    /// An empty stack for `operation`, which names it in logs.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    /// Registers how to undo a step that has just succeeded.
    pub fn push<F>(&mut self, label: &'static str, undo: F)
    where
        F: FnOnce() -> Result<(), SyncError> + 'a,
    {
        self.steps.push((label, Box::new(undo)));
    }

    /// Every step succeeded; drop the compensations unrun.
    pub fn commit(self) {
        log::trace!("{}: committed {} step(s)", self.operation, self.steps.len());
    }

    /// Undoes the completed steps in reverse and hands back the error to report.
    pub fn fail(self, error: SyncError) -> SyncError {
        log::warn!("{} failed ({}), rolling back", self.operation, error);

        let mut failures = Vec::new();
        for (label, undo) in self.steps.into_iter().rev() {
            match undo() {
                Ok(()) => log::debug!("{}: undid '{}'", self.operation, label),
                Err(e) => {
                    log::warn!("{}: could not undo '{}': {}", self.operation, label, e);
                    failures.push(format!("{}: {}", label, e));
                }
            }
        }

        if failures.is_empty() {
            error
        } else {
            SyncError::RollbackIncomplete {
                source: Box::new(error),
                failures,
            }
        }
    }

    /// Runs `step`; on error, rolls back and returns the resulting error.
    pub fn run<T, E: Into<SyncError>>(&mut self, step: Result<T, E>) -> Result<T, SyncError> {
        let operation = self.operation;
        step.map_err(|e| std::mem::replace(self, Self::new(operation)).fail(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_fail_runs_compensations_in_reverse() {
        let log = RefCell::new(Vec::new());
        let mut rollback = Rollback::new("test");
        rollback.push("first", || {
            log.borrow_mut().push("first");
            Ok(())
        });
        rollback.push("second", || {
            log.borrow_mut().push("second");
            Ok(())
        });

        let err = rollback.fail(SyncError::ProjectNotFound("app".into()));

        assert!(matches!(err, SyncError::ProjectNotFound(_)));
        assert_eq!(*log.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn test_commit_runs_nothing() {
        let ran = RefCell::new(false);
        let mut rollback = Rollback::new("test");
        rollback.push("step", || {
            *ran.borrow_mut() = true;
            Ok(())
        });
        rollback.commit();

        assert!(!*ran.borrow());
    }

    #[test]
    fn test_failed_compensation_is_reported_not_swallowed() {
        let ran_first = RefCell::new(false);
        let mut rollback = Rollback::new("test");
        rollback.push("first", || {
            *ran_first.borrow_mut() = true;
            Ok(())
        });
        rollback.push("second", || Err(SyncError::ProjectNotFound("ghost".into())));

        let err = rollback.fail(SyncError::ProjectExists("app".into()));

        // Later failures do not stop earlier compensations.
        assert!(*ran_first.borrow());
        match err {
            SyncError::RollbackIncomplete { source, failures } => {
                assert!(matches!(*source, SyncError::ProjectExists(_)));
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("second:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_run_rolls_back_on_error() {
        let undone = RefCell::new(false);
        let mut rollback = Rollback::new("test");
        rollback.push("step", || {
            *undone.borrow_mut() = true;
            Ok(())
        });

        let result: Result<(), SyncError> =
            rollback.run(Err(SyncError::CommandNotFound("serve".into())));

        assert!(result.is_err());
        assert!(*undone.borrow());
        rollback.commit();
    }
}
