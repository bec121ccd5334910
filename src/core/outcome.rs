// src/core/outcome.rs

//! The single value every core operation hands back to a front end.

use serde::Serialize;
use std::fmt;

/// How an [`Outcome`] is styled and whether it counts as a failure.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The operation changed something.
    Success,
    /// Nothing needed to change.
    Info,
    /// Completed, but something looked off.
    Warning,
    /// The operation failed and changed nothing.
    Error,
    /// Unstyled text, e.g. listings.
    Plain,
}

/// Result of a management operation, ready to print or serialize.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Styling and success of the operation.
    pub kind: OutcomeKind,
    /// Human-readable, complete sentence.
    pub message: String,
}

impl Outcome {
    /// Wraps `message` with an explicit kind.
    pub fn new(kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A [`OutcomeKind::Success`] outcome.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Success, message)
    }

    /// A [`OutcomeKind::Info`] outcome.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Info, message)
    }

    /// A [`OutcomeKind::Warning`] outcome.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Warning, message)
    }

    /// A [`OutcomeKind::Error`] outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Error, message)
    }

    /// A [`OutcomeKind::Plain`] outcome.
    pub fn plain(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Plain, message)
    }

    /// True for [`OutcomeKind::Error`].
    pub fn is_error(&self) -> bool {
        self.kind == OutcomeKind::Error
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<Result<Self, E>> for Outcome {
    fn from(result: Result<Self, E>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) => Self::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result_turns_errors_into_error_outcomes() {
        let ok: Result<Outcome, std::io::Error> = Ok(Outcome::success("done"));
        assert_eq!(Outcome::from(ok), Outcome::success("done"));

        let err: Result<Outcome, std::io::Error> = Err(std::io::Error::other("boom"));
        let outcome = Outcome::from(err);
        assert!(outcome.is_error());
        assert_eq!(outcome.message, "boom");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&Outcome::warning("careful")).unwrap();
        assert_eq!(json, r#"{"kind":"warning","message":"careful"}"#);
    }
}
