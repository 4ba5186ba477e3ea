use thiserror::Error;

use crate::pattern::{error::PatternError, Word};

#[derive(Error, Debug)]
pub enum SolverError {
    /// The search finished with required goals still ungrounded.  Carries
    /// the orphan words nothing could derive.
    #[error("unsatisfiable goals, nothing grounds: {}", .0.join(" "))]
    Unsatisfiable(Vec<Word>),

    #[error("goal set exceeded the search bound of {limit} words; simplify the rule set")]
    BoundExceeded { limit: usize },

    #[error("solve cancelled")]
    Cancelled,

    /// A grounded rule command failed; the plan is aborted.  Ungrounded
    /// command failures are recovered by rejecting the rewrite instead.
    #[error("command exited with status {status}: {command}")]
    Command { command: String, status: i32 },

    #[error("failed to run command: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl SolverError {
    /// True for errors that indicate a bug rather than bad user input.
    pub fn is_internal(&self) -> bool {
        matches!(self, SolverError::Internal(_))
    }
}
