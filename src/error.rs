//! Top-level error type and process exit codes.

use crate::{
    pattern::error::{MatchError, PatternError},
    registry::RegistryError,
    solver::SolverError,
};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl Error {
    /// Process exit code for this error: 1 for user errors, 2 for internal
    /// invariant violations.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Match(err) if err.is_internal() => 2,
            Error::Solver(err) if err.is_internal() => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_exit_with_two() {
        let user: Error = SolverError::Unsatisfiable(vec!["x".to_string()]).into();
        assert_eq!(user.exit_code(), 1);
        let internal: Error = SolverError::Internal("oops".to_string()).into();
        assert_eq!(internal.exit_code(), 2);
    }
}
