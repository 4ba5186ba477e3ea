use thiserror::Error;

use crate::pattern::Word;

/// A pattern is malformed.  Surfaced at definition time; the offending
/// definition is rejected and prior registry state is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("variable %{0} appears more than once in the pattern")]
    RepeatedVariable(String),

    #[error("term {0:?} contains a % that is not a variable reference")]
    EmptyReference(String),
}

/// A bind of a pattern over a word list failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Words were left over after every pattern term claimed its share.
    #[error("pattern did not consume: {}", .0.join(" "))]
    NotConsumed(Vec<Word>),

    /// A word passed the profile filter but failed regex rebinding against
    /// the term that produced the profile.  Indicates a bug in the matcher.
    #[error("word {word:?} matched the profile of {term:?} but failed rebinding")]
    Internal { term: String, word: String },
}

impl MatchError {
    /// True for the kinds that indicate an engine bug rather than user input.
    pub fn is_internal(&self) -> bool {
        matches!(self, MatchError::Internal { .. })
    }
}
