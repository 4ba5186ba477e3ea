//! The content-tracking backend boundary.
//!
//! The engine never touches the shell or the filesystem itself; it hands
//! every command and every freshness decision to a [`Backend`].  The plan's
//! partial order is the only synchronization contract: a rule must not begin
//! until the backend has confirmed each prerequisite, and must not be retried
//! concurrently for the same fingerprint.

pub mod memory;
pub mod shell;

use std::io;

pub use memory::MemoryBackend;
pub use shell::ShellBackend;

use crate::{
    pattern::{Bindings, Word},
    registry::RuleId,
};

/// An opaque content fingerprint for one word.
pub type Fingerprint = String;

pub trait Backend {
    /// Stable fingerprint for the current content behind `word`.
    fn fingerprint(&mut self, word: &Word) -> Fingerprint;

    /// True when the outputs of `(rule, bindings)` are up to date with
    /// respect to `inputs` and the command need not run.
    fn is_fresh(&mut self, rule: RuleId, bindings: &Bindings, inputs: &[Fingerprint]) -> bool;

    /// Record the fingerprints a rule produced, completing the freshness
    /// bookkeeping started by [`Backend::is_fresh`].
    fn record_output(&mut self, rule: RuleId, bindings: &Bindings, outputs: &[Fingerprint]);

    /// Run a fully expanded command.  Returns the exit status; a failure to
    /// spawn at all is an `Err`.
    fn execute(&mut self, rule: RuleId, command: &str, bindings: &Bindings) -> io::Result<i32>;
}

/// Canonical map key for one `(rule, bindings)` firing.
pub(crate) fn firing_key(rule: RuleId, bindings: &Bindings) -> String {
    format!("{} {}", rule, bindings)
}
