//! An in-memory backend: nothing executes, everything is remembered.
//!
//! Useful for dry runs and for tests that script command outcomes.

use std::{collections::HashMap, io};

use log::debug;

use crate::{
    backend::{Backend, Fingerprint},
    pattern::{Bindings, Word},
    registry::RuleId,
};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Every command handed to `execute`, in order.
    pub executed: Vec<(RuleId, String)>,
    /// Commands that report the given exit status instead of 0, keyed by the
    /// expanded command text.
    pub statuses: HashMap<String, i32>,
    fresh: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that reports every firing as fresh, so no command runs.
    pub fn all_fresh() -> Self {
        MemoryBackend {
            fresh: true,
            ..Self::default()
        }
    }

    /// Script `command` to exit with `status`.
    pub fn set_status(&mut self, command: &str, status: i32) {
        self.statuses.insert(command.to_string(), status);
    }

    pub fn commands(&self) -> Vec<&str> {
        self.executed.iter().map(|(_, c)| c.as_str()).collect()
    }
}

impl Backend for MemoryBackend {
    fn fingerprint(&mut self, word: &Word) -> Fingerprint {
        format!("mem:{}", word)
    }

    fn is_fresh(&mut self, _rule: RuleId, _bindings: &Bindings, _inputs: &[Fingerprint]) -> bool {
        self.fresh
    }

    fn record_output(&mut self, _rule: RuleId, _bindings: &Bindings, _outputs: &[Fingerprint]) {}

    fn execute(&mut self, rule: RuleId, command: &str, _bindings: &Bindings) -> io::Result<i32> {
        let status = self.statuses.get(command).copied().unwrap_or(0);
        debug!("{}: {} -> {}", rule, command, status);
        self.executed.push((rule, command.to_string()));
        Ok(status)
    }
}
