//! A backend that runs commands through `sh -c` and fingerprints build
//! products by hashing file contents.

use std::{collections::HashMap, fs, io, path::Path, process::Command};

use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::{
    backend::{firing_key, Backend, Fingerprint},
    pattern::{Bindings, Word},
    registry::RuleId,
};

/// Shell-executing, content-hashing backend.
///
/// Freshness is judged per `(rule, bindings)` firing: a firing is fresh when
/// its recorded input fingerprints match the current ones and an output
/// record exists for it.  The `jobs` hint bounds how many commands the
/// backend may run at once; this implementation runs them one at a time.
pub struct ShellBackend {
    jobs: usize,
    recorded_inputs: HashMap<String, Vec<Fingerprint>>,
    pending_inputs: HashMap<String, Vec<Fingerprint>>,
    recorded_outputs: HashMap<String, Vec<Fingerprint>>,
}

impl ShellBackend {
    pub fn new(jobs: usize) -> Self {
        ShellBackend {
            jobs: jobs.max(1),
            recorded_inputs: HashMap::new(),
            pending_inputs: HashMap::new(),
            recorded_outputs: HashMap::new(),
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }
}

impl Backend for ShellBackend {
    fn fingerprint(&mut self, word: &Word) -> Fingerprint {
        let digest = match fs::read(Path::new(word)) {
            Ok(bytes) => Sha256::digest(&bytes),
            // A word with no file behind it fingerprints as its own text, so
            // phony goals still participate in freshness tracking.
            Err(_) => Sha256::digest(format!("word:{}", word).as_bytes()),
        };
        hex::encode(digest)
    }

    fn is_fresh(&mut self, rule: RuleId, bindings: &Bindings, inputs: &[Fingerprint]) -> bool {
        let key = firing_key(rule, bindings);
        let fresh = self.recorded_outputs.contains_key(&key)
            && self.recorded_inputs.get(&key).map(Vec::as_slice) == Some(inputs);
        if !fresh {
            self.pending_inputs.insert(key, inputs.to_vec());
        }
        fresh
    }

    fn record_output(&mut self, rule: RuleId, bindings: &Bindings, outputs: &[Fingerprint]) {
        let key = firing_key(rule, bindings);
        if let Some(inputs) = self.pending_inputs.remove(&key) {
            self.recorded_inputs.insert(key.clone(), inputs);
        }
        self.recorded_outputs.insert(key, outputs.to_vec());
    }

    fn execute(&mut self, rule: RuleId, command: &str, _bindings: &Bindings) -> io::Result<i32> {
        info!("{}: {}", rule, command);
        let status = Command::new("sh").arg("-c").arg(command).status()?;
        let code = status.code().unwrap_or(-1);
        debug!("{} exited with {}", rule, code);
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_reports_exit_status() {
        let mut backend = ShellBackend::new(1);
        let bindings = Bindings::new();
        assert_eq!(
            backend.execute(RuleId(0), "true", &bindings).unwrap(),
            0
        );
        assert_eq!(
            backend.execute(RuleId(0), "exit 3", &bindings).unwrap(),
            3
        );
    }

    #[test]
    fn freshness_requires_a_recorded_run() {
        let mut backend = ShellBackend::new(1);
        let bindings = Bindings::new();
        let inputs = vec!["abc".to_string()];
        assert!(!backend.is_fresh(RuleId(1), &bindings, &inputs));
        backend.record_output(RuleId(1), &bindings, &["out".to_string()]);
        assert!(backend.is_fresh(RuleId(1), &bindings, &inputs));
        // A changed input fingerprint spoils the record.
        assert!(!backend.is_fresh(RuleId(1), &bindings, &["xyz".to_string()]));
    }

    #[test]
    fn missing_files_fingerprint_by_name() {
        let mut backend = ShellBackend::new(1);
        let a = backend.fingerprint(&"no-such-file-a".to_string());
        let b = backend.fingerprint(&"no-such-file-b".to_string());
        assert_ne!(a, b);
        assert_eq!(a, backend.fingerprint(&"no-such-file-a".to_string()));
    }
}
