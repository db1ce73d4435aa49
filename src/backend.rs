//! Backend seam: content tracking and command execution.
//!
//! The engine never touches the shell or the filesystem itself. Everything
//! effectful goes through the [`Backend`] trait:
//!
//! - `fingerprint` turns a word into a content identity,
//! - `is_fresh` decides whether a plan step can be skipped,
//! - `record_output` commits a step's results after success,
//! - `execute` runs a command and reports its exit status.
//!
//! For each plan step the engine calls `fingerprint` on the inputs, then
//! `is_fresh`, then (when stale) `execute`, then `record_output`. Backends
//! may rely on that order.
//!
//! [`ShellBackend`] is the reference implementation used by the CLI: `sh -c`
//! execution, file-based fingerprints, and an in-process freshness ledger.
//! A durable content store is deliberately out of scope; it would implement
//! this same trait.

use crate::error::Result;
use crate::{Bindings, RuleId};
use std::collections::HashMap;
use std::process::Command;
use std::time::UNIX_EPOCH;

/// Opaque content identity for a word. Only ever compared for equality.
pub type Fingerprint = String;

pub trait Backend {
    fn fingerprint(&self, word: &str) -> Fingerprint;
    fn is_fresh(&mut self, rule: RuleId, bindings: &Bindings, inputs: &[Fingerprint]) -> bool;
    fn record_output(&mut self, rule: RuleId, bindings: &Bindings, outputs: &[Fingerprint]);
    fn execute(&mut self, rule: RuleId, command: &str, bindings: &Bindings) -> Result<i32>;
}

/// Shell-executing backend with file fingerprints.
///
/// Words are fingerprinted as files (length + mtime when the file exists, an
/// absent marker otherwise). Freshness is an in-process ledger keyed by rule
/// instance: a step is fresh when its input fingerprints match what was
/// recorded at its last successful execution in this process.
pub struct ShellBackend {
    jobs: usize,
    /// Input fingerprints recorded at the last successful run per rule
    /// instance.
    ledger: HashMap<(RuleId, String), Vec<Fingerprint>>,
    /// Inputs seen by the most recent `is_fresh` query per rule instance,
    /// committed to the ledger by `record_output`.
    pending: HashMap<(RuleId, String), Vec<Fingerprint>>,
}

impl ShellBackend {
    pub fn new(jobs: usize) -> Self {
        ShellBackend { jobs: jobs.max(1), ledger: HashMap::new(), pending: HashMap::new() }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    fn key(rule: RuleId, bindings: &Bindings) -> (RuleId, String) {
        (rule, bindings.to_string())
    }
}

impl Default for ShellBackend {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Backend for ShellBackend {
    fn fingerprint(&self, word: &str) -> Fingerprint {
        match std::fs::metadata(word) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                format!("file:{}:{}", meta.len(), mtime)
            }
            Err(_) => "absent".to_string(),
        }
    }

    fn is_fresh(&mut self, rule: RuleId, bindings: &Bindings, inputs: &[Fingerprint]) -> bool {
        let key = Self::key(rule, bindings);
        let fresh = self.ledger.get(&key).is_some_and(|recorded| recorded == inputs);
        self.pending.insert(key, inputs.to_vec());
        fresh
    }

    fn record_output(&mut self, rule: RuleId, bindings: &Bindings, _outputs: &[Fingerprint]) {
        let key = Self::key(rule, bindings);
        if let Some(inputs) = self.pending.remove(&key) {
            self.ledger.insert(key, inputs);
        }
    }

    fn execute(&mut self, _rule: RuleId, command: &str, _bindings: &Bindings) -> Result<i32> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("WEFT_JOBS", self.jobs.to_string())
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Scripted backend for tests: records executions, never spawns anything.
#[cfg(test)]
pub struct RecordingBackend {
    executed: Vec<(RuleId, String)>,
    fail_patterns: Vec<String>,
    all_fresh: bool,
    recorded: Vec<(RuleId, Vec<Fingerprint>)>,
}

#[cfg(test)]
impl RecordingBackend {
    pub fn new() -> Self {
        RecordingBackend { executed: Vec::new(), fail_patterns: Vec::new(), all_fresh: false, recorded: Vec::new() }
    }

    /// Commands containing `pattern` exit non-zero.
    pub fn fail_matching(&mut self, pattern: &str) {
        self.fail_patterns.push(pattern.to_string());
    }

    /// Report every step as fresh.
    pub fn mark_all_fresh(&mut self) {
        self.all_fresh = true;
    }

    pub fn executed(&self) -> &[(RuleId, String)] {
        &self.executed
    }

    pub fn recorded(&self) -> &[(RuleId, Vec<Fingerprint>)] {
        &self.recorded
    }
}

#[cfg(test)]
impl Backend for RecordingBackend {
    fn fingerprint(&self, word: &str) -> Fingerprint {
        format!("fp:{word}")
    }

    fn is_fresh(&mut self, _rule: RuleId, _bindings: &Bindings, _inputs: &[Fingerprint]) -> bool {
        self.all_fresh
    }

    fn record_output(&mut self, rule: RuleId, _bindings: &Bindings, outputs: &[Fingerprint]) {
        self.recorded.push((rule, outputs.to_vec()));
    }

    fn execute(&mut self, rule: RuleId, command: &str, _bindings: &Bindings) -> Result<i32> {
        self.executed.push((rule, command.to_string()));
        let failed = self.fail_patterns.iter().any(|p| command.contains(p));
        Ok(if failed { 1 } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_fingerprint_as_absent() {
        let backend = ShellBackend::default();
        assert_eq!(backend.fingerprint("no/such/file/anywhere"), "absent");
    }

    #[test]
    fn freshness_requires_a_recorded_run_with_matching_inputs() {
        let mut backend = ShellBackend::default();
        let bindings = Bindings::new();
        let inputs = vec!["file:1:2".to_string()];

        assert!(!backend.is_fresh(0, &bindings, &inputs));
        backend.record_output(0, &bindings, &[]);
        assert!(backend.is_fresh(0, &bindings, &inputs));

        // Changed inputs invalidate the recording.
        let changed = vec!["file:9:9".to_string()];
        assert!(!backend.is_fresh(0, &bindings, &changed));
    }

    #[test]
    fn record_without_a_prior_query_is_a_no_op() {
        let mut backend = ShellBackend::default();
        let bindings = Bindings::new();
        backend.record_output(7, &bindings, &[]);
        assert!(!backend.is_fresh(7, &bindings, &[]));
    }

    #[test]
    fn shell_exit_status_is_reported() {
        let mut backend = ShellBackend::default();
        let bindings = Bindings::new();
        assert_eq!(backend.execute(0, "exit 0", &bindings).unwrap(), 0);
        assert_eq!(backend.execute(0, "exit 3", &bindings).unwrap(), 3);
    }
}
