extern crate self as weft;

#[macro_use]
mod macros;
mod api;
mod backend;
mod engine;
mod error;
mod pattern;

pub use api::{BuildReport, CancelToken, Engine, Options, SearchPass, SolveDetails};
pub use backend::{Backend, Fingerprint, ShellBackend};
pub use error::{Error, MatchFail, Result};
pub use pattern::Term;

use std::collections::HashMap;
use std::fmt;

// --- Core model --------------------------------------------------------------

/// A word: a non-empty string of non-space characters. Word lists are ordered,
/// but in most contexts the ordering is non-semantic (dependencies commute);
/// only destructuring matches care about position.
pub type Word = String;

/// Rule identifier (index into the registry's rule vector).
pub type RuleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// A build edge (`:`): inputs must be grounded before the command runs.
    Grounded,
    /// A rewrite equation (`=`): always applicable during goal expansion; its
    /// command, if any, is speculative and idempotent.
    Ungrounded,
}

/// A build rule: output patterns, input patterns, and an optional command
/// template. Globals are not rules; they live in their own keyed map on the
/// registry.
#[derive(Debug, Clone)]
pub struct Rule {
    pub outs: Vec<Term>,
    pub ins: Vec<Term>,
    /// Command template tokens. Empty means the rule has no command.
    pub cmd: Vec<Term>,
    pub kind: RuleKind,
}

impl Rule {
    /// A terminal rule is a grounded rule with no inputs ("this exists").
    pub fn is_terminal(&self) -> bool {
        self.kind == RuleKind::Grounded && self.ins.is_empty()
    }

    pub fn has_command(&self) -> bool {
        !self.cmd.is_empty()
    }
}

impl fmt::Display for Rule {
    /// Reconstructs the definition surface form: `outs : ins :: cmd`. A
    /// terminal rule with a command round-trips as the bare `out :: cmd`
    /// form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |terms: &[Term]| terms.iter().map(Term::source).collect::<Vec<_>>().join(" ");
        write!(f, "{}", join(&self.outs))?;
        let bare_terminal = self.kind == RuleKind::Grounded && self.ins.is_empty() && self.has_command();
        if !bare_terminal {
            write!(f, " {}", if self.kind == RuleKind::Grounded { ":" } else { "=" })?;
            if !self.ins.is_empty() {
                write!(f, " {}", join(&self.ins))?;
            }
        }
        if self.has_command() {
            write!(f, " :: {}", join(&self.cmd))?;
        }
        Ok(())
    }
}

// --- Bindings ----------------------------------------------------------------

/// A map from variable name to a word list, preserving first-insertion order.
///
/// Every binding is uniformly a word list; the `@` prefix on a variable only
/// governs whether multiple distinct values are admissible during matching,
/// it is not a type. Singular variables carry exactly one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    names: Vec<String>,
    map: HashMap<String, Vec<Word>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a binding. The name keeps its original insertion position.
    pub fn set(&mut self, name: &str, values: Vec<Word>) {
        if !self.map.contains_key(name) {
            self.names.push(name.to_string());
        }
        self.map.insert(name.to_string(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[Word]> {
        self.map.get(name).map(Vec::as_slice)
    }

    /// Iterate bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Word])> {
        self.names.iter().map(|n| (n.as_str(), self.map[n].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Clone with one extra binding. Used to graft the synthetic `in`/`out`
    /// variables onto a match result before command expansion.
    pub fn with(&self, name: &str, values: Vec<Word>) -> Self {
        let mut next = self.clone();
        next.set(name, values);
        next
    }

    /// Drop a binding if present.
    pub fn remove(&mut self, name: &str) {
        if self.map.remove(name).is_some() {
            self.names.retain(|n| n != name);
        }
    }
}

impl fmt::Display for Bindings {
    /// `x=foo xs=[bar bif]` — single-value bindings print bare, everything
    /// else in brackets. Stable across runs (insertion order).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, values) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match values {
                [single] => write!(f, "{name}={single}")?,
                many => write!(f, "{name}=[{}]", many.join(" "))?,
            }
        }
        Ok(())
    }
}

// --- Plan --------------------------------------------------------------------

/// One emitted build step: a rule instance with its match bindings and the
/// fully expanded input/output word lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub rule: RuleId,
    pub bindings: Bindings,
    pub inputs: Vec<Word>,
    pub outputs: Vec<Word>,
    /// Command text expanded with the bindings plus `%in`/`%out`. `None` for
    /// command-less rules.
    pub command: Option<String>,
}

/// An ordered list of steps. Executing them in order, consulting the Backend
/// before each, produces all requested goals. Steps with no dependency
/// relation between them are only incidentally ordered; the Backend may run
/// those in parallel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the plan one step per line, `#id [bindings] outputs <- inputs`.
    /// The rendering is byte-stable for identical solves.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(&format!(
                "#{} [{}] {} <- {}",
                step.rule,
                step.bindings,
                step.outputs.join(" "),
                if step.inputs.is_empty() { "·".to_string() } else { step.inputs.join(" ") },
            ));
            if let Some(cmd) = &step.command {
                out.push_str(&format!(" :: {cmd}"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_preserve_insertion_order() {
        let mut b = Bindings::new();
        b.set("z", vec!["1".into()]);
        b.set("a", vec!["2".into(), "3".into()]);
        b.set("z", vec!["9".into()]);

        let collected: Vec<(&str, &[Word])> = b.iter().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].0, "z");
        assert_eq!(collected[0].1, ["9".to_string()]);
        assert_eq!(collected[1].0, "a");
        assert_eq!(b.to_string(), "z=9 a=[2 3]");
    }

    #[test]
    fn bindings_with_does_not_mutate_original() {
        let mut b = Bindings::new();
        b.set("x", vec!["foo".into()]);
        let extended = b.with("in", vec!["foo.c".into()]);

        assert!(b.get("in").is_none());
        assert_eq!(extended.get("in").unwrap(), ["foo.c".to_string()]);
        assert_eq!(extended.get("x").unwrap(), ["foo".to_string()]);
    }
}
