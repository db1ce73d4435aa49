//! Error taxonomy.
//!
//! Two layers:
//!
//! - [`MatchFail`]: why a single destructuring match did not produce bindings.
//!   The matcher returns this directly; most callers treat a failed match as
//!   "this rule does not apply" and move on.
//! - [`Error`]: everything that propagates to the caller — rejected
//!   definitions, unsatisfiable goal sets, command failures, and internal
//!   invariant violations.
//!
//! The matcher and expander never interact with the shell; command failures
//! can only originate from Backend execution, and they are recovered only for
//! ungrounded (speculative) rewrites.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a destructuring match failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFail {
    /// Words were left over after every pattern term was processed.
    #[error("words left over after matching: {}", .0.join(" "))]
    NotConsumed(Vec<String>),

    /// A variable name appears more than once across the pattern terms.
    #[error("variable %{0} appears more than once in the pattern")]
    RepeatedVariable(String),

    /// A term contains a `%` that is not part of a variable reference.
    #[error("pattern term `{0}` contains a `%` with no variable name")]
    EmptyPattern(String),

    /// A word passed the profile filter but failed regex rebinding. The glob
    /// and the binding regex are derived from the same term, so this is a bug
    /// indicator, never a user error.
    #[error("word `{word}` passed the profile filter for `{term}` but failed rebinding")]
    InternalMismatch { term: String, word: String },
}

impl MatchFail {
    pub fn is_internal(&self) -> bool {
        matches!(self, MatchFail::InternalMismatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed pattern at definition time; the definition is rejected and
    /// prior registry state is untouched.
    #[error("malformed pattern: {0}")]
    Pattern(MatchFail),

    /// A match that was expected to succeed (e.g. binding a global's LHS
    /// against its RHS) did not.
    #[error("cannot bind `{pattern}` against `{text}`: {fail}")]
    Match { pattern: String, text: String, fail: MatchFail },

    /// A definition that is structurally invalid independent of any pattern.
    #[error("bad definition: {0}")]
    Definition(String),

    /// The solver terminated with required goals still ungrounded.
    #[error("cannot ground: {}", .0.join(" "))]
    UnsatisfiableGoal(Vec<String>),

    /// The goal set outgrew the per-solve safety bound.
    #[error("goal set exceeded the search bound of {limit}; simplify the rule set or split the build")]
    SearchBoundExceeded { limit: usize },

    /// Non-zero exit from a grounded rule's command. Ungrounded-rule failures
    /// are swallowed by the rewrite loop and never reach this variant.
    #[error("command exited with status {status}: {command}")]
    CommandFailed { command: String, status: i32 },

    /// The cancellation token fired; partial solve state was discarded.
    #[error("cancelled")]
    Cancelled,

    /// A bug in the engine, reported with reproducer context.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that indicate an engine bug rather than user input.
    /// The binary maps these to exit code 2.
    pub fn is_internal(&self) -> bool {
        match self {
            Error::InternalInvariant(_) => true,
            Error::Pattern(fail) => fail.is_internal(),
            Error::Match { fail, .. } => fail.is_internal(),
            _ => false,
        }
    }
}
