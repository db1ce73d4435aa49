//! Solve metrics.
//!
//! Small observation structs for profiling and the `-v` report, in the same
//! spirit as the rest of the engine: opt-in, cheap on the hot path (counts
//! and durations only, no per-goal detail), and stable across identical
//! solves except for the durations themselves.

use crate::{Plan, Word};
use std::time::Duration;

/// Timings and counts for one full solve.
#[derive(Debug, Default, Clone)]
pub struct SolveMetrics {
    /// Total elapsed time (rewrite + search + plan emission).
    pub total: Duration,
    /// The ungrounded-equation fixpoint over the goal list.
    pub rewrite: RewriteMetrics,
    /// One entry per search iteration (sweep + propagation + expansion).
    pub search: Vec<PassMetrics>,
    /// Time spent selecting disjuncts and ordering the plan.
    pub plan: Duration,
}

/// Timings for the rewrite fixpoint.
#[derive(Debug, Default, Clone)]
pub struct RewriteMetrics {
    pub total: Duration,
    /// Number of passes over the equation list (final, unchanged pass
    /// included).
    pub passes: usize,
    /// Number of rewrites that were actually applied.
    pub applied: usize,
}

/// Counts for a single search iteration.
#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    pub duration: Duration,
    /// Goals grounded during this iteration.
    pub grounded: usize,
    /// Disjunctions recorded during this iteration.
    pub expanded: usize,
    /// Total goal count at the end of the iteration.
    pub goals: usize,
}

/// Solver output bundled with timing information.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub plan: Plan,
    /// The goal list after the rewrite fixpoint (the words the search
    /// actually grounded), in insertion order.
    pub goals: Vec<Word>,
    pub metrics: SolveMetrics,
}
