//! Matching, expansion, and solving engine.
//!
//! This module is the operational core of the build engine. The public
//! surface lives in `src/api.rs`; the pieces here compose into one pipeline:
//!
//! ```text
//! definitions ──▶ Registry::define          (registry.rs)
//!                   - dispatch : / = / ::
//!                   - pre-expand globals
//!                   - upsert globals, append rules
//!
//! goals ──▶ rewrite fixpoint                (solver.rs + expander.rs)
//!             - ungrounded rules as equations
//!             - speculative commands accept/reject rewrites
//!               │
//!               ▼
//!           CompiledRules::new              (compiled.rs)
//!             - classify grounded rules (terminal/unary/everything)
//!               │
//!               ▼
//!           Solver::search                  (solver.rs + matcher.rs)
//!             - terminal sweep
//!             - parent propagation (worklist)
//!             - goal expansion + unification
//!               │
//!               ▼
//!           plan emission ──▶ Plan          (handed to the Backend)
//! ```
//!
//! The solver is single-threaded and deterministic: rule definition order is
//! preserved in every registry iteration, goal insertion order is preserved in
//! the goal vector, and disjunction alternatives are indexed in discovery
//! order. Concurrency only exists past the plan boundary, inside the Backend.
//!
//! ## Responsibilities by module
//!
//! - `matcher.rs`: destructure a word list against pattern terms (factor +
//!   bind, shadowing, the at-most-one-plural rule).
//! - `expander.rs`: the inverse — substitute bindings into templates with
//!   cross-multiplication.
//! - `registry.rs`: definition dispatch and the grounded/ungrounded/global
//!   split.
//! - `compiled.rs`: per-solve classification indexes over grounded rules.
//! - `solver.rs`: goal expansion, terminal grounding, propagation, and plan
//!   emission.
//! - `metrics.rs`: per-phase timing for verbose reports.
//!
//! ## Debugging
//!
//! Set `WEFT_DEBUG_SOLVE=1` to print rewrite, grounding, and expansion traces
//! to stderr.

#[path = "engine/compiled.rs"]
mod compiled;
#[path = "engine/expander.rs"]
mod expander;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/registry.rs"]
mod registry;
#[path = "engine/solver.rs"]
mod solver;

#[allow(unused_imports)]
pub use compiled::{CompiledRules, RuleFlags};
#[allow(unused_imports)]
pub use expander::{expand, expand_to_text};
#[allow(unused_imports)]
pub use matcher::match_terms;
#[allow(unused_imports)]
pub use metrics::{PassMetrics, RewriteMetrics, SolveMetrics, SolveResult};
#[allow(unused_imports)]
pub use registry::{Global, Registry};
#[allow(unused_imports)]
pub use solver::Solver;
