use crate::backend::{Backend, Fingerprint};
use crate::engine::{Registry, Solver};
use crate::error::{Error, Result};
use crate::{Plan, Word};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Shared cancellation flag.
///
/// Cancelling aborts the current solve after the in-flight iteration and
/// stops plan execution before the next step; partial solve state is
/// discarded. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options that affect solving and plan execution.
///
/// Intentionally minimal; the concurrency hint lives on the Backend, which is
/// the only component that ever runs anything in parallel.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub cancel: CancelToken,
}

/// One search iteration in a verbose trace.
#[derive(Debug, Clone)]
pub struct SearchPass {
    pub pass: usize,
    pub duration: Duration,
    /// Goals grounded in this iteration.
    pub grounded: usize,
    /// Disjunctions recorded in this iteration.
    pub expanded: usize,
    /// Goal count at the end of the iteration.
    pub goals: usize,
}

/// Compact per-phase details returned by [`Engine::solve_with_details`].
/// Meant for debugging and performance inspection, not for driving builds.
#[derive(Debug, Clone)]
pub struct SolveDetails {
    pub total: Duration,
    pub rewrite: Duration,
    pub rewrite_passes: usize,
    pub rewrites_applied: usize,
    /// The goal list after the rewrite fixpoint.
    pub goals: Vec<Word>,
    pub passes: Vec<SearchPass>,
    pub plan_emission: Duration,
}

/// Outcome of executing a plan against a Backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Steps in the executed plan.
    pub steps: usize,
    /// Steps whose command actually ran.
    pub executed: usize,
    /// Steps skipped because the Backend reported them fresh.
    pub fresh: usize,
}

/// One rule-graph instance: a registry plus the operations over it.
///
/// Definitions mutate the engine; `eval`, `solve`, and `build` are read-only
/// against the registry (the Backend carries all the mutable build state).
#[derive(Debug, Default)]
pub struct Engine {
    registry: Registry,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one definition from a positional token vector. Separators
    /// (`:`, `=`, `::`) are recognized only as standalone tokens.
    pub fn define<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        self.registry.define(tokens)
    }

    /// Define from one whitespace-separated line. Blank lines and `#`
    /// comments are ignored.
    pub fn define_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        self.registry.define(&tokens)
    }

    /// Load a rule file: one definition per line.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            self.define_line(line)?;
        }
        Ok(())
    }

    /// Register `word` as a terminal grounded rule ("this exists").
    pub fn define_terminal(&mut self, word: &str) -> Result<()> {
        self.registry.define_terminal(word)
    }

    pub fn default_goals(&self) -> &[Word] {
        self.registry.default_goals()
    }

    pub fn has_rules(&self) -> bool {
        !self.registry.rules().is_empty()
    }

    /// Rules in definition order, rendered in their surface form.
    pub fn rule_lines(&self) -> Vec<String> {
        self.registry.rules().iter().map(|r| r.to_string()).collect()
    }

    /// Globals in insertion order, rendered as `%name = values`.
    pub fn global_lines(&self) -> Vec<String> {
        self.registry.globals().iter().map(|g| g.to_string()).collect()
    }

    /// Expand `words` through ungrounded equations to a fixpoint and return
    /// the result without solving anything.
    pub fn eval(&self, words: &[Word], backend: &mut dyn Backend) -> Result<Vec<Word>> {
        Solver::eval(&self.registry, words, backend)
    }

    /// Solve `goals` into an ordered plan.
    pub fn solve(&self, goals: &[Word], backend: &mut dyn Backend, options: &Options) -> Result<Plan> {
        Ok(Solver::solve(&self.registry, goals, backend, &options.cancel)?.plan)
    }

    /// Solve `goals` and return per-phase timing details alongside the plan.
    pub fn solve_with_details(
        &self,
        goals: &[Word],
        backend: &mut dyn Backend,
        options: &Options,
    ) -> Result<(Plan, SolveDetails)> {
        let result = Solver::solve(&self.registry, goals, backend, &options.cancel)?;

        let passes = result
            .metrics
            .search
            .iter()
            .enumerate()
            .map(|(idx, p)| SearchPass {
                pass: idx + 1,
                duration: p.duration,
                grounded: p.grounded,
                expanded: p.expanded,
                goals: p.goals,
            })
            .collect();

        let details = SolveDetails {
            total: result.metrics.total,
            rewrite: result.metrics.rewrite.total,
            rewrite_passes: result.metrics.rewrite.passes,
            rewrites_applied: result.metrics.rewrite.applied,
            goals: result.goals,
            passes,
            plan_emission: result.metrics.plan,
        };
        Ok((result.plan, details))
    }

    /// Execute a solved plan in order: fingerprint inputs, skip fresh steps,
    /// run stale commands, record outputs. A failing grounded command aborts
    /// the build.
    pub fn execute_plan(&self, plan: &Plan, backend: &mut dyn Backend, options: &Options) -> Result<BuildReport> {
        let mut report = BuildReport { steps: plan.len(), executed: 0, fresh: 0 };
        for step in &plan.steps {
            if options.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let inputs: Vec<Fingerprint> = step.inputs.iter().map(|w| backend.fingerprint(w)).collect();
            if backend.is_fresh(step.rule, &step.bindings, &inputs) {
                report.fresh += 1;
                continue;
            }
            if let Some(command) = &step.command {
                let status = backend.execute(step.rule, command, &step.bindings)?;
                if status != 0 {
                    return Err(Error::CommandFailed { command: command.clone(), status });
                }
                report.executed += 1;
            }
            let outputs: Vec<Fingerprint> = step.outputs.iter().map(|w| backend.fingerprint(w)).collect();
            backend.record_output(step.rule, &step.bindings, &outputs);
        }
        Ok(report)
    }

    /// Solve and execute in one call.
    pub fn build(&self, goals: &[Word], backend: &mut dyn Backend, options: &Options) -> Result<BuildReport> {
        let plan = self.solve(goals, backend, options)?;
        self.execute_plan(&plan, backend, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn engine(lines: &[&str]) -> Engine {
        let mut engine = Engine::new();
        for line in lines {
            engine.define_line(line).unwrap();
        }
        engine
    }

    fn goal_words(goals: &[&str]) -> Vec<Word> {
        goals.iter().map(|g| g.to_string()).collect()
    }

    #[test]
    fn build_runs_the_chain_in_dependency_order() {
        let engine = engine(&[
            "%bin : %bin.o :: link %in -o %out",
            "%x.o : %x.c :: cc -c %in",
            "foo.c :",
        ]);
        let mut backend = RecordingBackend::new();
        let report = engine.build(&goal_words(&["foo"]), &mut backend, &Options::default()).unwrap();

        assert_eq!(report, BuildReport { steps: 3, executed: 2, fresh: 0 });
        let commands: Vec<&str> = backend.executed().iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(commands, ["cc -c foo.c", "link foo.o -o foo"]);
        // Every step, command-less terminals included, records its outputs.
        assert_eq!(backend.recorded().len(), 3);
    }

    #[test]
    fn fresh_steps_are_skipped() {
        let engine = engine(&["%x.o : %x.c :: cc -c %in", "foo.c :"]);
        let mut backend = RecordingBackend::new();
        backend.mark_all_fresh();
        let report = engine.build(&goal_words(&["foo.o"]), &mut backend, &Options::default()).unwrap();

        assert_eq!(report, BuildReport { steps: 2, executed: 0, fresh: 2 });
        assert!(backend.executed().is_empty());
    }

    #[test]
    fn failing_grounded_command_aborts_the_build() {
        let engine = engine(&["%x.o : %x.c :: cc -c %in", "foo.c :"]);
        let mut backend = RecordingBackend::new();
        backend.fail_matching("cc");
        let err = engine.build(&goal_words(&["foo.o"]), &mut backend, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { status: 1, .. }));
    }

    #[test]
    fn redefining_a_global_does_not_change_existing_rules() {
        let mut engine = engine(&["%cc = gcc", "%x.o : %x.c :: %cc -c %in", "foo.c :"]);
        let mut backend = RecordingBackend::new();
        engine.build(&goal_words(&["foo.o"]), &mut backend, &Options::default()).unwrap();
        assert_eq!(backend.executed()[0].1, "gcc -c foo.c");

        engine.define_line("%cc = clang").unwrap();
        let mut backend = RecordingBackend::new();
        engine.build(&goal_words(&["foo.o"]), &mut backend, &Options::default()).unwrap();
        assert_eq!(backend.executed()[0].1, "gcc -c foo.c");
    }

    #[test]
    fn eval_expands_without_building() {
        let engine = engine(&["inout-%x = %x"]);
        let mut backend = RecordingBackend::new();
        let out = engine.eval(&goal_words(&["inout-7", "other"]), &mut backend).unwrap();
        assert_eq!(out, ["7", "other"]);
        assert!(backend.recorded().is_empty());
    }

    #[test]
    fn load_str_skips_blanks_and_comments() {
        let mut engine = Engine::new();
        engine
            .load_str(
                "# toolchain\n\
                 %cc = cc\n\
                 \n\
                 %x.o : %x.c :: %cc -c %in\n\
                 : app\n",
            )
            .unwrap();
        assert_eq!(engine.rule_lines().len(), 1);
        assert_eq!(engine.global_lines(), ["%cc = cc"]);
        assert_eq!(engine.default_goals(), ["app"]);
    }

    #[test]
    fn listing_preserves_definition_order() {
        let engine = engine(&["%bin : %bin.o :: link %in", "gen.h gen.c : spec :: generate", "%opt = -O2"]);
        assert_eq!(
            engine.rule_lines(),
            ["%bin : %bin.o :: link %in", "gen.h gen.c : spec :: generate"]
        );
        assert_eq!(engine.global_lines(), ["%opt = -O2"]);
    }

    #[test]
    fn cancelled_options_stop_before_any_step() {
        let engine = engine(&["foo :"]);
        let options = Options::default();
        options.cancel.cancel();
        let mut backend = RecordingBackend::new();
        let err = engine.build(&goal_words(&["foo"]), &mut backend, &options).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
