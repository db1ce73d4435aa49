//! Goal solver: rewrite fixpoint, terminal grounding, propagation, and plan
//! emission.
//!
//! Solving happens in two phases over one shared vocabulary of words:
//!
//! 1. **Rewrite fixpoint.** Ungrounded equations are applied to the goal
//!    list until none changes it. An equation's LHS is matched against the
//!    list with an implicit trailing `%@__rest` catch-all, so it can claim a
//!    subset of the goals and leave the rest alone. Equations with commands
//!    are speculative: a non-zero exit quietly rejects the rewrite and the
//!    next equation is tried.
//! 2. **Search.** Grounded rules derive goals from prerequisite goals:
//!
//! ```text
//! ┌─ iteration ────────────────────────────────────────────────┐
//! │ terminal sweep   ground goals that terminal rules produce  │
//! │ propagation      worklist: a goal grounds when one of its  │
//! │                  disjuncts has every dependency grounded   │
//! │ expansion        per-goal cursor over nonterminal rules;   │
//! │                  new prerequisites unify into goals[]      │
//! └────────────────── until required goals ground, or no ──────┘
//!                     iteration makes progress (unsatisfiable)
//! ```
//!
//! Every data structure is insertion-ordered and every rule iteration is in
//! definition order, so identical inputs produce byte-identical plans. The
//! goal vector is bounded by `64 + n³`; rule sets that outgrow it abort
//! rather than spin.
//!
//! A goal may accumulate several *disjuncts* (alternative derivations). The
//! one that actually fired records the grounding witness; plan emission walks
//! the witness graph post-order, so prerequisites always precede their
//! dependents and a rule instance shared by several outputs is emitted once.

use crate::backend::Backend;
use crate::engine::metrics::{PassMetrics, RewriteMetrics, SolveMetrics, SolveResult};
use crate::engine::registry::Registry;
use crate::engine::{CompiledRules, RuleFlags, expand, expand_to_text, match_terms};
use crate::error::{Error, Result};
use crate::pattern::Term;
use crate::{Bindings, CancelToken, Plan, PlanStep, Rule, RuleId, RuleKind, Word};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// One alternative derivation of a goal.
#[derive(Debug, Clone)]
struct Disjunct {
    rule: RuleId,
    bindings: Bindings,
    /// Goal indices this derivation depends on.
    deps: Vec<usize>,
    terminal: bool,
}

/// Search state for a single solve. Lives only for the solve's duration; the
/// registry is read-only throughout.
pub struct Solver<'a> {
    registry: &'a Registry,
    compiled: CompiledRules,
    /// Catch-all patterns (`outs %@__rest`) for rules matched against the
    /// whole goal list.
    catchall: HashMap<RuleId, Vec<Term>>,

    goals: Vec<Word>,
    goal_ix: HashMap<Word, usize>,
    grounded: Vec<bool>,
    /// For each goal, the goals that depend on it.
    parents: Vec<Vec<usize>>,
    disjunctions: Vec<Vec<Disjunct>>,
    /// Next nonterminal rule to try per goal.
    cursor: Vec<usize>,
    everything_tried: Vec<bool>,
    /// Set for goals first discovered through an everything-rule derivation,
    /// directly or transitively. Such goals never get the fallback again.
    everything_derived: Vec<bool>,
    terminal_swept: Vec<bool>,
    /// Index of the disjunct that grounded each goal (the witness).
    chosen: Vec<Option<usize>>,

    queue: VecDeque<usize>,
    required: usize,
    limit: usize,

    pass_grounded: usize,
    pass_expanded: usize,
}

impl<'a> Solver<'a> {
    /// Expand `words` through ungrounded equations to a fixpoint. This is the
    /// `--eval` surface; no grounded rule is consulted.
    pub fn eval(registry: &Registry, words: &[Word], backend: &mut dyn Backend) -> Result<Vec<Word>> {
        let compiled = CompiledRules::new(registry);
        let catchall = build_catchall(registry, &compiled)?;
        let mut metrics = RewriteMetrics::default();
        rewrite_fixpoint(
            registry,
            &compiled.ungrounded,
            &catchall,
            words.to_vec(),
            backend,
            search_limit(words.len()),
            &CancelToken::new(),
            &mut metrics,
        )
    }

    /// Solve `goal_words` into an ordered plan.
    pub fn solve(
        registry: &Registry,
        goal_words: &[Word],
        backend: &mut dyn Backend,
        cancel: &CancelToken,
    ) -> Result<SolveResult> {
        let total_start = Instant::now();
        let compiled = CompiledRules::new(registry);
        let catchall = build_catchall(registry, &compiled)?;
        let limit = search_limit(goal_words.len());
        let mut metrics = SolveMetrics::default();

        let expanded = rewrite_fixpoint(
            registry,
            &compiled.ungrounded,
            &catchall,
            goal_words.to_vec(),
            backend,
            limit,
            cancel,
            &mut metrics.rewrite,
        )?;

        let mut solver = Solver {
            registry,
            compiled,
            catchall,
            goals: Vec::new(),
            goal_ix: HashMap::new(),
            grounded: Vec::new(),
            parents: Vec::new(),
            disjunctions: Vec::new(),
            cursor: Vec::new(),
            everything_tried: Vec::new(),
            everything_derived: Vec::new(),
            terminal_swept: Vec::new(),
            chosen: Vec::new(),
            queue: VecDeque::new(),
            required: 0,
            limit,
            pass_grounded: 0,
            pass_expanded: 0,
        };
        for word in expanded {
            solver.unify(word, false)?;
        }
        solver.required = solver.goals.len();
        let initial_goals = solver.goals.clone();

        metrics.search = solver.search(cancel)?;

        let plan_start = Instant::now();
        let plan = solver.emit_plan()?;
        metrics.plan = plan_start.elapsed();
        metrics.total = total_start.elapsed();

        Ok(SolveResult { plan, goals: initial_goals, metrics })
    }

    // --- Search --------------------------------------------------------------

    fn search(&mut self, cancel: &CancelToken) -> Result<Vec<PassMetrics>> {
        let mut passes = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let pass_start = Instant::now();
            self.pass_grounded = 0;
            self.pass_expanded = 0;
            let goals_before = self.goals.len();

            self.terminal_sweep()?;
            self.propagate();
            if !self.satisfied() {
                self.expand_goals()?;
                self.propagate();
            }

            passes.push(PassMetrics {
                duration: pass_start.elapsed(),
                grounded: self.pass_grounded,
                expanded: self.pass_expanded,
                goals: self.goals.len(),
            });

            if self.satisfied() {
                return Ok(passes);
            }
            let progress =
                self.pass_grounded > 0 || self.pass_expanded > 0 || self.goals.len() > goals_before;
            if !progress {
                return Err(Error::UnsatisfiableGoal(self.orphans()));
            }
        }
    }

    fn satisfied(&self) -> bool {
        (0..self.required).all(|i| self.grounded[i])
    }

    /// Ground ungrounded goals that terminal rules produce directly.
    fn terminal_sweep(&mut self) -> Result<()> {
        let debug = std::env::var_os("WEFT_DEBUG_SOLVE").is_some();

        let unary = self.compiled.terminal_unary.clone();
        for i in 0..self.goals.len() {
            if self.terminal_swept[i] {
                continue;
            }
            self.terminal_swept[i] = true;
            if self.grounded[i] {
                continue;
            }
            for &rid in &unary {
                let rule = self.registry.rule(rid);
                let Some(bound) = attempt(&rule.outs, std::slice::from_ref(&self.goals[i]))? else {
                    continue;
                };
                if debug {
                    eprintln!("[terminal] rule=#{rid} grounds `{}`", self.goals[i]);
                }
                let witness = self.disjunctions[i].len();
                self.disjunctions[i].push(Disjunct { rule: rid, bindings: bound, deps: Vec::new(), terminal: true });
                self.ground(i, witness);
                break;
            }
        }

        // Multi-output terminals fire only when every output is a goal.
        let multi = self.compiled.terminal_multi.clone();
        for rid in multi {
            let rule = self.registry.rule(rid);
            let Some(mut bound) = attempt(&self.catchall[&rid], &self.goals)? else {
                continue;
            };
            bound.remove("__rest");
            let out_words = expand(&bound, &rule.outs);
            if out_words.is_empty() {
                continue;
            }
            let Some(out_ixs) = self.existing_goal_indices(&out_words) else {
                continue;
            };
            for ix in out_ixs {
                if self.disjunctions[ix].iter().any(|d| d.rule == rid) {
                    continue;
                }
                if debug {
                    eprintln!("[terminal] rule=#{rid} grounds `{}`", self.goals[ix]);
                }
                let witness = self.disjunctions[ix].len();
                self.disjunctions[ix].push(Disjunct {
                    rule: rid,
                    bindings: bound.clone(),
                    deps: Vec::new(),
                    terminal: true,
                });
                self.ground(ix, witness);
            }
        }
        Ok(())
    }

    /// Worklist propagation: when a goal grounds, re-check only the goals
    /// that depend on it, never the whole vector.
    fn propagate(&mut self) {
        while let Some(g) = self.queue.pop_front() {
            let dependents = self.parents[g].clone();
            for p in dependents {
                if self.grounded[p] {
                    continue;
                }
                let witness = self.disjunctions[p]
                    .iter()
                    .position(|d| d.deps.iter().all(|&dep| self.grounded[dep]));
                if let Some(ix) = witness {
                    self.ground(p, ix);
                }
            }
        }
    }

    /// Advance each ungrounded goal's cursor until it records one new
    /// derivation (or runs out of rules). Everything-rules are a fallback of
    /// last resort and apply at most once per derivation chain: a goal whose
    /// own ancestry already passed through an everything-rule never gets the
    /// fallback again, so a re-wrapping rule like `%bin : %bin.o` can fire on
    /// transitively discovered goals without regressing an unsatisfiable
    /// chain (foo.c, foo.c.o, foo.c.o.c, …) into the search bound.
    fn expand_goals(&mut self) -> Result<()> {
        let snapshot = self.goals.len();
        for i in 0..snapshot {
            if self.grounded[i] {
                continue;
            }
            let mut recorded = false;
            while self.cursor[i] < self.compiled.nonterminal.len() {
                let rid = self.compiled.nonterminal[self.cursor[i]];
                self.cursor[i] += 1;
                if self.try_expand(i, rid)? {
                    recorded = true;
                    break;
                }
            }
            if !recorded
                && !self.everything_derived[i]
                && self.cursor[i] >= self.compiled.nonterminal.len()
                && self.disjunctions[i].is_empty()
                && !self.everything_tried[i]
            {
                self.everything_tried[i] = true;
                let everything = self.compiled.everything.clone();
                for rid in everything {
                    if self.try_expand(i, rid)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Try one nonterminal rule against goal `i`. Returns whether a new
    /// disjunction was recorded.
    fn try_expand(&mut self, i: usize, rid: RuleId) -> Result<bool> {
        let debug = std::env::var_os("WEFT_DEBUG_SOLVE").is_some();
        let rule = self.registry.rule(rid);

        let (bound, out_ixs) = if self.compiled.flags[rid].contains(RuleFlags::UNARY) {
            match attempt(&rule.outs, std::slice::from_ref(&self.goals[i]))? {
                Some(b) => (b, vec![i]),
                None => return Ok(false),
            }
        } else {
            // Many-to-many: the rule fires only if all its outputs are
            // already-requested goals, via the catch-all destructure.
            let Some(mut b) = attempt(&self.catchall[&rid], &self.goals)? else {
                return Ok(false);
            };
            b.remove("__rest");
            let out_words = expand(&b, &rule.outs);
            if out_words.is_empty() {
                return Ok(false);
            }
            let Some(out_ixs) = self.existing_goal_indices(&out_words) else {
                return Ok(false);
            };
            if !out_ixs.contains(&i) {
                return Ok(false);
            }
            (b, out_ixs)
        };

        let prereqs = expand(&bound, &rule.ins);
        let tainted =
            self.everything_derived[i] || self.compiled.flags[rid].contains(RuleFlags::EVERYTHING);
        let mut deps = Vec::with_capacity(prereqs.len());
        for word in prereqs {
            deps.push(self.unify(word, tainted)?);
        }

        let mut recorded = false;
        for &g in &out_ixs {
            if self.disjunctions[g].iter().any(|d| d.rule == rid && d.bindings == bound) {
                continue;
            }
            for &dep in &deps {
                if !self.parents[dep].contains(&g) {
                    self.parents[dep].push(g);
                }
            }
            if debug {
                let dep_words: Vec<&str> = deps.iter().map(|&d| self.goals[d].as_str()).collect();
                eprintln!("[expand] rule=#{rid} goal=`{}` needs [{}]", self.goals[g], dep_words.join(" "));
            }
            let witness = self.disjunctions[g].len();
            self.disjunctions[g].push(Disjunct {
                rule: rid,
                bindings: bound.clone(),
                deps: deps.clone(),
                terminal: false,
            });
            self.pass_expanded += 1;
            recorded = true;
            if !self.grounded[g] && deps.iter().all(|&d| self.grounded[d]) {
                self.ground(g, witness);
            }
        }
        Ok(recorded)
    }

    fn ground(&mut self, i: usize, witness: usize) {
        if self.grounded[i] {
            return;
        }
        if std::env::var_os("WEFT_DEBUG_SOLVE").is_some() {
            eprintln!("[ground] `{}`", self.goals[i]);
        }
        self.grounded[i] = true;
        self.chosen[i] = Some(witness);
        self.queue.push_back(i);
        self.pass_grounded += 1;
    }

    /// Unify a word with the goal vector: identical words share one index.
    /// `everything_derived` marks a goal first discovered through an
    /// everything-rule derivation; it is fixed at creation and ignored when
    /// the word is already a goal.
    fn unify(&mut self, word: Word, everything_derived: bool) -> Result<usize> {
        if let Some(&ix) = self.goal_ix.get(&word) {
            return Ok(ix);
        }
        if self.goals.len() >= self.limit {
            return Err(Error::SearchBoundExceeded { limit: self.limit });
        }
        let ix = self.goals.len();
        self.goal_ix.insert(word.clone(), ix);
        self.goals.push(word);
        self.grounded.push(false);
        self.parents.push(Vec::new());
        self.disjunctions.push(Vec::new());
        self.cursor.push(0);
        self.everything_tried.push(false);
        self.everything_derived.push(everything_derived);
        self.terminal_swept.push(false);
        self.chosen.push(None);
        Ok(ix)
    }

    /// Map expanded output words to existing goal indices; `None` if any
    /// output is not a requested goal.
    fn existing_goal_indices(&self, words: &[Word]) -> Option<Vec<usize>> {
        let mut ixs = Vec::with_capacity(words.len());
        for word in words {
            ixs.push(*self.goal_ix.get(word)?);
        }
        ixs.dedup();
        Some(ixs)
    }

    /// Leaf orphans first (nothing could derive them), then any remaining
    /// ungrounded required goals.
    fn orphans(&self) -> Vec<Word> {
        let mut out: Vec<Word> = self
            .goals
            .iter()
            .enumerate()
            .filter(|&(i, _)| !self.grounded[i] && self.disjunctions[i].is_empty())
            .map(|(_, g)| g.clone())
            .collect();
        if out.is_empty() {
            out = (0..self.required)
                .filter(|&i| !self.grounded[i])
                .map(|i| self.goals[i].clone())
                .collect();
        }
        out
    }

    // --- Plan emission -------------------------------------------------------

    /// Walk the witness graph post-order from the required goals, emitting
    /// each selected rule instance once, prerequisites first.
    fn emit_plan(&self) -> Result<Plan> {
        let debug = std::env::var_os("WEFT_DEBUG_SOLVE").is_some();
        let mut steps: Vec<PlanStep> = Vec::new();
        let mut visited = vec![false; self.goals.len()];

        for root in 0..self.required {
            let mut stack: Vec<(usize, bool)> = vec![(root, false)];
            while let Some((g, children_done)) = stack.pop() {
                if children_done {
                    self.emit_step(g, &mut steps)?;
                    continue;
                }
                if visited[g] {
                    continue;
                }
                visited[g] = true;
                stack.push((g, true));
                let d = self.witness(g)?;
                for &dep in d.deps.iter().rev() {
                    if !visited[dep] {
                        stack.push((dep, false));
                    }
                }
            }
        }

        if debug {
            for step in &steps {
                eprintln!("[plan] #{} [{}] -> {}", step.rule, step.bindings, step.outputs.join(" "));
            }
        }
        Ok(Plan { steps })
    }

    fn witness(&self, g: usize) -> Result<&Disjunct> {
        let ix = self.chosen[g].ok_or_else(|| {
            Error::InternalInvariant(format!("grounded goal `{}` has no chosen disjunct", self.goals[g]))
        })?;
        Ok(&self.disjunctions[g][ix])
    }

    fn emit_step(&self, g: usize, steps: &mut Vec<PlanStep>) -> Result<()> {
        let d = self.witness(g)?;
        if steps.iter().any(|s| s.rule == d.rule && s.bindings == d.bindings) {
            return Ok(());
        }
        let rule = self.registry.rule(d.rule);
        let inputs = expand(&d.bindings, &rule.ins);
        let outputs = expand(&d.bindings, &rule.outs);
        let command = if rule.has_command() {
            let cb = d.bindings.with("in", inputs.clone()).with("out", outputs.clone());
            Some(expand_to_text(&cb, &rule.cmd))
        } else {
            None
        };
        steps.push(PlanStep { rule: d.rule, bindings: d.bindings.clone(), inputs, outputs, command });
        Ok(())
    }
}

// --- Rewrite fixpoint ---------------------------------------------------------

fn search_limit(initial_goals: usize) -> usize {
    64 + initial_goals.pow(3)
}

/// Append the implicit `%@__rest` catch-all to every rule that is matched
/// against the whole goal list: ungrounded equations and non-unary grounded
/// rules.
fn build_catchall(registry: &Registry, compiled: &CompiledRules) -> Result<HashMap<RuleId, Vec<Term>>> {
    let mut map = HashMap::new();
    for (id, rule) in registry.rules().iter().enumerate() {
        let needed = match rule.kind {
            RuleKind::Ungrounded => true,
            RuleKind::Grounded => !compiled.flags[id].contains(RuleFlags::UNARY),
        };
        if needed {
            map.insert(id, catchall_pattern(rule)?);
        }
    }
    Ok(map)
}

/// Match, separating "does not apply" from internal inconsistency: a word
/// that passed the profile filter but failed rebinding indicates a bug and
/// must surface, never read as a missed rule.
fn attempt(terms: &[Term], words: &[Word]) -> Result<Option<Bindings>> {
    match match_terms(terms, words) {
        Ok(bound) => Ok(Some(bound)),
        Err(fail) if fail.is_internal() => Err(Error::Match {
            pattern: terms.iter().map(Term::source).collect::<Vec<_>>().join(" "),
            text: words.join(" "),
            fail,
        }),
        Err(_) => Ok(None),
    }
}

fn catchall_pattern(rule: &Rule) -> Result<Vec<Term>> {
    let mut pattern = rule.outs.clone();
    pattern.push(Term::parse("%@__rest")?);
    Ok(pattern)
}

/// Apply ungrounded equations to the goal list until a fixpoint.
///
/// An equation must consume actual goal words (a vacuous match where every
/// LHS term bound nothing does not rewrite), and a rewrite that reproduces
/// the current list is skipped so identity equations cannot spin. Rewrites
/// are whole-word: `inout-%x` claims the word `inout-7`, never a substring
/// of `z.inout-7`.
#[allow(clippy::too_many_arguments)]
fn rewrite_fixpoint(
    registry: &Registry,
    ungrounded: &[RuleId],
    catchall: &HashMap<RuleId, Vec<Term>>,
    words: Vec<Word>,
    backend: &mut dyn Backend,
    limit: usize,
    cancel: &CancelToken,
    metrics: &mut RewriteMetrics,
) -> Result<Vec<Word>> {
    let debug = std::env::var_os("WEFT_DEBUG_SOLVE").is_some();
    let start = Instant::now();
    let mut goals = words;

    'passes: loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        metrics.passes += 1;
        if metrics.passes > limit {
            return Err(Error::SearchBoundExceeded { limit });
        }

        for &id in ungrounded {
            let rule = registry.rule(id);
            let Some(bound) = attempt(&catchall[&id], &goals)? else {
                continue;
            };
            let consumed = expand(&bound, &rule.outs);
            if consumed.is_empty() || !consumed.iter().all(|w| goals.contains(w)) {
                continue;
            }
            let rest = bound.get("__rest").map(<[Word]>::to_vec).unwrap_or_default();
            let replacement = expand(&bound, &rule.ins);
            let mut next = replacement.clone();
            next.extend(rest);
            if next == goals {
                continue;
            }

            if rule.has_command() {
                let cb = bound.with("in", consumed.clone()).with("out", replacement.clone());
                let text = expand_to_text(&cb, &rule.cmd);
                let status = backend.execute(id, &text, &cb)?;
                if status != 0 {
                    if debug {
                        eprintln!("[rewrite:rejected] rule=#{id} status={status} cmd=\"{text}\"");
                    }
                    continue;
                }
            }

            if debug {
                eprintln!("[rewrite] rule=#{id} {} -> {}", consumed.join(" "), replacement.join(" "));
            }
            goals = next;
            metrics.applied += 1;
            continue 'passes;
        }

        metrics.total = start.elapsed();
        return Ok(goals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn registry(lines: &[&str]) -> Registry {
        let mut reg = Registry::new();
        for line in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            reg.define(&tokens).unwrap();
        }
        reg
    }

    fn solve(reg: &Registry, goals: &[&str]) -> Result<SolveResult> {
        let mut backend = RecordingBackend::new();
        let words: Vec<Word> = goals.iter().map(|g| g.to_string()).collect();
        Solver::solve(reg, &words, &mut backend, &CancelToken::new())
    }

    fn commands(plan: &Plan) -> Vec<String> {
        plan.steps.iter().filter_map(|s| s.command.clone()).collect()
    }

    #[test]
    fn chain_solve_orders_prerequisites_first() {
        let reg = registry(&[
            "%bin : %bin.o :: link %in -o %out",
            "%x.o : %x.c :: cc -c %in",
            "foo.c :",
        ]);
        let result = solve(&reg, &["foo"]).unwrap();

        assert_eq!(result.plan.len(), 3);
        assert!(result.plan.steps[0].command.is_none()); // terminal foo.c
        assert_eq!(result.plan.steps[0].outputs, ["foo.c"]);
        assert_eq!(commands(&result.plan), ["cc -c foo.c", "link foo.o -o foo"]);
        assert_eq!(result.plan.steps[1].bindings.get("x").unwrap(), ["foo".to_string()]);
        assert_eq!(result.plan.steps[2].bindings.get("bin").unwrap(), ["foo".to_string()]);
    }

    #[test]
    fn missing_terminal_reports_the_leaf_orphan() {
        let reg = registry(&["%bin : %bin.o :: link %in -o %out", "%x.o : %x.c :: cc -c %in"]);
        match solve(&reg, &["foo"]) {
            Err(Error::UnsatisfiableGoal(orphans)) => assert_eq!(orphans, ["foo.c"]),
            other => panic!("expected UnsatisfiableGoal, got {other:?}"),
        }
    }

    #[test]
    fn shared_prerequisites_unify_into_one_step() {
        let reg = registry(&[
            "%x.o : %x.c :: cc %in",
            "app : app.o util.o :: link-app %in",
            "tests : tests.o util.o :: link-tests %in",
            "app.c :",
            "util.c :",
            "tests.c :",
        ]);
        let result = solve(&reg, &["app", "tests"]).unwrap();

        // 3 terminals + 3 compiles + 2 links; util.o is compiled exactly once.
        assert_eq!(result.plan.len(), 8);
        let util_steps = commands(&result.plan).iter().filter(|c| c.contains("util.c")).count();
        assert_eq!(util_steps, 1);
    }

    #[test]
    fn multi_output_rule_fires_once_for_all_outputs() {
        let reg = registry(&["gen.h gen.c : spec.txt :: generate %in", "spec.txt :"]);
        let result = solve(&reg, &["gen.h", "gen.c"]).unwrap();

        assert_eq!(result.plan.len(), 2);
        assert_eq!(commands(&result.plan), ["generate spec.txt"]);
        assert_eq!(result.plan.steps[1].outputs, ["gen.h", "gen.c"]);
    }

    #[test]
    fn multi_output_rule_requires_every_output_as_goal() {
        let reg = registry(&["gen.h gen.c : spec.txt :: generate %in", "spec.txt :"]);
        match solve(&reg, &["gen.h"]) {
            Err(Error::UnsatisfiableGoal(orphans)) => assert_eq!(orphans, ["gen.h"]),
            other => panic!("expected UnsatisfiableGoal, got {other:?}"),
        }
    }

    #[test]
    fn everything_rule_is_a_fallback_for_requested_goals() {
        let reg = registry(&["%f : store/%f :: fetch %f", "store/hello :"]);
        let result = solve(&reg, &["hello"]).unwrap();
        assert_eq!(commands(&result.plan), ["fetch hello"]);
    }

    #[test]
    fn everything_fallback_applies_to_transitively_discovered_goals() {
        // `prog` is never a requested goal; it only appears as the
        // prerequisite of `go`, and the %bin rule must still fire on it.
        let reg = registry(&[
            "go : prog",
            "%bin : %bin.o :: link %in -o %out",
            "%x.o : %x.c :: cc -c %in",
            "prog.c :",
        ]);
        let result = solve(&reg, &["go"]).unwrap();

        assert_eq!(result.plan.len(), 4);
        assert_eq!(commands(&result.plan), ["cc -c prog.c", "link prog.o -o prog"]);
    }

    #[test]
    fn specific_rules_shadow_the_everything_fallback() {
        let reg = registry(&["%x.o : %x.c :: cc %in", "%f : store/%f :: fetch %f", "foo.c :"]);
        let result = solve(&reg, &["foo.o"]).unwrap();
        assert_eq!(commands(&result.plan), ["cc foo.c"]);
    }

    #[test]
    fn everything_fallback_does_not_regress_derived_goals() {
        // Without a terminal for foo.c the chain must fail as unsatisfiable,
        // not spin the fallback into foo.c.o, foo.c.o.c, ...
        let reg = registry(&["%bin : %bin.o :: link %in", "%x.o : %x.c :: cc %in"]);
        match solve(&reg, &["foo"]) {
            Err(Error::UnsatisfiableGoal(orphans)) => assert_eq!(orphans, ["foo.c"]),
            other => panic!("expected UnsatisfiableGoal, got {other:?}"),
        }
    }

    #[test]
    fn ungrounded_equation_rewrites_goals() {
        let reg = registry(&["inout-%x = %x", "7 :"]);
        let result = solve(&reg, &["inout-7"]).unwrap();
        assert_eq!(result.goals, ["7"]);
        assert_eq!(result.plan.len(), 1);
        assert_eq!(result.plan.steps[0].outputs, ["7"]);
    }

    #[test]
    fn rewrites_are_whole_word() {
        let reg = registry(&["inout-%x = %x"]);
        let mut backend = RecordingBackend::new();
        let out = Solver::eval(&reg, &["z.inout-5".to_string()], &mut backend).unwrap();
        assert_eq!(out, ["z.inout-5"]);

        let out = Solver::eval(&reg, &["inout-7".to_string()], &mut backend).unwrap();
        assert_eq!(out, ["7"]);
    }

    #[test]
    fn speculative_command_failure_rejects_the_rewrite() {
        let reg = registry(&["big-%x = %x :: check %x", "big-5 :"]);
        let mut backend = RecordingBackend::new();
        backend.fail_matching("check");
        let words = vec!["big-5".to_string()];
        let result = Solver::solve(&reg, &words, &mut backend, &CancelToken::new()).unwrap();

        // The rewrite was attempted, rejected, and the goal stayed put.
        assert!(backend.executed().iter().any(|(_, cmd)| cmd == "check 5"));
        assert_eq!(result.goals, ["big-5"]);
    }

    #[test]
    fn speculative_command_success_accepts_the_rewrite() {
        let reg = registry(&["big-%x = %x :: check %x", "5 :"]);
        let mut backend = RecordingBackend::new();
        let words = vec!["big-5".to_string()];
        let result = Solver::solve(&reg, &words, &mut backend, &CancelToken::new()).unwrap();

        assert!(backend.executed().iter().any(|(_, cmd)| cmd == "check 5"));
        assert_eq!(result.goals, ["5"]);
    }

    #[test]
    fn runaway_rewrites_hit_the_search_bound() {
        let reg = registry(&["%x = %x-x"]);
        let mut backend = RecordingBackend::new();
        let err = Solver::eval(&reg, &["a".to_string()], &mut backend).unwrap_err();
        assert!(matches!(err, Error::SearchBoundExceeded { .. }));
    }

    #[test]
    fn runaway_expansion_hits_the_search_bound() {
        let reg = registry(&["dep.%x : dep.%x.d :: gen"]);
        let err = solve(&reg, &["dep.a"]).unwrap_err();
        assert!(matches!(err, Error::SearchBoundExceeded { limit: 65 }));
    }

    #[test]
    fn cancellation_aborts_the_solve() {
        let reg = registry(&["foo :"]);
        let mut backend = RecordingBackend::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Solver::solve(&reg, &["foo".to_string()], &mut backend, &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn identical_solves_produce_identical_plans() {
        let reg = registry(&[
            "%bin : %bin.o :: link %in -o %out",
            "%x.o : %x.c :: cc -c %in",
            "foo.c :",
            "bar.c :",
        ]);
        let first = solve(&reg, &["foo", "bar"]).unwrap();
        let second = solve(&reg, &["foo", "bar"]).unwrap();
        assert_eq!(first.plan.render(), second.plan.render());
    }

    #[test]
    fn goal_permutations_agree_up_to_topological_order() {
        let reg = registry(&[
            "%bin : %bin.o :: link %in -o %out",
            "%x.o : %x.c :: cc -c %in",
            "foo.c :",
            "bar.c :",
        ]);
        let ab = solve(&reg, &["foo", "bar"]).unwrap();
        let ba = solve(&reg, &["bar", "foo"]).unwrap();

        let mut lines_ab: Vec<String> = ab.plan.render().lines().map(str::to_string).collect();
        let mut lines_ba: Vec<String> = ba.plan.render().lines().map(str::to_string).collect();
        lines_ab.sort();
        lines_ba.sort();
        assert_eq!(lines_ab, lines_ba);
    }

    #[test]
    fn duplicate_goals_collapse() {
        let reg = registry(&["foo :"]);
        let result = solve(&reg, &["foo", "foo"]).unwrap();
        assert_eq!(result.plan.len(), 1);
    }

    #[test]
    fn empty_goal_list_solves_to_an_empty_plan() {
        let reg = registry(&["foo :"]);
        let result = solve(&reg, &[]).unwrap();
        assert!(result.plan.is_empty());
    }
}
