//! Rule registry: definition dispatch and the grounded/ungrounded/global
//! split.
//!
//! A definition arrives as a positional token vector; the separators `:`
//! (grounded), `=` (ungrounded) and `::` (command) drive a small state
//! machine:
//!
//! ```text
//! outs…  :  ins…  :: cmd…     grounded rule
//! outs…  =  ins…  [:: cmd…]   ungrounded equation (speculative command)
//! outs…  :: cmd…              terminal grounded rule with a command
//!        :  goals…            default goal list (no command permitted)
//! ```
//!
//! Globals are carved out of the ungrounded case: when the expanded RHS is
//! fully literal, the LHS has variable references, and no command was given,
//! the LHS is matched against the RHS and every bound variable is upserted
//! into the global map. Globals are pre-expanded into the inputs and command
//! of every later definition, so matching and expansion at solve time never
//! consult the global table.
//!
//! Definition order is significant and preserved: rules append, globals
//! upsert in place, and every registry iteration downstream walks rules in
//! definition order.

use crate::engine::{expand, match_terms};
use crate::error::{Error, MatchFail, Result};
use crate::pattern::Term;
use crate::{Bindings, Rule, RuleId, RuleKind, Word};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A constant binding: an ungrounded equation whose RHS was fully literal.
#[derive(Debug, Clone)]
pub struct Global {
    name: String,
    values: Vec<Word>,
    plural: bool,
}

impl Global {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Word] {
        &self.values
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.plural { "%@" } else { "%" };
        write!(f, "{}{} = {}", marker, self.name, self.values.join(" "))
    }
}

/// One instance's rule state. All mutation happens during the definition
/// phase; solving is read-only against this structure.
#[derive(Debug, Default)]
pub struct Registry {
    rules: Vec<Rule>,
    globals: Vec<Global>,
    globals_ix: HashMap<String, usize>,
    default_goals: Vec<Word>,
}

#[derive(Clone, Copy)]
enum State {
    Outs,
    Ins,
    Cmd,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one definition. A rejected definition leaves the registry
    /// untouched: all parsing and validation happens before any mutation.
    pub fn define<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        let mut outs_tok: Vec<&str> = Vec::new();
        let mut ins_tok: Vec<&str> = Vec::new();
        let mut cmd_tok: Vec<&str> = Vec::new();
        let mut mode: Option<RuleKind> = None;
        let mut state = State::Outs;

        for token in tokens {
            let token = token.as_ref();
            match state {
                State::Outs => match token {
                    ":" => {
                        state = State::Ins;
                        mode = Some(RuleKind::Grounded);
                    }
                    "=" => {
                        state = State::Ins;
                        mode = Some(RuleKind::Ungrounded);
                    }
                    "::" => {
                        state = State::Cmd;
                        mode = Some(RuleKind::Grounded);
                    }
                    word => outs_tok.push(word),
                },
                State::Ins if token == "::" => state = State::Cmd,
                State::Ins => ins_tok.push(token),
                State::Cmd => cmd_tok.push(token),
            }
        }

        let Some(mode) = mode else {
            return Err(Error::Definition("definition has no separator (`:`, `=`, or `::`)".to_string()));
        };

        if outs_tok.is_empty() {
            if !cmd_tok.is_empty() {
                return Err(Error::Definition("a default-goal definition cannot carry a command".to_string()));
            }
            let ins = Term::parse_all(&ins_tok)?;
            self.default_goals = expand(&self.globals_bindings(), &ins);
            return Ok(());
        }

        let outs = Term::parse_all(&outs_tok)?;
        Self::check_no_repeated_vars(&outs)?;
        let globals = self.globals_bindings();
        let ins = self.pre_expand(&globals, &ins_tok)?;
        let cmd = self.pre_expand(&globals, &cmd_tok)?;

        let rhs_literal = ins.iter().all(|t| !t.has_vars());
        let lhs_has_vars = outs.iter().any(Term::has_vars);
        if mode == RuleKind::Ungrounded && cmd.is_empty() && rhs_literal && lhs_has_vars {
            // Global definition: bind the LHS against the literal RHS and
            // upsert every bound variable. The LHS is deliberately *not*
            // pre-expanded here; otherwise a re-definition of %x would see
            // its own old value substituted and could never upsert.
            let words: Vec<Word> = ins.iter().map(|t| t.source().to_string()).collect();
            let bound = match_terms(&outs, &words).map_err(|fail| Error::Match {
                pattern: outs_tok.join(" "),
                text: words.join(" "),
                fail,
            })?;
            for (name, values) in bound.iter() {
                let plural = outs
                    .iter()
                    .flat_map(|t| t.vars())
                    .find(|v| v.name() == name)
                    .map(|v| v.plural())
                    .unwrap_or(false);
                self.upsert_global(name, values.to_vec(), plural);
            }
            return Ok(());
        }

        // Non-global definitions also get their outputs pre-expanded, so a
        // rule like `%cc.bin : …` sees the current value of %cc.
        let outs = self.pre_expand(&globals, &outs_tok)?;
        Self::check_no_repeated_vars(&outs)?;
        self.rules.push(Rule { outs, ins, cmd, kind: mode });
        Ok(())
    }

    /// Register `word` as a terminal grounded rule ("this exists").
    pub fn define_terminal(&mut self, word: &str) -> Result<()> {
        let outs = self.pre_expand(&self.globals_bindings(), &[word])?;
        self.rules.push(Rule { outs, ins: Vec::new(), cmd: Vec::new(), kind: RuleKind::Grounded });
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    /// Globals in insertion order.
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn default_goals(&self) -> &[Word] {
        &self.default_goals
    }

    /// The current global map as bindings, for pre-expansion.
    fn globals_bindings(&self) -> Bindings {
        let mut b = Bindings::new();
        for g in &self.globals {
            b.set(&g.name, g.values.clone());
        }
        b
    }

    /// Expand raw tokens against the global map and re-parse the result.
    /// A plural global multiplies its containing token.
    fn pre_expand<S: AsRef<str>>(&self, globals: &Bindings, tokens: &[S]) -> Result<Vec<Term>> {
        let parsed = Term::parse_all(tokens)?;
        let expanded = expand(globals, &parsed);
        Term::parse_all(&expanded)
    }

    fn check_no_repeated_vars(terms: &[Term]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for term in terms {
            for var in term.vars() {
                if !seen.insert(var.name()) {
                    return Err(Error::Pattern(MatchFail::RepeatedVariable(var.name().to_string())));
                }
            }
        }
        Ok(())
    }

    fn upsert_global(&mut self, name: &str, values: Vec<Word>, plural: bool) {
        match self.globals_ix.get(name) {
            Some(&ix) => {
                self.globals[ix].values = values;
                self.globals[ix].plural = plural;
            }
            None => {
                self.globals_ix.insert(name.to_string(), self.globals.len());
                self.globals.push(Global { name: name.to_string(), values, plural });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(reg: &mut Registry, line: &str) -> Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        reg.define(&tokens)
    }

    #[test]
    fn dispatch_recognizes_the_three_separators() {
        let mut reg = Registry::new();
        def(&mut reg, "%bin : %bin.o :: link %bin").unwrap();
        def(&mut reg, "inout-%x = %x").unwrap();
        def(&mut reg, "generated.h :: makeheaders").unwrap();

        assert_eq!(reg.rules().len(), 3);
        assert_eq!(reg.rules()[0].kind, RuleKind::Grounded);
        assert!(reg.rules()[0].has_command());
        assert_eq!(reg.rules()[1].kind, RuleKind::Ungrounded);
        assert!(reg.rules()[2].is_terminal());
        assert!(reg.rules()[2].has_command());
    }

    #[test]
    fn empty_outs_sets_default_goals() {
        let mut reg = Registry::new();
        def(&mut reg, "%@targets = app tests").unwrap();
        def(&mut reg, ": %@targets docs").unwrap();
        assert_eq!(reg.default_goals(), ["app", "tests", "docs"]);
    }

    #[test]
    fn default_goal_definition_rejects_a_command() {
        let mut reg = Registry::new();
        let err = def(&mut reg, ": all :: echo no").unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
        assert!(reg.default_goals().is_empty());
    }

    #[test]
    fn missing_separator_is_rejected() {
        let mut reg = Registry::new();
        assert!(matches!(def(&mut reg, "just some words").unwrap_err(), Error::Definition(_)));
        assert!(reg.rules().is_empty());
    }

    #[test]
    fn simple_global_binds_and_upserts() {
        let mut reg = Registry::new();
        def(&mut reg, "%x = 10").unwrap();
        assert_eq!(reg.globals().len(), 1);
        assert_eq!(reg.globals()[0].values(), ["10"]);

        def(&mut reg, "%x = 20").unwrap();
        assert_eq!(reg.globals().len(), 1);
        assert_eq!(reg.globals()[0].values(), ["20"]);
    }

    #[test]
    fn plural_global_holds_a_word_list() {
        let mut reg = Registry::new();
        def(&mut reg, "%@srcs = a.c b.c c.c").unwrap();
        assert_eq!(reg.globals()[0].values(), ["a.c", "b.c", "c.c"]);
        assert_eq!(reg.globals()[0].to_string(), "%@srcs = a.c b.c c.c");
    }

    #[test]
    fn destructuring_global_binds_each_variable() {
        let mut reg = Registry::new();
        def(&mut reg, "%major.%minor = 1.42").unwrap();
        assert_eq!(reg.globals().len(), 2);
        assert_eq!(reg.globals()[0].name(), "major");
        assert_eq!(reg.globals()[0].values(), ["1"]);
        assert_eq!(reg.globals()[1].values(), ["42"]);
    }

    #[test]
    fn global_with_unbindable_lhs_is_a_user_error() {
        let mut reg = Registry::new();
        let err = def(&mut reg, "lib%x.a = gcc").unwrap_err();
        assert!(matches!(err, Error::Match { .. }));
        assert!(reg.globals().is_empty());
    }

    #[test]
    fn rhs_with_variables_stays_ungrounded() {
        let mut reg = Registry::new();
        def(&mut reg, "%double = %x %x0").unwrap();
        assert!(reg.globals().is_empty());
        assert_eq!(reg.rules().len(), 1);
        assert_eq!(reg.rules()[0].kind, RuleKind::Ungrounded);
    }

    #[test]
    fn literal_lhs_stays_ungrounded() {
        let mut reg = Registry::new();
        def(&mut reg, "all = app docs").unwrap();
        assert!(reg.globals().is_empty());
        assert_eq!(reg.rules()[0].kind, RuleKind::Ungrounded);
    }

    #[test]
    fn equation_with_command_stays_ungrounded() {
        let mut reg = Registry::new();
        def(&mut reg, "inout-%x = %x :: :").unwrap();
        assert!(reg.globals().is_empty());
        assert_eq!(reg.rules()[0].kind, RuleKind::Ungrounded);
        assert!(reg.rules()[0].has_command());
    }

    #[test]
    fn globals_are_pre_expanded_into_later_definitions() {
        let mut reg = Registry::new();
        def(&mut reg, "%cc = gcc").unwrap();
        def(&mut reg, "%x.o : %x.c :: %cc -c %x.c -o %x.o").unwrap();

        let cmd: Vec<&str> = reg.rules()[0].cmd.iter().map(Term::source).collect();
        assert_eq!(cmd, ["gcc", "-c", "%x.c", "-o", "%x.o"]);

        // Re-defining the global later must not affect the stored rule.
        def(&mut reg, "%cc = clang").unwrap();
        let cmd: Vec<&str> = reg.rules()[0].cmd.iter().map(Term::source).collect();
        assert_eq!(cmd[0], "gcc");
    }

    #[test]
    fn plural_global_multiplies_the_containing_token() {
        let mut reg = Registry::new();
        def(&mut reg, "%@srcs = a b").unwrap();
        def(&mut reg, "app : %@srcs.o :: link").unwrap();
        let ins: Vec<&str> = reg.rules()[0].ins.iter().map(Term::source).collect();
        assert_eq!(ins, ["a.o", "b.o"]);
    }

    #[test]
    fn repeated_variable_in_outputs_is_rejected() {
        let mut reg = Registry::new();
        let err = def(&mut reg, "%x-%x : input").unwrap_err();
        assert!(matches!(err, Error::Pattern(MatchFail::RepeatedVariable(name)) if name == "x"));
        assert!(reg.rules().is_empty());
    }

    #[test]
    fn malformed_pattern_is_rejected_before_any_mutation() {
        let mut reg = Registry::new();
        let err = def(&mut reg, "100% : input").unwrap_err();
        assert!(matches!(err, Error::Pattern(MatchFail::EmptyPattern(_))));
        assert!(reg.rules().is_empty());
    }

    #[test]
    fn terminal_registration_appends_a_grounded_rule() {
        let mut reg = Registry::new();
        reg.define_terminal("foo.c").unwrap();
        assert!(reg.rules()[0].is_terminal());
        assert_eq!(reg.rules()[0].outs[0].source(), "foo.c");
    }
}
