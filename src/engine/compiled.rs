//! Per-solve rule classification and indexing.
//!
//! The solver never walks the raw rule list. Once per solve, grounded rules
//! are classified into cheap index vectors so the hot loops can iterate only
//! the rules that can possibly apply:
//!
//! - **Terminal** rules (no inputs) ground goals directly; unary ones get a
//!   linear per-goal match, the rest go through the catch-all destructure.
//! - **Nonterminal** rules drive goal expansion.
//! - **Everything-rules** (output profile purely `%`) match any word at all;
//!   they are held out of the nonterminal vector and only tried as a
//!   fallback, once a goal has exhausted every other rule without gaining a
//!   derivation.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into the registry's rule vector; `flags` is aligned
//!   with it (ungrounded rules carry empty flags).
//! - Every index vector preserves definition order.

use crate::engine::registry::Registry;
use crate::{RuleId, RuleKind};

bitflags::bitflags! {
    /// Classification of a grounded rule for the solver's hot loops.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u8 {
        /// No inputs: grounds its outputs unconditionally.
        const TERMINAL   = 1 << 0;
        /// Single output term without plural variables: eligible for the
        /// linear per-goal match.
        const UNARY      = 1 << 1;
        /// Output profile is purely `%`: matches any word (fallback only).
        const EVERYTHING = 1 << 2;
    }
}

/// Pre-classified view of the registry for one solve.
#[derive(Debug)]
pub struct CompiledRules {
    /// Aligned with the registry's rule vector.
    pub flags: Vec<RuleFlags>,
    pub terminal_unary: Vec<RuleId>,
    pub terminal_multi: Vec<RuleId>,
    /// Nonterminal rules excluding everything-rules.
    pub nonterminal: Vec<RuleId>,
    /// Nonterminal everything-rules, tried only as a fallback.
    pub everything: Vec<RuleId>,
    /// Ungrounded equations, for the rewrite fixpoint.
    pub ungrounded: Vec<RuleId>,
}

impl CompiledRules {
    pub fn new(registry: &Registry) -> Self {
        let mut compiled = CompiledRules {
            flags: Vec::with_capacity(registry.rules().len()),
            terminal_unary: Vec::new(),
            terminal_multi: Vec::new(),
            nonterminal: Vec::new(),
            everything: Vec::new(),
            ungrounded: Vec::new(),
        };

        for (id, rule) in registry.rules().iter().enumerate() {
            if rule.kind == RuleKind::Ungrounded {
                compiled.flags.push(RuleFlags::empty());
                compiled.ungrounded.push(id);
                continue;
            }

            let mut flags = RuleFlags::empty();
            if rule.ins.is_empty() {
                flags |= RuleFlags::TERMINAL;
            }
            if rule.outs.len() == 1 && !rule.outs[0].has_plural() {
                flags |= RuleFlags::UNARY;
            }
            if rule.outs.len() == 1 && rule.outs[0].is_everything() {
                flags |= RuleFlags::EVERYTHING;
            }
            compiled.flags.push(flags);

            if flags.contains(RuleFlags::TERMINAL) {
                if flags.contains(RuleFlags::UNARY) {
                    compiled.terminal_unary.push(id);
                } else {
                    compiled.terminal_multi.push(id);
                }
            } else if flags.contains(RuleFlags::EVERYTHING) {
                compiled.everything.push(id);
            } else {
                compiled.nonterminal.push(id);
            }
        }

        compiled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::Registry;

    fn registry(lines: &[&str]) -> Registry {
        let mut reg = Registry::new();
        for line in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            reg.define(&tokens).unwrap();
        }
        reg
    }

    #[test]
    fn classifies_terminal_nonterminal_and_everything() {
        let reg = registry(&[
            "foo.c :",
            "out1 out2 :",
            "%x.o : %x.c :: cc",
            "%any : store/%any :: fetch",
            "alias-%x = %x",
        ]);
        let compiled = CompiledRules::new(&reg);

        assert_eq!(compiled.terminal_unary, [0]);
        assert_eq!(compiled.terminal_multi, [1]);
        assert_eq!(compiled.nonterminal, [2]);
        assert_eq!(compiled.everything, [3]);
        assert_eq!(compiled.ungrounded, [4]);

        assert_eq!(compiled.flags[0], RuleFlags::TERMINAL | RuleFlags::UNARY);
        assert!(compiled.flags[3].contains(RuleFlags::EVERYTHING | RuleFlags::UNARY));
        assert_eq!(compiled.flags[4], RuleFlags::empty());
    }

    #[test]
    fn plural_output_is_not_unary() {
        let reg = registry(&["%@objs.o : %@objs.c :: cc"]);
        let compiled = CompiledRules::new(&reg);
        assert!(!compiled.flags[0].contains(RuleFlags::UNARY));
        assert_eq!(compiled.nonterminal, [0]);
    }
}
