//! Destructuring matcher: factor + bind.
//!
//! `match_terms` binds a multi-term pattern over a word list. Each pattern
//! term in turn *factors* the remaining words by its profile (shape filter),
//! then *binds* the matching candidates against the full term, accumulating
//! per-variable values. A candidate whose captures contradict an established
//! singular binding is rejected back into the remainder for later terms; the
//! match as a whole succeeds iff the remainder ends empty.
//!
//! Two rules keep destructuring deterministic:
//!
//! - **At most one plural per term.** Within a term, a variable may only
//!   accumulate distinct values once it has claimed the term's single plural
//!   slot; the claim requires the `@` flag and is sticky once made.
//! - **Shadowing.** A term whose profile reappears in a *later* term binds
//!   exactly one word; the unclaimed candidates carry over to the next term
//!   of the same profile. Earlier terms win, so `%@x.c %@xs.c` splits
//!   first-vs-rest instead of competing ambiguously.
//!
//! The factored partition is computed once per profile and carried across
//! shadowed terms, so identical profiles never re-scan the remainder.

use crate::error::MatchFail;
use crate::pattern::Term;
use crate::{Bindings, Word};
use std::collections::{HashMap, HashSet, VecDeque};

/// Result of binding one term: accepted capture columns plus the words the
/// term did not claim.
struct TermBind {
    /// Accepted captures, one row per consumed word, one column per variable.
    values: Vec<Vec<String>>,
    /// Column that claimed the term's plural slot, if any.
    plural_ix: Option<usize>,
    consumed: usize,
    /// Candidates rejected by the plural rule; they return to the remainder.
    rejected: Vec<Word>,
    /// Candidates a shadowed term left for the next term of this profile.
    leftover: VecDeque<Word>,
}

/// Bind `terms` over `words`.
///
/// ```text
/// pattern: %@xs.c  %@ys.h      text: foo.c bar.c bif.h
///          │                         └─ factored by profile "%.c" → [foo.c bar.c]
///          └─ xs=[foo bar]                             "%.h" → [bif.h]
/// result: xs=[foo bar] ys=[bif]
/// ```
pub fn match_terms(terms: &[Term], words: &[Word]) -> Result<Bindings, MatchFail> {
    let mut seen: HashSet<&str> = HashSet::new();
    for term in terms {
        for var in term.vars() {
            if !seen.insert(var.name()) {
                return Err(MatchFail::RepeatedVariable(var.name().to_string()));
            }
        }
    }

    let mut remainder: Vec<Word> = words.to_vec();
    // Partitions left behind by shadowed terms, keyed by profile.
    let mut carried: HashMap<String, VecDeque<Word>> = HashMap::new();
    let mut bindings = Bindings::new();

    for (i, term) in terms.iter().enumerate() {
        let shadowed = terms[i + 1..].iter().any(|t| t.profile() == term.profile());

        let candidates: VecDeque<Word> = match carried.remove(term.profile()) {
            Some(c) => c,
            None => {
                let mut c = VecDeque::new();
                let mut rest = Vec::new();
                for word in remainder.drain(..) {
                    if term.matches_shape(&word) {
                        c.push_back(word);
                    } else {
                        rest.push(word);
                    }
                }
                remainder = rest;
                c
            }
        };

        let bound = bind_term(term, candidates, shadowed)?;
        remainder.extend(bound.rejected);
        if shadowed {
            carried.insert(term.profile().to_string(), bound.leftover);
        }

        for (j, var) in term.vars().iter().enumerate() {
            if bound.consumed == 0 {
                // A term that claimed no words leaves singular variables
                // unbound; plural variables bind the empty list.
                if var.plural() {
                    bindings.set(var.name(), Vec::new());
                }
                continue;
            }
            let column: Vec<String> = if bound.plural_ix == Some(j) {
                bound.values.iter().map(|row| row[j].clone()).collect()
            } else {
                vec![bound.values[0][j].clone()]
            };
            bindings.set(var.name(), column);
        }
    }

    if remainder.is_empty() {
        Ok(bindings)
    } else {
        Err(MatchFail::NotConsumed(remainder))
    }
}

/// Walk the candidates of one term, enforcing the at-most-one-plural rule.
fn bind_term(term: &Term, candidates: VecDeque<Word>, shadowed: bool) -> Result<TermBind, MatchFail> {
    let mut bound = TermBind {
        values: Vec::new(),
        plural_ix: None,
        consumed: 0,
        rejected: Vec::new(),
        leftover: VecDeque::new(),
    };

    for word in candidates {
        if shadowed && bound.consumed == 1 {
            bound.leftover.push_back(word);
            continue;
        }

        let caps = term.captures(&word).ok_or_else(|| MatchFail::InternalMismatch {
            term: term.source().to_string(),
            word: word.clone(),
        })?;

        if bound.consumed == 0 {
            bound.values.push(caps);
            bound.consumed = 1;
            continue;
        }

        // Tentatively extend the plural claim; commit only on acceptance.
        let mut claim = bound.plural_ix;
        let mut ok = true;
        for (j, v) in caps.iter().enumerate() {
            if Some(j) == claim {
                continue;
            }
            if *v == bound.values[0][j] {
                continue;
            }
            if term.vars()[j].plural() && claim.is_none() {
                claim = Some(j);
            } else {
                ok = false;
                break;
            }
        }

        if ok {
            bound.plural_ix = claim;
            bound.values.push(caps);
            bound.consumed += 1;
        } else {
            bound.rejected.push(word);
        }
    }

    Ok(bound)
}
