//! Template expansion: substitute bindings into terms, cross-multiplying
//! plural values.
//!
//! Expansion is the inverse of matching. Each template term starts from the
//! singleton expansion set `{""}` and folds its segments in order:
//!
//! ```text
//! template: %@xs-%@ys      xs=[1 2 3]  ys=[a b]
//!
//! {""}  ──%@xs──▶ {1 2 3}  ──"-"──▶ {1- 2- 3-}  ──%@ys──▶ {1-a 2-a 3-a 1-b 2-b 3-b}
//! ```
//!
//! The product is value-major: for each value of the incoming variable, every
//! element of the current set is extended. Unbound references are not errors;
//! they expand back to their literal source text (`%name`), which lets
//! commands reference variables a later layer will fill in.

use crate::pattern::{Segment, Term};
use crate::{Bindings, Word};

/// Expand `terms` under `bindings`, concatenating each term's expansion.
///
/// A term containing a variable bound to the empty list expands to nothing:
/// the cross product with zero values has zero elements.
pub fn expand(bindings: &Bindings, terms: &[Term]) -> Vec<Word> {
    let mut out = Vec::new();
    for term in terms {
        out.extend(expand_term(bindings, term));
    }
    out
}

/// Expand command-template terms to a single text line (space-joined).
pub fn expand_to_text(bindings: &Bindings, terms: &[Term]) -> String {
    expand(bindings, terms).join(" ")
}

fn expand_term(bindings: &Bindings, term: &Term) -> Vec<Word> {
    let mut acc: Vec<String> = vec![String::new()];
    for segment in term.segments() {
        match segment {
            Segment::Literal(lit) => {
                for e in &mut acc {
                    e.push_str(lit);
                }
            }
            Segment::Var(ix) => {
                let var = &term.vars()[*ix];
                match bindings.get(var.name()) {
                    Some(values) => {
                        let crossed: Vec<String> = values
                            .iter()
                            .flat_map(|v| acc.iter().map(move |e| format!("{e}{v}")))
                            .collect();
                        acc = crossed;
                    }
                    None => {
                        for e in &mut acc {
                            e.push_str(var.source());
                        }
                    }
                }
            }
        }
    }
    acc
}
