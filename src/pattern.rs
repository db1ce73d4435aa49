//! Pattern terms and variable profiles.
//!
//! A pattern term is a single word-sized string mixing literal text with
//! variable references (`%name` singular, `%@name` plural). Parsing a term
//! yields three derived forms that the rest of the engine runs on:
//!
//! - **Segments**: the literal/variable interleaving, used by the expander.
//! - **Profile**: the term with every reference collapsed to a bare `%`. Two
//!   terms with equal profiles match identical literal structure; the profile
//!   `%` alone is the *everything-profile*.
//! - **Regexes**: a shape filter built from the profile (each `%` → `.*`) and
//!   a binding regex built from the term (each reference → a greedy `(.*)`
//!   capture). Both are compiled once here, at parse time, and reused for
//!   every match.
//!
//! A `%` that is not part of a valid reference makes the term malformed; the
//! registry rejects such definitions up front.

use crate::error::{Error, MatchFail, Result};
use regex::Regex;

/// A single variable reference inside a term.
#[derive(Debug, Clone)]
pub struct VarRef {
    /// Variable name with the `@` flag stripped.
    name: String,
    /// Whether the reference was written `%@name`. Plural variables may bind
    /// word lists longer than one; the flag is not a type.
    plural: bool,
    /// The reference as written, e.g. `%@xs`. Unbound references expand back
    /// to this text.
    source: String,
}

impl VarRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural(&self) -> bool {
        self.plural
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// One parsed piece of a term: literal text or an index into the term's
/// variable vector.
#[derive(Debug, Clone)]
pub(crate) enum Segment {
    Literal(String),
    Var(usize),
}

/// A parsed pattern term.
#[derive(Debug, Clone)]
pub struct Term {
    source: String,
    profile: String,
    segments: Vec<Segment>,
    vars: Vec<VarRef>,
    /// Anchored shape filter derived from the profile (`%` → `.*`).
    glob: Regex,
    /// Anchored binding regex derived from the term (`%name` → `(.*)`).
    bind: Regex,
}

impl Term {
    /// Parse a single token into a term.
    ///
    /// Scans for `%(@?[A-Za-z0-9_]+)`; captures in order give the variable
    /// sequence, the gaps give the literal segments.
    pub fn parse(token: &str) -> Result<Term> {
        let re = regex!("%(@?[A-Za-z0-9_]+)");

        // First pass: split the token into literal gaps and references.
        enum Piece<'a> {
            Literal(&'a str),
            Var { source: &'a str, raw: &'a str },
        }
        let mut pieces = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(token) {
            let whole = caps
                .get(0)
                .ok_or_else(|| Error::InternalInvariant(format!("reference scan lost the whole match in `{token}`")))?;
            if whole.start() > last {
                pieces.push(Piece::Literal(&token[last..whole.start()]));
            }
            let raw = caps
                .get(1)
                .ok_or_else(|| Error::InternalInvariant(format!("reference scan lost the name group in `{token}`")))?;
            pieces.push(Piece::Var { source: whole.as_str(), raw: raw.as_str() });
            last = whole.end();
        }
        if last < token.len() {
            pieces.push(Piece::Literal(&token[last..]));
        }

        // Second pass: derive segments, profile, and both regex sources.
        let mut segments = Vec::new();
        let mut vars: Vec<VarRef> = Vec::new();
        let mut profile = String::new();
        let mut glob_src = String::from("^");
        let mut bind_src = String::from("^");
        for piece in pieces {
            match piece {
                Piece::Literal(lit) => {
                    if lit.contains('%') {
                        return Err(Error::Pattern(MatchFail::EmptyPattern(token.to_string())));
                    }
                    segments.push(Segment::Literal(lit.to_string()));
                    profile.push_str(lit);
                    glob_src.push_str(&regex::escape(lit));
                    bind_src.push_str(&regex::escape(lit));
                }
                Piece::Var { source, raw } => {
                    segments.push(Segment::Var(vars.len()));
                    vars.push(VarRef {
                        name: raw.trim_start_matches('@').to_string(),
                        plural: raw.starts_with('@'),
                        source: source.to_string(),
                    });
                    profile.push('%');
                    glob_src.push_str(".*");
                    bind_src.push_str("(.*)");
                }
            }
        }
        glob_src.push('$');
        bind_src.push('$');
        let glob = Regex::new(&glob_src)
            .map_err(|e| Error::InternalInvariant(format!("bad glob regex for `{token}`: {e}")))?;
        let bind = Regex::new(&bind_src)
            .map_err(|e| Error::InternalInvariant(format!("bad bind regex for `{token}`: {e}")))?;

        Ok(Term { source: token.to_string(), profile, segments, vars, glob, bind })
    }

    /// Parse a whitespace-separated token vector.
    pub fn parse_all(tokens: &[impl AsRef<str>]) -> Result<Vec<Term>> {
        tokens.iter().map(|t| Term::parse(t.as_ref())).collect()
    }

    /// The term as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The term with every variable reference replaced by a bare `%`.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn vars(&self) -> &[VarRef] {
        &self.vars
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_vars(&self) -> bool {
        !self.vars.is_empty()
    }

    pub fn has_plural(&self) -> bool {
        self.vars.iter().any(VarRef::plural)
    }

    /// True if the profile is purely `%` with no literal content: the term
    /// matches any word at all.
    pub fn is_everything(&self) -> bool {
        self.profile == "%"
    }

    /// Shape filter: does `word` match the bash-style glob of the profile?
    pub fn matches_shape(&self, word: &str) -> bool {
        self.glob.is_match(word)
    }

    /// Rebind `word` against the full term, returning one captured value per
    /// variable in reference order. `None` here after a positive
    /// [`matches_shape`] is an internal inconsistency; callers surface it as
    /// `MatchFail::InternalMismatch`.
    pub fn captures(&self, word: &str) -> Option<Vec<String>> {
        let caps = self.bind.captures(word)?;
        Some((1..=self.vars.len()).map(|i| caps.get(i).map(|m| m.as_str()).unwrap_or("").to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_references() {
        let term = Term::parse("%@xs.%ext").unwrap();
        assert_eq!(term.profile(), "%.%");
        assert_eq!(term.vars().len(), 2);
        assert_eq!(term.vars()[0].name(), "xs");
        assert!(term.vars()[0].plural());
        assert_eq!(term.vars()[0].source(), "%@xs");
        assert_eq!(term.vars()[1].name(), "ext");
        assert!(!term.vars()[1].plural());
    }

    #[test]
    fn profile_distinguishes_literal_structure() {
        let cases: Vec<(&str, &str)> = vec![
            ("%x", "%"),
            ("%@xs", "%"),
            ("%x.c", "%.c"),
            ("lib%name.a", "lib%.a"),
            ("plain", "plain"),
            ("%a-%b", "%-%"),
        ];
        for (token, expected) in cases {
            assert_eq!(Term::parse(token).unwrap().profile(), expected, "token {token}");
        }
    }

    #[test]
    fn everything_profile_is_a_single_bare_reference() {
        assert!(Term::parse("%x").unwrap().is_everything());
        assert!(Term::parse("%@rest").unwrap().is_everything());
        assert!(!Term::parse("%x.c").unwrap().is_everything());
        assert!(!Term::parse("a%x").unwrap().is_everything());
    }

    #[test]
    fn shape_filter_follows_profile() {
        let term = Term::parse("%x.o").unwrap();
        assert!(term.matches_shape("foo.o"));
        assert!(term.matches_shape("a.b.o"));
        assert!(!term.matches_shape("foo.c"));
    }

    #[test]
    fn captures_align_with_reference_order() {
        let term = Term::parse("%a-%b").unwrap();
        assert_eq!(term.captures("x-y").unwrap(), vec!["x".to_string(), "y".to_string()]);
        assert!(term.captures("xy").is_none());
    }

    #[test]
    fn stray_percent_is_rejected() {
        for token in ["%", "a%", "%%x", "100%"] {
            match Term::parse(token) {
                Err(Error::Pattern(MatchFail::EmptyPattern(t))) => assert_eq!(t, token),
                other => panic!("expected EmptyPattern for {token}, got {other:?}"),
            }
        }
    }
}
