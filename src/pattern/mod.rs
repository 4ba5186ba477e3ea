//! The pattern model: words, variable references, terms and profiles.
//!
//! A *term* is a single word-sized string mixing literal text with variable
//! references of the form `%name` (singular) or `%@name` (plural).  The
//! *profile* of a term is its shape with every reference collapsed to a bare
//! `%`; terms of identical profile compete for the same words during
//! matching, so profiles drive both the factoring of text and the shadowing
//! order between terms.

pub mod error;
pub mod expander;
pub mod matcher;

use std::{collections::HashMap, fmt, sync::LazyLock};

use regex::Regex;

use crate::pattern::error::PatternError;

/// A single build word: non-empty text with no whitespace.
pub type Word = String;

/// The profile of a term that matches any word at all.
pub const EVERYTHING_PROFILE: &str = "%";

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(@?[A-Za-z0-9_]+)").expect("variable reference regex"));

/// One parsed piece of a term: literal text or a variable reference.
///
/// The `@` plurality marker is not part of the stored name; bindings are
/// uniformly word lists and the flag only decides whether multiple distinct
/// values are admissible during matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Var { name: String, plural: bool },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Segment::Literal(text) => write!(f, "{}", text),
            Segment::Var { name, plural: true } => write!(f, "%@{}", name),
            Segment::Var { name, plural: false } => write!(f, "%{}", name),
        }
    }
}

/// A parsed pattern term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    text: String,
    segments: Vec<Segment>,
    profile: String,
}

impl Term {
    /// Parse one word-sized string into a term.
    ///
    /// Every `%` in the text must start a variable reference; a stray `%`
    /// (including the bare `%@`) is rejected.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for caps in VAR_RE.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            let literal = &text[cursor..whole.start()];
            if !literal.is_empty() {
                Self::check_literal(text, literal)?;
                segments.push(Segment::Literal(literal.to_string()));
            }
            let reference = &caps[1];
            let (name, plural) = match reference.strip_prefix('@') {
                Some(bare) => (bare, true),
                None => (reference, false),
            };
            segments.push(Segment::Var {
                name: name.to_string(),
                plural,
            });
            cursor = whole.end();
        }
        let tail = &text[cursor..];
        if !tail.is_empty() {
            Self::check_literal(text, tail)?;
            segments.push(Segment::Literal(tail.to_string()));
        }
        let profile = VAR_RE.replace_all(text, "%").into_owned();
        Ok(Term {
            text: text.to_string(),
            segments,
            profile,
        })
    }

    fn check_literal(term: &str, literal: &str) -> Result<(), PatternError> {
        if literal.contains('%') {
            return Err(PatternError::EmptyReference(term.to_string()));
        }
        Ok(())
    }

    /// Parse a sequence of words into terms.
    pub fn parse_all(words: &[impl AsRef<str>]) -> Result<Vec<Term>, PatternError> {
        words.iter().map(|w| Term::parse(w.as_ref())).collect()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Variable names in reference order, `@` stripped.
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// (name, plural) pairs in reference order.
    pub(crate) fn vars(&self) -> impl Iterator<Item = (&str, bool)> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var { name, plural } => Some((name.as_str(), *plural)),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_vars(&self) -> bool {
        self.var_names().next().is_some()
    }

    /// True when the term is literal text with no references at all.
    pub fn is_literal(&self) -> bool {
        !self.has_vars()
    }

    pub fn has_plural(&self) -> bool {
        self.vars().any(|(_, plural)| plural)
    }

    /// True when the profile is purely `%`: the term matches any word.
    pub fn is_everything(&self) -> bool {
        self.profile == EVERYTHING_PROFILE
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Interns profiles as small integers so the matcher can compare term shapes
/// cheaply and share one compiled regex per distinct profile.
#[derive(Debug, Default)]
pub(crate) struct ProfileInterner {
    ids: HashMap<String, ProfileId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProfileId(pub u32);

impl ProfileInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, profile: &str) -> ProfileId {
        if let Some(&id) = self.ids.get(profile) {
            return id;
        }
        let id = ProfileId(self.ids.len() as u32);
        self.ids.insert(profile.to_string(), id);
        id
    }
}

/// Variable bindings produced by a match: name (without `@`) to word list.
///
/// Singular variables carry exactly one word; plural variables carry any
/// non-negative number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    map: HashMap<String, Vec<Word>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[Word]> {
        self.map.get(name).map(Vec::as_slice)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Word>) {
        self.map.insert(name.into(), values);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Word>> {
        self.map.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// (name, values) pairs sorted by name.  `Display` uses this, which makes
    /// the rendered form a canonical key for bindings.
    pub fn sorted(&self) -> Vec<(&str, &[Word])> {
        let mut pairs: Vec<_> = self
            .map
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (name, values)) in self.sorted().into_iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}=[{}]", name, values.join(" "))?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Vec<Word>)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Word>)>>(iter: I) -> Self {
        Bindings {
            map: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg_lit(text: &str) -> Segment {
        Segment::Literal(text.to_string())
    }

    fn seg_var(name: &str, plural: bool) -> Segment {
        Segment::Var {
            name: name.to_string(),
            plural,
        }
    }

    #[test]
    fn parses_interleaved_references() {
        let term = Term::parse("lib%name.%@exts").unwrap();
        assert_eq!(
            term.segments(),
            &[
                seg_lit("lib"),
                seg_var("name", false),
                seg_lit("."),
                seg_var("exts", true),
            ]
        );
        assert_eq!(term.profile(), "lib%.%");
        assert!(!term.is_everything());
        assert!(term.has_plural());
    }

    #[test]
    fn pure_variable_is_everything_profile() {
        let term = Term::parse("%x").unwrap();
        assert_eq!(term.profile(), EVERYTHING_PROFILE);
        assert!(term.is_everything());
        let term = Term::parse("%@rest").unwrap();
        assert!(term.is_everything());
    }

    #[test]
    fn literal_term_has_no_vars() {
        let term = Term::parse("main.o").unwrap();
        assert!(term.is_literal());
        assert_eq!(term.profile(), "main.o");
    }

    #[test]
    fn stray_percent_is_rejected() {
        assert_eq!(
            Term::parse("%"),
            Err(PatternError::EmptyReference("%".to_string()))
        );
        assert_eq!(
            Term::parse("a%"),
            Err(PatternError::EmptyReference("a%".to_string()))
        );
        assert_eq!(
            Term::parse("%@"),
            Err(PatternError::EmptyReference("%@".to_string()))
        );
        // `-` terminates the name, leaving the second `%` dangling.
        assert!(Term::parse("%a-%").is_err());
    }

    #[test]
    fn profile_interning_is_stable() {
        let mut interner = ProfileInterner::new();
        let a = interner.intern("%.c");
        let b = interner.intern("%.h");
        let c = interner.intern("%.c");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn bindings_display_is_sorted() {
        let mut b = Bindings::new();
        b.insert("ys", vec!["z".to_string()]);
        b.insert("xs", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(b.to_string(), "xs=[a b], ys=[z]");
    }
}
