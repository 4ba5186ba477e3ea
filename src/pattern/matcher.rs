//! Binds a multi-variable pattern over a sequence of words.
//!
//! Terms are processed left to right.  Each term *factors* the remaining
//! words by its profile (the bash-style glob with every reference collapsed
//! to `*`), then rebinds the matching words with a greedy capture regex.  A
//! term whose profile reappears in a later term is *shadowed* and claims
//! exactly one word, which resolves the ambiguity between structurally
//! identical terms in favor of the earlier one.  Within one term at most one
//! variable (necessarily `@`-prefixed) may take distinct values across the
//! factored words; a candidate word that would force a second distinct value
//! onto any other variable is rejected back into the remainder.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::trace;
use regex::Regex;

use crate::pattern::{
    error::{MatchError, PatternError},
    Bindings, ProfileId, ProfileInterner, Term, Word,
};

/// Bind `terms` over `words`.
///
/// Succeeds iff every word is consumed by some term.  The returned bindings
/// map each referenced variable to its word list; a singular variable that
/// received no word is simply absent.
pub fn match_terms(terms: &[Term], words: &[Word]) -> Result<Bindings, MatchError> {
    let mut seen = HashSet::new();
    for term in terms {
        for name in term.var_names() {
            if !seen.insert(name) {
                return Err(PatternError::RepeatedVariable(name.to_string()).into());
            }
        }
    }

    // One compiled regex per distinct profile.  Terms of equal profile have
    // identical literal structure, so the same regex both filters words by
    // shape and rebinds their captures.
    let mut interner = ProfileInterner::new();
    let mut regexes: HashMap<ProfileId, Regex> = HashMap::new();
    let mut profiles = Vec::with_capacity(terms.len());
    for term in terms {
        let id = interner.intern(term.profile());
        regexes
            .entry(id)
            .or_insert_with(|| profile_regex(term.profile()));
        profiles.push(id);
    }

    let mut bindings = Bindings::new();
    let mut pool: Vec<Word> = words.to_vec();

    for (i, term) in terms.iter().enumerate() {
        let shadowed = profiles[i + 1..].contains(&profiles[i]);
        bind_term(term, &regexes[&profiles[i]], shadowed, &mut pool, &mut bindings)?;
    }

    if pool.is_empty() {
        Ok(bindings)
    } else {
        Err(MatchError::NotConsumed(pool))
    }
}

/// Parse `patterns` and bind them over `words` in one step.
pub fn match_words(
    patterns: &[impl AsRef<str>],
    words: &[Word],
) -> Result<Bindings, MatchError> {
    let terms = Term::parse_all(patterns)?;
    match_terms(&terms, words)
}

fn bind_term(
    term: &Term,
    re: &Regex,
    shadowed: bool,
    pool: &mut Vec<Word>,
    bindings: &mut Bindings,
) -> Result<(), MatchError> {
    let vars: Vec<(&str, bool)> = term.vars().collect();
    let arity = vars.len();

    // Accepted captures per variable index, interleaved at stride `arity`.
    let mut chosen: Vec<Vec<Word>> = vec![Vec::new(); arity];
    let mut plural_at: Option<usize> = None;
    let mut consumed = vec![false; pool.len()];
    let mut claimed = false;

    for (wi, word) in pool.iter().enumerate() {
        if !re.is_match(word) {
            continue;
        }
        if shadowed && claimed {
            break;
        }
        let caps = re.captures(word).ok_or_else(|| MatchError::Internal {
            term: term.text().to_string(),
            word: word.clone(),
        })?;
        let mut values = Vec::with_capacity(arity);
        for k in 1..=arity {
            match caps.get(k) {
                Some(m) => values.push(m.as_str().to_string()),
                None => {
                    return Err(MatchError::Internal {
                        term: term.text().to_string(),
                        word: word.clone(),
                    })
                }
            }
        }

        // The at-most-one-plural rule: a variable may diverge from its prior
        // value only if it is the term's plural index, or can still become it.
        let mut promote = None;
        let mut admissible = true;
        for (k, value) in values.iter().enumerate() {
            let prior = match chosen[k].first() {
                Some(prior) => prior,
                None => continue,
            };
            if plural_at == Some(k) || prior == value {
                continue;
            }
            let (_, plural) = vars[k];
            if plural && plural_at.is_none() && promote.is_none() {
                promote = Some(k);
            } else {
                admissible = false;
                break;
            }
        }
        if !admissible {
            trace!("rejecting {:?} back into the remainder of {}", word, term);
            continue;
        }
        if promote.is_some() {
            plural_at = promote;
        }
        for (k, value) in values.into_iter().enumerate() {
            chosen[k].push(value);
        }
        consumed[wi] = true;
        claimed = true;
    }

    // Collapse the interleaved captures: plural variables accumulate every
    // value at their stride, singular variables take the first.
    for (k, (name, plural)) in vars.iter().enumerate() {
        if *plural {
            bindings.insert(*name, std::mem::take(&mut chosen[k]));
        } else if let Some(first) = chosen[k].first() {
            bindings.insert(*name, vec![first.clone()]);
        }
    }

    let mut index = 0;
    pool.retain(|_| {
        let keep = !consumed[index];
        index += 1;
        keep
    });
    Ok(())
}

/// Anchored regex for a profile: literals escaped, each `%` a greedy capture.
fn profile_regex(profile: &str) -> Regex {
    let body = profile.split('%').map(|lit| regex::escape(lit)).join("(.*)");
    Regex::new(&format!("^{}$", body)).expect("escaped profile is a valid regex")
}
