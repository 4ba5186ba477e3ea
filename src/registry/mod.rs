//! The rule registry: definition dispatch, globals, and rule classification.
//!
//! Definitions arrive as positional token vectors with the separators `:`
//! (grounded), `=` (ungrounded) and `::` (command).  Globals are pre-expanded
//! into outputs, inputs and commands at definition time, so matching and
//! expansion never consult the global table afterwards.

use std::{collections::HashMap, fmt};

use log::debug;
use thiserror::Error;

use crate::pattern::{
    error::{MatchError, PatternError},
    expander, matcher, Bindings, Term, Word,
};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("global pattern failed to bind its value: {0}")]
    GlobalBind(MatchError),

    #[error("default goal definition cannot carry a command")]
    DefaultGoalCommand,

    #[error("definition has no `:`, `=` or `::` separator: {}", .0.join(" "))]
    MissingSeparator(Vec<String>),
}

/// Identifies a rule within one registry, in definition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// A build edge: inputs must be resolved before the command runs.
    Grounded,
    /// A rewriting equation, applied during goal expansion.  Its command is
    /// speculative and cheap.
    Ungrounded,
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub id: RuleId,
    pub kind: RuleKind,
    pub outputs: Vec<Term>,
    pub inputs: Vec<Term>,
    pub command: Option<String>,
}

impl Rule {
    /// A grounded rule with no inputs: the outputs simply exist.
    pub fn is_terminal(&self) -> bool {
        self.kind == RuleKind::Grounded && self.inputs.is_empty()
    }

    /// Single output with no plural output variable: eligible for a
    /// linear-time per-goal match.
    pub fn is_unary(&self) -> bool {
        self.outputs.len() == 1 && !self.outputs[0].has_plural()
    }

    /// Every output matches any word at all.  Such rules are kept as a
    /// fallback so they cannot swallow the whole goal set.
    pub fn is_everything(&self) -> bool {
        !self.outputs.is_empty() && self.outputs.iter().all(Term::is_everything)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let outs = self.outputs.iter().map(Term::text).collect::<Vec<_>>();
        let ins = self.inputs.iter().map(Term::text).collect::<Vec<_>>();
        let sep = match self.kind {
            RuleKind::Grounded => ":",
            RuleKind::Ungrounded => "=",
        };
        write!(f, "{} {}", outs.join(" "), sep)?;
        if !ins.is_empty() {
            write!(f, " {}", ins.join(" "))?;
        }
        if let Some(command) = &self.command {
            write!(f, " :: {}", command)?;
        }
        Ok(())
    }
}

/// One instance's rule set: grounded and ungrounded rules in definition
/// order, globals keyed by variable name, and the default goal list.
#[derive(Debug, Default)]
pub struct Registry {
    rules: Vec<Rule>,
    globals: Vec<(String, Vec<Word>)>,
    global_index: HashMap<String, usize>,
    default_goals: Vec<Word>,
}

enum DefState {
    Outs,
    Ins,
    Cmd,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one definition token vector.
    ///
    /// Separators are recognized only as standalone tokens.  An empty output
    /// side sets the default goal list instead of storing a rule.
    pub fn define(&mut self, tokens: &[String]) -> Result<(), RegistryError> {
        let mut outs: Vec<String> = Vec::new();
        let mut ins: Vec<String> = Vec::new();
        let mut cmd: Vec<String> = Vec::new();
        let mut state = DefState::Outs;
        let mut kind = None;

        for token in tokens {
            match state {
                DefState::Outs => match token.as_str() {
                    ":" => {
                        state = DefState::Ins;
                        kind = Some(RuleKind::Grounded);
                    }
                    "=" => {
                        state = DefState::Ins;
                        kind = Some(RuleKind::Ungrounded);
                    }
                    "::" => {
                        state = DefState::Cmd;
                        kind = Some(RuleKind::Grounded);
                    }
                    _ => outs.push(token.clone()),
                },
                DefState::Ins if token == "::" => state = DefState::Cmd,
                DefState::Ins => ins.push(token.clone()),
                DefState::Cmd => cmd.push(token.clone()),
            }
        }

        let kind = kind.ok_or_else(|| RegistryError::MissingSeparator(tokens.to_vec()))?;
        let globals = self.global_bindings();

        if outs.is_empty() {
            if !cmd.is_empty() {
                return Err(RegistryError::DefaultGoalCommand);
            }
            let goal_terms = Term::parse_all(&ins)?;
            self.default_goals = expander::expand(&globals, &goal_terms);
            debug!("default goals set to: {}", self.default_goals.join(" "));
            return Ok(());
        }

        // Pre-expand globals everywhere; unbound references stay literal and
        // survive the round trip back into terms.
        let out_words = expander::expand(&globals, &Term::parse_all(&outs)?);
        let in_words = expander::expand(&globals, &Term::parse_all(&ins)?);
        let out_terms = Term::parse_all(&out_words)?;
        let in_terms = Term::parse_all(&in_words)?;
        let command = if cmd.is_empty() {
            None
        } else {
            Some(expander::expand_command(&globals, &cmd.join(" "))?)
        };

        let mut seen = std::collections::HashSet::new();
        for term in &out_terms {
            for name in term.var_names() {
                if !seen.insert(name.to_string()) {
                    return Err(PatternError::RepeatedVariable(name.to_string()).into());
                }
            }
        }

        if kind == RuleKind::Ungrounded
            && command.is_none()
            && self.try_define_global(&out_terms, &in_words)?
        {
            return Ok(());
        }

        let rule = Rule {
            id: RuleId(self.rules.len()),
            kind,
            outputs: out_terms,
            inputs: in_terms,
            command,
        };
        debug!("defined {}: {}", rule.id, rule);
        self.rules.push(rule);
        Ok(())
    }

    /// Store an ungrounded definition as a global if it qualifies: the
    /// expanded value side must be variable-free, and the name side must be
    /// either a single literal token or a pattern that fully binds the value.
    fn try_define_global(
        &mut self,
        out_terms: &[Term],
        in_words: &[Word],
    ) -> Result<bool, RegistryError> {
        if in_words.iter().any(|w| w.contains('%')) {
            return Ok(false);
        }
        if out_terms.len() == 1 && out_terms[0].is_literal() {
            self.upsert_global(out_terms[0].text(), in_words.to_vec());
            return Ok(true);
        }
        if out_terms.iter().any(Term::has_vars) {
            let bound = matcher::match_terms(out_terms, in_words)
                .map_err(RegistryError::GlobalBind)?;
            // Upsert in reference order so repeated listings are stable.
            for term in out_terms {
                for name in term.var_names() {
                    if let Some(values) = bound.get(name) {
                        self.upsert_global(name, values.to_vec());
                    }
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn upsert_global(&mut self, name: &str, values: Vec<Word>) {
        debug!("global {} = {}", name, values.join(" "));
        match self.global_index.get(name) {
            Some(&slot) => self.globals[slot].1 = values,
            None => {
                self.global_index
                    .insert(name.to_string(), self.globals.len());
                self.globals.push((name.to_string(), values));
            }
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, &[Word])> {
        self.globals
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn global(&self, name: &str) -> Option<&[Word]> {
        self.global_index
            .get(name)
            .map(|&slot| self.globals[slot].1.as_slice())
    }

    pub fn default_goals(&self) -> &[Word] {
        &self.default_goals
    }

    /// Snapshot of the global table as bindings, for pre-expansion.
    fn global_bindings(&self) -> Bindings {
        self.globals
            .iter()
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }
}

/// Rules in definition order, then globals in insertion order.
impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        for (name, values) in self.globals() {
            writeln!(f, "{} = {}", name, values.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn define(registry: &mut Registry, text: &str) {
        registry.define(&tokens(text)).unwrap();
    }

    #[test]
    fn grounded_and_ungrounded_dispatch() {
        let mut r = Registry::new();
        define(&mut r, "%x.o : %x.c :: cc -c %x.c");
        define(&mut r, "tidy-%x = %x");
        assert_eq!(r.rules().len(), 2);
        assert_eq!(r.rules()[0].kind, RuleKind::Grounded);
        assert_eq!(r.rules()[0].command.as_deref(), Some("cc -c %x.c"));
        assert_eq!(r.rules()[1].kind, RuleKind::Ungrounded);
        assert!(r.rules()[1].command.is_none());
    }

    #[test]
    fn double_colon_without_inputs_is_terminal_with_command() {
        let mut r = Registry::new();
        define(&mut r, "seed :: touch seed");
        let rule = &r.rules()[0];
        assert!(rule.is_terminal());
        assert_eq!(rule.command.as_deref(), Some("touch seed"));
    }

    #[test]
    fn literal_name_global_upserts_in_place() {
        let mut r = Registry::new();
        define(&mut r, "cc = gcc");
        assert_eq!(r.global("cc").unwrap(), &["gcc".to_string()]);
        define(&mut r, "cc = clang");
        assert_eq!(r.global("cc").unwrap(), &["clang".to_string()]);
        assert_eq!(r.globals().count(), 1);
        assert!(r.rules().is_empty());
    }

    #[test]
    fn pattern_global_binds_each_variable() {
        let mut r = Registry::new();
        define(&mut r, "%@srcs.c = foo.c bar.c");
        assert_eq!(
            r.global("srcs").unwrap(),
            &["foo".to_string(), "bar".to_string()]
        );
    }

    #[test]
    fn bound_global_expands_in_later_definitions() {
        let mut r = Registry::new();
        define(&mut r, "%x = 10");
        assert_eq!(r.global("x").unwrap(), &["10".to_string()]);
        define(&mut r, ": %x");
        assert_eq!(r.default_goals(), &["10".to_string()]);
    }

    #[test]
    fn globals_are_pre_expanded_into_rules() {
        let mut r = Registry::new();
        define(&mut r, "cc = gcc");
        define(&mut r, "%x.o : %x.c :: %cc -c %x.c");
        // Redefining the global later must not affect the stored rule.
        define(&mut r, "cc = clang");
        assert_eq!(r.rules()[0].command.as_deref(), Some("gcc -c %x.c"));
    }

    #[test]
    fn variable_value_demotes_global_to_ungrounded() {
        let mut r = Registry::new();
        define(&mut r, "alias-%x = %x.elsewhere");
        assert!(r.globals().next().is_none());
        assert_eq!(r.rules().len(), 1);
        assert_eq!(r.rules()[0].kind, RuleKind::Ungrounded);
    }

    #[test]
    fn global_expansion_multiplies_rule_outputs() {
        let mut r = Registry::new();
        define(&mut r, "%@objs = a.o b.o");
        define(&mut r, "%@objs : gen :: build");
        assert_eq!(r.rules()[0].outputs.len(), 2);
        assert_eq!(r.rules()[0].outputs[0].text(), "a.o");
    }

    #[test]
    fn empty_outputs_set_default_goals() {
        let mut r = Registry::new();
        define(&mut r, "cc = gcc");
        define(&mut r, ": all %cc");
        assert_eq!(r.default_goals(), &["all".to_string(), "gcc".to_string()]);
        assert!(r
            .define(&tokens(": all :: echo no"))
            .is_err());
    }

    #[test]
    fn repeated_output_variable_is_rejected_and_state_untouched() {
        let mut r = Registry::new();
        let err = r.define(&tokens("%x-%x : %x.c")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Pattern(PatternError::RepeatedVariable(_))
        ));
        assert!(r.rules().is_empty());
    }

    #[test]
    fn unbindable_global_pattern_is_an_error() {
        let mut r = Registry::new();
        let err = r.define(&tokens("%x.c = literal.h")).unwrap_err();
        assert!(matches!(err, RegistryError::GlobalBind(_)));
    }

    #[test]
    fn display_lists_rules_then_globals() {
        let mut r = Registry::new();
        define(&mut r, "%x.o : %x.c :: cc %x.c");
        define(&mut r, "cc = gcc");
        let listing = r.to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines, vec!["%x.o : %x.c :: cc %x.c", "cc = gcc"]);
    }
}
