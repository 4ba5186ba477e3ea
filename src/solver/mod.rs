//! The dependency solver: goal rewriting, grounding search, plan emission.
//!
//! A solve is strictly single-threaded and deterministic: rule definition
//! order, goal insertion order, and disjunct discovery order are all
//! preserved, so identical inputs produce byte-identical plans.

pub mod error;
pub mod plan;
mod search;

use std::collections::VecDeque;

use log::debug;

pub use error::SolverError;
pub use plan::{Plan, PlanStep};

use crate::{
    backend::Backend,
    engine::CancelToken,
    pattern::{expander, Word},
    registry::{Registry, RuleKind},
};

/// Default base of the goal-table size bound.
pub const SEARCH_BOUND_BASE: usize = 64;
/// Default exponent applied to the initial goal count in the size bound.
pub const SEARCH_BOUND_EXPONENT: u32 = 3;

pub struct Solver<'a> {
    registry: &'a Registry,
    cancel: CancelToken,
    bound_base: usize,
    bound_exponent: u32,
}

impl<'a> Solver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self::with_cancel(registry, CancelToken::new())
    }

    pub fn with_cancel(registry: &'a Registry, cancel: CancelToken) -> Self {
        Solver {
            registry,
            cancel,
            bound_base: SEARCH_BOUND_BASE,
            bound_exponent: SEARCH_BOUND_EXPONENT,
        }
    }

    /// Override the search bound, `base + initial^exponent`.
    pub fn with_bound(mut self, base: usize, exponent: u32) -> Self {
        self.bound_base = base;
        self.bound_exponent = exponent;
        self
    }

    /// Resolve `goals` into an ordered plan of `(rule, bindings)` firings.
    ///
    /// The goal words are first rewritten to a fixpoint through the
    /// ungrounded rules, then grounded against the grounded rules.
    pub fn solve(&self, goals: &[Word], backend: &mut dyn Backend) -> Result<Plan, SolverError> {
        let expanded = self.rewrite(goals, backend)?;
        debug!("solving for: {}", expanded.join(" "));
        search::Search::new(
            self.registry,
            self.cancel.clone(),
            self.bound_base,
            self.bound_exponent,
        )
        .run(&expanded)
    }

    /// Rewrite `words` through the ungrounded rules until no rule applies.
    ///
    /// Each word is tried against the ungrounded rules in definition order.
    /// A match expands the rule's value side into the replacement; if the
    /// rule carries a command it runs first, speculatively, with the extra
    /// bindings `in` (the matched word) and `out` (the replacement), and a
    /// non-zero exit rejects the rewrite in favor of the next rule.
    pub fn rewrite(
        &self,
        words: &[Word],
        backend: &mut dyn Backend,
    ) -> Result<Vec<Word>, SolverError> {
        let rules: Vec<_> = self
            .registry
            .rules()
            .iter()
            .filter(|r| r.kind == RuleKind::Ungrounded)
            .collect();
        let limit = search::goal_size_limit(self.bound_base, self.bound_exponent, words.len());
        let mut queue: VecDeque<Word> = words.iter().cloned().collect();
        let mut out = Vec::new();
        let mut rewrites = 0usize;

        'words: while let Some(word) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(SolverError::Cancelled);
            }
            for rule in &rules {
                let bindings =
                    match search::try_match(&rule.outputs, std::slice::from_ref(&word))? {
                        Some(bindings) => bindings,
                        None => continue,
                    };
                let replacement = expander::expand(&bindings, &rule.inputs);
                if replacement.len() == 1 && replacement[0] == word {
                    // Already stable under this equation.
                    continue;
                }
                if let Some(template) = &rule.command {
                    let mut with_io = bindings.clone();
                    with_io.insert("in", vec![word.clone()]);
                    with_io.insert("out", replacement.clone());
                    let command = expander::expand_command(&with_io, template)?;
                    let status = backend.execute(rule.id, &command, &with_io)?;
                    if status != 0 {
                        debug!(
                            "{} rejected rewrite of {:?} (command exited {})",
                            rule.id, word, status
                        );
                        continue;
                    }
                }
                rewrites += 1;
                if rewrites > limit {
                    return Err(SolverError::BoundExceeded { limit });
                }
                debug!("{} rewrote {:?} -> {:?}", rule.id, word, replacement);
                for next in replacement.into_iter().rev() {
                    queue.push_front(next);
                }
                continue 'words;
            }
            out.push(word);
        }
        Ok(out)
    }
}
