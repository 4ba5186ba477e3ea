//! Build plans: ordered `(rule, bindings)` firings with an explicit partial
//! order.
//!
//! Steps are emitted in a valid topological order, so a serial executor can
//! walk them front to back.  The `deps` indices expose the true partial
//! order; steps that share no path may run in parallel, subject to the
//! backend's job limit.

use std::fmt;

use crate::{
    pattern::{Bindings, Word},
    registry::RuleId,
};

/// One firing of a grounded rule.
#[derive(Clone, Debug)]
pub struct PlanStep {
    pub rule: RuleId,
    pub bindings: Bindings,
    /// Words this firing produces.
    pub outputs: Vec<Word>,
    /// Words this firing consumes, in expansion order.
    pub inputs: Vec<Word>,
    /// Command template, still unexpanded; `None` for bare terminal rules.
    pub command: Option<String>,
    /// Indices of earlier steps that must complete first.
    pub deps: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "#{} {} -> {}", i, step.rule, step.outputs.join(" "))?;
            if !step.inputs.is_empty() {
                write!(f, " <- {}", step.inputs.join(" "))?;
            }
            if !step.bindings.is_empty() {
                write!(f, " ({})", step.bindings)?;
            }
            if !step.deps.is_empty() {
                let deps: Vec<String> = step.deps.iter().map(|d| format!("#{}", d)).collect();
                write!(f, " after {}", deps.join(" "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
