//! Goal-directed search over the grounded rules.
//!
//! The search grows an ordered goal table from the requested words, recording
//! for every goal the alternative derivations (*disjuncts*) that could
//! produce it.  Terminal rules ground goals directly; grounding then
//! propagates to parents over a worklist.  Prerequisite words are unified
//! into the table by string equality, so shared dependencies are solved once.
//!
//! Rules whose outputs match any word at all are kept as a fallback: a goal
//! introduced beneath such a rule may not use one again, which keeps
//! match-anything chains from regenerating themselves forever.  Rule sets
//! that grow the goal table without such chains are cut off by the size
//! bound.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, trace};

use crate::{
    engine::CancelToken,
    pattern::{error::MatchError, expander, matcher, Bindings, Term, Word},
    registry::{Registry, Rule, RuleId, RuleKind},
    solver::{
        error::SolverError,
        plan::{Plan, PlanStep},
    },
};

/// Name of the implicit catch-all variable used to match a subset of the
/// goal list; reserved, never surfaced in bindings.
const REST_VAR: &str = "__rest";

/// Pathological rule sets are cut off once the goal table outgrows this.
pub(super) fn goal_size_limit(base: usize, exponent: u32, initial: usize) -> usize {
    base.saturating_add(initial.saturating_pow(exponent))
}

/// Bind `terms` over `words`, treating leftover words as a plain non-match.
pub(super) fn try_match(
    terms: &[Term],
    words: &[Word],
) -> Result<Option<Bindings>, SolverError> {
    match matcher::match_terms(terms, words) {
        Ok(bindings) => Ok(Some(bindings)),
        Err(MatchError::NotConsumed(_)) => Ok(None),
        Err(err @ MatchError::Internal { .. }) => Err(SolverError::Internal(err.to_string())),
        Err(MatchError::Pattern(err)) => Err(SolverError::Pattern(err)),
    }
}

/// Classified view of the grounded rules, computed once per solve.
struct RuleSet<'a> {
    unary_terminals: Vec<&'a Rule>,
    wide_terminals: Vec<&'a Rule>,
    /// Nonterminals in cursor order: ordinary rules first, everything-rules
    /// after, each sub-list in definition order.
    nonterminals: Vec<&'a Rule>,
    /// Cursor bound for goals that may not use everything-rules.
    plain_len: usize,
}

impl<'a> RuleSet<'a> {
    fn classify(registry: &'a Registry) -> Self {
        let mut unary_terminals = Vec::new();
        let mut wide_terminals = Vec::new();
        let mut plain = Vec::new();
        let mut everything = Vec::new();
        for rule in registry.rules() {
            if rule.kind != RuleKind::Grounded {
                continue;
            }
            if rule.is_terminal() {
                if rule.is_unary() {
                    unary_terminals.push(rule);
                } else {
                    wide_terminals.push(rule);
                }
            } else if rule.is_everything() {
                everything.push(rule);
            } else {
                plain.push(rule);
            }
        }
        let plain_len = plain.len();
        let mut nonterminals = plain;
        nonterminals.extend(everything);
        RuleSet {
            unary_terminals,
            wide_terminals,
            nonterminals,
            plain_len,
        }
    }
}

/// One alternative derivation of a set of goals.
struct Disjunct {
    rule: RuleId,
    bindings: Bindings,
    /// Goal indices this derivation produces.
    outputs: Vec<usize>,
    /// Goal indices it requires first.
    deps: Vec<usize>,
    /// Input words in expansion order, for the plan.
    input_words: Vec<Word>,
    terminal: bool,
}

#[derive(Default)]
struct Table {
    words: Vec<Word>,
    index: HashMap<Word, usize>,
    grounded: Vec<bool>,
    /// Goals that depend on this one, via any disjunct.
    parents: Vec<Vec<usize>>,
    /// Disjunct ids per goal, in discovery order.
    alts: Vec<Vec<usize>>,
    /// Next nonterminal rule index to try for this goal.
    cursor: Vec<usize>,
    /// Introduced beneath an everything-rule; may not use one itself.
    tainted: Vec<bool>,
    disjuncts: Vec<Disjunct>,
    required: usize,
}

impl Table {
    /// Unify a word into the table, returning its goal index.  Reaching an
    /// existing goal through an ordinary chain clears its taint.
    fn intern(&mut self, word: &Word, tainted: bool) -> usize {
        if let Some(&i) = self.index.get(word) {
            if !tainted {
                self.tainted[i] = false;
            }
            return i;
        }
        let i = self.words.len();
        self.words.push(word.clone());
        self.index.insert(word.clone(), i);
        self.grounded.push(false);
        self.parents.push(Vec::new());
        self.alts.push(Vec::new());
        self.cursor.push(0);
        self.tainted.push(tainted);
        trace!("goal[{}] = {:?} (tainted: {})", i, word, tainted);
        i
    }

    fn add_disjunct(
        &mut self,
        rule: &Rule,
        bindings: Bindings,
        outputs: Vec<usize>,
        deps: Vec<usize>,
        input_words: Vec<Word>,
    ) -> usize {
        let id = self.disjuncts.len();
        for &goal in &outputs {
            self.alts[goal].push(id);
        }
        for &dep in &deps {
            for &goal in &outputs {
                if !self.parents[dep].contains(&goal) {
                    self.parents[dep].push(goal);
                }
            }
        }
        trace!(
            "disjunct {} for goals {:?}: {} needs {:?}",
            id,
            outputs,
            rule.id,
            deps
        );
        self.disjuncts.push(Disjunct {
            rule: rule.id,
            bindings,
            outputs,
            deps,
            input_words,
            terminal: rule.is_terminal(),
        });
        id
    }

    fn ground(&mut self, goal: usize, ready: &mut VecDeque<usize>, progress: &mut bool) {
        if !self.grounded[goal] {
            self.grounded[goal] = true;
            ready.push_back(goal);
            *progress = true;
            trace!("grounded goal[{}] {:?}", goal, self.words[goal]);
        }
    }

    fn satisfied(&self, goal: usize) -> bool {
        self.alts[goal]
            .iter()
            .any(|&d| self.disjuncts[d].deps.iter().all(|&q| self.grounded[q]))
    }

    fn all_required_grounded(&self) -> bool {
        self.grounded[..self.required].iter().all(|&g| g)
    }

    /// Ungrounded goals with no derivation at all, reachable from a required
    /// goal.  Falls back to the required goals themselves for cyclic stalls.
    fn orphans(&self) -> Vec<Word> {
        let mut seen = vec![false; self.words.len()];
        let mut stack: Vec<usize> = (0..self.required).filter(|&i| !self.grounded[i]).collect();
        let mut leaves = Vec::new();
        while let Some(goal) = stack.pop() {
            if seen[goal] {
                continue;
            }
            seen[goal] = true;
            if self.alts[goal].is_empty() {
                leaves.push(self.words[goal].clone());
            }
            for &d in &self.alts[goal] {
                for &dep in &self.disjuncts[d].deps {
                    if !self.grounded[dep] {
                        stack.push(dep);
                    }
                }
            }
        }
        if leaves.is_empty() {
            (0..self.required)
                .filter(|&i| !self.grounded[i])
                .map(|i| self.words[i].clone())
                .collect()
        } else {
            leaves.sort();
            leaves.dedup();
            leaves
        }
    }
}

pub(super) struct Search<'a> {
    registry: &'a Registry,
    cancel: CancelToken,
    bound_base: usize,
    bound_exponent: u32,
}

impl<'a> Search<'a> {
    pub(super) fn new(
        registry: &'a Registry,
        cancel: CancelToken,
        bound_base: usize,
        bound_exponent: u32,
    ) -> Self {
        Search {
            registry,
            cancel,
            bound_base,
            bound_exponent,
        }
    }

    pub(super) fn run(&self, goals: &[Word]) -> Result<Plan, SolverError> {
        let rules = RuleSet::classify(self.registry);
        let rest = Term::parse(&format!("%@{}", REST_VAR))?;

        let mut table = Table::default();
        for word in goals {
            table.intern(word, false);
        }
        table.required = table.words.len();
        let limit = goal_size_limit(self.bound_base, self.bound_exponent, table.required);

        // Wide rules bind against the whole goal list and fire at most once.
        let mut fired: HashSet<RuleId> = HashSet::new();
        let mut ready: VecDeque<usize> = VecDeque::new();

        loop {
            if self.cancel.is_cancelled() {
                return Err(SolverError::Cancelled);
            }
            if table.words.len() > limit {
                return Err(SolverError::BoundExceeded { limit });
            }
            let mut progress = false;

            self.terminal_sweep(&rules, &rest, &mut table, &mut fired, &mut ready, &mut progress)?;
            propagate(&mut table, &mut ready, &mut progress);
            if table.all_required_grounded() {
                break;
            }

            self.expand_goals(
                &rules,
                &rest,
                &mut table,
                &mut fired,
                &mut ready,
                &mut progress,
                limit,
            )?;
            propagate(&mut table, &mut ready, &mut progress);
            if table.all_required_grounded() {
                break;
            }

            if !progress {
                return Err(SolverError::Unsatisfiable(table.orphans()));
            }
        }

        debug!(
            "search grounded {} goals ({} required) with {} disjuncts",
            table.words.len(),
            table.required,
            table.disjuncts.len()
        );
        emit_plan(self.registry, &table)
    }

    fn terminal_sweep(
        &self,
        rules: &RuleSet,
        rest: &Term,
        table: &mut Table,
        fired: &mut HashSet<RuleId>,
        ready: &mut VecDeque<usize>,
        progress: &mut bool,
    ) -> Result<(), SolverError> {
        for i in 0..table.words.len() {
            if table.grounded[i] {
                continue;
            }
            let word = table.words[i].clone();
            for rule in &rules.unary_terminals {
                if let Some(bindings) =
                    try_match(&rule.outputs, std::slice::from_ref(&word))?
                {
                    table.add_disjunct(rule, bindings, vec![i], Vec::new(), Vec::new());
                    table.ground(i, ready, progress);
                    break;
                }
            }
        }
        for rule in &rules.wide_terminals {
            if fired.contains(&rule.id) {
                continue;
            }
            if let Some((bindings, outputs)) = self.match_wide(rule, rest, table)? {
                fired.insert(rule.id);
                table.add_disjunct(rule, bindings, outputs.clone(), Vec::new(), Vec::new());
                for goal in outputs {
                    table.ground(goal, ready, progress);
                }
            }
        }
        Ok(())
    }

    /// Match a multi-output rule against the whole goal list through the
    /// implicit catch-all, so it fires only when every expanded output is a
    /// requested goal.
    fn match_wide(
        &self,
        rule: &Rule,
        rest: &Term,
        table: &Table,
    ) -> Result<Option<(Bindings, Vec<usize>)>, SolverError> {
        let mut pattern = rule.outputs.clone();
        pattern.push(rest.clone());
        let mut bindings = match try_match(&pattern, &table.words)? {
            Some(bindings) => bindings,
            None => return Ok(None),
        };
        bindings.remove(REST_VAR);
        let out_words = expander::expand(&bindings, &rule.outputs);
        let mut outputs = Vec::new();
        for word in &out_words {
            match table.index.get(word) {
                Some(&goal) => {
                    if !outputs.contains(&goal) {
                        outputs.push(goal);
                    }
                }
                // An output that no goal requested: the rule does not fire.
                None => return Ok(None),
            }
        }
        if outputs.is_empty() {
            return Ok(None);
        }
        Ok(Some((bindings, outputs)))
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_goals(
        &self,
        rules: &RuleSet,
        rest: &Term,
        table: &mut Table,
        fired: &mut HashSet<RuleId>,
        ready: &mut VecDeque<usize>,
        progress: &mut bool,
        limit: usize,
    ) -> Result<(), SolverError> {
        let mut i = 0;
        while i < table.words.len() {
            // Expansion introduces goals while this pass walks them, so the
            // size bound has to be enforced here as well.
            if table.words.len() > limit {
                return Err(SolverError::BoundExceeded { limit });
            }
            if table.grounded[i] {
                i += 1;
                continue;
            }
            loop {
                let end = if table.tainted[i] {
                    rules.plain_len
                } else {
                    rules.nonterminals.len()
                };
                if table.cursor[i] >= end {
                    break;
                }
                let rule = rules.nonterminals[table.cursor[i]];
                table.cursor[i] += 1;

                if rule.is_unary() {
                    let word = table.words[i].clone();
                    let bindings =
                        match try_match(&rule.outputs, std::slice::from_ref(&word))? {
                            Some(bindings) => bindings,
                            None => continue,
                        };
                    let taint = table.tainted[i] || rule.is_everything();
                    let input_words = expander::expand(&bindings, &rule.inputs);
                    let deps = unify_deps(table, &input_words, taint);
                    let id = table.add_disjunct(rule, bindings, vec![i], deps, input_words);
                    *progress = true;
                    if table.disjuncts[id].deps.iter().all(|&q| table.grounded[q]) {
                        table.ground(i, ready, progress);
                    }
                } else {
                    if fired.contains(&rule.id) {
                        continue;
                    }
                    let (bindings, outputs) = match self.match_wide(rule, rest, table)? {
                        Some(found) => found,
                        None => continue,
                    };
                    fired.insert(rule.id);
                    let taint = outputs.iter().any(|&g| table.tainted[g]) || rule.is_everything();
                    let input_words = expander::expand(&bindings, &rule.inputs);
                    let deps = unify_deps(table, &input_words, taint);
                    let id =
                        table.add_disjunct(rule, bindings, outputs.clone(), deps, input_words);
                    *progress = true;
                    if table.disjuncts[id].deps.iter().all(|&q| table.grounded[q]) {
                        for goal in outputs {
                            table.ground(goal, ready, progress);
                        }
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }
}

fn unify_deps(table: &mut Table, input_words: &[Word], taint: bool) -> Vec<usize> {
    let mut deps = Vec::new();
    for word in input_words {
        let goal = table.intern(word, taint);
        if !deps.contains(&goal) {
            deps.push(goal);
        }
    }
    deps
}

/// Worklist propagation: a parent grounds as soon as any of its disjuncts
/// has every dependency grounded.
fn propagate(table: &mut Table, ready: &mut VecDeque<usize>, progress: &mut bool) {
    while let Some(goal) = ready.pop_front() {
        let parents = table.parents[goal].clone();
        for parent in parents {
            if !table.grounded[parent] && table.satisfied(parent) {
                table.ground(parent, ready, progress);
            }
        }
    }
}

/// Pick one disjunct per goal (terminal preferred, else the earliest added
/// whose dependencies are grounded) and emit the selected firings in
/// topological order.
fn emit_plan(registry: &Registry, table: &Table) -> Result<Plan, SolverError> {
    const UNVISITED: u8 = 0;
    const VISITING: u8 = 1;
    const DONE: u8 = 2;

    let mut chosen: Vec<Option<usize>> = vec![None; table.words.len()];
    let mut state = vec![UNVISITED; table.words.len()];
    let mut step_of: HashMap<usize, usize> = HashMap::new();
    let mut steps: Vec<PlanStep> = Vec::new();

    let choose = |goal: usize| -> Result<usize, SolverError> {
        let alts = &table.alts[goal];
        if let Some(&d) = alts.iter().find(|&&d| table.disjuncts[d].terminal) {
            return Ok(d);
        }
        alts.iter()
            .copied()
            .find(|&d| table.disjuncts[d].deps.iter().all(|&q| table.grounded[q]))
            .ok_or_else(|| {
                SolverError::Internal(format!(
                    "grounded goal {:?} has no satisfied derivation",
                    table.words[goal]
                ))
            })
    };

    for root in 0..table.required {
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(&(goal, pos)) = stack.last() {
            if state[goal] == DONE {
                stack.pop();
                continue;
            }
            state[goal] = VISITING;
            let d = match chosen[goal] {
                Some(d) => d,
                None => {
                    let d = choose(goal)?;
                    chosen[goal] = Some(d);
                    d
                }
            };
            let deps = &table.disjuncts[d].deps;
            if pos < deps.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let next = deps[pos];
                match state[next] {
                    DONE => {}
                    VISITING => {
                        return Err(SolverError::Internal(format!(
                            "cycle through goal {:?} in selected derivations",
                            table.words[next]
                        )))
                    }
                    _ => stack.push((next, 0)),
                }
            } else {
                if !step_of.contains_key(&d) {
                    let disjunct = &table.disjuncts[d];
                    let mut dep_steps: Vec<usize> = disjunct
                        .deps
                        .iter()
                        .map(|&q| {
                            chosen[q]
                                .and_then(|dq| step_of.get(&dq).copied())
                                .ok_or_else(|| {
                                    SolverError::Internal(
                                        "dependency emitted out of order".to_string(),
                                    )
                                })
                        })
                        .collect::<Result<_, _>>()?;
                    dep_steps.sort_unstable();
                    dep_steps.dedup();
                    let index = steps.len();
                    steps.push(PlanStep {
                        rule: disjunct.rule,
                        bindings: disjunct.bindings.clone(),
                        outputs: disjunct
                            .outputs
                            .iter()
                            .map(|&g| table.words[g].clone())
                            .collect(),
                        inputs: disjunct.input_words.clone(),
                        command: registry.rule(disjunct.rule).command.clone(),
                        deps: dep_steps,
                    });
                    step_of.insert(d, index);
                }
                state[goal] = DONE;
                stack.pop();
            }
        }
    }

    Ok(Plan { steps })
}
