//! One rule-graph instance: the registry, the solver entry points, and the
//! plan executor.
//!
//! Multiple independent instances are just multiple `Engine` values; an
//! embedder that wants named instances keeps an outer map.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, info};

use crate::{
    backend::Backend,
    error::Error,
    pattern::{expander, Word},
    registry::Registry,
    solver::{self, Plan, Solver, SolverError},
};

/// Shared flag that aborts a solve after the in-flight iteration and stops
/// the executor from starting new jobs.  Partial solver state is discarded.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct Params {
    /// Concurrency hint forwarded to the backend.  The solver itself is
    /// single-threaded regardless.
    pub jobs: usize,
    /// Base of the solver's goal-table size bound.
    pub search_bound_base: usize,
    /// Exponent applied to the initial goal count in the size bound.
    pub search_bound_exponent: u32,
    /// Rules file consulted and appended to by the CLI.
    pub rules_file: PathBuf,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            jobs: 1,
            search_bound_base: solver::SEARCH_BOUND_BASE,
            search_bound_exponent: solver::SEARCH_BOUND_EXPONENT,
            rules_file: PathBuf::from("Quernfile"),
        }
    }
}

pub struct Engine {
    registry: Registry,
    params: Params,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(params: Params) -> Self {
        Engine {
            registry: Registry::new(),
            params,
            cancel: CancelToken::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Clone of the engine's cancellation token, for another thread to trip.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Dispatch one definition token vector into the registry.
    pub fn define(&mut self, tokens: &[String]) -> Result<(), Error> {
        self.registry.define(tokens)?;
        Ok(())
    }

    /// Register `word` as a terminal grounded rule: it simply exists.
    pub fn define_terminal(&mut self, word: &str) -> Result<(), Error> {
        self.define(&[word.to_string(), ":".to_string()])
    }

    pub fn default_goals(&self) -> &[Word] {
        self.registry.default_goals()
    }

    fn solver(&self) -> Solver<'_> {
        Solver::with_cancel(&self.registry, self.cancel.clone())
            .with_bound(self.params.search_bound_base, self.params.search_bound_exponent)
    }

    /// Expand `words` through the ungrounded rules and return the fixpoint.
    pub fn eval(&self, words: &[Word], backend: &mut dyn Backend) -> Result<Vec<Word>, Error> {
        Ok(self.solver().rewrite(words, backend)?)
    }

    /// Resolve `goals` into a plan without executing anything.
    pub fn solve(&self, goals: &[Word], backend: &mut dyn Backend) -> Result<Plan, Error> {
        Ok(self.solver().solve(goals, backend)?)
    }

    /// Resolve `goals` and execute the plan against the backend.
    pub fn build(&self, goals: &[Word], backend: &mut dyn Backend) -> Result<Plan, Error> {
        let plan = self.solve(goals, backend)?;
        debug!("executing plan:\n{}", plan);
        self.execute(&plan, backend)?;
        Ok(plan)
    }

    /// Walk the plan in order, consulting the backend before each firing.
    ///
    /// Command templates are expanded with the rule bindings plus the
    /// synthetic `in` and `out` word lists.
    fn execute(&self, plan: &Plan, backend: &mut dyn Backend) -> Result<(), Error> {
        for (index, step) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SolverError::Cancelled.into());
            }
            let inputs: Vec<_> = step.inputs.iter().map(|w| backend.fingerprint(w)).collect();
            if backend.is_fresh(step.rule, &step.bindings, &inputs) {
                debug!("#{} {} is fresh, skipping", index, step.rule);
                continue;
            }
            if let Some(template) = &step.command {
                let mut with_io = step.bindings.clone();
                with_io.insert("in", step.inputs.clone());
                with_io.insert("out", step.outputs.clone());
                let command =
                    expander::expand_command(&with_io, template).map_err(SolverError::from)?;
                let status = backend
                    .execute(step.rule, &command, &with_io)
                    .map_err(SolverError::from)?;
                if status != 0 {
                    return Err(SolverError::Command { command, status }.into());
                }
                info!("#{} {} ok", index, step.rule);
            }
            let outputs: Vec<_> = step.outputs.iter().map(|w| backend.fingerprint(w)).collect();
            backend.record_output(step.rule, &step.bindings, &outputs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn engine_with(defs: &[&str]) -> Engine {
        let mut engine = Engine::new(Params::default());
        for def in defs {
            engine.define(&tokens(def)).unwrap();
        }
        engine
    }

    #[test]
    fn build_runs_commands_in_dependency_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let engine = engine_with(&[
            "%bin : %bin.o :: link -o %bin %in",
            "%x.o : %x.c :: cc -c %in",
            "foo.c :",
        ]);
        let mut backend = MemoryBackend::new();
        engine.build(&tokens("foo"), &mut backend).unwrap();
        assert_eq!(
            backend.commands(),
            vec!["cc -c foo.c", "link -o foo foo.o"]
        );
    }

    #[test]
    fn fresh_firings_are_skipped() {
        let engine = engine_with(&["out : src :: generate", "src :"]);
        let mut backend = MemoryBackend::all_fresh();
        engine.build(&tokens("out"), &mut backend).unwrap();
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn failed_grounded_command_aborts_the_plan() {
        let engine = engine_with(&["out : src :: generate out", "src : :: make src"]);
        let mut backend = MemoryBackend::new();
        backend.set_status("make src", 2);
        let err = engine.build(&tokens("out"), &mut backend).unwrap_err();
        assert!(matches!(
            err,
            Error::Solver(SolverError::Command { status: 2, .. })
        ));
        // The dependent command never ran.
        assert_eq!(backend.commands(), vec!["make src"]);
    }

    #[test]
    fn terminal_registration_satisfies_goals() {
        let mut engine = engine_with(&[]);
        engine.define_terminal("exists").unwrap();
        let mut backend = MemoryBackend::new();
        let plan = engine.build(&tokens("exists"), &mut backend).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn eval_runs_ungrounded_rewrites() {
        let engine = engine_with(&["tidy-%x = %x"]);
        let mut backend = MemoryBackend::new();
        let out = engine
            .eval(&tokens("tidy-a b tidy-c"), &mut backend)
            .unwrap();
        assert_eq!(out, tokens("a b c"));
    }

    #[test]
    fn custom_search_bound_is_honored() {
        let params = Params {
            search_bound_base: 2,
            search_bound_exponent: 1,
            ..Params::default()
        };
        let mut engine = Engine::new(params);
        engine.define(&tokens("%x.o : %x.o.o :: widen")).unwrap();
        let mut backend = MemoryBackend::new();
        let err = engine.build(&tokens("foo.o"), &mut backend).unwrap_err();
        assert!(matches!(
            err,
            Error::Solver(SolverError::BoundExceeded { limit: 3 })
        ));
    }

    #[test]
    fn cancellation_stops_the_solve() {
        let engine = engine_with(&["x :"]);
        engine.cancel_token().cancel();
        let mut backend = MemoryBackend::new();
        let err = engine.build(&tokens("x"), &mut backend).unwrap_err();
        assert!(matches!(err, Error::Solver(SolverError::Cancelled)));
    }
}
