//! A dependency-graph build engine whose rules are equations over a word
//! pattern language.
//!
//! Rules associate a pattern of outputs with a pattern of inputs and an
//! optional command.  Patterns mix literal text with `%name` (singular) and
//! `%@name` (plural) variables; the [`pattern`] module matches patterns over
//! words and expands bindings back into words.  The [`registry`] separates
//! grounded rules (build edges) from ungrounded rules (rewriting equations)
//! and globals (constant bindings).  The [`solver`] turns a requested goal
//! set into an ordered plan of `(rule, bindings)` firings, which the
//! [`engine`] executes through a pluggable content-tracking [`backend`].

pub mod backend;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod registry;
pub mod solver;

pub use engine::{CancelToken, Engine, Params};
pub use error::{Error, Result};
