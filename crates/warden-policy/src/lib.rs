//! # warden-policy
//!
//! The sift policy language: declarative check rules and metadata-update
//! rules that govern every tool call the Warden interpreter makes.
//!
//! A policy source compiles once — through one of the pluggable
//! [`adapter::PolicySource`] surfaces — into a [`PolicyConfig`] whose tool
//! patterns and string domains are pre-compiled. Call-time work is pure
//! evaluation: [`eval::check_call`] walks the matching check rules and
//! produces a [`eval::Decision`] with the full trail, and the
//! `apply_*_updates` functions rewrite result/session metadata per the
//! matching update rules.
//!
//! ## Key invariants
//!
//! - **No call-time compilation**: regexes, wildcards, and name bindings
//!   are resolved when the policy compiles, never during evaluation.
//! - **Hard beats soft, deny beats allow**: a matched hard deny decides
//!   regardless of priorities; soft rules resolve by priority with
//!   declaration order breaking ties.
//! - **Round-trip stable**: serializing and re-parsing a [`PolicyConfig`]
//!   yields identical decisions over identical inputs.

pub mod adapter;
pub mod ast;
pub mod compile;
pub mod domain;
pub mod error;
pub mod eval;
pub mod expr;
pub mod parser;
pub mod rules;
pub mod token;

pub use adapter::{source_for, PolicySource, RulebookSource, SiftLiteSource, SiftSource};
pub use compile::compile;
pub use error::{CompileWarning, PolicyError};
pub use eval::{
    apply_result_updates, apply_session_updates, check_call, CallContext, CheckStep, Decision,
    Verdict,
};
pub use expr::{MetaField, Predicate, SetExpr};
pub use parser::parse;
pub use rules::{
    AssignOp, CheckRule, CompiledRules, Enforcement, GateMode, MetaGatePolicy, MetaUpdateRule,
    PolicyConfig, PolicyPresets, RuleOutcome, ToolPattern, UpdatePhase,
};
