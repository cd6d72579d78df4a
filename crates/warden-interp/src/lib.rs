//! # warden-interp
//!
//! The policy-enforcing program interpreter.
//!
//! The planner emits a structurally constrained program; the interpreter
//! executes it statement by statement, intercepting every tool call (for
//! check-rule evaluation and metadata updates) and every conditional
//! branch (for the branching metadata gate). Execution is synchronous
//! and cooperative: the only suspension points are the blocking calls
//! into caller-supplied tool executors.
//!
//! ## Key invariants
//!
//! - **Single chokepoint**: there is no way to reach a tool except
//!   through the policy check, and no way to branch except through the
//!   branching gate.
//! - **Cache hits never skip policy**: cached results bypass execution
//!   only; check rules and update rules run either way, against current
//!   session metadata.
//! - **Transactional statements**: a tool failure rolls back the
//!   statement's `session before` effects; a policy denial keeps them
//!   (denied calls still advance session counters).

pub mod cache;
pub mod error;
pub mod interp;
pub mod model;
pub mod program;
pub mod runner;
pub mod tool;

pub use error::{InterpError, PartialResult, ToolError};
pub use interp::{AttemptRun, Interpreter, PolicyCheckRecord, StatementPhase};
pub use model::{PlanContext, Planner, PlannerTurn, QuarantinedModel, ScriptedPlanner};
pub use program::{Expr, Program, Statement};
pub use runner::{ErrorInfo, RunReport, RunStatus, TurnRequest, TurnRunner};
pub use tool::{ToolDescriptor, ToolExecutor, ToolRegistry};
