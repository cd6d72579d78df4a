// model.rs — Seams to the external planner and quarantined models.
//
// Both models are external collaborators: the planner generates programs
// (structurally constrained but untrusted), and the quarantined model
// extracts plain values from untrusted data with no tool access. Neither
// is implemented here — callers supply them.

use warden_session::StepRecord;

use crate::error::ToolError;
use crate::program::Program;

/// What the planner produced for one attempt.
#[derive(Debug, Clone)]
pub enum PlannerTurn {
    /// A candidate program to validate and execute.
    Program(Program),
    /// The planner is done; this is the final answer.
    Finish(serde_json::Value),
}

/// What the planner sees when asked to plan.
#[derive(Debug)]
pub struct PlanContext<'a> {
    /// The trusted user query for this turn.
    pub query: &'a str,
    /// 1-based attempt number within the turn.
    pub attempt: u32,
    /// Visible step history (possibly pruned between attempts).
    pub history: &'a [StepRecord],
    /// Why the previous attempt failed, if it did.
    pub last_failure: Option<&'a str>,
}

/// The planning model: trusted query in, candidate program out.
pub trait Planner {
    fn plan(&mut self, ctx: &PlanContext) -> Result<PlannerTurn, ToolError>;
}

/// The quarantined model: untrusted data plus an extraction instruction
/// in, a plain value out. No tool-calling capability; its output only
/// re-enters the program as a metadata-tagged value.
pub trait QuarantinedModel: Send + Sync {
    fn extract(
        &self,
        data: &serde_json::Value,
        instruction: &str,
    ) -> Result<serde_json::Value, ToolError>;
}

/// A scripted planner that replays a fixed sequence of turns. Used by
/// tests and the offline CLI runner.
pub struct ScriptedPlanner {
    turns: std::vec::IntoIter<PlannerTurn>,
}

impl ScriptedPlanner {
    pub fn new(turns: Vec<PlannerTurn>) -> Self {
        ScriptedPlanner {
            turns: turns.into_iter(),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&mut self, _ctx: &PlanContext) -> Result<PlannerTurn, ToolError> {
        self.turns
            .next()
            .ok_or_else(|| ToolError::new("planner", "scripted planner ran out of turns"))
    }
}
