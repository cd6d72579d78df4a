// error.rs — Error taxonomy for program interpretation.
//
// Recoverability tiers:
// - Validation/config errors terminate the request before execution.
// - PolicyViolation / BranchingViolation / ExtractionBlocked /
//   StepBudgetExhausted abort the current attempt; the runner may retry
//   within the attempt limit.
// - Session errors mean corrupted interpreter state and are fatal.
//
// Branching and extraction violations carry deliberately sanitized
// messages: naming the metadata (or gate contents) that triggered the
// block would leak the very information the gate protects.

use thiserror::Error;

use warden_meta::Value;
use warden_policy::Enforcement;
use warden_session::SessionError;

/// A variable bound before the attempt aborted, surfaced alongside a
/// policy violation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PartialResult {
    pub var: String,
    pub value: Value,
}

/// An external tool failure.
#[derive(Debug, Clone, Error)]
#[error("tool '{tool}' failed: {message}")]
pub struct ToolError {
    pub tool: String,
    pub message: String,
}

impl ToolError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while validating or executing a program.
#[derive(Debug, Error)]
pub enum InterpError {
    /// The submitted program failed structural validation.
    #[error("invalid program: {0}")]
    Validation(String),

    /// A hard (or deciding) deny blocked a tool call; the attempt is
    /// aborted program-wide.
    #[error("policy violation: rule '{rule}' denied tool '{tool}'")]
    PolicyViolation {
        rule: String,
        tool: String,
        enforcement: Enforcement,
        /// Values bound before the abort.
        partial: Vec<PartialResult>,
    },

    /// The branching metadata gate blocked a conditional. The message
    /// names only the statement position.
    #[error("branching policy blocked the conditional at statement {statement}")]
    BranchingViolation { statement: usize },

    /// The extraction gate blocked data from reaching the quarantined
    /// model. Sanitized like [`InterpError::BranchingViolation`].
    #[error("extraction policy blocked the extract at statement {statement}")]
    ExtractionBlocked { statement: usize },

    /// The attempt used up its statement budget.
    #[error("statement budget of {budget} exhausted")]
    StepBudgetExhausted { budget: u32 },

    /// The attempt exceeded its tool-call limit.
    #[error("tool-call limit of {limit} exceeded")]
    ToolCallLimit { limit: u32 },

    /// No quarantined model was supplied but the program used `extract`.
    #[error("program uses extract but no quarantined model is configured")]
    NoQuarantinedModel,

    /// The planner failed to produce a turn.
    #[error("planner error: {0}")]
    Planner(String),

    /// Every allowed attempt failed.
    #[error("turn failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    /// Session lifecycle failure (fatal).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A rule failed to evaluate (fatal for the attempt).
    #[error(transparent)]
    Policy(#[from] warden_policy::PolicyError),
}

impl InterpError {
    /// Whether the runner may retry the turn with a fresh attempt.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            InterpError::StepBudgetExhausted { .. }
                | InterpError::ToolCallLimit { .. }
                | InterpError::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branching_violation_message_is_sanitized() {
        let err = InterpError::BranchingViolation { statement: 3 };
        let msg = err.to_string();
        assert!(msg.contains("statement 3"));
        // No metadata content in the message.
        assert!(!msg.contains("tag"));
        assert!(!msg.contains("producer"));
    }

    #[test]
    fn policy_violation_names_the_rule() {
        let err = InterpError::PolicyViolation {
            rule: "Block known spam recipients".into(),
            tool: "send_email".into(),
            enforcement: Enforcement::Hard,
            partial: vec![],
        };
        assert!(err.to_string().contains("Block known spam recipients"));
        assert!(err.to_string().contains("send_email"));
    }

    #[test]
    fn retryable_classification() {
        assert!(InterpError::StepBudgetExhausted { budget: 10 }.retryable());
        assert!(!InterpError::PolicyViolation {
            rule: "r".into(),
            tool: "t".into(),
            enforcement: Enforcement::Hard,
            partial: vec![],
        }
        .retryable());
    }
}
