// runner.rs — Turn lifecycle: attempts, retries, and the run report.
//
// A turn is one user query. The runner checks the session out (holding
// its exclusive lock for the whole turn), asks the planner for a
// program, executes it, and retries with a fresh attempt when the
// failure class and configuration allow. Failed attempts can prune
// their step history before the next attempt.
//
// Denials retry only when `retry_on_policy_violation` is set AND the
// policy is not fail_fast — fail_fast means a violation aborts the whole
// turn, not just the attempt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use warden_config::EffectiveConfig;
use warden_meta::Value;
use warden_session::{SessionError, SessionStore};

use crate::error::InterpError;
use crate::interp::{Interpreter, PolicyCheckRecord};
use crate::model::{PlanContext, Planner, PlannerTurn, QuarantinedModel};
use crate::program::Program;
use crate::tool::ToolRegistry;

/// One turn request.
#[derive(Debug)]
pub struct TurnRequest<'a> {
    /// The trusted user query.
    pub query: &'a str,
    /// Continuation context; `None` starts a fresh session.
    pub session_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Machine-readable failure classification in a run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// What a turn produced. Optional sections follow the configured report
/// options.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub session_id: String,
    /// Attempts consumed (including the successful one).
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<Program>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_checks: Option<Vec<PolicyCheckRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<BTreeMap<String, Value>>,
}

/// Drives turns for one effective configuration.
pub struct TurnRunner<'a> {
    config: &'a EffectiveConfig,
    registry: &'a ToolRegistry,
    quarantined: Option<&'a dyn QuarantinedModel>,
}

impl<'a> TurnRunner<'a> {
    pub fn new(
        config: &'a EffectiveConfig,
        registry: &'a ToolRegistry,
        quarantined: Option<&'a dyn QuarantinedModel>,
    ) -> Self {
        TurnRunner {
            config,
            registry,
            quarantined,
        }
    }

    /// Run one turn against the session store.
    pub fn run_turn(
        &self,
        store: &SessionStore,
        planner: &mut dyn Planner,
        request: &TurnRequest,
    ) -> Result<RunReport, InterpError> {
        let handle = store.checkout_or_create(request.session_id, self.config.session_ttl_secs)?;
        let session_id = handle.session_id().to_string();
        let mut state = handle.lock()?;

        if !state.turns_remaining(self.config.max_turns) {
            let max_turns = self.config.max_turns.unwrap_or(0);
            drop(state);
            store.destroy(&session_id);
            return Err(InterpError::Session(SessionError::TurnsExhausted {
                session_id,
                max_turns,
            }));
        }
        state.begin_turn(self.config.clear_session_meta);

        let mut last_failure: Option<String> = None;
        let mut last_code = "attempts_exhausted".to_string();
        for attempt in 1..=self.config.max_attempts {
            let attempt_id = state.begin_attempt(self.config.clear_session_meta);

            let turn = planner
                .plan(&PlanContext {
                    query: request.query,
                    attempt,
                    history: &state.step_history,
                    last_failure: last_failure.as_deref(),
                })
                .map_err(|e| InterpError::Planner(e.to_string()))?;

            let program = match turn {
                PlannerTurn::Finish(raw) => {
                    return Ok(self.report_success(
                        session_id,
                        attempt,
                        Some(Value::new(raw)),
                        None,
                        Vec::new(),
                        BTreeMap::new(),
                    ));
                }
                PlannerTurn::Program(program) => program,
            };

            let interpreter = Interpreter::new(
                self.config,
                self.registry,
                self.quarantined,
                &mut state,
                attempt_id,
            );
            match interpreter.run(&program) {
                Ok(run) => {
                    return Ok(self.report_success(
                        session_id,
                        attempt,
                        run.value,
                        Some(program),
                        run.policy_checks,
                        run.namespace,
                    ));
                }
                Err(error) => {
                    let retryable = match &error {
                        InterpError::PolicyViolation { .. }
                        | InterpError::BranchingViolation { .. }
                        | InterpError::ExtractionBlocked { .. } => {
                            self.config.retry_on_policy_violation
                                && !self.config.policy.fail_fast
                        }
                        other => other.retryable(),
                    };
                    if self.config.prune_failed_attempts {
                        state.prune_attempt(attempt_id);
                    }
                    tracing::info!(
                        attempt,
                        error = %error,
                        retryable,
                        "attempt failed"
                    );
                    if !retryable {
                        return Ok(self.report_failure(session_id, attempt, &error, program));
                    }
                    last_code = error_code(&error).to_string();
                    last_failure = Some(error.to_string());
                }
            }
        }

        Ok(RunReport {
            status: RunStatus::Failure,
            session_id,
            attempts: self.config.max_attempts,
            final_value: None,
            error: Some(ErrorInfo {
                code: last_code,
                message: format!(
                    "no attempt succeeded within {} attempts: {}",
                    self.config.max_attempts,
                    last_failure.unwrap_or_else(|| "no failure recorded".to_string())
                ),
            }),
            program: None,
            policy_checks: None,
            namespace: None,
        })
    }

    fn report_success(
        &self,
        session_id: String,
        attempts: u32,
        final_value: Option<Value>,
        program: Option<Program>,
        policy_checks: Vec<PolicyCheckRecord>,
        namespace: BTreeMap<String, Value>,
    ) -> RunReport {
        let report = &self.config.report;
        RunReport {
            status: RunStatus::Success,
            session_id,
            attempts,
            final_value,
            error: None,
            program: program.filter(|_| report.include_program),
            policy_checks: report.include_policy_checks.then_some(policy_checks),
            namespace: report.include_namespace.then_some(namespace),
        }
    }

    fn report_failure(
        &self,
        session_id: String,
        attempts: u32,
        error: &InterpError,
        program: Program,
    ) -> RunReport {
        RunReport {
            status: RunStatus::Failure,
            session_id,
            attempts,
            final_value: None,
            error: Some(ErrorInfo {
                code: error_code(error).to_string(),
                message: error.to_string(),
            }),
            program: self.config.report.include_program.then_some(program),
            policy_checks: None,
            namespace: None,
        }
    }
}

fn error_code(error: &InterpError) -> &'static str {
    match error {
        InterpError::PolicyViolation { .. } => "policy_violation",
        InterpError::BranchingViolation { .. } => "branching_policy_violation",
        InterpError::ExtractionBlocked { .. } => "extraction_blocked",
        InterpError::StepBudgetExhausted { .. } => "step_budget_exhausted",
        InterpError::ToolCallLimit { .. } => "tool_call_limit",
        InterpError::Validation(_) => "invalid_program",
        InterpError::NoQuarantinedModel => "no_quarantined_model",
        InterpError::Planner(_) => "planner_error",
        InterpError::AttemptsExhausted { .. } => "attempts_exhausted",
        InterpError::Session(_) => "session_error",
        InterpError::Policy(_) => "policy_error",
    }
}
