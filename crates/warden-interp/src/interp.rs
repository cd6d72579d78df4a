// interp.rs — The statement-by-statement program interpreter.
//
// Per statement the machine moves through:
//   Ready → EvaluatingExpr → (ToolCallPending → PolicyCheck →
//   {Executing, Denied}) → Bound → Ready
// until the program completes, fails, or a policy violation aborts the
// attempt program-wide.
//
// Ordering around one tool call:
// 1. `session before` updates apply (and are snapshotted);
// 2. check rules evaluate against argument metadata and the UPDATED
//    session metadata — session rules that count calls gate correctly;
// 3. a deny aborts the attempt but keeps the `session before` effects
//    (denied attempts still advance session counters);
// 4. on allow the tool runs (or the cache answers — a hit bypasses
//    execution, never the policy evaluation that precedes it);
// 5. a tool failure rolls the `session before` effects back — the
//    before/after pair is transactional and must not partially apply —
//    and binds an error value so the program can continue;
// 6. on success `result` and `session after` rules run before the bound
//    variable becomes visible.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_config::{CacheToolResults, EffectiveConfig};
use warden_meta::{Metadata, Value};
use warden_policy::{
    apply_result_updates, apply_session_updates, check_call, CallContext, Decision, UpdatePhase,
};
use warden_session::{SessionState, StepRecord};

use crate::cache::cache_key;
use crate::error::{InterpError, PartialResult};
use crate::model::QuarantinedModel;
use crate::program::{Expr, Program, Statement};
use crate::tool::ToolRegistry;

/// Producer recorded on quarantined-model outputs.
pub const QUARANTINED_PRODUCER: &str = "quarantined-model";

/// Tag attached to values that stand in for failed tool calls.
pub const TOOL_ERROR_TAG: &str = "tool:error";

/// Where the machine is within the current statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPhase {
    Ready,
    EvaluatingExpr,
    ToolCallPending,
    PolicyCheck,
    Executing,
    Denied,
    Bound,
}

/// One policy-checked tool call, for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheckRecord {
    pub tool: String,
    pub decision: Decision,
    /// Whether the result came from the session cache.
    pub cached: bool,
}

/// The outcome of executing one program.
#[derive(Debug)]
pub struct AttemptRun {
    /// The returned value, if the program reached a `return`.
    pub value: Option<Value>,
    /// Final variable bindings.
    pub namespace: BTreeMap<String, Value>,
    pub policy_checks: Vec<PolicyCheckRecord>,
}

/// Executes one validated program against one locked session.
pub struct Interpreter<'a> {
    config: &'a EffectiveConfig,
    registry: &'a ToolRegistry,
    quarantined: Option<&'a dyn QuarantinedModel>,
    session: &'a mut SessionState,
    attempt_id: Uuid,
    namespace: BTreeMap<String, Value>,
    policy_checks: Vec<PolicyCheckRecord>,
    steps_used: u32,
    tool_calls: u32,
    statement_index: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        config: &'a EffectiveConfig,
        registry: &'a ToolRegistry,
        quarantined: Option<&'a dyn QuarantinedModel>,
        session: &'a mut SessionState,
        attempt_id: Uuid,
    ) -> Self {
        Interpreter {
            config,
            registry,
            quarantined,
            session,
            attempt_id,
            namespace: BTreeMap::new(),
            policy_checks: Vec::new(),
            steps_used: 0,
            tool_calls: 0,
            statement_index: 0,
        }
    }

    /// Validate and run a program to completion.
    pub fn run(mut self, program: &Program) -> Result<AttemptRun, InterpError> {
        program.validate(&self.registry.names())?;
        let value = self.exec_block(&program.statements)?;
        Ok(AttemptRun {
            value,
            namespace: self.namespace,
            policy_checks: self.policy_checks,
        })
    }

    /// Execute statements in order; `Some(value)` means a `return` fired.
    fn exec_block(&mut self, statements: &[Statement]) -> Result<Option<Value>, InterpError> {
        for statement in statements {
            if let Some(value) = self.exec_statement(statement)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn exec_statement(&mut self, statement: &Statement) -> Result<Option<Value>, InterpError> {
        self.statement_index += 1;
        self.steps_used += 1;
        let budget = self.config.program_support.step_budget();
        if self.steps_used > budget {
            return Err(InterpError::StepBudgetExhausted { budget });
        }

        self.trace_phase(StatementPhase::Ready);
        match statement {
            Statement::Let { var, expr } => {
                self.trace_phase(StatementPhase::EvaluatingExpr);
                let value = self.eval_expr(expr)?;
                self.trace_phase(StatementPhase::Bound);
                self.namespace.insert(var.clone(), value);
                Ok(None)
            }
            Statement::Return { expr } => {
                self.trace_phase(StatementPhase::EvaluatingExpr);
                let value = self.eval_expr(expr)?;
                Ok(Some(value))
            }
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                self.trace_phase(StatementPhase::EvaluatingExpr);
                let statement = self.statement_index;
                let condition = self.eval_expr(condition)?;

                // The interception point is the conditional itself:
                // branching on gated metadata leaks through control flow,
                // whatever the branch bodies would do.
                if self
                    .config
                    .policy
                    .presets
                    .branching_meta_policy
                    .blocks(&condition.meta)
                {
                    self.trace_phase(StatementPhase::Denied);
                    return Err(InterpError::BranchingViolation { statement });
                }

                if truthy(&condition.raw) {
                    self.exec_block(then)
                } else {
                    self.exec_block(otherwise)
                }
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, InterpError> {
        match expr {
            Expr::Lit { value } => Ok(Value::new(value.clone())),
            Expr::Var { name } => self
                .namespace
                .get(name)
                .cloned()
                .ok_or_else(|| InterpError::Validation(format!("variable '{name}' is unbound"))),
            Expr::List { items } => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                let raw = serde_json::Value::Array(values.iter().map(|v| v.raw.clone()).collect());
                Ok(Value::derived(raw, values.iter()))
            }
            Expr::Object { entries } => {
                let mut values = Vec::with_capacity(entries.len());
                let mut map = serde_json::Map::new();
                for (key, value_expr) in entries {
                    let value = self.eval_expr(value_expr)?;
                    map.insert(key.clone(), value.raw.clone());
                    values.push(value);
                }
                Ok(Value::derived(serde_json::Value::Object(map), values.iter()))
            }
            Expr::Call { tool, args } => self.eval_call(tool, args),
            Expr::Extract { data, instruction } => self.eval_extract(data, instruction),
        }
    }

    fn eval_call(&mut self, tool: &str, args: &[(String, Expr)]) -> Result<Value, InterpError> {
        self.trace_phase(StatementPhase::ToolCallPending);

        let mut arg_values: BTreeMap<String, Value> = BTreeMap::new();
        for (name, expr) in args {
            let value = self.eval_expr(expr)?;
            arg_values.insert(name.clone(), value);
        }

        self.tool_calls += 1;
        if let Some(limit) = self.config.max_tool_calls_per_attempt {
            if self.tool_calls > limit {
                return Err(InterpError::ToolCallLimit { limit });
            }
        }

        let (descriptor, executor) = self
            .registry
            .get(tool)
            .ok_or_else(|| InterpError::Validation(format!("tool '{tool}' is not registered")))?;
        let (descriptor, executor) = (descriptor.clone(), executor.clone());

        // `session before` updates run first; the check sees their
        // effects. Snapshot for the transactional rollback path.
        let before_snapshot = self.session.session_meta.clone();
        self.session.session_meta = apply_session_updates(
            &self.config.policy,
            UpdatePhase::SessionBefore,
            tool,
            &arg_values,
            &self.session.session_meta,
            None,
        )?;

        self.trace_phase(StatementPhase::PolicyCheck);
        let decision = check_call(
            &self.config.policy,
            &CallContext {
                tool_id: tool,
                args: &arg_values,
                session_meta: &self.session.session_meta,
                result: None,
            },
        )?;

        if !decision.allowed() {
            // Denials keep the `session before` effects: session rules
            // that count attempts must advance even on denied calls.
            self.trace_phase(StatementPhase::Denied);
            self.record_step(tool, &decision, false);
            let rule = decision
                .deciding_rule
                .clone()
                .unwrap_or_else(|| "default policy".to_string());
            tracing::info!(tool, rule = %rule, "tool call denied");
            return Err(InterpError::PolicyViolation {
                rule,
                tool: tool.to_string(),
                enforcement: decision.enforcement,
                partial: self
                    .namespace
                    .iter()
                    .map(|(var, value)| PartialResult {
                        var: var.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            });
        }

        let raw_args = serde_json::Value::Object(
            arg_values
                .iter()
                .map(|(k, v)| (k.clone(), v.raw.clone()))
                .collect(),
        );

        // Cache lookup. A hit bypasses execution only — the policy check
        // above and the update rules below still ran and still run.
        let cacheable = match self.config.cache_tool_results {
            CacheToolResults::All => true,
            CacheToolResults::DeterministicOnly => descriptor.deterministic,
            CacheToolResults::None => false,
        } || self.config.force_cached(tool);
        let key = cache_key(tool, &raw_args);
        let cache_hit = if cacheable {
            self.session.tool_cache.get(&key).cloned()
        } else {
            None
        };

        let (raw_result, cached) = match cache_hit {
            Some(raw) => (raw, true),
            None => {
                self.trace_phase(StatementPhase::Executing);
                match executor.call(tool, &raw_args) {
                    Ok(raw) => {
                        if cacheable {
                            self.session.tool_cache.insert(key, raw.clone());
                        }
                        (raw, false)
                    }
                    Err(tool_error) => {
                        // Roll back the paired `session before` effects
                        // and report the failure as a failed step; the
                        // program continues with an error value bound.
                        self.session.session_meta = before_snapshot;
                        self.record_step(tool, &decision, false);
                        tracing::warn!(tool, error = %tool_error, "tool execution failed");
                        let mut meta =
                            Metadata::merge_all(arg_values.values().map(|v| &v.meta));
                        meta.tags.insert(TOOL_ERROR_TAG.to_string());
                        return Ok(Value::with_meta(
                            serde_json::json!({ "error": tool_error.to_string() }),
                            meta,
                        ));
                    }
                }
            }
        };

        // Wrap the raw result: computed metadata from the arguments,
        // combined with the tool's declared override.
        let auto = Metadata::merge_all(arg_values.values().map(|v| &v.meta));
        let mut wrapped = Value::wrap(
            raw_result,
            descriptor.explicit_meta.as_ref(),
            descriptor.combine_mode,
            auto,
        );
        if let Some(tag) = &self.config.policy.presets.non_executable_tag {
            wrapped.meta.tags.insert(tag.clone());
        }

        wrapped.meta = apply_result_updates(
            &self.config.policy,
            tool,
            &arg_values,
            &self.session.session_meta,
            &wrapped,
        )?;
        self.session.session_meta = apply_session_updates(
            &self.config.policy,
            UpdatePhase::SessionAfter,
            tool,
            &arg_values,
            &self.session.session_meta,
            Some(&wrapped),
        )?;

        self.record_step(tool, &decision, cached);
        self.policy_checks.push(PolicyCheckRecord {
            tool: tool.to_string(),
            decision,
            cached,
        });
        self.trace_phase(StatementPhase::Bound);
        Ok(wrapped)
    }

    fn eval_extract(&mut self, data: &Expr, instruction: &str) -> Result<Value, InterpError> {
        let statement = self.statement_index;
        let data = self.eval_expr(data)?;

        if self
            .config
            .policy
            .presets
            .extract_input_meta_policy
            .blocks(&data.meta)
        {
            return Err(InterpError::ExtractionBlocked { statement });
        }

        let quarantined = self.quarantined.ok_or(InterpError::NoQuarantinedModel)?;
        let raw = match quarantined.extract(&data.raw, instruction) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(error = %error, "quarantined extraction failed");
                let mut meta = data.meta.clone();
                meta.tags.insert(TOOL_ERROR_TAG.to_string());
                return Ok(Value::with_meta(
                    serde_json::json!({ "error": error.to_string() }),
                    meta,
                ));
            }
        };

        // The extraction result inherits its input's lineage, gains the
        // quarantined producer, and is marked non-executable.
        let mut meta = data.meta.clone();
        meta.producers.insert(QUARANTINED_PRODUCER.to_string());
        if let Some(tag) = &self.config.policy.presets.non_executable_tag {
            meta.tags.insert(tag.clone());
        }
        Ok(Value::with_meta(raw, meta))
    }

    fn record_step(&mut self, tool: &str, decision: &Decision, cached: bool) {
        self.session.record_step(StepRecord {
            step_id: Uuid::new_v4(),
            attempt_id: self.attempt_id,
            tool_id: tool.to_string(),
            verdict: decision.verdict,
            enforcement: decision.enforcement,
            rule: decision.deciding_rule.clone(),
            cached,
            at: Utc::now(),
        });
    }

    fn trace_phase(&self, phase: StatementPhase) {
        tracing::trace!(
            statement = self.statement_index,
            phase = ?phase,
            "interpreter phase"
        );
    }
}

/// Branch-condition truthiness over raw JSON: null, false, zero, empty
/// strings and empty containers are false; everything else is true.
fn truthy(raw: &serde_json::Value) -> bool {
    match raw {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}
