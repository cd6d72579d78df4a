// state.rs — Per-session state: counters, metadata, and step history.
//
// A session is the unit of continuity across conversational turns. It
// accumulates metadata (written by `session before/after` policy rules)
// and a step history (every policy decision made on its behalf), and
// counts turns and planner attempts against the configured limits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_config::ClearSessionMeta;
use warden_meta::Metadata;
use warden_policy::{Enforcement, Verdict};

/// One policy-checked step, recorded in the session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: Uuid,
    /// The planner attempt this step belongs to.
    pub attempt_id: Uuid,
    pub tool_id: String,
    pub verdict: Verdict,
    pub enforcement: Enforcement,
    /// Display name of the deciding rule, if a rule (not the default)
    /// decided.
    pub rule: Option<String>,
    /// Whether the result was served from the tool-result cache.
    pub cached: bool,
    pub at: DateTime<Utc>,
}

/// The state of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Completed or in-progress turns.
    pub turn_count: u32,
    /// Planner attempts across all turns.
    pub attempt_count: u32,
    pub session_meta: Metadata,
    pub step_history: Vec<StepRecord>,
    /// Cached raw tool results, keyed by (tool id, canonical argument
    /// JSON). Lives and dies with the session; hits never bypass policy
    /// re-evaluation.
    #[serde(default)]
    pub tool_cache: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        SessionState {
            session_id: session_id.into(),
            turn_count: 0,
            attempt_count: 0,
            session_meta: Metadata::new(),
            step_history: Vec::new(),
            tool_cache: BTreeMap::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Start a new turn, applying the configured metadata-clearing policy.
    pub fn begin_turn(&mut self, clear: ClearSessionMeta) {
        self.turn_count += 1;
        self.last_active_at = Utc::now();
        if clear == ClearSessionMeta::EveryTurn {
            self.session_meta = Metadata::new();
        }
        tracing::debug!(
            session_id = %self.session_id,
            turn = self.turn_count,
            "session turn started"
        );
    }

    /// Start a new planner attempt within the current turn. Returns the
    /// attempt id used to correlate step records.
    pub fn begin_attempt(&mut self, clear: ClearSessionMeta) -> Uuid {
        self.attempt_count += 1;
        self.last_active_at = Utc::now();
        if clear == ClearSessionMeta::EveryAttempt {
            self.session_meta = Metadata::new();
        }
        Uuid::new_v4()
    }

    pub fn record_step(&mut self, step: StepRecord) {
        self.last_active_at = Utc::now();
        self.step_history.push(step);
    }

    /// Drop the recorded steps of one (failed) attempt — token economy
    /// between retries.
    pub fn prune_attempt(&mut self, attempt_id: Uuid) {
        self.step_history.retain(|s| s.attempt_id != attempt_id);
    }

    /// Whether the session has outlived its idle TTL.
    pub fn expired(&self, ttl_secs: i64) -> bool {
        Utc::now() - self.last_active_at > chrono::Duration::seconds(ttl_secs)
    }

    /// Whether another turn may start under the configured limit.
    pub fn turns_remaining(&self, max_turns: Option<u32>) -> bool {
        match max_turns {
            None => true,
            Some(max) => self.turn_count < max,
        }
    }
}
