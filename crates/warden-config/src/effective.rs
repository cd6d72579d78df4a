// effective.rs — The effective per-request configuration.
//
// An EffectiveConfig is built fresh for every request by the resolver.
// It owns all of its data (no shared substructure with the preset it was
// copied from), so `Clone` is the deep copy the resolver relies on and
// nothing a request does can leak into the shared presets.

use serde::{Deserialize, Serialize};

use warden_policy::domain::CompiledRegex;
use warden_policy::PolicyConfig;

/// Whether requests run through one model or the planner/quarantined pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    SingleModel,
    DualModel,
}

impl Default for Architecture {
    fn default() -> Self {
        Architecture::DualModel
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::SingleModel => write!(f, "single_model"),
            Architecture::DualModel => write!(f, "dual_model"),
        }
    }
}

/// Which processing pipeline the request entered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    Chat,
    Code,
    Agent,
    Graph,
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EndpointType::Chat => "chat",
            EndpointType::Code => "code",
            EndpointType::Agent => "agent",
            EndpointType::Graph => "graph",
        };
        write!(f, "{name}")
    }
}

/// Statement budget tiers for generated programs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramSupport {
    #[default]
    Base,
    Mid,
    Long,
}

impl ProgramSupport {
    /// Maximum statements one attempt may execute.
    pub fn step_budget(self) -> u32 {
        match self {
            ProgramSupport::Base => 256,
            ProgramSupport::Mid => 1024,
            ProgramSupport::Long => 4096,
        }
    }
}

/// When session metadata is cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearSessionMeta {
    #[default]
    Never,
    EveryAttempt,
    EveryTurn,
}

/// Which tool results are eligible for the per-session result cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheToolResults {
    None,
    All,
    #[default]
    DeterministicOnly,
}

/// What the run report includes beyond the final value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOptions {
    #[serde(default)]
    pub include_program: bool,
    #[serde(default)]
    pub include_policy_checks: bool,
    #[serde(default)]
    pub include_namespace: bool,
}

/// The complete configuration one request runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub architecture: Architecture,
    pub planner_model: String,
    pub quarantined_model: String,

    /// Planner attempts per turn before the turn fails.
    pub max_attempts: u32,
    /// Tool calls allowed per attempt; `None` means unlimited.
    pub max_tool_calls_per_attempt: Option<u32>,
    /// Turns allowed per session; `None` means unlimited.
    pub max_turns: Option<u32>,
    /// Idle session lifetime in seconds.
    pub session_ttl_secs: i64,

    pub clear_session_meta: ClearSessionMeta,
    pub retry_on_policy_violation: bool,
    /// Drop failed attempts from the visible history between retries.
    pub prune_failed_attempts: bool,

    pub cache_tool_results: CacheToolResults,
    /// Tool-id patterns whose results are always cached.
    #[serde(default)]
    pub force_cache_patterns: Vec<CompiledRegex>,

    pub program_support: ProgramSupport,
    pub policy: PolicyConfig,
    /// Language tag the policy was compiled from, for reporting.
    pub policy_language: String,
    pub report: ReportOptions,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        EffectiveConfig {
            architecture: Architecture::DualModel,
            planner_model: String::new(),
            quarantined_model: String::new(),
            max_attempts: 4,
            max_tool_calls_per_attempt: Some(200),
            max_turns: Some(1),
            session_ttl_secs: 3600,
            clear_session_meta: ClearSessionMeta::default(),
            retry_on_policy_violation: false,
            prune_failed_attempts: true,
            cache_tool_results: CacheToolResults::default(),
            force_cache_patterns: Vec::new(),
            program_support: ProgramSupport::default(),
            policy: PolicyConfig::default(),
            policy_language: "sift".to_string(),
            report: ReportOptions::default(),
        }
    }
}

impl EffectiveConfig {
    /// Whether a tool id matches a force-cache pattern.
    pub fn force_cached(&self, tool_id: &str) -> bool {
        self.force_cache_patterns.iter().any(|p| p.is_match(tool_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_tiers() {
        assert_eq!(ProgramSupport::Base.step_budget(), 256);
        assert_eq!(ProgramSupport::Mid.step_budget(), 1024);
        assert_eq!(ProgramSupport::Long.step_budget(), 4096);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EffectiveConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.max_tool_calls_per_attempt, Some(200));
        assert_eq!(config.max_turns, Some(1));
        assert_eq!(config.cache_tool_results, CacheToolResults::DeterministicOnly);
        assert!(!config.retry_on_policy_violation);
        assert!(config.prune_failed_attempts);
    }

    #[test]
    fn force_cache_patterns_match() {
        let mut config = EffectiveConfig::default();
        config
            .force_cache_patterns
            .push(CompiledRegex::new("^lookup_.*").unwrap());
        assert!(config.force_cached("lookup_user"));
        assert!(!config.force_cached("send_email"));
    }

    #[test]
    fn effective_config_serde_round_trip() {
        let config = EffectiveConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EffectiveConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
