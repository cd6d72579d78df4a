// overrides.rs — Partial override documents and their application.
//
// Overrides arrive as partial JSON objects. Parsing is tolerant of
// unknown fields (forward compatibility), but a present-yet-incomplete
// document is rejected: validation runs before anything is applied, so a
// bad document rejects the whole request and the target config is never
// half-mutated.

use serde::{Deserialize, Deserializer};

use warden_policy::domain::CompiledRegex;
use warden_policy::{source_for, Enforcement, MetaGatePolicy, PolicyConfig};

use crate::effective::{
    Architecture, CacheToolResults, ClearSessionMeta, EffectiveConfig, ProgramSupport,
    ReportOptions,
};
use crate::error::ConfigError;

/// Feature override: may replace the agent architecture wholesale.
#[derive(Debug, Deserialize)]
pub struct FeatureOverride {
    /// Required — a feature document that names no architecture is
    /// incomplete.
    pub architecture: Option<Architecture>,
    #[serde(default)]
    pub program_support: Option<ProgramSupport>,
}

impl FeatureOverride {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let doc: FeatureOverride = serde_json::from_str(raw)
            .map_err(|e| ConfigError::validation("feature", "(document)", e.to_string()))?;
        if doc.architecture.is_none() {
            return Err(ConfigError::validation(
                "feature",
                "architecture",
                "missing required field",
            ));
        }
        Ok(doc)
    }

    pub fn apply(&self, config: &mut EffectiveConfig) {
        let Some(architecture) = self.architecture else {
            return;
        };
        if architecture != config.architecture {
            config.architecture = architecture;
            // Cascading default: a single-model architecture has no
            // separate quarantined model — it collapses onto the planner.
            if architecture == Architecture::SingleModel {
                config.quarantined_model = config.planner_model.clone();
            }
        }
        if let Some(program_support) = self.program_support {
            config.program_support = program_support;
        }
    }
}

/// Policy override: replaces the compiled policy and its presets.
#[derive(Debug, Deserialize)]
pub struct PolicyOverride {
    /// Required.
    pub language: Option<String>,
    /// Required. A single source or a list joined in order.
    pub code: Option<PolicyCode>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
    #[serde(default)]
    pub default_allow: Option<bool>,
    #[serde(default)]
    pub default_allow_level: Option<Enforcement>,
    #[serde(default)]
    pub branching_meta_policy: Option<MetaGatePolicy>,
    #[serde(default)]
    pub extract_input_meta_policy: Option<MetaGatePolicy>,
    #[serde(default)]
    pub non_executable_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PolicyCode {
    One(String),
    Many(Vec<String>),
}

impl PolicyCode {
    fn joined(&self) -> String {
        match self {
            PolicyCode::One(code) => code.clone(),
            PolicyCode::Many(codes) => codes.join("\n"),
        }
    }
}

impl PolicyOverride {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let doc: PolicyOverride = serde_json::from_str(raw)
            .map_err(|e| ConfigError::validation("policy", "(document)", e.to_string()))?;
        if doc.language.is_none() {
            return Err(ConfigError::validation(
                "policy",
                "language",
                "missing required field",
            ));
        }
        if doc.code.is_none() {
            return Err(ConfigError::validation(
                "policy",
                "code",
                "missing required field",
            ));
        }
        Ok(doc)
    }

    pub fn apply(
        &self,
        config: &mut EffectiveConfig,
        registered_tools: Option<&[String]>,
    ) -> Result<(), ConfigError> {
        let (Some(language), Some(code)) = (self.language.as_deref(), self.code.as_ref()) else {
            return Err(ConfigError::validation(
                "policy",
                "language",
                "missing required field",
            ));
        };
        let code = code.joined();

        let source = source_for(language)?;
        let rules = source.compile(&code, registered_tools)?;

        // Presets carry over from the current config unless overridden.
        let mut presets = config.policy.presets.clone();
        if let Some(default_allow) = self.default_allow {
            presets.default_allow = default_allow;
        }
        if let Some(level) = self.default_allow_level {
            presets.default_allow_level = level;
        }
        if let Some(gate) = &self.branching_meta_policy {
            presets.branching_meta_policy = gate.clone();
        }
        if let Some(gate) = &self.extract_input_meta_policy {
            presets.extract_input_meta_policy = gate.clone();
        }
        if let Some(tag) = &self.non_executable_tag {
            presets.non_executable_tag = Some(tag.clone());
        }

        let fail_fast = self.fail_fast.unwrap_or(config.policy.fail_fast);
        config.policy = PolicyConfig::from_rules(rules, fail_fast, presets);
        config.policy_language = language.to_string();
        Ok(())
    }
}

/// Fine-grained override: every knob optional, `null` meaning "unset"
/// where the underlying field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FineGrainedOverride {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Absent = keep; `null` = unlimited; number = limit.
    #[serde(default, deserialize_with = "present_field")]
    pub max_tool_calls_per_attempt: Option<Option<u32>>,
    #[serde(default, deserialize_with = "present_field")]
    pub max_turns: Option<Option<u32>>,
    #[serde(default)]
    pub session_ttl_secs: Option<i64>,
    #[serde(default)]
    pub clear_session_meta: Option<ClearSessionMeta>,
    #[serde(default)]
    pub retry_on_policy_violation: Option<bool>,
    #[serde(default)]
    pub prune_failed_attempts: Option<bool>,
    #[serde(default)]
    pub cache_tool_results: Option<CacheToolResults>,
    #[serde(default)]
    pub force_cache: Option<Vec<String>>,
    #[serde(default)]
    pub program_support: Option<ProgramSupport>,
    #[serde(default)]
    pub report: Option<ReportOptions>,
}

/// Distinguish a present-but-null field (`Some(None)`, meaning "unset the
/// limit") from an absent one (`None`, meaning "keep"). Serde's stock
/// `Option<Option<T>>` collapses null to the outer `None`.
fn present_field<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl FineGrainedOverride {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let doc: FineGrainedOverride = serde_json::from_str(raw)
            .map_err(|e| ConfigError::validation("fine_grained", "(document)", e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::validation(
                "fine_grained",
                "max_attempts",
                "must be at least 1",
            ));
        }
        if self.max_tool_calls_per_attempt == Some(Some(0)) {
            return Err(ConfigError::validation(
                "fine_grained",
                "max_tool_calls_per_attempt",
                "must be at least 1 (use null for unlimited)",
            ));
        }
        if self.max_turns == Some(Some(0)) {
            return Err(ConfigError::validation(
                "fine_grained",
                "max_turns",
                "must be at least 1 (use null for unlimited)",
            ));
        }
        if matches!(self.session_ttl_secs, Some(ttl) if ttl < 1) {
            return Err(ConfigError::validation(
                "fine_grained",
                "session_ttl_secs",
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn apply(&self, config: &mut EffectiveConfig) -> Result<(), ConfigError> {
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(limit) = self.max_tool_calls_per_attempt {
            config.max_tool_calls_per_attempt = limit;
        }
        if let Some(turns) = self.max_turns {
            config.max_turns = turns;
        }
        if let Some(ttl) = self.session_ttl_secs {
            config.session_ttl_secs = ttl;
        }
        if let Some(clear) = self.clear_session_meta {
            config.clear_session_meta = clear;
        }
        if let Some(retry) = self.retry_on_policy_violation {
            config.retry_on_policy_violation = retry;
        }
        if let Some(prune) = self.prune_failed_attempts {
            config.prune_failed_attempts = prune;
        }
        if let Some(cache) = self.cache_tool_results {
            config.cache_tool_results = cache;
        }
        if let Some(patterns) = &self.force_cache {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                compiled.push(CompiledRegex::new(pattern).map_err(|e| {
                    ConfigError::validation("fine_grained", "force_cache", e.to_string())
                })?);
            }
            config.force_cache_patterns = compiled;
        }
        if let Some(program_support) = self.program_support {
            config.program_support = program_support;
        }
        if let Some(report) = self.report {
            config.report = report;
        }
        Ok(())
    }
}
