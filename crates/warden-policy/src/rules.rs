// rules.rs — The compiled rule representation.
//
// Every surface syntax (sift, sift-lite, rulebook) compiles down to the
// types in this file. Tool patterns are compiled once here; call-time
// evaluation only matches, never compiles. The whole configuration
// serializes, and a serialize→deserialize round trip yields identical
// decisions — the evaluator depends on nothing outside these types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use warden_meta::{ConsumerSet, Metadata};

use crate::domain::CompiledRegex;
use crate::error::CompileWarning;
use crate::expr::{MetaField, Predicate, SetExpr};

/// How a rule's tool pattern is matched against a tool id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPattern {
    Literal(String),
    Regex(CompiledRegex),
}

impl ToolPattern {
    pub fn matches(&self, tool_id: &str) -> bool {
        match self {
            ToolPattern::Literal(name) => name == tool_id,
            ToolPattern::Regex(regex) => regex.is_match(tool_id),
        }
    }

    /// The pattern as written in the source.
    pub fn source_text(&self) -> &str {
        match self {
            ToolPattern::Literal(name) => name,
            ToolPattern::Regex(regex) => regex.pattern(),
        }
    }
}

impl std::fmt::Display for ToolPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolPattern::Literal(name) => write!(f, "\"{name}\""),
            ToolPattern::Regex(regex) => write!(f, "r\"{}\"", regex.pattern()),
        }
    }
}

/// Hard rules are irrevocable; soft rules can be overridden by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    Hard,
    Soft,
}

/// What a matched check rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Allow,
    Deny,
}

/// When a meta-update rule runs relative to the tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    /// After the call, rewriting the result's metadata.
    Result,
    /// Before the call, rewriting session metadata. May not reference the
    /// result (enforced at compile time).
    SessionBefore,
    /// After the call, rewriting session metadata. May reference the result.
    SessionAfter,
}

/// How an update combines its computed set with the current field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Assign,
    Union,
    Intersect,
    Diff,
    SymDiff,
}

/// A compiled check rule: allows or denies a matching tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRule {
    /// Display name from the rule's doc comment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub pattern: ToolPattern,
    pub enforcement: Enforcement,
    pub outcome: RuleOutcome,
    /// `None` means `always`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Predicate>,
    #[serde(default)]
    pub priority: i64,
    /// Declaration order; breaks priority ties (earlier wins).
    pub index: usize,
}

impl CheckRule {
    /// Identity used in violation reports: the doc-comment name when
    /// present, otherwise a synthesized pattern+index label.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("rule #{} for tool {}", self.index, self.pattern),
        }
    }
}

/// A compiled metadata-update rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaUpdateRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub pattern: ToolPattern,
    pub phase: UpdatePhase,
    pub field: MetaField,
    pub op: AssignOp,
    pub value: SetExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Predicate>,
    #[serde(default)]
    pub priority: i64,
    pub index: usize,
}

/// Whether a metadata gate admits or blocks by listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// The lists are an allowlist: metadata outside them blocks.
    Allow,
    /// The lists are a denylist: metadata intersecting them blocks.
    Deny,
}

/// A metadata gate guarding a non-tool interception point (conditional
/// branches, quarantined-model inputs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaGatePolicy {
    pub mode: GateMode,
    #[serde(default)]
    pub producers: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub consumers: BTreeSet<String>,
}

impl Default for MetaGatePolicy {
    /// Deny mode with empty lists: nothing blocked.
    fn default() -> Self {
        MetaGatePolicy {
            mode: GateMode::Deny,
            producers: BTreeSet::new(),
            tags: BTreeSet::new(),
            consumers: BTreeSet::new(),
        }
    }
}

impl MetaGatePolicy {
    /// Whether the gate blocks a value carrying `meta`.
    ///
    /// Deny mode: any overlap between the value's metadata and the listed
    /// sets blocks. Allow mode: every producer and tag must appear in the
    /// corresponding list; the consumer check applies only when a consumer
    /// list is configured, and a universal consumer set fails it (an
    /// unrestricted audience cannot satisfy a finite allowlist).
    pub fn blocks(&self, meta: &Metadata) -> bool {
        match self.mode {
            GateMode::Deny => {
                meta.producers.iter().any(|p| self.producers.contains(p))
                    || meta.tags.iter().any(|t| self.tags.contains(t))
                    || !self.consumers.is_empty()
                        && meta
                            .consumers
                            .overlaps(&ConsumerSet::from_names(self.consumers.iter().cloned()))
            }
            GateMode::Allow => {
                let producers_ok = meta.producers.iter().all(|p| self.producers.contains(p));
                let tags_ok = meta.tags.iter().all(|t| self.tags.contains(t));
                let consumers_ok = self.consumers.is_empty()
                    || match meta.consumers.names() {
                        None => false,
                        Some(names) => names.iter().all(|c| self.consumers.contains(c)),
                    };
                !(producers_ok && tags_ok && consumers_ok)
            }
        }
    }
}

/// Preset knobs that apply when no explicit rule decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPresets {
    /// The verdict when no check rule matches a call.
    pub default_allow: bool,
    /// Enforcement level attached to the default verdict.
    pub default_allow_level: Enforcement,
    /// Gate applied to conditional-branch operands.
    #[serde(default)]
    pub branching_meta_policy: MetaGatePolicy,
    /// Gate applied to quarantined-model inputs.
    #[serde(default)]
    pub extract_input_meta_policy: MetaGatePolicy,
    /// Tag injected into every tool result when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_executable_tag: Option<String>,
}

impl Default for PolicyPresets {
    fn default() -> Self {
        PolicyPresets {
            default_allow: true,
            default_allow_level: Enforcement::Soft,
            branching_meta_policy: MetaGatePolicy::default(),
            extract_input_meta_policy: MetaGatePolicy::default(),
            non_executable_tag: None,
        }
    }
}

/// The output of compiling one policy source: rules plus non-fatal
/// warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledRules {
    pub check_rules: Vec<CheckRule>,
    pub update_rules: Vec<MetaUpdateRule>,
    #[serde(default)]
    pub warnings: Vec<CompileWarning>,
}

/// A complete, evaluable policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub check_rules: Vec<CheckRule>,
    pub update_rules: Vec<MetaUpdateRule>,
    /// Stop evaluating further rules after the first hard violation.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub presets: PolicyPresets,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            check_rules: Vec::new(),
            update_rules: Vec::new(),
            fail_fast: false,
            presets: PolicyPresets::default(),
        }
    }
}

impl PolicyConfig {
    /// Assemble a configuration from compiled rules and presets.
    pub fn from_rules(rules: CompiledRules, fail_fast: bool, presets: PolicyPresets) -> Self {
        PolicyConfig {
            check_rules: rules.check_rules,
            update_rules: rules.update_rules,
            fail_fast,
            presets,
        }
    }
}
