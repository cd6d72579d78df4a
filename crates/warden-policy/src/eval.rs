// eval.rs — Call-time evaluation of compiled rules.
//
// Everything here is pure and CPU-bound: rules were compiled ahead of
// time, patterns are pre-compiled, and evaluation only reads the call
// context. Re-evaluating the same rules against the same inputs always
// produces the same decision.
//
// Resolution order for one tool call:
// 1. Collect check rules whose pattern matches the tool id.
// 2. Evaluate each condition against argument and session metadata.
// 3. A matched hard deny decides immediately (fail_fast stops the walk;
//    otherwise the walk continues for trace completeness).
// 4. Otherwise a matched hard allow decides.
// 5. Otherwise matched soft rules resolve by priority (higher wins, ties
//    by declaration order).
// 6. Otherwise the default_allow preset decides, at its configured
//    enforcement level.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use warden_meta::{ConsumerSet, Metadata, Value, UNIVERSAL_MARKER};

use crate::error::PolicyError;
use crate::expr::{MetaField, MetaRef, Predicate, Reduce, SetCmp, SetElement, SetExpr, SetOp};
use crate::rules::{AssignOp, CheckRule, Enforcement, PolicyConfig, RuleOutcome, UpdatePhase};

/// The inputs one tool call exposes to rule evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub tool_id: &'a str,
    /// Named call arguments with their metadata.
    pub args: &'a BTreeMap<String, Value>,
    pub session_meta: &'a Metadata,
    /// The wrapped tool result; absent before the tool runs.
    pub result: Option<&'a Value>,
}

/// The final verdict for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
}

/// One evaluated rule in the decision trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStep {
    pub rule: String,
    pub enforcement: Enforcement,
    pub outcome: RuleOutcome,
    pub matched: bool,
    /// Whether this rule ended evaluation.
    pub terminal: bool,
}

/// The result of policy evaluation for one call, with the full trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub enforcement: Enforcement,
    /// Display name of the deciding rule; `None` when the default preset
    /// decided.
    pub deciding_rule: Option<String>,
    /// Every matching rule evaluated, in order.
    pub steps: Vec<CheckStep>,
    /// Matched soft-deny rules that were overridden — recorded, not fatal.
    pub soft_warnings: Vec<String>,
}

impl Decision {
    pub fn allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// Evaluate all matching check rules for one call.
pub fn check_call(config: &PolicyConfig, ctx: &CallContext) -> Result<Decision, PolicyError> {
    let mut steps = Vec::new();
    let mut hard_deny: Option<&CheckRule> = None;
    let mut hard_allow: Option<&CheckRule> = None;
    let mut soft_matched: Vec<&CheckRule> = Vec::new();

    for rule in &config.check_rules {
        if !rule.pattern.matches(ctx.tool_id) {
            continue;
        }
        let matched = match &rule.condition {
            None => true,
            Some(condition) => eval_pred(condition, ctx)
                .map_err(|e| rule_eval_error(rule, e))?,
        };
        steps.push(CheckStep {
            rule: rule.display_name(),
            enforcement: rule.enforcement,
            outcome: rule.outcome,
            matched,
            terminal: false,
        });
        if !matched {
            continue;
        }
        match (rule.enforcement, rule.outcome) {
            (Enforcement::Hard, RuleOutcome::Deny) => {
                hard_deny.get_or_insert(rule);
                if config.fail_fast {
                    break;
                }
            }
            (Enforcement::Hard, RuleOutcome::Allow) => {
                hard_allow.get_or_insert(rule);
            }
            (Enforcement::Soft, _) => soft_matched.push(rule),
        }
    }

    // A hard deny overrides everything, including hard allows.
    let decided: Option<(&CheckRule, Verdict, Enforcement)> = if let Some(rule) = hard_deny {
        Some((rule, Verdict::Deny, Enforcement::Hard))
    } else if let Some(rule) = hard_allow {
        Some((rule, Verdict::Allow, Enforcement::Hard))
    } else {
        // Soft resolution: highest priority wins, declaration order breaks
        // ties (stable min_by_key on (-priority, index)).
        soft_matched
            .iter()
            .min_by_key(|r| (-r.priority, r.index))
            .map(|rule| {
                let verdict = match rule.outcome {
                    RuleOutcome::Allow => Verdict::Allow,
                    RuleOutcome::Deny => Verdict::Deny,
                };
                (*rule, verdict, Enforcement::Soft)
            })
    };

    let (verdict, enforcement, deciding_rule) = match decided {
        Some((rule, verdict, enforcement)) => {
            let name = rule.display_name();
            if let Some(step) = steps.iter_mut().rev().find(|s| s.rule == name && s.matched) {
                step.terminal = true;
            }
            (verdict, enforcement, Some(name))
        }
        None => {
            let verdict = if config.presets.default_allow {
                Verdict::Allow
            } else {
                Verdict::Deny
            };
            (verdict, config.presets.default_allow_level, None)
        }
    };

    // Matched soft denies that were overridden are recorded, not fatal.
    let soft_warnings: Vec<String> = if verdict == Verdict::Allow {
        soft_matched
            .iter()
            .filter(|r| r.outcome == RuleOutcome::Deny)
            .map(|r| r.display_name())
            .collect()
    } else {
        Vec::new()
    };

    Ok(Decision {
        verdict,
        enforcement,
        deciding_rule,
        steps,
        soft_warnings,
    })
}

/// Apply the `result` update rules for a call, producing the result's
/// final metadata. Rules apply in declaration order; each sees the
/// effects of the previous ones.
pub fn apply_result_updates(
    config: &PolicyConfig,
    tool_id: &str,
    args: &BTreeMap<String, Value>,
    session_meta: &Metadata,
    result: &Value,
) -> Result<Metadata, PolicyError> {
    let mut working = result.clone();
    for rule in &config.update_rules {
        if rule.phase != UpdatePhase::Result || !rule.pattern.matches(tool_id) {
            continue;
        }
        let ctx = CallContext {
            tool_id,
            args,
            session_meta,
            result: Some(&working),
        };
        let applies = match &rule.condition {
            None => true,
            Some(condition) => {
                eval_pred(condition, &ctx).map_err(|e| update_eval_error(rule, e))?
            }
        };
        if !applies {
            continue;
        }
        let value = eval_set(&rule.value, &ctx).map_err(|e| update_eval_error(rule, e))?;
        apply_field(&mut working.meta, rule.field, rule.op, value);
    }
    Ok(working.meta)
}

/// Apply `session before` or `session after` update rules, producing the
/// session's new metadata.
pub fn apply_session_updates(
    config: &PolicyConfig,
    phase: UpdatePhase,
    tool_id: &str,
    args: &BTreeMap<String, Value>,
    session_meta: &Metadata,
    result: Option<&Value>,
) -> Result<Metadata, PolicyError> {
    debug_assert!(matches!(
        phase,
        UpdatePhase::SessionBefore | UpdatePhase::SessionAfter
    ));
    let mut working = session_meta.clone();
    for rule in &config.update_rules {
        if rule.phase != phase || !rule.pattern.matches(tool_id) {
            continue;
        }
        let ctx = CallContext {
            tool_id,
            args,
            session_meta: &working,
            result,
        };
        let applies = match &rule.condition {
            None => true,
            Some(condition) => {
                eval_pred(condition, &ctx).map_err(|e| update_eval_error(rule, e))?
            }
        };
        if !applies {
            continue;
        }
        let value = eval_set(&rule.value, &ctx).map_err(|e| update_eval_error(rule, e))?;
        let mut meta = working.clone();
        apply_field(&mut meta, rule.field, rule.op, value);
        working = meta;
    }
    Ok(working)
}

fn rule_eval_error(rule: &CheckRule, source: PolicyError) -> PolicyError {
    PolicyError::Eval {
        rule: rule.display_name(),
        reason: source.to_string(),
    }
}

fn update_eval_error(rule: &crate::rules::MetaUpdateRule, source: PolicyError) -> PolicyError {
    PolicyError::Eval {
        rule: rule
            .name
            .clone()
            .unwrap_or_else(|| format!("update #{} for tool {}", rule.index, rule.pattern)),
        reason: source.to_string(),
    }
}

// ── runtime set values ──────────────────────────────────────────────

/// The runtime value of a set expression: named strings plus optional
/// typed domains, or the universal set.
#[derive(Debug, Clone, PartialEq)]
pub struct SetValue {
    pub universal: bool,
    pub strings: BTreeSet<String>,
    pub domains: Vec<crate::domain::Domain>,
}

impl SetValue {
    fn empty() -> Self {
        SetValue {
            universal: false,
            strings: BTreeSet::new(),
            domains: Vec::new(),
        }
    }

    fn universal() -> Self {
        SetValue {
            universal: true,
            strings: BTreeSet::new(),
            domains: Vec::new(),
        }
    }

    fn from_names(names: &BTreeSet<String>) -> Self {
        SetValue {
            universal: false,
            strings: names.clone(),
            domains: Vec::new(),
        }
    }

    fn from_consumers(consumers: &ConsumerSet) -> Self {
        match consumers.names() {
            None => SetValue::universal(),
            Some(names) => SetValue::from_names(names),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.universal && self.strings.is_empty() && self.domains.is_empty()
    }

    /// Whether a raw JSON value is a member.
    pub fn contains_raw(&self, raw: &serde_json::Value) -> bool {
        if self.universal {
            return true;
        }
        if let Some(text) = raw.as_str() {
            if self.strings.contains(text) {
                return true;
            }
        }
        self.domains.iter().any(|d| d.matches(raw))
    }

    fn union(mut self, other: SetValue) -> SetValue {
        if self.universal || other.universal {
            return SetValue::universal();
        }
        self.strings.extend(other.strings);
        self.domains.extend(other.domains);
        self
    }

    fn intersect(self, other: SetValue) -> SetValue {
        // Absorbing intersection, mirroring the consumer-set rule.
        if self.universal {
            return other;
        }
        if other.universal {
            return self;
        }
        SetValue {
            universal: false,
            strings: self.strings.intersection(&other.strings).cloned().collect(),
            domains: Vec::new(),
        }
    }

    fn difference(self, other: SetValue) -> SetValue {
        if other.universal {
            return SetValue::empty();
        }
        if self.universal {
            // The complement of a named set is not representable; removing
            // named elements from the universal set is a no-op.
            return SetValue::universal();
        }
        SetValue {
            universal: false,
            strings: self.strings.difference(&other.strings).cloned().collect(),
            domains: Vec::new(),
        }
    }

    fn symmetric_difference(self, other: SetValue) -> SetValue {
        match (self.universal, other.universal) {
            (true, true) => SetValue::empty(),
            (true, false) | (false, true) => SetValue::universal(),
            (false, false) => SetValue {
                universal: false,
                strings: self
                    .strings
                    .symmetric_difference(&other.strings)
                    .cloned()
                    .collect(),
                domains: Vec::new(),
            },
        }
    }

    fn with(mut self, element: &str) -> SetValue {
        if element == UNIVERSAL_MARKER {
            return SetValue::universal();
        }
        if !self.universal {
            self.strings.insert(element.to_string());
        }
        self
    }

    fn without(mut self, element: &str) -> SetValue {
        if !self.universal {
            self.strings.remove(element);
        }
        self
    }

    fn overlaps(&self, other: &SetValue) -> bool {
        if self.universal {
            return !other.is_empty();
        }
        if other.universal {
            return !self.is_empty();
        }
        self.strings.intersection(&other.strings).next().is_some()
    }

    fn subset_of(&self, other: &SetValue) -> bool {
        if other.universal {
            return true;
        }
        if self.universal {
            return false;
        }
        self.strings.is_subset(&other.strings)
    }

    /// Convert to a plain name set for the tags/producers fields. The
    /// universal set spells itself as the marker string; only the
    /// consumers field interprets it.
    fn into_names(self) -> BTreeSet<String> {
        if self.universal {
            [UNIVERSAL_MARKER.to_string()].into_iter().collect()
        } else {
            self.strings
        }
    }

    fn into_consumers(self) -> ConsumerSet {
        if self.universal {
            ConsumerSet::Universal
        } else {
            ConsumerSet::Named(self.strings)
        }
    }
}

/// Evaluate a set expression in a call context.
///
/// Metadata reads of absent values (unknown argument name, `@result`
/// before the call) yield the empty set.
pub fn eval_set(expr: &SetExpr, ctx: &CallContext) -> Result<SetValue, PolicyError> {
    Ok(match expr {
        SetExpr::Literal(elements) => {
            let mut value = SetValue::empty();
            for element in elements {
                match element {
                    SetElement::Str(text) => {
                        if text == UNIVERSAL_MARKER {
                            value.universal = true;
                            value.strings.clear();
                            value.domains.clear();
                            break;
                        }
                        value.strings.insert(text.clone());
                    }
                    SetElement::Domain(domain) => value.domains.push(domain.clone()),
                }
            }
            value
        }
        SetExpr::Ref(name) => {
            return Err(PolicyError::Eval {
                rule: name.clone(),
                reason: "unresolved name reached the evaluator".into(),
            })
        }
        SetExpr::Meta(meta_ref) => read_meta(meta_ref, ctx),
        SetExpr::Aggregate { field, reduce } => {
            let mut values = ctx
                .args
                .values()
                .map(|v| read_field(&v.meta, *field));
            match reduce {
                Reduce::Union => values.fold(SetValue::empty(), SetValue::union),
                Reduce::Intersect => match values.next() {
                    None => SetValue::empty(),
                    Some(first) => values.fold(first, SetValue::intersect),
                },
            }
        }
        SetExpr::Binary { op, left, right } => {
            let left = eval_set(left, ctx)?;
            let right = eval_set(right, ctx)?;
            match op {
                SetOp::Union => left.union(right),
                SetOp::Intersect => left.intersect(right),
                SetOp::Diff => left.difference(right),
                SetOp::SymDiff => left.symmetric_difference(right),
            }
        }
        SetExpr::With { base, element } => eval_set(base, ctx)?.with(element),
        SetExpr::Without { base, element } => eval_set(base, ctx)?.without(element),
    })
}

fn read_meta(meta_ref: &MetaRef, ctx: &CallContext) -> SetValue {
    match meta_ref {
        MetaRef::Arg { name, field } => match ctx.args.get(name) {
            Some(value) => read_field(&value.meta, *field),
            None => SetValue::empty(),
        },
        MetaRef::Result { field } => match ctx.result {
            Some(value) => read_field(&value.meta, *field),
            None => SetValue::empty(),
        },
        MetaRef::Session { field } => read_field(ctx.session_meta, *field),
        // Bare refs are resolved away at compile time; an empty read is
        // the safe fallback.
        MetaRef::Bare { .. } => SetValue::empty(),
    }
}

fn read_field(meta: &Metadata, field: MetaField) -> SetValue {
    match field {
        MetaField::Producers => SetValue::from_names(&meta.producers),
        MetaField::Tags => SetValue::from_names(&meta.tags),
        MetaField::Consumers => SetValue::from_consumers(&meta.consumers),
    }
}

/// Evaluate a predicate in a call context.
pub fn eval_pred(pred: &Predicate, ctx: &CallContext) -> Result<bool, PolicyError> {
    Ok(match pred {
        Predicate::Not(inner) => !eval_pred(inner, ctx)?,
        Predicate::And(left, right) => eval_pred(left, ctx)? && eval_pred(right, ctx)?,
        Predicate::Or(left, right) => eval_pred(left, ctx)? || eval_pred(right, ctx)?,
        Predicate::ValueIn { arg, set } => match ctx.args.get(arg) {
            None => false,
            Some(value) => eval_set(set, ctx)?.contains_raw(&value.raw),
        },
        Predicate::ValueEq { arg, literal } => match ctx.args.get(arg) {
            None => false,
            Some(value) => literal.matches(&value.raw),
        },
        Predicate::Cmp { left, cmp } => {
            let left = eval_set(left, ctx)?;
            match cmp {
                SetCmp::Overlaps(right) => left.overlaps(&eval_set(right, ctx)?),
                SetCmp::SubsetOf(right) => left.subset_of(&eval_set(right, ctx)?),
                SetCmp::SupersetOf(right) => eval_set(right, ctx)?.subset_of(&left),
                SetCmp::Equals(right) => {
                    let right = eval_set(right, ctx)?;
                    left.universal == right.universal && left.strings == right.strings
                }
                SetCmp::IsEmpty => left.is_empty(),
                SetCmp::IsUniversal => left.universal,
            }
        }
        Predicate::Ref(name) => {
            return Err(PolicyError::Eval {
                rule: name.clone(),
                reason: "unresolved name reached the evaluator".into(),
            })
        }
    })
}

fn apply_field(meta: &mut Metadata, field: MetaField, op: AssignOp, value: SetValue) {
    match field {
        MetaField::Tags => apply_names(&mut meta.tags, op, value),
        MetaField::Producers => apply_names(&mut meta.producers, op, value),
        MetaField::Consumers => {
            let rhs = value.into_consumers();
            meta.consumers = match op {
                AssignOp::Assign => rhs,
                AssignOp::Union => meta.consumers.union(&rhs),
                AssignOp::Intersect => meta.consumers.intersect(&rhs),
                AssignOp::Diff => meta.consumers.difference(&rhs),
                AssignOp::SymDiff => meta.consumers.symmetric_difference(&rhs),
            };
        }
    }
}

fn apply_names(current: &mut BTreeSet<String>, op: AssignOp, value: SetValue) {
    let rhs = value.into_names();
    match op {
        AssignOp::Assign => *current = rhs,
        AssignOp::Union => current.extend(rhs),
        AssignOp::Intersect => *current = current.intersection(&rhs).cloned().collect(),
        AssignOp::Diff => *current = current.difference(&rhs).cloned().collect(),
        AssignOp::SymDiff => *current = current.symmetric_difference(&rhs).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::rules::PolicyPresets;
    use serde_json::json;

    fn policy(source: &str) -> PolicyConfig {
        PolicyConfig::from_rules(
            compile(source, None).unwrap(),
            false,
            PolicyPresets::default(),
        )
    }

    fn arg(raw: serde_json::Value, tags: &[&str]) -> Value {
        Value::with_meta(
            raw,
            Metadata::with(
                std::iter::empty(),
                ["*".to_string()],
                tags.iter().map(|s| s.to_string()),
            ),
        )
    }

    fn check(
        config: &PolicyConfig,
        tool: &str,
        args: &BTreeMap<String, Value>,
        session: &Metadata,
    ) -> Decision {
        check_call(
            config,
            &CallContext {
                tool_id: tool,
                args,
                session_meta: session,
                result: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn confidential_email_scenario() {
        // Deny send_email when the body is confidential and the recipient
        // is not at the trusted domain.
        let config = policy(
            r#"
            tool "send_email" {
                must deny when body.tags overlaps {"confidential"}
                    and not (to.value in {str matching r".*@trustedcorp\.com"});
                should allow always;
            }
            "#,
        );
        let session = Metadata::new();

        let mut args = BTreeMap::new();
        args.insert("body".to_string(), arg(json!("the plan"), &["confidential"]));
        args.insert("to".to_string(), arg(json!("research@gmail.com"), &[]));
        let decision = check(&config, "send_email", &args, &session);
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(decision.enforcement, Enforcement::Hard);
        assert!(decision.deciding_rule.is_some());

        let mut args = BTreeMap::new();
        args.insert("body".to_string(), arg(json!("the plan"), &["confidential"]));
        args.insert("to".to_string(), arg(json!("admin@trustedcorp.com"), &[]));
        let decision = check(&config, "send_email", &args, &session);
        assert_eq!(decision.verdict, Verdict::Allow);
    }

    #[test]
    fn hard_deny_overrides_soft_allow() {
        let config = policy(
            r#"
            tool "t" {
                should allow always;
                must deny when x.tags overlaps {"bad"};
            }
            "#,
        );
        let mut args = BTreeMap::new();
        args.insert("x".to_string(), arg(json!(1), &["bad"]));
        let decision = check(&config, "t", &args, &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(decision.enforcement, Enforcement::Hard);
    }

    #[test]
    fn hard_deny_overrides_hard_allow() {
        let config = policy(
            r#"
            tool "t" {
                must allow always;
                must deny always;
            }
            "#,
        );
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
    }

    #[test]
    fn soft_rules_resolve_by_priority() {
        let config = policy(
            r#"
            tool "t" { priority 10; should deny always; }
            tool "t" { priority 20; should allow always; }
            "#,
        );
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Allow);
        // The overridden soft deny is recorded as a warning.
        assert_eq!(decision.soft_warnings.len(), 1);
    }

    #[test]
    fn soft_ties_break_by_declaration_order() {
        let config = policy(
            r#"
            tool "t" { should deny always; }
            tool "t" { should allow always; }
            "#,
        );
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
    }

    #[test]
    fn default_allow_decides_when_nothing_matches() {
        let config = policy("");
        let decision = check(&config, "anything", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(decision.deciding_rule.is_none());
        assert_eq!(decision.enforcement, Enforcement::Soft);
    }

    #[test]
    fn default_deny_preset() {
        let mut config = policy("");
        config.presets.default_allow = false;
        config.presets.default_allow_level = Enforcement::Hard;
        let decision = check(&config, "anything", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(decision.enforcement, Enforcement::Hard);
    }

    #[test]
    fn unmatched_condition_falls_through_to_default() {
        let config = policy(r#"tool "t" { must deny when x.tags overlaps {"bad"}; }"#);
        let mut args = BTreeMap::new();
        args.insert("x".to_string(), arg(json!(1), &["fine"]));
        let decision = check(&config, "t", &args, &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Allow);
        // The rule was evaluated but did not match.
        assert_eq!(decision.steps.len(), 1);
        assert!(!decision.steps[0].matched);
    }

    #[test]
    fn fail_fast_stops_after_first_hard_violation() {
        let mut config = policy(
            r#"
            tool "t" { must deny always; }
            tool "t" { should allow always; }
            "#,
        );
        config.fail_fast = true;
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
        // Only the hard deny was evaluated.
        assert_eq!(decision.steps.len(), 1);

        config.fail_fast = false;
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(decision.steps.len(), 2);
    }

    #[test]
    fn rules_for_other_tools_are_ignored() {
        let config = policy(r#"tool "other" { must deny always; }"#);
        let decision = check(&config, "t", &BTreeMap::new(), &Metadata::new());
        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(decision.steps.is_empty());
    }

    #[test]
    fn regex_rules_match_by_pattern() {
        let config = policy(r#"tool r"^file_.*" { must deny always; }"#);
        assert_eq!(
            check(&config, "file_read", &BTreeMap::new(), &Metadata::new()).verdict,
            Verdict::Deny
        );
        assert_eq!(
            check(&config, "web_fetch", &BTreeMap::new(), &Metadata::new()).verdict,
            Verdict::Allow
        );
    }

    #[test]
    fn session_metadata_participates_in_conditions() {
        let config = policy(r#"tool "t" { must allow when @session.tags overlaps {"admin"}; must deny always; }"#);
        let admin = Metadata::with(std::iter::empty(), ["*".to_string()], ["admin".to_string()]);
        // Hard deny still dominates the hard allow.
        let decision = check(&config, "t", &BTreeMap::new(), &admin);
        assert_eq!(decision.verdict, Verdict::Deny);
    }

    #[test]
    fn aggregation_over_args() {
        let config = policy(
            r#"tool "t" { must deny when not (union of tags from args subset of {"clean", "public"}); }"#,
        );
        let mut args = BTreeMap::new();
        args.insert("a".to_string(), arg(json!(1), &["clean"]));
        args.insert("b".to_string(), arg(json!(2), &["public"]));
        assert_eq!(
            check(&config, "t", &args, &Metadata::new()).verdict,
            Verdict::Allow
        );

        args.insert("c".to_string(), arg(json!(3), &["dirty"]));
        assert_eq!(
            check(&config, "t", &args, &Metadata::new()).verdict,
            Verdict::Deny
        );
    }

    #[test]
    fn result_updates_apply_in_order() {
        let config = policy(
            r#"
            tool "fetch" {
                result {
                    @tags |= {"fetched"};
                    when @result.tags overlaps {"fetched"} {
                        @tags |= {"chained"};
                    }
                }
            }
            "#,
        );
        let result = Value::new(json!("data"));
        let meta = apply_result_updates(
            &config,
            "fetch",
            &BTreeMap::new(),
            &Metadata::new(),
            &result,
        )
        .unwrap();
        assert!(meta.tags.contains("fetched"));
        // The second rule saw the first rule's effect.
        assert!(meta.tags.contains("chained"));
    }

    #[test]
    fn result_update_narrows_consumers_with_absorption() {
        let config = policy(
            r#"tool "t" { result { @consumers &= {"internal", "audit"}; } }"#,
        );
        // Result starts with universal consumers; intersect narrows it.
        let result = Value::new(json!(1));
        let meta = apply_result_updates(
            &config,
            "t",
            &BTreeMap::new(),
            &Metadata::new(),
            &result,
        )
        .unwrap();
        assert_eq!(
            meta.consumers,
            ConsumerSet::from_names(["internal", "audit"])
        );
    }

    #[test]
    fn session_before_updates_ignore_result_rules() {
        let config = policy(
            r#"
            tool "t" {
                session before { @tags |= {"pending"}; }
                session after { @tags |= {"done"}; }
            }
            "#,
        );
        let before = apply_session_updates(
            &config,
            UpdatePhase::SessionBefore,
            "t",
            &BTreeMap::new(),
            &Metadata::new(),
            None,
        )
        .unwrap();
        assert!(before.tags.contains("pending"));
        assert!(!before.tags.contains("done"));

        let after = apply_session_updates(
            &config,
            UpdatePhase::SessionAfter,
            "t",
            &BTreeMap::new(),
            &before,
            Some(&Value::new(json!(1))),
        )
        .unwrap();
        assert!(after.tags.contains("pending"));
        assert!(after.tags.contains("done"));
    }

    #[test]
    fn session_after_condition_reads_the_result() {
        let config = policy(
            r#"
            tool "login" {
                session after {
                    when @result.tags overlaps {"auth:success"} {
                        @tags |= {"authenticated"};
                    }
                }
            }
            "#,
        );
        let failed = Value::new(json!("nope"));
        let meta = apply_session_updates(
            &config,
            UpdatePhase::SessionAfter,
            "login",
            &BTreeMap::new(),
            &Metadata::new(),
            Some(&failed),
        )
        .unwrap();
        assert!(!meta.tags.contains("authenticated"));

        let succeeded = Value::with_meta(
            json!("ok"),
            Metadata::with(
                std::iter::empty(),
                ["*".to_string()],
                ["auth:success".to_string()],
            ),
        );
        let meta = apply_session_updates(
            &config,
            UpdatePhase::SessionAfter,
            "login",
            &BTreeMap::new(),
            &Metadata::new(),
            Some(&succeeded),
        )
        .unwrap();
        assert!(meta.tags.contains("authenticated"));
    }

    #[test]
    fn with_and_without_element_ops() {
        let config = policy(
            r#"
            tool "t" {
                result {
                    @producers = @producers with "svc";
                    @tags = @tags without "stale";
                }
            }
            "#,
        );
        let result = Value::with_meta(
            json!(1),
            Metadata::with(
                std::iter::empty(),
                ["*".to_string()],
                ["stale".to_string(), "keep".to_string()],
            ),
        );
        let meta = apply_result_updates(
            &config,
            "t",
            &BTreeMap::new(),
            &Metadata::new(),
            &result,
        )
        .unwrap();
        assert!(meta.producers.contains("svc"));
        assert!(!meta.tags.contains("stale"));
        assert!(meta.tags.contains("keep"));
    }

    #[test]
    fn universal_assignment_restores_open_consumers() {
        let config = policy(r#"tool "t" { result { @consumers = {"*"}; } }"#);
        let result = Value::with_meta(
            json!(1),
            Metadata::with(std::iter::empty(), ["alice".to_string()], std::iter::empty()),
        );
        let meta = apply_result_updates(
            &config,
            "t",
            &BTreeMap::new(),
            &Metadata::new(),
            &result,
        )
        .unwrap();
        assert!(meta.consumers.is_universal());
    }

    #[test]
    fn is_universal_and_is_empty_predicates() {
        let config = policy(
            r#"
            tool "t" {
                must deny when x.consumers is universal;
                must deny when x.tags is empty;
            }
            "#,
        );
        let mut args = BTreeMap::new();
        args.insert("x".to_string(), arg(json!(1), &["t1"]));
        // Universal consumers → first rule matches.
        assert_eq!(check(&config, "t", &args, &Metadata::new()).verdict, Verdict::Deny);

        let mut args = BTreeMap::new();
        args.insert(
            "x".to_string(),
            Value::with_meta(
                json!(1),
                Metadata::with(std::iter::empty(), ["c".to_string()], ["t1".to_string()]),
            ),
        );
        assert_eq!(check(&config, "t", &args, &Metadata::new()).verdict, Verdict::Allow);
    }

    #[test]
    fn repeated_evaluation_is_deterministic() {
        let config = policy(
            r#"
            tool "t" {
                should deny when x.tags overlaps {"a"};
                should allow when x.tags overlaps {"b"};
            }
            "#,
        );
        let mut args = BTreeMap::new();
        args.insert("x".to_string(), arg(json!(1), &["a", "b"]));
        let first = check(&config, "t", &args, &Metadata::new());
        for _ in 0..10 {
            let again = check(&config, "t", &args, &Metadata::new());
            assert_eq!(again.verdict, first.verdict);
            assert_eq!(again.deciding_rule, first.deciding_rule);
        }
    }

    #[test]
    fn round_trip_preserves_decisions() {
        let config = policy(
            r#"
            let Sensitive = {"pii", "secret"};
            tool "send_email" {
                must deny when body.tags overlaps Sensitive;
                should allow always;
            }
            tool r"^read_.*" -> @tags |= {"readonly"};
            "#,
        );
        let json = serde_json::to_string(&config).unwrap();
        let reparsed: PolicyConfig = serde_json::from_str(&json).unwrap();

        let corpus: Vec<(&str, Vec<(&str, Value)>)> = vec![
            ("send_email", vec![("body", arg(json!("x"), &["pii"]))]),
            ("send_email", vec![("body", arg(json!("x"), &["clean"]))]),
            ("read_file", vec![]),
            ("unknown_tool", vec![]),
        ];
        for (tool, arg_list) in corpus {
            let args: BTreeMap<String, Value> = arg_list
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let original = check(&config, tool, &args, &Metadata::new());
            let round_tripped = check(&reparsed, tool, &args, &Metadata::new());
            assert_eq!(original.verdict, round_tripped.verdict, "tool {tool}");
            assert_eq!(original.deciding_rule, round_tripped.deciding_rule);
        }
    }
}
