// adapter.rs — Pluggable policy source syntaxes.
//
// Three concrete surfaces compile to the same CompiledRules:
// - "sift": the full language (parser.rs + compile.rs);
// - "sift-lite": a restricted subset of sift — no let bindings, no
//   datetime domains, no argument aggregations. Everything it accepts
//   means exactly what sift means, so it reuses the sift pipeline and
//   rejects the out-of-subset constructs;
// - "rulebook": a declarative JSON array with no expression grammar,
//   for callers that generate policies mechanically.

use serde::Deserialize;

use crate::ast::{Item, PolicyAst, RuleItem, ToolBody, UpdateItem};
use crate::compile::{compile, lower};
use crate::domain::{CompiledRegex, Domain};
use crate::error::{CompileWarning, PolicyError};
use crate::expr::{MetaField, MetaRef, Predicate, Reduce, ScalarLiteral, SetCmp, SetElement, SetExpr};
use crate::parser::parse;
use crate::rules::{
    AssignOp, CheckRule, CompiledRules, Enforcement, MetaUpdateRule, RuleOutcome, ToolPattern,
    UpdatePhase,
};

/// A policy surface syntax that compiles to the internal rule form.
pub trait PolicySource {
    /// The language tag callers use to select this source.
    fn language(&self) -> &'static str;

    fn compile(
        &self,
        source: &str,
        registered_tools: Option<&[String]>,
    ) -> Result<CompiledRules, PolicyError>;
}

/// Look up the adapter for a language tag.
pub fn source_for(language: &str) -> Result<Box<dyn PolicySource>, PolicyError> {
    match language {
        "sift" => Ok(Box::new(SiftSource)),
        "sift-lite" => Ok(Box::new(SiftLiteSource)),
        "rulebook" => Ok(Box::new(RulebookSource)),
        other => Err(PolicyError::UnknownLanguage(other.to_string())),
    }
}

/// The full sift language.
pub struct SiftSource;

impl PolicySource for SiftSource {
    fn language(&self) -> &'static str {
        "sift"
    }

    fn compile(
        &self,
        source: &str,
        registered_tools: Option<&[String]>,
    ) -> Result<CompiledRules, PolicyError> {
        compile(source, registered_tools)
    }
}

/// The restricted sift subset.
pub struct SiftLiteSource;

impl PolicySource for SiftLiteSource {
    fn language(&self) -> &'static str {
        "sift-lite"
    }

    fn compile(
        &self,
        source: &str,
        registered_tools: Option<&[String]>,
    ) -> Result<CompiledRules, PolicyError> {
        let ast = parse(source)?;
        check_lite_subset(&ast)?;
        lower(&ast, registered_tools)
    }
}

/// Reject sift constructs outside the lite subset.
fn check_lite_subset(ast: &PolicyAst) -> Result<(), PolicyError> {
    for item in &ast.items {
        match item {
            Item::Let(binding) => {
                return Err(PolicyError::Semantic {
                    message: format!(
                        "let bindings are not available in sift-lite ('{}')",
                        binding.name
                    ),
                    line: binding.line,
                });
            }
            Item::Tool(tool) => match &tool.body {
                ToolBody::Shorthand(short) => {
                    lite_check_set(&short.assign.value, short.assign.line)?;
                    if let Some(condition) = &short.condition {
                        lite_check_pred(condition, short.assign.line)?;
                    }
                }
                ToolBody::Block(block) => {
                    for rule in &block.rules {
                        match rule {
                            RuleItem::Check(check) => {
                                if let Some(condition) = &check.condition {
                                    lite_check_pred(condition, check.line)?;
                                }
                            }
                            RuleItem::ResultBlock { updates, line }
                            | RuleItem::SessionBlock { updates, line, .. } => {
                                lite_check_updates(updates, *line)?;
                            }
                        }
                    }
                }
            },
        }
    }
    Ok(())
}

fn lite_check_updates(updates: &[UpdateItem], line: usize) -> Result<(), PolicyError> {
    for update in updates {
        match update {
            UpdateItem::Assign(assign) => lite_check_set(&assign.value, assign.line)?,
            UpdateItem::When {
                condition,
                updates,
                line: when_line,
            } => {
                lite_check_pred(condition, *when_line)?;
                lite_check_updates(updates, line)?;
            }
        }
    }
    Ok(())
}

fn lite_check_set(expr: &SetExpr, line: usize) -> Result<(), PolicyError> {
    match expr {
        SetExpr::Aggregate { .. } => Err(PolicyError::Semantic {
            message: "argument aggregations are not available in sift-lite".into(),
            line,
        }),
        SetExpr::Literal(elements) => {
            for element in elements {
                if let SetElement::Domain(Domain::Datetime(_)) = element {
                    return Err(PolicyError::Semantic {
                        message: "datetime domains are not available in sift-lite".into(),
                        line,
                    });
                }
            }
            Ok(())
        }
        SetExpr::Ref(_) | SetExpr::Meta(_) => Ok(()),
        SetExpr::Binary { left, right, .. } => {
            lite_check_set(left, line)?;
            lite_check_set(right, line)
        }
        SetExpr::With { base, .. } | SetExpr::Without { base, .. } => lite_check_set(base, line),
    }
}

fn lite_check_pred(pred: &Predicate, line: usize) -> Result<(), PolicyError> {
    match pred {
        Predicate::Not(inner) => lite_check_pred(inner, line),
        Predicate::And(left, right) | Predicate::Or(left, right) => {
            lite_check_pred(left, line)?;
            lite_check_pred(right, line)
        }
        Predicate::ValueIn { set, .. } => lite_check_set(set, line),
        Predicate::ValueEq { .. } | Predicate::Ref(_) => Ok(()),
        Predicate::Cmp { left, cmp } => {
            lite_check_set(left, line)?;
            match cmp {
                SetCmp::Overlaps(set)
                | SetCmp::SubsetOf(set)
                | SetCmp::SupersetOf(set)
                | SetCmp::Equals(set) => lite_check_set(set, line),
                SetCmp::IsEmpty | SetCmp::IsUniversal => Ok(()),
            }
        }
    }
}

/// The declarative JSON rulebook form.
///
/// A rulebook is a JSON array of rule objects:
///
/// ```json
/// [
///   {"tool": "send_email", "kind": "check", "enforcement": "hard",
///    "outcome": "deny",
///    "when": {"subject": "body.tags", "test": "overlaps",
///             "values": ["confidential"]}},
///   {"tool": {"regex": "^read_.*"}, "kind": "update", "phase": "result",
///    "field": "tags", "op": "union", "values": ["readonly"]}
/// ]
/// ```
///
/// Unknown fields are ignored for forward compatibility; missing required
/// fields reject the document.
pub struct RulebookSource;

impl PolicySource for RulebookSource {
    fn language(&self) -> &'static str {
        "rulebook"
    }

    fn compile(
        &self,
        source: &str,
        registered_tools: Option<&[String]>,
    ) -> Result<CompiledRules, PolicyError> {
        let docs: Vec<RuleDoc> = serde_json::from_str(source)
            .map_err(|e| PolicyError::InvalidDocument(e.to_string()))?;

        let mut out = CompiledRules::default();
        let mut check_index = 0usize;
        let mut update_index = 0usize;
        for (position, doc) in docs.iter().enumerate() {
            let pattern = doc.tool.to_pattern()?;
            if let Some(tools) = registered_tools {
                if !tools.iter().any(|t| pattern.matches(t)) {
                    let warning = CompileWarning {
                        pattern: pattern.source_text().to_string(),
                        message: format!("tool pattern {pattern} matches no registered tool"),
                    };
                    tracing::warn!(pattern = %warning.pattern, "{}", warning.message);
                    out.warnings.push(warning);
                }
            }
            let condition = doc
                .when
                .as_ref()
                .map(|c| c.to_predicate(position))
                .transpose()?;
            match doc.kind {
                RuleKind::Check => {
                    let outcome = doc.outcome.ok_or_else(|| {
                        PolicyError::InvalidDocument(format!(
                            "rule {position}: check rules require an 'outcome'"
                        ))
                    })?;
                    out.check_rules.push(CheckRule {
                        name: doc.name.clone(),
                        pattern,
                        enforcement: doc.enforcement.unwrap_or(Enforcement::Soft),
                        outcome,
                        condition,
                        priority: doc.priority,
                        index: check_index,
                    });
                    check_index += 1;
                }
                RuleKind::Update => {
                    let field = doc.field.ok_or_else(|| {
                        PolicyError::InvalidDocument(format!(
                            "rule {position}: update rules require a 'field'"
                        ))
                    })?;
                    let values = doc.values.clone().ok_or_else(|| {
                        PolicyError::InvalidDocument(format!(
                            "rule {position}: update rules require 'values'"
                        ))
                    })?;
                    let elements = values.into_iter().map(SetElement::Str).collect();
                    let value = SetExpr::Literal(elements);
                    let op = doc.op.unwrap_or(AssignOp::Union);
                    // Augmented ops read the current field value, exactly
                    // like the sift augmented assignments.
                    out.update_rules.push(MetaUpdateRule {
                        name: doc.name.clone(),
                        pattern,
                        phase: doc.phase.unwrap_or(UpdatePhase::Result),
                        field,
                        op,
                        value,
                        condition,
                        priority: doc.priority,
                        index: update_index,
                    });
                    update_index += 1;
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct RuleDoc {
    tool: ToolField,
    kind: RuleKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    enforcement: Option<Enforcement>,
    #[serde(default)]
    outcome: Option<RuleOutcome>,
    #[serde(default)]
    phase: Option<UpdatePhase>,
    #[serde(default)]
    field: Option<MetaField>,
    #[serde(default)]
    op: Option<AssignOp>,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default)]
    when: Option<ConditionDoc>,
    #[serde(default)]
    priority: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RuleKind {
    Check,
    Update,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolField {
    Literal(String),
    Regex { regex: String },
}

impl ToolField {
    fn to_pattern(&self) -> Result<ToolPattern, PolicyError> {
        Ok(match self {
            ToolField::Literal(name) => ToolPattern::Literal(name.clone()),
            ToolField::Regex { regex } => ToolPattern::Regex(CompiledRegex::new(regex)?),
        })
    }
}

/// Declarative condition: connectives plus subject/test leaves.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConditionDoc {
    All {
        all: Vec<ConditionDoc>,
    },
    Any {
        any: Vec<ConditionDoc>,
    },
    Not {
        not: Box<ConditionDoc>,
    },
    Leaf {
        subject: String,
        test: LeafTest,
        #[serde(default)]
        values: Vec<serde_json::Value>,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum LeafTest {
    Overlaps,
    SubsetOf,
    SupersetOf,
    Equals,
    IsEmpty,
    IsUniversal,
    In,
    Eq,
}

impl ConditionDoc {
    fn to_predicate(&self, position: usize) -> Result<Predicate, PolicyError> {
        match self {
            ConditionDoc::All { all } => combine(all, position, Predicate::And),
            ConditionDoc::Any { any } => combine(any, position, Predicate::Or),
            ConditionDoc::Not { not } => {
                Ok(Predicate::Not(Box::new(not.to_predicate(position)?)))
            }
            ConditionDoc::Leaf {
                subject,
                test,
                values,
            } => leaf_predicate(subject, *test, values, position),
        }
    }
}

fn combine(
    docs: &[ConditionDoc],
    position: usize,
    connect: fn(Box<Predicate>, Box<Predicate>) -> Predicate,
) -> Result<Predicate, PolicyError> {
    let mut preds = docs.iter().map(|d| d.to_predicate(position));
    let first = preds.next().ok_or_else(|| {
        PolicyError::InvalidDocument(format!("rule {position}: empty condition list"))
    })??;
    preds.try_fold(first, |acc, next| {
        Ok(connect(Box::new(acc), Box::new(next?)))
    })
}

fn leaf_predicate(
    subject: &str,
    test: LeafTest,
    values: &[serde_json::Value],
    position: usize,
) -> Result<Predicate, PolicyError> {
    let (head, field_name) = subject.rsplit_once('.').ok_or_else(|| {
        PolicyError::InvalidDocument(format!(
            "rule {position}: subject '{subject}' must be '<source>.<field>'"
        ))
    })?;

    // Value tests address `<arg>.value`.
    if field_name == "value" {
        let arg = head.to_string();
        return match test {
            LeafTest::In => Ok(Predicate::ValueIn {
                arg,
                set: string_set(values, position)?,
            }),
            LeafTest::Eq => {
                let value = values.first().ok_or_else(|| {
                    PolicyError::InvalidDocument(format!(
                        "rule {position}: 'eq' requires one value"
                    ))
                })?;
                Ok(Predicate::ValueEq {
                    arg,
                    literal: scalar(value, position)?,
                })
            }
            _ => Err(PolicyError::InvalidDocument(format!(
                "rule {position}: test {test:?} does not apply to values"
            ))),
        };
    }

    let field = match field_name {
        "tags" => MetaField::Tags,
        "producers" => MetaField::Producers,
        "consumers" => MetaField::Consumers,
        other => {
            return Err(PolicyError::InvalidDocument(format!(
                "rule {position}: unknown metadata field '{other}'"
            )))
        }
    };
    let left = match head {
        "session" => SetExpr::Meta(MetaRef::Session { field }),
        "result" => SetExpr::Meta(MetaRef::Result { field }),
        "args" => SetExpr::Aggregate {
            field,
            reduce: Reduce::Union,
        },
        arg => SetExpr::Meta(MetaRef::Arg {
            name: arg.to_string(),
            field,
        }),
    };

    let cmp = match test {
        LeafTest::Overlaps => SetCmp::Overlaps(string_set(values, position)?),
        LeafTest::SubsetOf => SetCmp::SubsetOf(string_set(values, position)?),
        LeafTest::SupersetOf => SetCmp::SupersetOf(string_set(values, position)?),
        LeafTest::Equals => SetCmp::Equals(string_set(values, position)?),
        LeafTest::IsEmpty => SetCmp::IsEmpty,
        LeafTest::IsUniversal => SetCmp::IsUniversal,
        LeafTest::In | LeafTest::Eq => {
            return Err(PolicyError::InvalidDocument(format!(
                "rule {position}: test {test:?} applies to values, not metadata fields"
            )))
        }
    };
    Ok(Predicate::Cmp { left, cmp })
}

fn string_set(values: &[serde_json::Value], position: usize) -> Result<SetExpr, PolicyError> {
    let elements = values
        .iter()
        .map(|v| {
            v.as_str().map(|s| SetElement::Str(s.to_string())).ok_or_else(|| {
                PolicyError::InvalidDocument(format!(
                    "rule {position}: set values must be strings, got {v}"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SetExpr::Literal(elements))
}

fn scalar(value: &serde_json::Value, position: usize) -> Result<ScalarLiteral, PolicyError> {
    if let Some(s) = value.as_str() {
        return Ok(ScalarLiteral::Str(s.to_string()));
    }
    if let Some(n) = value.as_i64() {
        return Ok(ScalarLiteral::Int(n));
    }
    if let Some(x) = value.as_f64() {
        return Ok(ScalarLiteral::Float(x));
    }
    if let Some(b) = value.as_bool() {
        return Ok(ScalarLiteral::Bool(b));
    }
    Err(PolicyError::InvalidDocument(format!(
        "rule {position}: unsupported literal {value}"
    )))
}
