// compile.rs — Lowers the surface AST into compiled rules.
//
// Compilation does four things:
// 1. Resolves `let` bindings by substitution — compiled rules contain no
//    Ref nodes, so call-time evaluation never resolves names.
// 2. Resolves bare `@field` references against their enclosing block.
// 3. Enforces static rules: `@result` may not appear in `session before`
//    blocks; typed domains only support membership tests and union;
//    update targets must match their block.
// 4. Emits non-fatal warnings for tool patterns that match no registered
//    tool.
//
// The shorthand form lowers through the same path as the block form and
// produces identical rules — there is one MetaUpdateRule shape, however
// the policy was written.

use std::collections::HashMap;

use crate::ast::{
    AssignItem, Item, LetValue, PolicyAst, RuleItem, ToolBody, ToolPolicy, UpdateItem,
};
use crate::error::{CompileWarning, PolicyError};
use crate::expr::{MetaRef, Predicate, SetCmp, SetExpr};
use crate::parser::parse;
use crate::rules::{CheckRule, CompiledRules, MetaUpdateRule, UpdatePhase};

/// Parse and compile sift source in one step.
///
/// `registered_tools`, when provided, is the closed tool registry; rules
/// whose pattern matches none of it produce warnings (never errors).
pub fn compile(
    source: &str,
    registered_tools: Option<&[String]>,
) -> Result<CompiledRules, PolicyError> {
    let ast = parse(source)?;
    lower(&ast, registered_tools)
}

/// Lower a parsed AST into compiled rules.
pub fn lower(
    ast: &PolicyAst,
    registered_tools: Option<&[String]>,
) -> Result<CompiledRules, PolicyError> {
    let mut env: HashMap<String, LetValue> = HashMap::new();
    let mut out = CompiledRules::default();
    let mut check_index = 0usize;
    let mut update_index = 0usize;

    for item in &ast.items {
        match item {
            Item::Let(binding) => {
                if env.contains_key(&binding.name) {
                    return Err(PolicyError::Semantic {
                        message: format!("duplicate let binding '{}'", binding.name),
                        line: binding.line,
                    });
                }
                // Substitute earlier bindings now so every stored value is
                // already Ref-free.
                let resolved = match &binding.value {
                    LetValue::Set(set) => LetValue::Set(resolve_set(set, &env, binding.line)?),
                    LetValue::Pred(pred) => LetValue::Pred(resolve_pred(pred, &env, binding.line)?),
                };
                env.insert(binding.name.clone(), resolved);
            }
            Item::Tool(tool) => {
                lower_tool(tool, &env, &mut out, &mut check_index, &mut update_index)?;
                if let Some(tools) = registered_tools {
                    if !tools.iter().any(|t| tool.pattern.matches(t)) {
                        let warning = CompileWarning {
                            pattern: tool.pattern.source_text().to_string(),
                            message: format!(
                                "tool pattern {} matches no registered tool",
                                tool.pattern
                            ),
                        };
                        tracing::warn!(pattern = %warning.pattern, "{}", warning.message);
                        out.warnings.push(warning);
                    }
                }
            }
        }
    }
    Ok(out)
}

fn lower_tool(
    tool: &ToolPolicy,
    env: &HashMap<String, LetValue>,
    out: &mut CompiledRules,
    check_index: &mut usize,
    update_index: &mut usize,
) -> Result<(), PolicyError> {
    match &tool.body {
        ToolBody::Block(block) => {
            let priority = block.priority.or(tool.bracket_priority).unwrap_or(0);
            for rule in &block.rules {
                match rule {
                    RuleItem::Check(check) => {
                        let condition = check
                            .condition
                            .as_ref()
                            .map(|c| resolve_pred(c, env, check.line))
                            .transpose()?;
                        if let Some(condition) = &condition {
                            check_pred_algebra(condition, check.line)?;
                        }
                        out.check_rules.push(CheckRule {
                            name: check.doc.clone().or_else(|| tool.doc.clone()),
                            pattern: tool.pattern.clone(),
                            enforcement: check.enforcement,
                            outcome: check.outcome,
                            condition,
                            priority,
                            index: *check_index,
                        });
                        *check_index += 1;
                    }
                    RuleItem::ResultBlock { updates, line: _ } => {
                        lower_updates(
                            tool,
                            UpdatePhase::Result,
                            updates,
                            None,
                            env,
                            out,
                            update_index,
                            priority,
                        )?;
                    }
                    RuleItem::SessionBlock {
                        phase,
                        updates,
                        line: _,
                    } => {
                        lower_updates(
                            tool,
                            phase.update_phase(),
                            updates,
                            None,
                            env,
                            out,
                            update_index,
                            priority,
                        )?;
                    }
                }
            }
        }
        ToolBody::Shorthand(short) => {
            let priority = tool.bracket_priority.unwrap_or(0);
            let condition = short
                .condition
                .as_ref()
                .map(|c| resolve_pred(c, env, short.assign.line))
                .transpose()?;
            lower_assign(
                tool,
                short.phase,
                &short.assign,
                condition,
                env,
                out,
                update_index,
                priority,
            )?;
        }
    }
    Ok(())
}

/// Lower the updates of one result/session block, distributing `when`
/// conditions over nested assignments.
#[allow(clippy::too_many_arguments)]
fn lower_updates(
    tool: &ToolPolicy,
    phase: UpdatePhase,
    updates: &[UpdateItem],
    outer_condition: Option<Predicate>,
    env: &HashMap<String, LetValue>,
    out: &mut CompiledRules,
    update_index: &mut usize,
    priority: i64,
) -> Result<(), PolicyError> {
    for update in updates {
        match update {
            UpdateItem::Assign(assign) => {
                lower_assign(
                    tool,
                    phase,
                    assign,
                    outer_condition.clone(),
                    env,
                    out,
                    update_index,
                    priority,
                )?;
            }
            UpdateItem::When {
                condition,
                updates,
                line,
            } => {
                let resolved = resolve_pred(condition, env, *line)?;
                let combined = match &outer_condition {
                    None => resolved,
                    Some(outer) => {
                        Predicate::And(Box::new(outer.clone()), Box::new(resolved))
                    }
                };
                lower_updates(
                    tool,
                    phase,
                    updates,
                    Some(combined),
                    env,
                    out,
                    update_index,
                    priority,
                )?;
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn lower_assign(
    tool: &ToolPolicy,
    phase: UpdatePhase,
    assign: &AssignItem,
    condition: Option<Predicate>,
    env: &HashMap<String, LetValue>,
    out: &mut CompiledRules,
    update_index: &mut usize,
    priority: i64,
) -> Result<(), PolicyError> {
    // Resolve the target against the enclosing block and reject targets
    // that contradict it.
    let field = match (&assign.target, phase) {
        (MetaRef::Bare { field }, _) => *field,
        (MetaRef::Result { field }, UpdatePhase::Result) => *field,
        (MetaRef::Session { field }, UpdatePhase::SessionBefore | UpdatePhase::SessionAfter) => {
            *field
        }
        (MetaRef::Result { .. }, _) => {
            return Err(PolicyError::Semantic {
                message: "@result is not a valid target in a session block".into(),
                line: assign.line,
            })
        }
        (MetaRef::Session { .. }, _) => {
            return Err(PolicyError::Semantic {
                message: "@session is not a valid target in a result block".into(),
                line: assign.line,
            })
        }
        (MetaRef::Arg { name, .. }, _) => {
            return Err(PolicyError::Semantic {
                message: format!("argument '{name}' is not a valid update target"),
                line: assign.line,
            })
        }
    };

    let value = resolve_bare(
        &resolve_set(&assign.value, env, assign.line)?,
        phase,
    );
    let condition = condition.map(|c| resolve_bare_pred(&c, phase));

    // Session-before rules run before the tool does; referencing the
    // result there is a contradiction caught now, not at run time.
    if phase == UpdatePhase::SessionBefore {
        if set_refs_result(&value) {
            return Err(PolicyError::Semantic {
                message: "@result may not be referenced in a 'session before' block".into(),
                line: assign.line,
            });
        }
        if let Some(condition) = &condition {
            if pred_refs_result(condition) {
                return Err(PolicyError::Semantic {
                    message: "@result may not be referenced in a 'session before' block".into(),
                    line: assign.line,
                });
            }
        }
    }

    check_set_algebra(&value, assign.line)?;
    if value.has_domains() {
        return Err(PolicyError::Semantic {
            message: "typed domains cannot be stored into metadata fields".into(),
            line: assign.line,
        });
    }
    if let Some(condition) = &condition {
        check_pred_algebra(condition, assign.line)?;
    }

    out.update_rules.push(MetaUpdateRule {
        name: tool.doc.clone(),
        pattern: tool.pattern.clone(),
        phase,
        field,
        op: assign.op,
        value,
        condition,
        priority,
        index: *update_index,
    });
    *update_index += 1;
    Ok(())
}

// ── name resolution ─────────────────────────────────────────────────

fn resolve_set(
    expr: &SetExpr,
    env: &HashMap<String, LetValue>,
    line: usize,
) -> Result<SetExpr, PolicyError> {
    Ok(match expr {
        SetExpr::Ref(name) => match env.get(name) {
            Some(LetValue::Set(set)) => set.clone(),
            Some(LetValue::Pred(_)) => {
                return Err(PolicyError::Semantic {
                    message: format!("'{name}' is a predicate but is used as a set"),
                    line,
                })
            }
            None => {
                return Err(PolicyError::Semantic {
                    message: format!("unknown name '{name}'"),
                    line,
                })
            }
        },
        SetExpr::Literal(_) | SetExpr::Meta(_) | SetExpr::Aggregate { .. } => expr.clone(),
        SetExpr::Binary { op, left, right } => SetExpr::Binary {
            op: *op,
            left: Box::new(resolve_set(left, env, line)?),
            right: Box::new(resolve_set(right, env, line)?),
        },
        SetExpr::With { base, element } => SetExpr::With {
            base: Box::new(resolve_set(base, env, line)?),
            element: element.clone(),
        },
        SetExpr::Without { base, element } => SetExpr::Without {
            base: Box::new(resolve_set(base, env, line)?),
            element: element.clone(),
        },
    })
}

fn resolve_pred(
    pred: &Predicate,
    env: &HashMap<String, LetValue>,
    line: usize,
) -> Result<Predicate, PolicyError> {
    Ok(match pred {
        Predicate::Ref(name) => match env.get(name) {
            Some(LetValue::Pred(pred)) => pred.clone(),
            Some(LetValue::Set(_)) => {
                return Err(PolicyError::Semantic {
                    message: format!("'{name}' is a set but is used as a predicate"),
                    line,
                })
            }
            None => {
                return Err(PolicyError::Semantic {
                    message: format!("unknown name '{name}'"),
                    line,
                })
            }
        },
        Predicate::Not(inner) => Predicate::Not(Box::new(resolve_pred(inner, env, line)?)),
        Predicate::And(left, right) => Predicate::And(
            Box::new(resolve_pred(left, env, line)?),
            Box::new(resolve_pred(right, env, line)?),
        ),
        Predicate::Or(left, right) => Predicate::Or(
            Box::new(resolve_pred(left, env, line)?),
            Box::new(resolve_pred(right, env, line)?),
        ),
        Predicate::ValueIn { arg, set } => Predicate::ValueIn {
            arg: arg.clone(),
            set: resolve_set(set, env, line)?,
        },
        Predicate::ValueEq { .. } => pred.clone(),
        Predicate::Cmp { left, cmp } => Predicate::Cmp {
            left: resolve_set(left, env, line)?,
            cmp: match cmp {
                SetCmp::Overlaps(set) => SetCmp::Overlaps(resolve_set(set, env, line)?),
                SetCmp::SubsetOf(set) => SetCmp::SubsetOf(resolve_set(set, env, line)?),
                SetCmp::SupersetOf(set) => SetCmp::SupersetOf(resolve_set(set, env, line)?),
                SetCmp::Equals(set) => SetCmp::Equals(resolve_set(set, env, line)?),
                SetCmp::IsEmpty => SetCmp::IsEmpty,
                SetCmp::IsUniversal => SetCmp::IsUniversal,
            },
        },
    })
}

// ── bare-@field resolution ──────────────────────────────────────────

/// Rewrite bare `@field` references to the block's target.
fn resolve_bare(expr: &SetExpr, phase: UpdatePhase) -> SetExpr {
    match expr {
        SetExpr::Meta(MetaRef::Bare { field }) => SetExpr::Meta(match phase {
            UpdatePhase::Result => MetaRef::Result { field: *field },
            UpdatePhase::SessionBefore | UpdatePhase::SessionAfter => {
                MetaRef::Session { field: *field }
            }
        }),
        SetExpr::Literal(_) | SetExpr::Ref(_) | SetExpr::Meta(_) | SetExpr::Aggregate { .. } => {
            expr.clone()
        }
        SetExpr::Binary { op, left, right } => SetExpr::Binary {
            op: *op,
            left: Box::new(resolve_bare(left, phase)),
            right: Box::new(resolve_bare(right, phase)),
        },
        SetExpr::With { base, element } => SetExpr::With {
            base: Box::new(resolve_bare(base, phase)),
            element: element.clone(),
        },
        SetExpr::Without { base, element } => SetExpr::Without {
            base: Box::new(resolve_bare(base, phase)),
            element: element.clone(),
        },
    }
}

fn resolve_bare_pred(pred: &Predicate, phase: UpdatePhase) -> Predicate {
    match pred {
        Predicate::Not(inner) => Predicate::Not(Box::new(resolve_bare_pred(inner, phase))),
        Predicate::And(left, right) => Predicate::And(
            Box::new(resolve_bare_pred(left, phase)),
            Box::new(resolve_bare_pred(right, phase)),
        ),
        Predicate::Or(left, right) => Predicate::Or(
            Box::new(resolve_bare_pred(left, phase)),
            Box::new(resolve_bare_pred(right, phase)),
        ),
        Predicate::ValueIn { arg, set } => Predicate::ValueIn {
            arg: arg.clone(),
            set: resolve_bare(set, phase),
        },
        Predicate::ValueEq { .. } | Predicate::Ref(_) => pred.clone(),
        Predicate::Cmp { left, cmp } => Predicate::Cmp {
            left: resolve_bare(left, phase),
            cmp: match cmp {
                SetCmp::Overlaps(set) => SetCmp::Overlaps(resolve_bare(set, phase)),
                SetCmp::SubsetOf(set) => SetCmp::SubsetOf(resolve_bare(set, phase)),
                SetCmp::SupersetOf(set) => SetCmp::SupersetOf(resolve_bare(set, phase)),
                SetCmp::Equals(set) => SetCmp::Equals(resolve_bare(set, phase)),
                SetCmp::IsEmpty => SetCmp::IsEmpty,
                SetCmp::IsUniversal => SetCmp::IsUniversal,
            },
        },
    }
}

// ── static checks ───────────────────────────────────────────────────

fn set_refs_result(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Meta(MetaRef::Result { .. }) => true,
        SetExpr::Literal(_) | SetExpr::Ref(_) | SetExpr::Meta(_) | SetExpr::Aggregate { .. } => {
            false
        }
        SetExpr::Binary { left, right, .. } => set_refs_result(left) || set_refs_result(right),
        SetExpr::With { base, .. } | SetExpr::Without { base, .. } => set_refs_result(base),
    }
}

fn pred_refs_result(pred: &Predicate) -> bool {
    match pred {
        Predicate::Not(inner) => pred_refs_result(inner),
        Predicate::And(left, right) | Predicate::Or(left, right) => {
            pred_refs_result(left) || pred_refs_result(right)
        }
        Predicate::ValueIn { set, .. } => set_refs_result(set),
        Predicate::ValueEq { .. } | Predicate::Ref(_) => false,
        Predicate::Cmp { left, cmp } => {
            set_refs_result(left)
                || match cmp {
                    SetCmp::Overlaps(set)
                    | SetCmp::SubsetOf(set)
                    | SetCmp::SupersetOf(set)
                    | SetCmp::Equals(set) => set_refs_result(set),
                    SetCmp::IsEmpty | SetCmp::IsUniversal => false,
                }
        }
    }
}

/// Typed domains describe value families, not enumerable sets: they only
/// support membership tests (`value in`) and union composition. Catch
/// everything else here so the evaluator never sees it.
fn check_set_algebra(expr: &SetExpr, line: usize) -> Result<(), PolicyError> {
    match expr {
        SetExpr::Literal(_) | SetExpr::Ref(_) | SetExpr::Meta(_) | SetExpr::Aggregate { .. } => {
            Ok(())
        }
        SetExpr::Binary { op, left, right } => {
            check_set_algebra(left, line)?;
            check_set_algebra(right, line)?;
            if !matches!(op, crate::expr::SetOp::Union)
                && (left.has_domains() || right.has_domains())
            {
                return Err(PolicyError::Semantic {
                    message: "typed domains only support membership tests and union".into(),
                    line,
                });
            }
            Ok(())
        }
        SetExpr::With { base, .. } | SetExpr::Without { base, .. } => {
            check_set_algebra(base, line)
        }
    }
}

fn check_pred_algebra(pred: &Predicate, line: usize) -> Result<(), PolicyError> {
    match pred {
        Predicate::Not(inner) => check_pred_algebra(inner, line),
        Predicate::And(left, right) | Predicate::Or(left, right) => {
            check_pred_algebra(left, line)?;
            check_pred_algebra(right, line)
        }
        Predicate::ValueIn { set, .. } => check_set_algebra(set, line),
        Predicate::ValueEq { .. } | Predicate::Ref(_) => Ok(()),
        Predicate::Cmp { left, cmp } => {
            check_set_algebra(left, line)?;
            let right = match cmp {
                SetCmp::Overlaps(set)
                | SetCmp::SubsetOf(set)
                | SetCmp::SupersetOf(set)
                | SetCmp::Equals(set) => Some(set),
                SetCmp::IsEmpty | SetCmp::IsUniversal => None,
            };
            if let Some(right) = right {
                check_set_algebra(right, line)?;
                if left.has_domains() || right.has_domains() {
                    return Err(PolicyError::Semantic {
                        message: "typed domains only support membership tests and union".into(),
                        line,
                    });
                }
            } else if left.has_domains() {
                return Err(PolicyError::Semantic {
                    message: "typed domains only support membership tests and union".into(),
                    line,
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MetaField;
    use crate::rules::{AssignOp, Enforcement, RuleOutcome, ToolPattern};

    #[test]
    fn shorthand_compiles_to_identical_rule_as_block_form() {
        let block = compile(
            r#"tool "t1" { result { @tags |= {"tagged"}; } }"#,
            None,
        )
        .unwrap();
        let shorthand = compile(r#"tool "t1" -> @tags |= {"tagged"};"#, None).unwrap();
        assert_eq!(block.update_rules, shorthand.update_rules);
        assert_eq!(block.check_rules, shorthand.check_rules);
    }

    #[test]
    fn shorthand_session_before_equivalence() {
        let block = compile(
            r#"tool "t" { session before { @tags |= {"pre"}; } }"#,
            None,
        )
        .unwrap();
        let shorthand = compile(r#"tool "t" -> session before @tags |= {"pre"};"#, None).unwrap();
        assert_eq!(block.update_rules, shorthand.update_rules);
    }

    #[test]
    fn let_bindings_are_substituted() {
        let rules = compile(
            r#"
            let Blocked = {"spam@evil.com"};
            tool "send_email" {
                must deny when to.value in Blocked;
            }
            "#,
            None,
        )
        .unwrap();
        let rule = &rules.check_rules[0];
        match rule.condition.as_ref().unwrap() {
            Predicate::ValueIn { arg, set } => {
                assert_eq!(arg, "to");
                assert!(matches!(set, SetExpr::Literal(_)));
            }
            other => panic!("expected resolved ValueIn, got {other:?}"),
        }
    }

    #[test]
    fn predicate_let_bindings_substitute_into_checks() {
        let rules = compile(
            r#"
            let IsAdmin = user.tags overlaps {"admin"};
            tool "t" { must allow when IsAdmin; }
            "#,
            None,
        )
        .unwrap();
        assert!(matches!(
            rules.check_rules[0].condition,
            Some(Predicate::Cmp { .. })
        ));
    }

    #[test]
    fn unknown_name_is_semantic_error() {
        let err = compile(r#"tool "t" { must deny when Nope; }"#, None).unwrap_err();
        assert!(matches!(err, PolicyError::Semantic { .. }));
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn duplicate_let_is_semantic_error() {
        let err = compile("let a = {\"x\"};\nlet a = {\"y\"};", None).unwrap_err();
        match err {
            PolicyError::Semantic { message, line } => {
                assert!(message.contains("duplicate"));
                assert_eq!(line, 2);
            }
            other => panic!("expected semantic error, got {other:?}"),
        }
    }

    #[test]
    fn set_used_as_predicate_is_semantic_error() {
        let err = compile(
            "let S = {\"x\"};\ntool \"t\" { must deny when S; }",
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("used as a predicate"));
    }

    #[test]
    fn result_ref_in_session_before_is_semantic_error() {
        let err = compile(
            r#"
            tool "t" {
                session before {
                    @tags |= @result.tags;
                }
            }
            "#,
            None,
        )
        .unwrap_err();
        match err {
            PolicyError::Semantic { message, .. } => {
                assert!(message.contains("session before"));
            }
            other => panic!("expected semantic error, got {other:?}"),
        }
    }

    #[test]
    fn result_ref_in_session_before_condition_is_semantic_error() {
        let err = compile(
            r#"
            tool "t" {
                session before {
                    when @result.tags overlaps {"x"} {
                        @tags |= {"y"};
                    }
                }
            }
            "#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Semantic { .. }));
    }

    #[test]
    fn result_ref_in_session_after_is_allowed() {
        let rules = compile(
            r#"
            tool "t" {
                session after {
                    when @result.tags overlaps {"ok"} {
                        @tags |= {"done"};
                    }
                }
            }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(rules.update_rules.len(), 1);
        assert_eq!(rules.update_rules[0].phase, UpdatePhase::SessionAfter);
    }

    #[test]
    fn bare_fields_resolve_against_block() {
        let rules = compile(
            r#"
            tool "t" {
                result { @tags |= {"r"}; }
                session after { @tags |= {"s"}; }
            }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(rules.update_rules[0].phase, UpdatePhase::Result);
        assert_eq!(rules.update_rules[0].field, MetaField::Tags);
        assert_eq!(rules.update_rules[1].phase, UpdatePhase::SessionAfter);
    }

    #[test]
    fn bare_field_in_update_value_resolves_to_block_target() {
        let rules = compile(
            r#"tool "t" { result { @tags = @tags | {"x"}; } }"#,
            None,
        )
        .unwrap();
        let value = &rules.update_rules[0].value;
        // The right-hand @tags must have become @result.tags.
        match value {
            SetExpr::Binary { left, .. } => {
                assert_eq!(
                    **left,
                    SetExpr::Meta(MetaRef::Result {
                        field: MetaField::Tags
                    })
                );
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn nested_when_conditions_are_anded() {
        let rules = compile(
            r#"
            tool "t" {
                result {
                    when a.tags overlaps {"x"} {
                        when b.tags overlaps {"y"} {
                            @tags |= {"z"};
                        }
                    }
                }
            }
            "#,
            None,
        )
        .unwrap();
        assert!(matches!(
            rules.update_rules[0].condition,
            Some(Predicate::And(_, _))
        ));
    }

    #[test]
    fn session_target_in_result_block_is_semantic_error() {
        let err = compile(
            r#"tool "t" { result { @session.tags |= {"x"}; } }"#,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a valid target"));
    }

    #[test]
    fn block_priority_applies_to_rules() {
        let rules = compile(
            r#"tool "t" { priority 100; should allow always; }"#,
            None,
        )
        .unwrap();
        assert_eq!(rules.check_rules[0].priority, 100);
    }

    #[test]
    fn bracket_priority_applies_to_shorthand() {
        let rules = compile(r#"tool "t" [50] -> @tags |= {"x"};"#, None).unwrap();
        assert_eq!(rules.update_rules[0].priority, 50);
    }

    #[test]
    fn declaration_order_indexes_are_assigned() {
        let rules = compile(
            r#"
            tool "a" { should allow always; }
            tool "b" { should deny always; }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(rules.check_rules[0].index, 0);
        assert_eq!(rules.check_rules[1].index, 1);
    }

    #[test]
    fn doc_comment_names_the_rule() {
        let rules = compile(
            r#"
            tool "send_email" {
                /// Block known spam recipients
                must deny when to.value in {"spam@evil.com"};
            }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(
            rules.check_rules[0].name.as_deref(),
            Some("Block known spam recipients")
        );
    }

    #[test]
    fn unmatched_pattern_warns_but_compiles() {
        let tools = vec!["send_email".to_string()];
        let rules = compile(
            r#"tool "no_such_tool" { should allow always; }"#,
            Some(&tools),
        )
        .unwrap();
        assert_eq!(rules.check_rules.len(), 1);
        assert_eq!(rules.warnings.len(), 1);
        assert!(rules.warnings[0].message.contains("matches no registered tool"));
    }

    #[test]
    fn matched_regex_pattern_does_not_warn() {
        let tools = vec!["file_read".to_string(), "file_write".to_string()];
        let rules = compile(
            r#"tool r"^file_.*" { should allow always; }"#,
            Some(&tools),
        )
        .unwrap();
        assert!(rules.warnings.is_empty());
    }

    #[test]
    fn domains_in_intersection_are_rejected() {
        let err = compile(
            r#"tool "t" { must deny when x.value in ({int 1..5} & {"a"}); }"#,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("membership tests and union"));
    }

    #[test]
    fn domains_in_union_are_accepted() {
        let rules = compile(
            r#"tool "t" { must deny when x.value in ({int 1..5} | {"a"}); }"#,
            None,
        )
        .unwrap();
        assert_eq!(rules.check_rules.len(), 1);
    }

    #[test]
    fn domains_in_overlaps_are_rejected() {
        let err = compile(
            r#"tool "t" { must deny when x.tags overlaps {int 1..5}; }"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Semantic { .. }));
    }

    #[test]
    fn domains_cannot_be_assigned_to_fields() {
        let err = compile(
            r#"tool "t" { result { @tags |= {int 1..5}; } }"#,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be stored"));
    }

    #[test]
    fn check_rule_kinds_compile() {
        let rules = compile(
            r#"
            tool "file_access" {
                must deny when path.value in {"/etc/passwd", "/etc/shadow"};
                must allow when user.tags overlaps {"root"};
                should deny when path.tags overlaps {"sensitive"};
                should allow when user.tags overlaps {"trusted"};
                should deny always;
            }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(rules.check_rules.len(), 5);
        assert_eq!(rules.check_rules[0].enforcement, Enforcement::Hard);
        assert_eq!(rules.check_rules[0].outcome, RuleOutcome::Deny);
        assert_eq!(rules.check_rules[4].enforcement, Enforcement::Soft);
        assert!(rules.check_rules[4].condition.is_none());
    }

    #[test]
    fn regex_patterns_stay_compiled() {
        let rules = compile(r#"tool r"^log_.*" -> @tags |= {"logged"};"#, None).unwrap();
        match &rules.update_rules[0].pattern {
            ToolPattern::Regex(regex) => assert!(regex.is_match("log_event")),
            other => panic!("expected regex pattern, got {other:?}"),
        }
        assert_eq!(rules.update_rules[0].op, AssignOp::Union);
    }
}
