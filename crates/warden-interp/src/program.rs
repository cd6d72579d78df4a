// program.rs — The sandboxed program representation.
//
// The planner submits programs as typed JSON — a statement list over a
// deliberately narrow instruction set: bindings, literals, variable
// reads, list/object construction, declared tool calls, quarantined
// extraction, conditionals, and return. There is no string-eval path and
// no way to call anything that is not in the tool registry, which keeps
// the policy-interception surface closed.
//
// Deserialization is the first validation layer; `validate()` adds the
// semantic pass (undefined variables, unknown tools, nesting depth).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::InterpError;

/// Maximum conditional nesting a program may use.
const MAX_NESTING_DEPTH: usize = 16;

/// A planner-emitted program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// One statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    /// Bind the value of an expression to a variable.
    Let { var: String, expr: Expr },
    /// Branch on a condition value; the condition's metadata passes the
    /// branching gate before either arm runs.
    If {
        condition: Expr,
        then: Vec<Statement>,
        #[serde(default)]
        otherwise: Vec<Statement>,
    },
    /// Finish the program with a value.
    Return { expr: Expr },
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// A literal JSON value (trusted — it came from the planner's text).
    Lit { value: serde_json::Value },
    /// Read a bound variable.
    Var { name: String },
    /// Build a list; metadata merges across the items.
    List { items: Vec<Expr> },
    /// Build an object; metadata merges across the field values.
    Object { entries: Vec<(String, Expr)> },
    /// Call a registered tool with named arguments.
    Call { tool: String, args: Vec<(String, Expr)> },
    /// Route untrusted data through the quarantined model.
    Extract { data: Box<Expr>, instruction: String },
}

impl Program {
    /// Parse a program from its JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, InterpError> {
        serde_json::from_str(raw).map_err(|e| InterpError::Validation(e.to_string()))
    }

    /// Structural validation: every variable is bound before use, every
    /// called tool is registered, and nesting stays within bounds.
    ///
    /// Variable scoping is flat and sequential: a binding inside a
    /// conditional arm is visible to later statements, conservatively —
    /// execution treats reading a genuinely unbound variable as a fault.
    pub fn validate(&self, registered_tools: &[String]) -> Result<(), InterpError> {
        let mut bound = BTreeSet::new();
        validate_statements(&self.statements, &mut bound, registered_tools, 0)
    }

    /// Total statement count, including nested arms.
    pub fn statement_count(&self) -> usize {
        fn count(statements: &[Statement]) -> usize {
            statements
                .iter()
                .map(|s| match s {
                    Statement::If {
                        then, otherwise, ..
                    } => 1 + count(then) + count(otherwise),
                    _ => 1,
                })
                .sum()
        }
        count(&self.statements)
    }
}

fn validate_statements(
    statements: &[Statement],
    bound: &mut BTreeSet<String>,
    tools: &[String],
    depth: usize,
) -> Result<(), InterpError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(InterpError::Validation(format!(
            "conditional nesting exceeds the limit of {MAX_NESTING_DEPTH}"
        )));
    }
    for statement in statements {
        match statement {
            Statement::Let { var, expr } => {
                validate_expr(expr, bound, tools)?;
                bound.insert(var.clone());
            }
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                validate_expr(condition, bound, tools)?;
                validate_statements(then, bound, tools, depth + 1)?;
                validate_statements(otherwise, bound, tools, depth + 1)?;
            }
            Statement::Return { expr } => validate_expr(expr, bound, tools)?,
        }
    }
    Ok(())
}

fn validate_expr(
    expr: &Expr,
    bound: &BTreeSet<String>,
    tools: &[String],
) -> Result<(), InterpError> {
    match expr {
        Expr::Lit { .. } => Ok(()),
        Expr::Var { name } => {
            if bound.contains(name) {
                Ok(())
            } else {
                Err(InterpError::Validation(format!(
                    "variable '{name}' is read before it is bound"
                )))
            }
        }
        Expr::List { items } => {
            for item in items {
                validate_expr(item, bound, tools)?;
            }
            Ok(())
        }
        Expr::Object { entries } => {
            for (_, value) in entries {
                validate_expr(value, bound, tools)?;
            }
            Ok(())
        }
        Expr::Call { tool, args } => {
            if !tools.iter().any(|t| t == tool) {
                return Err(InterpError::Validation(format!(
                    "tool '{tool}' is not registered"
                )));
            }
            for (_, value) in args {
                validate_expr(value, bound, tools)?;
            }
            Ok(())
        }
        Expr::Extract { data, .. } => validate_expr(data, bound, tools),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> Vec<String> {
        vec!["get_doc".to_string(), "send_email".to_string()]
    }

    #[test]
    fn program_parses_from_json() {
        let program = Program::from_json(
            r#"{
                "statements": [
                    {"op": "let", "var": "doc",
                     "expr": {"kind": "call", "tool": "get_doc",
                              "args": [["id", {"kind": "lit", "value": 7}]]}},
                    {"op": "return", "expr": {"kind": "var", "name": "doc"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 2);
        program.validate(&tools()).unwrap();
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = Program::from_json("{\"statements\": [{\"op\": \"noop\"}]}").unwrap_err();
        assert!(matches!(err, InterpError::Validation(_)));
    }

    #[test]
    fn unbound_variable_is_rejected() {
        let program = Program {
            statements: vec![Statement::Return {
                expr: Expr::Var {
                    name: "ghost".into(),
                },
            }],
        };
        let err = program.validate(&tools()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let program = Program {
            statements: vec![Statement::Let {
                var: "x".into(),
                expr: Expr::Call {
                    tool: "rm_rf".into(),
                    args: vec![],
                },
            }],
        };
        let err = program.validate(&tools()).unwrap_err();
        assert!(err.to_string().contains("rm_rf"));
    }

    #[test]
    fn bindings_inside_branches_are_visible_later() {
        let program = Program {
            statements: vec![
                Statement::If {
                    condition: Expr::Lit { value: json!(true) },
                    then: vec![Statement::Let {
                        var: "x".into(),
                        expr: Expr::Lit { value: json!(1) },
                    }],
                    otherwise: vec![],
                },
                Statement::Return {
                    expr: Expr::Var { name: "x".into() },
                },
            ],
        };
        program.validate(&tools()).unwrap();
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let mut statements = vec![Statement::Return {
            expr: Expr::Lit { value: json!(0) },
        }];
        for _ in 0..20 {
            statements = vec![Statement::If {
                condition: Expr::Lit { value: json!(true) },
                then: statements,
                otherwise: vec![],
            }];
        }
        let program = Program { statements };
        assert!(program.validate(&tools()).is_err());
    }

    #[test]
    fn statement_count_includes_nested_arms() {
        let program = Program {
            statements: vec![Statement::If {
                condition: Expr::Lit { value: json!(true) },
                then: vec![
                    Statement::Let {
                        var: "a".into(),
                        expr: Expr::Lit { value: json!(1) },
                    },
                    Statement::Let {
                        var: "b".into(),
                        expr: Expr::Lit { value: json!(2) },
                    },
                ],
                otherwise: vec![Statement::Return {
                    expr: Expr::Lit { value: json!(0) },
                }],
            }],
        };
        assert_eq!(program.statement_count(), 4);
    }

    #[test]
    fn program_serde_round_trip() {
        let program = Program {
            statements: vec![Statement::Let {
                var: "x".into(),
                expr: Expr::Extract {
                    data: Box::new(Expr::Lit {
                        value: json!("raw email body"),
                    }),
                    instruction: "extract the sender address".into(),
                },
            }],
        };
        let json = serde_json::to_string(&program).unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back, program);
    }
}
