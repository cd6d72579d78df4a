// expr.rs — Predicate and set-expression trees.
//
// One representation serves two stages: the parser produces trees that may
// contain `Ref` nodes (names bound by `let`), and the compiler substitutes
// those away. Compiled rules are guaranteed Ref-free — the evaluator
// treats a surviving Ref as an internal error rather than resolving names
// at call time.

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// Which metadata field an expression reads or an update writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaField {
    Producers,
    Consumers,
    Tags,
}

impl std::fmt::Display for MetaField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetaField::Producers => "producers",
            MetaField::Consumers => "consumers",
            MetaField::Tags => "tags",
        };
        write!(f, "{name}")
    }
}

/// Binary set operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOp {
    Union,
    Intersect,
    Diff,
    SymDiff,
}

/// Reduction used by argument aggregation (`union of tags from args`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    Union,
    Intersect,
}

/// A reference to a metadata field of some value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaRef {
    /// `<arg>.tags` — a named call argument.
    Arg { name: String, field: MetaField },
    /// `@result.tags` — the tool result (update/`session after` contexts).
    Result { field: MetaField },
    /// `@session.tags` — session-level metadata.
    Session { field: MetaField },
    /// `@tags` — shorthand resolved against the enclosing block by the
    /// compiler; never present in compiled rules.
    Bare { field: MetaField },
}

/// A scalar literal for value equality tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarLiteral {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarLiteral {
    pub fn matches(&self, raw: &serde_json::Value) -> bool {
        match self {
            ScalarLiteral::Str(s) => raw.as_str() == Some(s.as_str()),
            ScalarLiteral::Int(n) => raw.as_i64() == Some(*n),
            ScalarLiteral::Float(x) => raw.as_f64() == Some(*x),
            ScalarLiteral::Bool(b) => raw.as_bool() == Some(*b),
        }
    }
}

/// One element of a set literal: a plain string or a typed domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetElement {
    Str(String),
    Domain(Domain),
}

/// A set-valued expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetExpr {
    /// `{"a", "b", int 1..10}`
    Literal(Vec<SetElement>),
    /// A `let`-bound name; eliminated by compilation.
    Ref(String),
    /// A metadata field read.
    Meta(MetaRef),
    /// `union of tags from args` / `@args.tags`
    Aggregate { field: MetaField, reduce: Reduce },
    Binary {
        op: SetOp,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
    /// `<set> with "element"`
    With { base: Box<SetExpr>, element: String },
    /// `<set> without "element"`
    Without { base: Box<SetExpr>, element: String },
}

impl SetExpr {
    /// Whether any literal reachable in this expression carries typed
    /// domains. Domain-bearing sets support only membership tests and
    /// union; the compiler rejects other algebra over them.
    pub fn has_domains(&self) -> bool {
        match self {
            SetExpr::Literal(elements) => {
                elements.iter().any(|e| matches!(e, SetElement::Domain(_)))
            }
            SetExpr::Ref(_) | SetExpr::Meta(_) | SetExpr::Aggregate { .. } => false,
            SetExpr::Binary { left, right, .. } => left.has_domains() || right.has_domains(),
            SetExpr::With { base, .. } | SetExpr::Without { base, .. } => base.has_domains(),
        }
    }
}

/// A set comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetCmp {
    Overlaps(SetExpr),
    SubsetOf(SetExpr),
    SupersetOf(SetExpr),
    Equals(SetExpr),
    IsEmpty,
    IsUniversal,
}

/// A boolean predicate over call arguments and session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    /// `<arg>.value in <set>`
    ValueIn { arg: String, set: SetExpr },
    /// `<arg>.value == <literal>`
    ValueEq { arg: String, literal: ScalarLiteral },
    /// `<set> overlaps <set>`, `<set> is empty`, ...
    Cmp { left: SetExpr, cmp: SetCmp },
    /// A `let`-bound predicate name; eliminated by compilation. A bare
    /// name in predicate position that resolves to a set is a semantic
    /// error.
    Ref(String),
}
