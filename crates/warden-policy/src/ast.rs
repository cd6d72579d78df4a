// ast.rs — Surface syntax tree produced by the parser.
//
// The AST stays close to the written form: `let` bindings are unresolved,
// bare `@field` references are unresolved, and block/shorthand tool
// policies are distinct shapes. The compiler lowers all of this into
// `CompiledRules`; equality of lowered output is how we test that the
// shorthand form means exactly what the block form means.

use crate::expr::{MetaRef, Predicate, SetExpr};
use crate::rules::{AssignOp, Enforcement, RuleOutcome, ToolPattern, UpdatePhase};

/// A parsed policy source file.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyAst {
    pub items: Vec<Item>,
}

/// A top-level item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Let(LetBinding),
    Tool(ToolPolicy),
}

/// `let Name = <expr>;` — a reusable predicate or set.
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub doc: Option<String>,
    pub name: String,
    pub value: LetValue,
    pub line: usize,
}

/// What a `let` binds. The parser distinguishes by shape where it can; a
/// bare reference chain stays ambiguous until compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum LetValue {
    Pred(Predicate),
    Set(SetExpr),
}

/// `tool "id" { ... }` or `tool "id" -> ...;`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPolicy {
    pub doc: Option<String>,
    pub pattern: ToolPattern,
    /// `[n]` priority written after the tool id, if any.
    pub bracket_priority: Option<i64>,
    pub body: ToolBody,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolBody {
    Block(ToolBlock),
    Shorthand(Shorthand),
}

/// The `{ ... }` body: optional `priority n;` plus rules in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolBlock {
    pub priority: Option<i64>,
    pub rules: Vec<RuleItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleItem {
    Check(CheckItem),
    ResultBlock { updates: Vec<UpdateItem>, line: usize },
    SessionBlock {
        phase: SessionPhase,
        updates: Vec<UpdateItem>,
        line: usize,
    },
}

/// `must|should allow|deny always|when <pred>;`
#[derive(Debug, Clone, PartialEq)]
pub struct CheckItem {
    pub doc: Option<String>,
    pub enforcement: Enforcement,
    pub outcome: RuleOutcome,
    /// `None` means `always`.
    pub condition: Option<Predicate>,
    pub line: usize,
}

/// Which session block an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Before,
    After,
}

impl SessionPhase {
    pub fn update_phase(self) -> UpdatePhase {
        match self {
            SessionPhase::Before => UpdatePhase::SessionBefore,
            SessionPhase::After => UpdatePhase::SessionAfter,
        }
    }
}

/// An update statement inside a result/session block.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateItem {
    Assign(AssignItem),
    /// `when <pred> { ... }` — the condition distributes over the nested
    /// updates at compile time.
    When {
        condition: Predicate,
        updates: Vec<UpdateItem>,
        line: usize,
    },
}

/// `<metaref> <op> <setexpr>;`
#[derive(Debug, Clone, PartialEq)]
pub struct AssignItem {
    pub target: MetaRef,
    pub op: AssignOp,
    pub value: SetExpr,
    pub line: usize,
}

/// `tool "id" [n]? -> <target>? <assign> (when <pred>)?;`
#[derive(Debug, Clone, PartialEq)]
pub struct Shorthand {
    /// Defaults to the result target when omitted.
    pub phase: UpdatePhase,
    pub assign: AssignItem,
    pub condition: Option<Predicate>,
}
