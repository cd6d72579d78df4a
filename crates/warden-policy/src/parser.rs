// parser.rs — Recursive-descent parser for the sift policy language.
//
// Grammar notes:
// - Keywords are contextual: the lexer emits plain identifiers and this
//   parser matches keyword text where the grammar expects it.
// - Predicates and set expressions share a front end. An atom parses as a
//   set expression first; a trailing comparison (overlaps / subset of /
//   is empty / ...) promotes it to a predicate. Boolean connectives have
//   precedence not > and > or.
// - Regex and wildcard literals compile here, so pattern errors surface
//   with source positions instead of at call time.

use chrono::{DateTime, Utc};

use crate::ast::{
    AssignItem, CheckItem, Item, LetBinding, LetValue, PolicyAst, RuleItem, SessionPhase,
    Shorthand, ToolBlock, ToolBody, ToolPolicy, UpdateItem,
};
use crate::domain::{
    CompiledGlob, CompiledRegex, DateRange, Domain, FloatRange, IntRange, StrMatcher,
};
use crate::error::PolicyError;
use crate::expr::{
    MetaField, MetaRef, Predicate, Reduce, ScalarLiteral, SetCmp, SetElement, SetExpr, SetOp,
};
use crate::rules::{AssignOp, Enforcement, RuleOutcome, ToolPattern, UpdatePhase};
use crate::token::{tokenize, Tok, Token};

/// Parse sift source into a surface AST.
pub fn parse(source: &str) -> Result<PolicyAst, PolicyError> {
    let tokens = tokenize(source)?;
    Parser {
        source,
        tokens,
        pos: 0,
    }
    .parse_policy()
}

/// An expression that may be a predicate or a set, decided by context.
enum ExprKind {
    Pred(Predicate),
    Set(SetExpr),
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    // ── token plumbing ──────────────────────────────────────────────

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn here(&self) -> (usize, usize) {
        let t = &self.tokens[self.pos];
        (t.line, t.column)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: impl Into<String>) -> PolicyError {
        let (line, column) = self.here();
        PolicyError::parse_at(message.into(), line, column, self.source)
    }

    fn expect(&mut self, expected: Tok) -> Result<Token, PolicyError> {
        if *self.peek() == expected {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                expected.describe(),
                self.peek().describe()
            )))
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name == kw)
    }

    fn is_kw_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), Tok::Ident(name) if name == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), PolicyError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{kw}', found {}", self.peek().describe())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, PolicyError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", other.describe()))),
        }
    }

    /// Collect consecutive doc comments, joined with a space.
    fn take_doc(&mut self) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();
        while let Tok::DocComment(text) = self.peek() {
            lines.push(text.clone());
            self.advance();
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join(" "))
        }
    }

    /// Skip doc comments where they carry no meaning (inside update blocks).
    fn skip_doc(&mut self) {
        while matches!(self.peek(), Tok::DocComment(_)) {
            self.advance();
        }
    }

    // ── top level ───────────────────────────────────────────────────

    fn parse_policy(mut self) -> Result<PolicyAst, PolicyError> {
        let mut items = Vec::new();
        loop {
            let doc = self.take_doc();
            if *self.peek() == Tok::Eof {
                break;
            }
            if self.is_kw("let") {
                items.push(Item::Let(self.parse_let(doc)?));
            } else if self.is_kw("tool") {
                items.push(Item::Tool(self.parse_tool(doc)?));
            } else {
                return Err(self.error(format!(
                    "expected 'let' or 'tool', found {}",
                    self.peek().describe()
                )));
            }
        }
        Ok(PolicyAst { items })
    }

    fn parse_let(&mut self, doc: Option<String>) -> Result<LetBinding, PolicyError> {
        let (line, _) = self.here();
        self.expect_kw("let")?;
        let name = self.expect_ident()?;
        self.expect(Tok::Eq)?;
        let value = match self.parse_expr()? {
            ExprKind::Pred(pred) => LetValue::Pred(pred),
            ExprKind::Set(set) => LetValue::Set(set),
        };
        self.expect(Tok::Semi)?;
        Ok(LetBinding {
            doc,
            name,
            value,
            line,
        })
    }

    fn parse_tool(&mut self, doc: Option<String>) -> Result<ToolPolicy, PolicyError> {
        let (line, _) = self.here();
        self.expect_kw("tool")?;
        let pattern = match self.peek().clone() {
            Tok::Str(name) => {
                self.advance();
                ToolPattern::Literal(name)
            }
            Tok::RegexStr(pattern) => {
                self.advance();
                ToolPattern::Regex(CompiledRegex::new(&pattern)?)
            }
            other => {
                return Err(self.error(format!(
                    "expected tool id (string or regex), found {}",
                    other.describe()
                )))
            }
        };

        let mut bracket_priority = None;
        if *self.peek() == Tok::LBracket {
            self.advance();
            bracket_priority = Some(self.parse_int()?);
            self.expect(Tok::RBracket)?;
        }

        let body = if *self.peek() == Tok::LBrace {
            ToolBody::Block(self.parse_tool_block()?)
        } else if *self.peek() == Tok::Arrow {
            self.advance();
            ToolBody::Shorthand(self.parse_shorthand()?)
        } else {
            return Err(self.error(format!(
                "expected '{{' or '->' after tool id, found {}",
                self.peek().describe()
            )));
        };

        Ok(ToolPolicy {
            doc,
            pattern,
            bracket_priority,
            body,
            line,
        })
    }

    fn parse_tool_block(&mut self) -> Result<ToolBlock, PolicyError> {
        self.expect(Tok::LBrace)?;
        let mut priority = None;
        let mut rules = Vec::new();
        loop {
            let doc = self.take_doc();
            if *self.peek() == Tok::RBrace {
                self.advance();
                break;
            }
            let (line, _) = self.here();
            if self.is_kw("priority") {
                self.advance();
                priority = Some(self.parse_int()?);
                self.expect(Tok::Semi)?;
            } else if self.is_kw("must") || self.is_kw("should") {
                let enforcement = if self.eat_kw("must") {
                    Enforcement::Hard
                } else {
                    self.expect_kw("should")?;
                    Enforcement::Soft
                };
                let outcome = if self.eat_kw("allow") {
                    RuleOutcome::Allow
                } else if self.eat_kw("deny") {
                    RuleOutcome::Deny
                } else {
                    return Err(self.error(format!(
                        "expected 'allow' or 'deny', found {}",
                        self.peek().describe()
                    )));
                };
                let condition = if self.eat_kw("always") {
                    None
                } else {
                    self.expect_kw("when")?;
                    Some(self.parse_predicate()?)
                };
                self.expect(Tok::Semi)?;
                rules.push(RuleItem::Check(CheckItem {
                    doc,
                    enforcement,
                    outcome,
                    condition,
                    line,
                }));
            } else if self.is_kw("result") {
                self.advance();
                let updates = self.parse_update_block()?;
                rules.push(RuleItem::ResultBlock { updates, line });
            } else if self.is_kw("session") {
                self.advance();
                let phase = if self.eat_kw("before") {
                    SessionPhase::Before
                } else if self.eat_kw("after") {
                    SessionPhase::After
                } else {
                    return Err(self.error(format!(
                        "expected 'before' or 'after', found {}",
                        self.peek().describe()
                    )));
                };
                let updates = self.parse_update_block()?;
                rules.push(RuleItem::SessionBlock {
                    phase,
                    updates,
                    line,
                });
            } else {
                return Err(self.error(format!(
                    "expected a rule ('must', 'should', 'result', 'session', 'priority'), found {}",
                    self.peek().describe()
                )));
            }
        }
        Ok(ToolBlock { priority, rules })
    }

    fn parse_update_block(&mut self) -> Result<Vec<UpdateItem>, PolicyError> {
        self.expect(Tok::LBrace)?;
        let mut updates = Vec::new();
        loop {
            self.skip_doc();
            if *self.peek() == Tok::RBrace {
                self.advance();
                return Ok(updates);
            }
            let (line, _) = self.here();
            if self.is_kw("when") {
                self.advance();
                let condition = self.parse_predicate()?;
                let nested = self.parse_update_block()?;
                updates.push(UpdateItem::When {
                    condition,
                    updates: nested,
                    line,
                });
            } else {
                updates.push(UpdateItem::Assign(self.parse_assign()?));
                self.expect(Tok::Semi)?;
            }
        }
    }

    /// `<@metaref> <assign-op> <setexpr>`
    fn parse_assign(&mut self) -> Result<AssignItem, PolicyError> {
        let (line, _) = self.here();
        if *self.peek() != Tok::At {
            return Err(self.error(format!(
                "expected an update target starting with '@', found {}",
                self.peek().describe()
            )));
        }
        let target = self.parse_meta_ref_as_target()?;
        let op = match self.peek() {
            Tok::Eq => AssignOp::Assign,
            Tok::PipeEq => AssignOp::Union,
            Tok::AmpEq => AssignOp::Intersect,
            Tok::MinusEq => AssignOp::Diff,
            Tok::CaretEq => AssignOp::SymDiff,
            other => {
                return Err(self.error(format!(
                    "expected an assignment operator, found {}",
                    other.describe()
                )))
            }
        };
        self.advance();
        let value = self.parse_set_expr()?;
        Ok(AssignItem {
            target,
            op,
            value,
            line,
        })
    }

    fn parse_shorthand(&mut self) -> Result<Shorthand, PolicyError> {
        // A target keyword is always followed by '@' (or a session phase
        // word); anything else at this position is the assignment itself.
        let phase = if self.is_kw("result") && *self.peek_at(1) == Tok::At {
            self.advance();
            UpdatePhase::Result
        } else if self.is_kw("session") {
            self.advance();
            if self.eat_kw("before") {
                UpdatePhase::SessionBefore
            } else {
                self.eat_kw("after");
                UpdatePhase::SessionAfter
            }
        } else {
            UpdatePhase::Result
        };

        let assign = self.parse_assign()?;
        let condition = if self.eat_kw("when") {
            Some(self.parse_predicate()?)
        } else {
            None
        };
        self.expect(Tok::Semi)?;
        Ok(Shorthand {
            phase,
            assign,
            condition,
        })
    }

    // ── expressions ─────────────────────────────────────────────────

    fn parse_predicate(&mut self) -> Result<Predicate, PolicyError> {
        match self.parse_expr()? {
            ExprKind::Pred(pred) => Ok(pred),
            ExprKind::Set(SetExpr::Ref(name)) => Ok(Predicate::Ref(name)),
            ExprKind::Set(_) => Err(self.error("expected a predicate, found a set expression")),
        }
    }

    fn parse_set_expr(&mut self) -> Result<SetExpr, PolicyError> {
        match self.parse_expr()? {
            ExprKind::Set(set) => Ok(set),
            ExprKind::Pred(_) => Err(self.error("expected a set expression, found a predicate")),
        }
    }

    fn parse_expr(&mut self) -> Result<ExprKind, PolicyError> {
        self.parse_or()
    }

    fn coerce_pred(&self, expr: ExprKind) -> Result<Predicate, PolicyError> {
        match expr {
            ExprKind::Pred(pred) => Ok(pred),
            ExprKind::Set(SetExpr::Ref(name)) => Ok(Predicate::Ref(name)),
            ExprKind::Set(_) => Err(self.error("expected a predicate, found a set expression")),
        }
    }

    fn parse_or(&mut self) -> Result<ExprKind, PolicyError> {
        let mut left = self.parse_and()?;
        while self.is_kw("or") {
            self.advance();
            let right = self.parse_and()?;
            let l = self.coerce_pred(left)?;
            let r = self.coerce_pred(right)?;
            left = ExprKind::Pred(Predicate::Or(Box::new(l), Box::new(r)));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprKind, PolicyError> {
        let mut left = self.parse_not()?;
        while self.is_kw("and") {
            self.advance();
            let right = self.parse_not()?;
            let l = self.coerce_pred(left)?;
            let r = self.coerce_pred(right)?;
            left = ExprKind::Pred(Predicate::And(Box::new(l), Box::new(r)));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ExprKind, PolicyError> {
        if self.is_kw("not") {
            self.advance();
            let inner = self.parse_not()?;
            let pred = self.coerce_pred(inner)?;
            return Ok(ExprKind::Pred(Predicate::Not(Box::new(pred))));
        }
        self.parse_comparison()
    }

    /// A set-expression chain optionally promoted to a predicate by a
    /// trailing comparison.
    fn parse_comparison(&mut self) -> Result<ExprKind, PolicyError> {
        // `<arg>.value in ... / == ...` — value refs exist only inside
        // predicates, so handle them before set parsing.
        if let Tok::Ident(name) = self.peek().clone() {
            if *self.peek_at(1) == Tok::Dot && self.is_kw_at(2, "value") {
                self.advance(); // name
                self.advance(); // .
                self.advance(); // value
                return self.parse_value_comparison(name).map(ExprKind::Pred);
            }
        }

        // A bare string literal is only meaningful as `"elem" in <set>`.
        if let Tok::Str(text) = self.peek().clone() {
            self.advance();
            self.expect_kw("in")?;
            let set = self.parse_set_chain()?;
            // `"x" in S` is the singleton overlap `{"x"} overlaps S`.
            return Ok(ExprKind::Pred(Predicate::Cmp {
                left: SetExpr::Literal(vec![SetElement::Str(text)]),
                cmp: SetCmp::Overlaps(set),
            }));
        }

        if *self.peek() == Tok::LParen {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(Tok::RParen)?;
            match inner {
                ExprKind::Pred(pred) => return Ok(ExprKind::Pred(pred)),
                ExprKind::Set(set) => {
                    let set = self.parse_set_chain_from(set)?;
                    return self.maybe_comparison(set);
                }
            }
        }

        let set = self.parse_set_chain()?;
        self.maybe_comparison(set)
    }

    fn parse_value_comparison(&mut self, arg: String) -> Result<Predicate, PolicyError> {
        if self.eat_kw("in") {
            let set = self.parse_set_chain()?;
            Ok(Predicate::ValueIn { arg, set })
        } else if *self.peek() == Tok::EqEq {
            self.advance();
            let literal = self.parse_scalar_literal()?;
            Ok(Predicate::ValueEq { arg, literal })
        } else {
            Err(self.error(format!(
                "expected 'in' or '==' after value reference, found {}",
                self.peek().describe()
            )))
        }
    }

    fn parse_scalar_literal(&mut self) -> Result<ScalarLiteral, PolicyError> {
        match self.peek().clone() {
            Tok::Str(s) => {
                self.advance();
                Ok(ScalarLiteral::Str(s))
            }
            Tok::Int(n) => {
                self.advance();
                Ok(ScalarLiteral::Int(n))
            }
            Tok::Float(x) => {
                self.advance();
                Ok(ScalarLiteral::Float(x))
            }
            Tok::Minus => {
                self.advance();
                match self.peek().clone() {
                    Tok::Int(n) => {
                        self.advance();
                        Ok(ScalarLiteral::Int(-n))
                    }
                    Tok::Float(x) => {
                        self.advance();
                        Ok(ScalarLiteral::Float(-x))
                    }
                    other => Err(self.error(format!(
                        "expected a number after '-', found {}",
                        other.describe()
                    ))),
                }
            }
            Tok::Ident(word) if word == "true" => {
                self.advance();
                Ok(ScalarLiteral::Bool(true))
            }
            Tok::Ident(word) if word == "false" => {
                self.advance();
                Ok(ScalarLiteral::Bool(false))
            }
            other => Err(self.error(format!("expected a literal, found {}", other.describe()))),
        }
    }

    fn maybe_comparison(&mut self, left: SetExpr) -> Result<ExprKind, PolicyError> {
        if self.is_kw("overlaps") {
            self.advance();
            let right = self.parse_set_chain()?;
            return Ok(ExprKind::Pred(Predicate::Cmp {
                left,
                cmp: SetCmp::Overlaps(right),
            }));
        }
        if self.is_kw("subset") {
            self.advance();
            self.expect_kw("of")?;
            let right = self.parse_set_chain()?;
            return Ok(ExprKind::Pred(Predicate::Cmp {
                left,
                cmp: SetCmp::SubsetOf(right),
            }));
        }
        if self.is_kw("superset") {
            self.advance();
            self.expect_kw("of")?;
            let right = self.parse_set_chain()?;
            return Ok(ExprKind::Pred(Predicate::Cmp {
                left,
                cmp: SetCmp::SupersetOf(right),
            }));
        }
        if *self.peek() == Tok::EqEq {
            self.advance();
            let right = self.parse_set_chain()?;
            return Ok(ExprKind::Pred(Predicate::Cmp {
                left,
                cmp: SetCmp::Equals(right),
            }));
        }
        if self.is_kw("is") {
            self.advance();
            if self.eat_kw("empty") {
                return Ok(ExprKind::Pred(Predicate::Cmp {
                    left,
                    cmp: SetCmp::IsEmpty,
                }));
            }
            if self.eat_kw("universal") {
                return Ok(ExprKind::Pred(Predicate::Cmp {
                    left,
                    cmp: SetCmp::IsUniversal,
                }));
            }
            return Err(self.error(format!(
                "expected 'empty' or 'universal' after 'is', found {}",
                self.peek().describe()
            )));
        }
        Ok(ExprKind::Set(left))
    }

    /// A left-associative chain of binary set operators over terms.
    fn parse_set_chain(&mut self) -> Result<SetExpr, PolicyError> {
        let first = self.parse_set_term()?;
        self.parse_set_chain_from(first)
    }

    fn parse_set_chain_from(&mut self, first: SetExpr) -> Result<SetExpr, PolicyError> {
        let mut left = self.parse_element_ops(first)?;
        loop {
            let op = match self.peek() {
                Tok::Pipe => SetOp::Union,
                Tok::Amp => SetOp::Intersect,
                Tok::Minus => SetOp::Diff,
                Tok::Caret => SetOp::SymDiff,
                Tok::Ident(word) => match word.as_str() {
                    "union" if !self.is_kw_at(1, "of") => SetOp::Union,
                    "intersect" if !self.is_kw_at(1, "of") => SetOp::Intersect,
                    "minus" => SetOp::Diff,
                    "xor" => SetOp::SymDiff,
                    _ => return Ok(left),
                },
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_set_term()?;
            let right = self.parse_element_ops(right)?;
            left = SetExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    /// `with "elem"` / `without "elem"` postfix chain — binds tighter than
    /// the binary operators.
    fn parse_element_ops(&mut self, mut base: SetExpr) -> Result<SetExpr, PolicyError> {
        loop {
            if self.is_kw("with") {
                self.advance();
                let element = self.parse_string()?;
                base = SetExpr::With {
                    base: Box::new(base),
                    element,
                };
            } else if self.is_kw("without") {
                self.advance();
                let element = self.parse_string()?;
                base = SetExpr::Without {
                    base: Box::new(base),
                    element,
                };
            } else {
                return Ok(base);
            }
        }
    }

    fn parse_set_term(&mut self) -> Result<SetExpr, PolicyError> {
        match self.peek().clone() {
            Tok::LParen => {
                self.advance();
                let inner = self.parse_set_chain()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Tok::LBrace => self.parse_set_literal(),
            Tok::At => self.parse_at_ref(),
            Tok::Ident(word) if word == "union" || word == "intersect" => {
                // `union of <field> from args`
                let reduce = if word == "union" {
                    Reduce::Union
                } else {
                    Reduce::Intersect
                };
                self.advance();
                self.expect_kw("of")?;
                let field = self.parse_field_name()?;
                self.expect_kw("from")?;
                self.expect_kw("args")?;
                Ok(SetExpr::Aggregate { field, reduce })
            }
            Tok::Ident(name) => {
                self.advance();
                if *self.peek() == Tok::Dot {
                    self.advance();
                    let field = self.parse_field_name()?;
                    Ok(SetExpr::Meta(MetaRef::Arg { name, field }))
                } else {
                    Ok(SetExpr::Ref(name))
                }
            }
            other => Err(self.error(format!(
                "expected a set expression, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_set_literal(&mut self) -> Result<SetExpr, PolicyError> {
        self.expect(Tok::LBrace)?;
        let mut elements = Vec::new();
        if *self.peek() != Tok::RBrace {
            loop {
                elements.push(self.parse_set_element()?);
                if *self.peek() == Tok::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Tok::RBrace)?;
        Ok(SetExpr::Literal(elements))
    }

    fn parse_set_element(&mut self) -> Result<SetElement, PolicyError> {
        match self.peek().clone() {
            Tok::Str(text) => {
                self.advance();
                Ok(SetElement::Str(text))
            }
            Tok::Ident(word)
                if matches!(word.as_str(), "bool" | "int" | "float" | "str" | "datetime") =>
            {
                Ok(SetElement::Domain(self.parse_domain()?))
            }
            other => Err(self.error(format!(
                "expected a string or typed domain, found {}",
                other.describe()
            ))),
        }
    }

    // ── @-references ────────────────────────────────────────────────

    fn parse_at_ref(&mut self) -> Result<SetExpr, PolicyError> {
        self.expect(Tok::At)?;
        let head = self.expect_ident()?;
        match head.as_str() {
            "result" => {
                self.expect(Tok::Dot)?;
                let field = self.parse_field_name()?;
                Ok(SetExpr::Meta(MetaRef::Result { field }))
            }
            "session" => {
                self.expect(Tok::Dot)?;
                let field = self.parse_field_name()?;
                Ok(SetExpr::Meta(MetaRef::Session { field }))
            }
            "args" => {
                self.expect(Tok::Dot)?;
                let field = self.parse_field_name()?;
                let reduce = if *self.peek() == Tok::Dot {
                    self.advance();
                    if self.eat_kw("union") {
                        Reduce::Union
                    } else if self.eat_kw("intersect") {
                        Reduce::Intersect
                    } else {
                        return Err(self.error(format!(
                            "expected 'union' or 'intersect', found {}",
                            self.peek().describe()
                        )));
                    }
                } else {
                    Reduce::Union
                };
                Ok(SetExpr::Aggregate { field, reduce })
            }
            "tags" => Ok(SetExpr::Meta(MetaRef::Bare {
                field: MetaField::Tags,
            })),
            "producers" => Ok(SetExpr::Meta(MetaRef::Bare {
                field: MetaField::Producers,
            })),
            "consumers" => Ok(SetExpr::Meta(MetaRef::Bare {
                field: MetaField::Consumers,
            })),
            other => Err(self.error(format!(
                "unknown reference '@{other}' (expected @result, @session, @args, or a bare field)"
            ))),
        }
    }

    /// An update target: `@result.f`, `@session.f`, or bare `@f`.
    fn parse_meta_ref_as_target(&mut self) -> Result<MetaRef, PolicyError> {
        match self.parse_at_ref()? {
            SetExpr::Meta(meta_ref) => Ok(meta_ref),
            SetExpr::Aggregate { .. } => {
                Err(self.error("@args aggregations cannot be assignment targets"))
            }
            _ => Err(self.error("expected an update target")),
        }
    }

    fn parse_field_name(&mut self) -> Result<MetaField, PolicyError> {
        let name = self.expect_ident()?;
        match name.as_str() {
            "tags" => Ok(MetaField::Tags),
            "producers" => Ok(MetaField::Producers),
            "consumers" => Ok(MetaField::Consumers),
            other => Err(self.error(format!(
                "expected a metadata field (tags/producers/consumers), found '{other}'"
            ))),
        }
    }

    // ── domains ─────────────────────────────────────────────────────

    fn parse_domain(&mut self) -> Result<Domain, PolicyError> {
        let kind = self.expect_ident()?;
        match kind.as_str() {
            "bool" => {
                if self.eat_kw("true") {
                    Ok(Domain::Bool(true))
                } else if self.eat_kw("false") {
                    Ok(Domain::Bool(false))
                } else {
                    Err(self.error(format!(
                        "expected 'true' or 'false', found {}",
                        self.peek().describe()
                    )))
                }
            }
            "int" => Ok(Domain::Int(self.parse_int_range()?)),
            "float" => Ok(Domain::Float(self.parse_float_range()?)),
            "str" => self.parse_str_domain(),
            "datetime" => self.parse_datetime_domain(),
            other => Err(self.error(format!("unknown domain type '{other}'"))),
        }
    }

    fn parse_str_domain(&mut self) -> Result<Domain, PolicyError> {
        let matcher = match self.peek().clone() {
            Tok::Str(text) => {
                self.advance();
                StrMatcher::Exact(text)
            }
            Tok::Ident(word) if word == "matching" => {
                self.advance();
                match self.peek().clone() {
                    Tok::RegexStr(pattern) => {
                        self.advance();
                        StrMatcher::Regex(CompiledRegex::new(&pattern)?)
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected a regex literal after 'matching', found {}",
                            other.describe()
                        )))
                    }
                }
            }
            Tok::Ident(word) if word == "like" => {
                self.advance();
                match self.peek().clone() {
                    Tok::WildStr(pattern) => {
                        self.advance();
                        StrMatcher::Wildcard(CompiledGlob::new(&pattern)?)
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected a wildcard literal after 'like', found {}",
                            other.describe()
                        )))
                    }
                }
            }
            other => {
                return Err(self.error(format!(
                    "expected a string, 'matching', or 'like', found {}",
                    other.describe()
                )))
            }
        };

        let length = if self.eat_kw("length") {
            Some(self.parse_int_range()?)
        } else {
            None
        };
        Ok(Domain::Str { matcher, length })
    }

    fn parse_datetime_domain(&mut self) -> Result<Domain, PolicyError> {
        // Epoch-seconds form: `datetime 0`.
        if let Tok::Int(secs) = *self.peek() {
            self.advance();
            let instant = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| self.error(format!("epoch timestamp {secs} out of range")))?;
            return Ok(Domain::Datetime(DateRange::exact(instant)));
        }

        let mut range = DateRange::default();
        if let Tok::DateStr(_) = self.peek() {
            range.min = Some(self.parse_datetime_literal()?);
        }
        if *self.peek() == Tok::DotDot {
            self.advance();
            if let Tok::DateStr(_) = self.peek() {
                range.max = Some(self.parse_datetime_literal()?);
            }
        } else {
            // Exact datetime.
            range.max = range.min;
        }
        if range.min.is_none() && range.max.is_none() {
            return Err(self.error("expected a datetime literal or range"));
        }
        Ok(Domain::Datetime(range))
    }

    fn parse_datetime_literal(&mut self) -> Result<DateTime<Utc>, PolicyError> {
        match self.peek().clone() {
            Tok::DateStr(text) => {
                let parsed = DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| self.error(format!("invalid datetime '{text}': {e}")))?;
                self.advance();
                Ok(parsed.with_timezone(&Utc))
            }
            other => Err(self.error(format!(
                "expected a datetime literal, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_int(&mut self) -> Result<i64, PolicyError> {
        let negative = if *self.peek() == Tok::Minus {
            self.advance();
            true
        } else {
            false
        };
        match *self.peek() {
            Tok::Int(n) => {
                self.advance();
                Ok(if negative { -n } else { n })
            }
            _ => Err(self.error(format!(
                "expected an integer, found {}",
                self.peek().describe()
            ))),
        }
    }

    fn parse_float_value(&mut self) -> Result<f64, PolicyError> {
        let negative = if *self.peek() == Tok::Minus {
            self.advance();
            true
        } else {
            false
        };
        let value = match *self.peek() {
            Tok::Float(x) => x,
            Tok::Int(n) => n as f64,
            _ => {
                return Err(self.error(format!(
                    "expected a number, found {}",
                    self.peek().describe()
                )))
            }
        };
        self.advance();
        Ok(if negative { -value } else { value })
    }

    fn at_number(&self) -> bool {
        matches!(self.peek(), Tok::Int(_) | Tok::Float(_) | Tok::Minus)
    }

    /// `1..100`, `0<..<100`, `0<..10`, `0..<10`, `10..`, `..50`, `..<50`,
    /// or a bare integer for an exact value.
    fn parse_int_range(&mut self) -> Result<IntRange, PolicyError> {
        let mut range = IntRange::default();
        if self.at_number() {
            range.min = Some(self.parse_int()?);
            if *self.peek() == Tok::Lt && *self.peek_at(1) == Tok::DotDot {
                self.advance();
                range.min_exclusive = true;
            }
            if *self.peek() == Tok::DotDot {
                self.advance();
                if *self.peek() == Tok::Lt {
                    self.advance();
                    range.max_exclusive = true;
                }
                if self.at_number() {
                    range.max = Some(self.parse_int()?);
                } else if range.max_exclusive {
                    return Err(self.error("exclusive upper bound requires a value"));
                }
            } else {
                range.max = range.min;
            }
        } else if *self.peek() == Tok::DotDot {
            self.advance();
            if *self.peek() == Tok::Lt {
                self.advance();
                range.max_exclusive = true;
            }
            range.max = Some(self.parse_int()?);
        } else {
            return Err(self.error(format!(
                "expected an integer or range, found {}",
                self.peek().describe()
            )));
        }
        Ok(range)
    }

    fn parse_float_range(&mut self) -> Result<FloatRange, PolicyError> {
        let mut range = FloatRange::default();
        if self.at_number() {
            range.min = Some(self.parse_float_value()?);
            if *self.peek() == Tok::Lt && *self.peek_at(1) == Tok::DotDot {
                self.advance();
                range.min_exclusive = true;
            }
            if *self.peek() == Tok::DotDot {
                self.advance();
                if *self.peek() == Tok::Lt {
                    self.advance();
                    range.max_exclusive = true;
                }
                if self.at_number() {
                    range.max = Some(self.parse_float_value()?);
                } else if range.max_exclusive {
                    return Err(self.error("exclusive upper bound requires a value"));
                }
            } else {
                range.max = range.min;
            }
        } else if *self.peek() == Tok::DotDot {
            self.advance();
            if *self.peek() == Tok::Lt {
                self.advance();
                range.max_exclusive = true;
            }
            range.max = Some(self.parse_float_value()?);
        } else {
            return Err(self.error(format!(
                "expected a number or range, found {}",
                self.peek().describe()
            )));
        }
        Ok(range)
    }

    fn parse_string(&mut self) -> Result<String, PolicyError> {
        match self.peek().clone() {
            Tok::Str(text) => {
                self.advance();
                Ok(text)
            }
            other => Err(self.error(format!("expected a string, found {}", other.describe()))),
        }
    }
}
