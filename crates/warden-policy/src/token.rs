// token.rs — Lexer for the sift policy language.
//
// Produces a flat token stream with line/column positions. Keywords are
// not distinguished from identifiers here; the parser matches keyword
// text in context, which keeps words like "result" usable as argument
// names where the grammar allows it.
//
// Prefixed string literals carry their own token kinds:
//   "..."   plain string        r"..."  regex pattern
//   w"..."  wildcard pattern    d"..."  datetime literal

use crate::error::PolicyError;

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Str(String),
    RegexStr(String),
    WildStr(String),
    DateStr(String),
    Int(i64),
    Float(f64),
    Ident(String),
    DocComment(String),

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    DotDot,
    At,
    Arrow,
    Pipe,
    Amp,
    Minus,
    Caret,
    PipeEq,
    AmpEq,
    MinusEq,
    CaretEq,
    Eq,
    EqEq,
    Lt,
    Eof,
}

impl Tok {
    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Tok::Str(s) => format!("string \"{s}\""),
            Tok::RegexStr(_) => "regex literal".into(),
            Tok::WildStr(_) => "wildcard literal".into(),
            Tok::DateStr(_) => "datetime literal".into(),
            Tok::Int(n) => format!("integer {n}"),
            Tok::Float(x) => format!("float {x}"),
            Tok::Ident(name) => format!("'{name}'"),
            Tok::DocComment(_) => "doc comment".into(),
            Tok::Eof => "end of input".into(),
            other => format!("'{}'", symbol_text(other)),
        }
    }
}

fn symbol_text(tok: &Tok) -> &'static str {
    match tok {
        Tok::LBrace => "{",
        Tok::RBrace => "}",
        Tok::LParen => "(",
        Tok::RParen => ")",
        Tok::LBracket => "[",
        Tok::RBracket => "]",
        Tok::Semi => ";",
        Tok::Comma => ",",
        Tok::Dot => ".",
        Tok::DotDot => "..",
        Tok::At => "@",
        Tok::Arrow => "->",
        Tok::Pipe => "|",
        Tok::Amp => "&",
        Tok::Minus => "-",
        Tok::Caret => "^",
        Tok::PipeEq => "|=",
        Tok::AmpEq => "&=",
        Tok::MinusEq => "-=",
        Tok::CaretEq => "^=",
        Tok::Eq => "=",
        Tok::EqEq => "==",
        Tok::Lt => "<",
        _ => "?",
    }
}

/// A token with its source position (1-indexed).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

/// Tokenize sift source, returning the stream terminated by `Tok::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, PolicyError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, PolicyError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let tok = match c {
                '/' if self.peek_at(1) == Some('/') => {
                    if self.peek_at(2) == Some('/') {
                        let text = self.take_line_comment(3);
                        tokens.push(Token {
                            tok: Tok::DocComment(text.trim().to_string()),
                            line,
                            column,
                        });
                    } else {
                        self.take_line_comment(2);
                    }
                    continue;
                }
                '"' => Tok::Str(self.take_string(line, column)?),
                'r' if self.peek_at(1) == Some('"') => {
                    self.advance();
                    Tok::RegexStr(self.take_string(line, column)?)
                }
                'w' if self.peek_at(1) == Some('"') => {
                    self.advance();
                    Tok::WildStr(self.take_string(line, column)?)
                }
                'd' if self.peek_at(1) == Some('"') => {
                    self.advance();
                    Tok::DateStr(self.take_string(line, column)?)
                }
                c if c.is_ascii_digit() => self.take_number(line, column)?,
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    Tok::Ident(ident)
                }
                '{' => self.single(Tok::LBrace),
                '}' => self.single(Tok::RBrace),
                '(' => self.single(Tok::LParen),
                ')' => self.single(Tok::RParen),
                '[' => self.single(Tok::LBracket),
                ']' => self.single(Tok::RBracket),
                ';' => self.single(Tok::Semi),
                ',' => self.single(Tok::Comma),
                '@' => self.single(Tok::At),
                '<' => self.single(Tok::Lt),
                '.' => {
                    self.advance();
                    if self.peek() == Some('.') {
                        self.advance();
                        Tok::DotDot
                    } else {
                        Tok::Dot
                    }
                }
                '|' => self.with_eq(Tok::Pipe, Tok::PipeEq),
                '&' => self.with_eq(Tok::Amp, Tok::AmpEq),
                '^' => self.with_eq(Tok::Caret, Tok::CaretEq),
                '=' => self.with_eq(Tok::Eq, Tok::EqEq),
                '-' => {
                    self.advance();
                    match self.peek() {
                        Some('>') => {
                            self.advance();
                            Tok::Arrow
                        }
                        Some('=') => {
                            self.advance();
                            Tok::MinusEq
                        }
                        _ => Tok::Minus,
                    }
                }
                other => {
                    return Err(PolicyError::parse_at(
                        format!("unexpected character '{other}'"),
                        line,
                        column,
                        self.source,
                    ))
                }
            };
            tokens.push(Token { tok, line, column });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.advance();
        tok
    }

    fn with_eq(&mut self, plain: Tok, with_eq: Tok) -> Tok {
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            with_eq
        } else {
            plain
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Consume to end-of-line, returning the text after `prefix_len` slashes.
    fn take_line_comment(&mut self, prefix_len: usize) -> String {
        for _ in 0..prefix_len {
            self.advance();
        }
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    /// Consume a quoted string (opening quote at current position).
    /// Supports `\"` and `\\` escapes; other escape pairs pass through.
    fn take_string(&mut self, line: usize, column: usize) -> Result<String, PolicyError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(PolicyError::parse_at(
                        "unterminated string literal",
                        line,
                        column,
                        self.source,
                    ))
                }
                Some('"') => return Ok(text),
                Some('\\') => match self.advance() {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => {
                        return Err(PolicyError::parse_at(
                            "unterminated string literal",
                            line,
                            column,
                            self.source,
                        ))
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }

    /// Consume an integer or float. A '.' only begins a fractional part if
    /// followed by a digit — `1..100` lexes as `1`, `..`, `100`.
    fn take_number(&mut self, line: usize, column: usize) -> Result<Tok, PolicyError> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        let is_float = self.peek() == Some('.')
            && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit());
        if is_float {
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|e| PolicyError::parse_at(format!("invalid float: {e}"), line, column, self.source))
        } else {
            text.parse::<i64>()
                .map(Tok::Int)
                .map_err(|e| PolicyError::parse_at(format!("invalid integer: {e}"), line, column, self.source))
        }
    }
}
