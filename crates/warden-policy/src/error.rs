// error.rs — Error and warning types for the policy subsystem.

use thiserror::Error;

/// Errors raised while parsing, compiling, or evaluating policies.
///
/// Parse and semantic errors are compile-time and always fatal for the
/// request that submitted the policy. Evaluation errors indicate a rule
/// that cannot be applied to the inputs it matched (treated as a hard
/// failure by callers — never silently skipped).
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy source is not syntactically valid.
    #[error("{}", format_located(message, *line, *column, snippet.as_deref()))]
    Parse {
        message: String,
        line: usize,
        column: usize,
        snippet: Option<String>,
    },

    /// The policy parsed but violates a static rule (e.g. `@result`
    /// referenced inside a `session before` block).
    #[error("semantic error at line {line}: {message}")]
    Semantic { message: String, line: usize },

    /// A regex pattern in the source failed to compile.
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// A wildcard pattern in the source failed to compile.
    #[error("invalid wildcard pattern '{pattern}': {reason}")]
    InvalidWildcard { pattern: String, reason: String },

    /// A declarative rulebook document did not match the expected schema.
    #[error("invalid rulebook document: {0}")]
    InvalidDocument(String),

    /// The requested policy language is not recognized.
    #[error("unknown policy language '{0}'")]
    UnknownLanguage(String),

    /// A rule matched but could not be applied to the call's inputs.
    #[error("rule '{rule}' failed to evaluate: {reason}")]
    Eval { rule: String, reason: String },
}

impl PolicyError {
    /// Construct a parse error, attaching the offending source line as a
    /// snippet when available.
    pub fn parse_at(message: impl Into<String>, line: usize, column: usize, source: &str) -> Self {
        let snippet = source.lines().nth(line.saturating_sub(1)).map(String::from);
        PolicyError::Parse {
            message: message.into(),
            line,
            column,
            snippet,
        }
    }
}

/// Format a parse error with location and a caret pointing at the column.
fn format_located(message: &str, line: usize, column: usize, snippet: Option<&str>) -> String {
    let mut out = format!("{message} at line {line}, column {column}");
    if let Some(snippet) = snippet {
        out.push_str(&format!("\n\n  {snippet}\n  {}^", " ".repeat(column.saturating_sub(1))));
    }
    out
}

/// A non-fatal finding from policy compilation.
///
/// Warnings never block the request; they are surfaced to the caller and
/// logged. The canonical case is a rule whose tool pattern matches no
/// registered tool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompileWarning {
    /// The tool pattern the warning concerns, as written in the source.
    pub pattern: String,
    pub message: String,
}

impl std::fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warning: {} ({})", self.message, self.pattern)
    }
}
