//! Token definitions for the FLM lexer.
//!
//! Tokens are coarser than TeX's character tokens: text is delivered in
//! runs, and environment boundaries and math delimiters are recognised by
//! the lexer so that mode changes can happen without parser involvement.

use flm_ir::Position;
use std::fmt;

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of literal text. Whitespace is kept as written; the parser
    /// collapses it. `[` and `]` are always delivered as one-character runs.
    TextRun(String),

    /// A control sequence like `\emph`. The string does NOT include the
    /// leading backslash.
    MacroName(String),

    /// Begin group token `{`
    BeginGroup,

    /// End group token `}`
    EndGroup,

    /// `\(`, `\)` or a single `$`
    MathInlineDelim { open: bool },

    /// `\[`, `\]` or `$$`
    MathDisplayDelim { open: bool },

    /// `\begin{name}`
    EnvironmentBegin(String),

    /// `\end{name}`
    EnvironmentEnd(String),

    /// A comment (everything from `%` to end of line, without the `%`)
    Comment(String),

    /// The complete body of a verbatim environment
    Verbatim(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::TextRun(text) => write!(f, "{}", text),
            TokenKind::MacroName(name) => write!(f, "\\{}", name),
            TokenKind::BeginGroup => write!(f, "{{"),
            TokenKind::EndGroup => write!(f, "}}"),
            TokenKind::MathInlineDelim { open: true } => write!(f, "\\("),
            TokenKind::MathInlineDelim { open: false } => write!(f, "\\)"),
            TokenKind::MathDisplayDelim { open: true } => write!(f, "\\["),
            TokenKind::MathDisplayDelim { open: false } => write!(f, "\\]"),
            TokenKind::EnvironmentBegin(name) => write!(f, "\\begin{{{}}}", name),
            TokenKind::EnvironmentEnd(name) => write!(f, "\\end{{{}}}", name),
            TokenKind::Comment(text) => write!(f, "%{}", text),
            TokenKind::Verbatim(text) => write!(f, "{}", text),
        }
    }
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    /// Returns the control sequence name if this is a MacroName token
    pub fn as_macro_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::MacroName(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true for a one-character `]` text run
    pub fn is_close_bracket(&self) -> bool {
        matches!(&self.kind, TokenKind::TextRun(t) if t == "]")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_reconstructs_source() {
        let cases = [
            (TokenKind::MacroName("emph".to_string()), "\\emph"),
            (TokenKind::EnvironmentBegin("itemize".to_string()), "\\begin{itemize}"),
            (TokenKind::MathDisplayDelim { open: false }, "\\]"),
            (TokenKind::Comment(" note".to_string()), "% note"),
        ];
        for (kind, expected) in cases {
            assert_eq!(kind.to_string(), expected);
        }
    }
}
