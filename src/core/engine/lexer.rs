//! FLM Lexer/Tokenizer
//!
//! Converts source text into a lazy stream of tokens. The lexer keeps a
//! stack of modes so that math inside a macro argument, or a verbatim
//! environment inside a list, switches mode only for its own extent:
//! - Text: control sequences, groups, comments, `~`, text runs
//! - Math: entered by `\(`, `\[`, `$`, `$$` or a math environment; control
//!   sequences stay math source and spaces after them are kept
//! - Verbatim: the body of a verbatim environment, copied byte for byte
//!
//! Spaces after alphabetic control words are swallowed in text mode, as TeX
//! does. A comment eats the rest of its line and the line break, unless the
//! next line is blank so that paragraph breaks survive.

use std::iter::Peekable;
use std::str::CharIndices;

use flm_ir::Position;

use super::token::{Token, TokenKind};
use crate::core::catalogue::Catalogue;
use crate::utils::error::LexError;

/// How the current math region ends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MathCloser {
    Paren,
    Bracket,
    Dollar,
    DoubleDollar,
    Environment(String),
}

impl MathCloser {
    fn opener(&self) -> String {
        match self {
            MathCloser::Paren => "\\(".to_string(),
            MathCloser::Bracket => "\\[".to_string(),
            MathCloser::Dollar => "$".to_string(),
            MathCloser::DoubleDollar => "$$".to_string(),
            MathCloser::Environment(name) => format!("\\begin{{{}}}", name),
        }
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Text,
    Math {
        closer: MathCloser,
        opened_at: Position,
        /// Open groups when the math region started
        group_depth: usize,
        /// `\begin{pmatrix}`-style environments open inside the region
        inner_envs: usize,
    },
    Verbatim {
        name: String,
        opened_at: Position,
    },
}

/// The FLM lexer
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    catalogue: &'a Catalogue,
    line: usize,
    column: usize,
    modes: Vec<Mode>,
    /// Positions of the currently open `{`
    groups: Vec<Position>,
    /// Track if we just emitted a control word (for space swallowing)
    after_cs: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(input: &'a str, catalogue: &'a Catalogue) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
            catalogue,
            line: 1,
            column: 1,
            modes: vec![Mode::Text],
            groups: Vec::new(),
            after_cs: false,
        }
    }

    /// The full source text
    pub fn source(&self) -> &'a str {
        self.input
    }

    /// Byte offset of the next character
    pub fn offset(&self) -> usize {
        self.chars
            .clone()
            .next()
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    /// Position of the next character
    pub fn position(&self) -> Position {
        Position::new(self.offset(), self.line, self.column)
    }

    /// Peek at the next character without consuming it
    pub fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    /// Consume and return the next character
    fn next_char(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Whether the lexer is inside a math region
    pub fn in_math(&self) -> bool {
        matches!(self.modes.last(), Some(Mode::Math { .. }))
    }

    // =========================================================================
    // Whitespace
    // =========================================================================

    /// Skip spaces and at most one line break, but never a blank line.
    fn skip_line_spaces(&mut self) {
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.next_char();
        }
        if !matches!(self.peek_char(), Some('\n') | Some('\r')) {
            return;
        }
        let mut ahead = self.chars.clone();
        if matches!(ahead.peek(), Some((_, '\r'))) {
            ahead.next();
        }
        ahead.next();
        while matches!(ahead.peek(), Some((_, ' ')) | Some((_, '\t'))) {
            ahead.next();
        }
        if matches!(ahead.peek(), Some((_, '\n')) | Some((_, '\r'))) {
            // Keep the paragraph break
            return;
        }
        if self.peek_char() == Some('\r') {
            self.next_char();
        }
        self.next_char();
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.next_char();
        }
    }

    /// Skip the whitespace allowed between a macro and its arguments.
    pub fn skip_arg_spaces(&mut self) {
        self.after_cs = false;
        self.skip_line_spaces();
    }

    /// Consume `c` if it is the next character.
    pub fn eat_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.next_char();
            true
        } else {
            false
        }
    }

    /// Consume a single character as a bare macro argument.
    pub fn read_char(&mut self) -> Option<(char, Position)> {
        self.after_cs = false;
        let pos = self.position();
        self.next_char().map(|c| (c, pos))
    }

    // =========================================================================
    // Raw argument reading
    // =========================================================================

    /// Read a balanced `{...}` group as raw text, without its braces.
    /// The next character must be `{`.
    pub fn read_raw_group(&mut self) -> Result<String, LexError> {
        let open = self.position();
        self.next_char();
        let start = self.offset();
        let mut depth = 0usize;
        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedGroup { pos: open }),
                Some('\\') => {
                    self.next_char();
                    self.next_char();
                }
                Some('{') => {
                    depth += 1;
                    self.next_char();
                }
                Some('}') if depth == 0 => {
                    let end = self.offset();
                    self.next_char();
                    return Ok(self.input[start..end].to_string());
                }
                Some('}') => {
                    depth -= 1;
                    self.next_char();
                }
                Some(_) => {
                    self.next_char();
                }
            }
        }
    }

    /// Read a `[...]` optional argument as raw text, without its brackets.
    /// Brackets inside braces do not close the argument. The next character
    /// must be `[`.
    pub fn read_raw_optional(&mut self) -> Result<String, LexError> {
        let open = self.position();
        self.next_char();
        let start = self.offset();
        let mut depth = 0usize;
        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedGroup { pos: open }),
                Some('\\') => {
                    self.next_char();
                    self.next_char();
                }
                Some('{') => {
                    depth += 1;
                    self.next_char();
                }
                Some('}') => {
                    depth = depth.saturating_sub(1);
                    self.next_char();
                }
                Some(']') if depth == 0 => {
                    let end = self.offset();
                    self.next_char();
                    return Ok(self.input[start..end].to_string());
                }
                Some(_) => {
                    self.next_char();
                }
            }
        }
    }

    /// Read `+text+`-style raw text delimited by the next character.
    pub fn read_raw_delimited(&mut self) -> Result<String, LexError> {
        let open = self.position();
        let delim = match self.next_char() {
            Some(c) => c,
            None => return Err(LexError::UnterminatedGroup { pos: open }),
        };
        let start = self.offset();
        while let Some(c) = self.peek_char() {
            if c == delim {
                let end = self.offset();
                self.next_char();
                return Ok(self.input[start..end].to_string());
            }
            self.next_char();
        }
        Err(LexError::UnterminatedGroup { pos: open })
    }

    // =========================================================================
    // Token reading
    // =========================================================================

    /// Read a control sequence name (letters only, or single non-letter)
    fn read_control_seq(&mut self, swallow_spaces: bool) -> String {
        let mut name = String::new();

        if let Some(c) = self.peek_char() {
            if c.is_ascii_alphabetic() {
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_alphabetic() {
                        name.push(c);
                        self.next_char();
                    } else {
                        break;
                    }
                }
                self.after_cs = swallow_spaces;
            } else {
                // Single non-letter control sequence like \% \{ \}
                name.push(c);
                self.next_char();
                self.after_cs = false;
            }
        }

        name
    }

    /// Read the `{name}` following `\begin` or `\end`.
    fn read_environment_name(&mut self) -> Option<String> {
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.next_char();
        }
        if self.peek_char() != Some('{') {
            return None;
        }
        self.next_char();
        let mut name = String::new();
        while let Some(c) = self.next_char() {
            if c == '}' {
                return Some(name.trim().to_string());
            }
            name.push(c);
        }
        None
    }

    /// Read a comment (everything until end of line)
    fn read_comment(&mut self) -> String {
        let mut comment = String::new();
        while let Some(c) = self.peek_char() {
            if c == '\n' || c == '\r' {
                break;
            }
            comment.push(c);
            self.next_char();
        }
        self.skip_line_spaces();
        comment
    }

    /// Read a text run up to the next character in `stops`
    fn read_text_run(&mut self, stops: &[char]) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if stops.contains(&c) {
                break;
            }
            text.push(c);
            self.next_char();
        }
        text
    }

    fn push_math(&mut self, closer: MathCloser, opened_at: Position) {
        log::trace!("lexer: entering math mode at {}", opened_at);
        self.modes.push(Mode::Math {
            closer,
            opened_at,
            group_depth: self.groups.len(),
            inner_envs: 0,
        });
    }

    fn pop_mode(&mut self) {
        if self.modes.len() > 1 {
            self.modes.pop();
        }
    }

    /// Read the next token, or `None` at the end of the input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        match self.modes.last().cloned() {
            Some(Mode::Verbatim { name, opened_at }) => self.next_verbatim(&name, opened_at),
            Some(Mode::Math {
                closer,
                group_depth,
                inner_envs,
                opened_at,
            }) => self.next_math(closer, group_depth, inner_envs, opened_at),
            _ => self.next_text(),
        }
    }

    fn next_text(&mut self) -> Result<Option<Token>, LexError> {
        // Handle space swallowing after control sequences
        if self.after_cs {
            self.skip_line_spaces();
            self.after_cs = false;
        }

        let pos = self.position();
        let c = match self.peek_char() {
            Some(c) => c,
            None => return self.finish().map(|_| None),
        };

        let kind = match c {
            '\\' => {
                self.next_char();
                let name = self.read_control_seq(true);
                match name.as_str() {
                    "" => TokenKind::TextRun("\\".to_string()),
                    "(" => {
                        self.push_math(MathCloser::Paren, pos);
                        TokenKind::MathInlineDelim { open: true }
                    }
                    "[" => {
                        self.push_math(MathCloser::Bracket, pos);
                        TokenKind::MathDisplayDelim { open: true }
                    }
                    "begin" => match self.read_environment_name() {
                        Some(env) => {
                            self.after_cs = false;
                            if self.catalogue.is_math_environment(&env) {
                                self.push_math(MathCloser::Environment(env.clone()), pos);
                            } else if self.catalogue.is_verbatim_environment(&env) {
                                log::trace!("lexer: entering verbatim mode at {}", pos);
                                self.modes.push(Mode::Verbatim {
                                    name: env.clone(),
                                    opened_at: pos,
                                });
                            }
                            TokenKind::EnvironmentBegin(env)
                        }
                        None => TokenKind::MacroName(name),
                    },
                    "end" => match self.read_environment_name() {
                        Some(env) => {
                            self.after_cs = false;
                            TokenKind::EnvironmentEnd(env)
                        }
                        None => TokenKind::MacroName(name),
                    },
                    _ => TokenKind::MacroName(name),
                }
            }
            '{' => {
                self.next_char();
                self.groups.push(pos);
                TokenKind::BeginGroup
            }
            '}' => {
                self.next_char();
                self.groups.pop();
                TokenKind::EndGroup
            }
            '$' => {
                self.next_char();
                if self.eat_char('$') {
                    self.push_math(MathCloser::DoubleDollar, pos);
                    TokenKind::MathDisplayDelim { open: true }
                } else {
                    self.push_math(MathCloser::Dollar, pos);
                    TokenKind::MathInlineDelim { open: true }
                }
            }
            '%' => {
                self.next_char();
                TokenKind::Comment(self.read_comment())
            }
            '~' => {
                self.next_char();
                TokenKind::TextRun("\u{a0}".to_string())
            }
            '[' | ']' => {
                self.next_char();
                TokenKind::TextRun(c.to_string())
            }
            _ => TokenKind::TextRun(
                self.read_text_run(&['\\', '{', '}', '$', '%', '~', '[', ']']),
            ),
        };

        Ok(Some(Token::new(kind, pos)))
    }

    fn next_math(
        &mut self,
        closer: MathCloser,
        group_depth: usize,
        inner_envs: usize,
        opened_at: Position,
    ) -> Result<Option<Token>, LexError> {
        self.after_cs = false;
        let pos = self.position();
        let c = match self.peek_char() {
            Some(c) => c,
            None => {
                return Err(LexError::UnterminatedMath {
                    delimiter: closer.opener(),
                    pos: opened_at,
                })
            }
        };

        let kind = match c {
            '\\' => {
                self.next_char();
                let name = self.read_control_seq(false);
                match (name.as_str(), &closer) {
                    ("", _) => TokenKind::TextRun("\\".to_string()),
                    (")", MathCloser::Paren) => {
                        self.pop_mode();
                        TokenKind::MathInlineDelim { open: false }
                    }
                    ("]", MathCloser::Bracket) => {
                        self.pop_mode();
                        TokenKind::MathDisplayDelim { open: false }
                    }
                    ("begin", _) => match self.read_environment_name() {
                        Some(env) => {
                            self.set_inner_envs(inner_envs + 1);
                            TokenKind::EnvironmentBegin(env)
                        }
                        None => TokenKind::MacroName(name),
                    },
                    ("end", _) => match self.read_environment_name() {
                        Some(env) => {
                            if inner_envs > 0 {
                                self.set_inner_envs(inner_envs - 1);
                            } else if closer == MathCloser::Environment(env.clone()) {
                                log::trace!("lexer: leaving math mode at {}", pos);
                                self.pop_mode();
                            }
                            TokenKind::EnvironmentEnd(env)
                        }
                        None => TokenKind::MacroName(name),
                    },
                    _ => TokenKind::MacroName(name),
                }
            }
            '{' => {
                self.next_char();
                self.groups.push(pos);
                TokenKind::BeginGroup
            }
            '}' => {
                if self.groups.len() <= group_depth {
                    // Closes a group that was opened before the math started
                    return Err(LexError::UnterminatedMath {
                        delimiter: closer.opener(),
                        pos: opened_at,
                    });
                }
                self.next_char();
                self.groups.pop();
                TokenKind::EndGroup
            }
            '$' => {
                self.next_char();
                match closer {
                    MathCloser::Dollar => {
                        self.pop_mode();
                        TokenKind::MathInlineDelim { open: false }
                    }
                    MathCloser::DoubleDollar if self.eat_char('$') => {
                        self.pop_mode();
                        TokenKind::MathDisplayDelim { open: false }
                    }
                    _ => TokenKind::TextRun("$".to_string()),
                }
            }
            '%' => {
                self.next_char();
                TokenKind::Comment(self.read_comment())
            }
            _ => TokenKind::TextRun(self.read_text_run(&['\\', '{', '}', '$', '%'])),
        };

        Ok(Some(Token::new(kind, pos)))
    }

    fn set_inner_envs(&mut self, count: usize) {
        if let Some(Mode::Math { inner_envs, .. }) = self.modes.last_mut() {
            *inner_envs = count;
        }
    }

    fn next_verbatim(
        &mut self,
        name: &str,
        opened_at: Position,
    ) -> Result<Option<Token>, LexError> {
        self.after_cs = false;
        let pos = self.position();
        let end_marker = format!("\\end{{{}}}", name);
        let start = self.offset();
        let len = match self.input[start..].find(&end_marker) {
            Some(len) => len,
            None => {
                return Err(LexError::UnterminatedVerbatim {
                    name: name.to_string(),
                    pos: opened_at,
                })
            }
        };
        let body = self.input[start..start + len].to_string();
        while self.offset() < start + len {
            self.next_char();
        }
        log::trace!("lexer: leaving verbatim mode at {}", self.position());
        self.pop_mode();
        Ok(Some(Token::new(TokenKind::Verbatim(body), pos)))
    }

    /// End of input: every group and math region must be closed.
    fn finish(&self) -> Result<(), LexError> {
        if let Some(pos) = self.groups.last() {
            return Err(LexError::UnterminatedGroup { pos: *pos });
        }
        Ok(())
    }
}

/// Tokenize a complete string, dropping comments.
pub fn tokenize(input: &str, catalogue: &Catalogue) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input, catalogue);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        if !matches!(token.kind, TokenKind::Comment(_)) {
            tokens.push(token);
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::DEFAULT_CATALOGUE;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input, &DEFAULT_CATALOGUE)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn text(s: &str) -> TokenKind {
        TokenKind::TextRun(s.to_string())
    }

    #[test]
    fn test_control_word_swallows_spaces() {
        assert_eq!(
            kinds(r"\emph  {x} y"),
            vec![
                TokenKind::MacroName("emph".to_string()),
                TokenKind::BeginGroup,
                text("x"),
                TokenKind::EndGroup,
                text(" y"),
            ]
        );
    }

    #[test]
    fn test_control_word_keeps_paragraph_break() {
        assert_eq!(
            kinds("\\ldots\n\nnext"),
            vec![TokenKind::MacroName("ldots".to_string()), text("\n\nnext")]
        );
    }

    #[test]
    fn test_comment_eats_line_break() {
        assert_eq!(
            kinds("a%note\nb"),
            vec![text("a"), text("b")]
        );
        assert_eq!(
            kinds("a %note\n\nb"),
            vec![text("a "), text("\n\nb")]
        );
    }

    #[test]
    fn test_math_mode_keeps_control_sequences() {
        assert_eq!(
            kinds(r"\(\alpha x\)"),
            vec![
                TokenKind::MathInlineDelim { open: true },
                TokenKind::MacroName("alpha".to_string()),
                text(" x"),
                TokenKind::MathInlineDelim { open: false },
            ]
        );
    }

    #[test]
    fn test_dollar_math() {
        assert_eq!(
            kinds("$a$ and $$b$$"),
            vec![
                TokenKind::MathInlineDelim { open: true },
                text("a"),
                TokenKind::MathInlineDelim { open: false },
                text(" and "),
                TokenKind::MathDisplayDelim { open: true },
                text("b"),
                TokenKind::MathDisplayDelim { open: false },
            ]
        );
    }

    #[test]
    fn test_math_environment_with_inner_environment() {
        assert_eq!(
            kinds(r"\begin{equation}\begin{pmatrix}a\end{pmatrix}\end{equation}x"),
            vec![
                TokenKind::EnvironmentBegin("equation".to_string()),
                TokenKind::EnvironmentBegin("pmatrix".to_string()),
                text("a"),
                TokenKind::EnvironmentEnd("pmatrix".to_string()),
                TokenKind::EnvironmentEnd("equation".to_string()),
                text("x"),
            ]
        );
    }

    #[test]
    fn test_verbatim_body_is_byte_exact() {
        assert_eq!(
            kinds("\\begin{verbatimcode}\\emph{x}  %y\n\\end{verbatimcode}"),
            vec![
                TokenKind::EnvironmentBegin("verbatimcode".to_string()),
                TokenKind::Verbatim("\\emph{x}  %y\n".to_string()),
                TokenKind::EnvironmentEnd("verbatimcode".to_string()),
            ]
        );
    }

    #[test]
    fn test_brackets_are_single_runs() {
        assert_eq!(kinds("a[b]"), vec![text("a"), text("["), text("b"), text("]")]);
    }

    #[test]
    fn test_tilde_is_nbsp() {
        assert_eq!(kinds("a~b"), vec![text("a"), text("\u{a0}"), text("b")]);
    }

    #[test]
    fn test_unterminated_group() {
        let err = tokenize("ab {c", &DEFAULT_CATALOGUE).unwrap_err();
        assert_eq!(
            err,
            LexError::UnterminatedGroup {
                pos: Position::new(3, 1, 4)
            }
        );
    }

    #[test]
    fn test_unterminated_math() {
        let err = tokenize("x\n\\(a", &DEFAULT_CATALOGUE).unwrap_err();
        assert_eq!(
            err,
            LexError::UnterminatedMath {
                delimiter: "\\(".to_string(),
                pos: Position::new(2, 2, 1)
            }
        );
    }

    #[test]
    fn test_math_cannot_close_outer_group() {
        let err = tokenize("{$a}$", &DEFAULT_CATALOGUE).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedMath { .. }));
    }

    #[test]
    fn test_unterminated_verbatim() {
        let err = tokenize("\\begin{verbatimtext}abc", &DEFAULT_CATALOGUE).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedVerbatim { .. }));
    }

    #[test]
    fn test_raw_group_is_balanced() {
        let mut lexer = Lexer::new("{a{b}\\}c} rest", &DEFAULT_CATALOGUE);
        assert_eq!(lexer.read_raw_group().expect("raw"), "a{b}\\}c");
        assert_eq!(lexer.peek_char(), Some(' '));
    }

    #[test]
    fn test_raw_optional_ignores_braced_brackets() {
        let mut lexer = Lexer::new("[a{]}b]x", &DEFAULT_CATALOGUE);
        assert_eq!(lexer.read_raw_optional().expect("raw"), "a{]}b");
        assert_eq!(lexer.peek_char(), Some('x'));
    }
}
