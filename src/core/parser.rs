//! Recursive-descent parser
//!
//! Pulls tokens from the [`Lexer`] and builds the node tree, consulting the
//! [`Catalogue`] for every macro and environment. Parsing stops at the first
//! structural error; there is no partial-tree recovery.
//!
//! Whitespace rules outside math and verbatim content:
//! - a blank line becomes a [`Node::ParagraphBreak`]
//! - any other run of spaces, tabs and single newlines becomes one space

use flm_ir::{
    Argument, Body, Delimiter, Diagnostic, EnvironmentNode, EquationLine, Fragment, ListItem,
    MacroNode, MathNode, Node, Position,
};
use lazy_static::lazy_static;
use regex::Regex;

use super::catalogue::{ArgSpec, Catalogue, MacroAction};
use super::engine::lexer::Lexer;
use super::engine::token::{Token, TokenKind};
use crate::features::endnotes::parse_cite_keys;
use crate::utils::error::{LexError, ParseError};

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"[ \t]*\r?\n(?:[ \t]*\r?\n)+[ \t]*").unwrap();
    // Not `\s`: that would also collapse non-breaking spaces
    static ref WHITESPACE_RUN: Regex = Regex::new(r"[ \t\r\n]+").unwrap();
}

/// Default limit on nested groups, environments and arguments.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

/// What ends the node sequence currently being parsed.
#[derive(Debug, Clone)]
enum Terminator {
    EndOfInput,
    Group,
    Bracket { open: Position },
    Environment { name: String, open: Position },
}

/// Parse `source` into a fragment named `name`.
pub fn parse_fragment(
    source: &str,
    name: &str,
    catalogue: &Catalogue,
    max_depth: usize,
) -> Result<Fragment, ParseError> {
    Parser::new(source, catalogue, max_depth).parse(name)
}

/// The FLM parser
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    catalogue: &'a Catalogue,
    max_depth: usize,
    depth: usize,
    /// One entry per nesting level, innermost last: `true` directly inside
    /// a list body, `false` inside groups, arguments and other environments
    scopes: Vec<bool>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, catalogue: &'a Catalogue, max_depth: usize) -> Self {
        Self {
            lexer: Lexer::new(source, catalogue),
            catalogue,
            max_depth,
            depth: 0,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Parse the complete input.
    pub fn parse(mut self, name: &str) -> Result<Fragment, ParseError> {
        let (nodes, _) = self.parse_nodes(Terminator::EndOfInput)?;
        for diagnostic in &self.diagnostics {
            log::warn!("{}: {}", name, diagnostic);
        }
        log::debug!("parsed fragment '{}' into {} top-level nodes", name, nodes.len());
        Ok(Fragment::with_diagnostics(name, nodes, self.diagnostics))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        Ok(self.lexer.next_token()?)
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        pos: Position,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::NestingTooDeep {
                limit: self.max_depth,
                pos,
            });
        }
        self.depth += 1;
        self.scopes.push(false);
        let result = f(self);
        self.scopes.pop();
        self.depth -= 1;
        result
    }

    fn source_between(&self, start: usize, end: usize) -> String {
        self.lexer.source()[start..end].to_string()
    }

    /// Collapse pending text into `nodes` following the paragraph rules.
    fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
        if text.is_empty() {
            return;
        }
        let mut first = true;
        for piece in PARAGRAPH_BREAK.split(text) {
            if !first {
                nodes.push(Node::ParagraphBreak);
            }
            first = false;
            let collapsed = WHITESPACE_RUN.replace_all(piece, " ");
            if !collapsed.is_empty() {
                nodes.push(Node::Text(collapsed.into_owned()));
            }
        }
        text.clear();
    }

    // =========================================================================
    // Node sequences
    // =========================================================================

    /// Parse nodes until `term`; returns the nodes and the position of the
    /// closing token.
    fn parse_nodes(&mut self, term: Terminator) -> Result<(Vec<Node>, Position), ParseError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None => {
                    Self::flush_text(&mut text, &mut nodes);
                    return match term {
                        Terminator::EndOfInput => Ok((nodes, self.lexer.position())),
                        Terminator::Group => Err(ParseError::malformed(
                            "{",
                            "group is never closed",
                            self.lexer.position(),
                        )),
                        Terminator::Bracket { open } => Err(ParseError::malformed(
                            "[",
                            "optional argument is never closed",
                            open,
                        )),
                        Terminator::Environment { name, open } => {
                            Err(LexError::UnterminatedEnvironment { name, pos: open }.into())
                        }
                    };
                }
            };

            if let Terminator::Bracket { .. } = term {
                if token.is_close_bracket() {
                    Self::flush_text(&mut text, &mut nodes);
                    return Ok((nodes, token.pos));
                }
            }

            match token.kind {
                TokenKind::TextRun(s) => text.push_str(&s),
                TokenKind::Comment(_) => {}
                TokenKind::MacroName(name) => {
                    Self::flush_text(&mut text, &mut nodes);
                    nodes.push(self.parse_macro(&name, token.pos)?);
                }
                TokenKind::BeginGroup => {
                    Self::flush_text(&mut text, &mut nodes);
                    let (inner, _) =
                        self.nested(token.pos, |p| p.parse_nodes(Terminator::Group))?;
                    nodes.push(Node::Group(inner));
                }
                TokenKind::EndGroup => {
                    if let Terminator::Group = term {
                        Self::flush_text(&mut text, &mut nodes);
                        return Ok((nodes, token.pos));
                    }
                    return Err(ParseError::malformed(
                        "}",
                        "closing brace without an open group",
                        token.pos,
                    ));
                }
                TokenKind::MathInlineDelim { open: true } => {
                    Self::flush_text(&mut text, &mut nodes);
                    nodes.push(self.parse_math(None, false, token.pos)?);
                }
                TokenKind::MathDisplayDelim { open: true } => {
                    Self::flush_text(&mut text, &mut nodes);
                    nodes.push(self.parse_math(None, true, token.pos)?);
                }
                TokenKind::EnvironmentBegin(name) => {
                    Self::flush_text(&mut text, &mut nodes);
                    nodes.push(self.parse_environment(name, token.pos)?);
                }
                TokenKind::EnvironmentEnd(name) => {
                    return match term {
                        Terminator::Environment {
                            name: expected,
                            open,
                        } => {
                            if name == expected {
                                Self::flush_text(&mut text, &mut nodes);
                                Ok((nodes, token.pos))
                            } else {
                                Err(ParseError::MismatchedEnvironment {
                                    expected,
                                    found: name,
                                    opened: open,
                                    pos: token.pos,
                                })
                            }
                        }
                        _ => Err(ParseError::malformed(
                            "end",
                            format!("\\end{{{}}} without a matching \\begin", name),
                            token.pos,
                        )),
                    };
                }
                TokenKind::MathInlineDelim { open: false }
                | TokenKind::MathDisplayDelim { open: false }
                | TokenKind::Verbatim(_) => {
                    return Err(ParseError::malformed(
                        &token.kind.to_string(),
                        "unexpected token",
                        token.pos,
                    ));
                }
            }
        }
    }

    // =========================================================================
    // Macros and arguments
    // =========================================================================

    fn parse_macro(&mut self, name: &str, pos: Position) -> Result<Node, ParseError> {
        if name == "begin" || name == "end" {
            return Err(ParseError::malformed(
                name,
                "expected an environment name in braces",
                pos,
            ));
        }
        let catalogue = self.catalogue;
        let spec = catalogue
            .lookup_macro(name)
            .ok_or_else(|| ParseError::UnknownMacro {
                name: name.to_string(),
                pos,
            })?;

        if let MacroAction::Item = spec.action {
            if self.scopes.last() != Some(&true) {
                return Err(ParseError::malformed(
                    name,
                    "\\item can only appear directly inside a list environment",
                    pos,
                ));
            }
        }

        let delimited_raw = matches!(spec.action, MacroAction::InlineVerbatim { .. });
        let args = self.parse_arguments(name, &spec.arguments, delimited_raw, pos)?;

        if let MacroAction::Constant(text) = &spec.action {
            return Ok(Node::Text(text.clone()));
        }
        if let MacroAction::Cite = spec.action {
            Self::check_cite_arguments(name, &args, pos)?;
        }

        Ok(Node::Macro(MacroNode {
            name: name.to_string(),
            args,
            pos,
        }))
    }

    /// `\cite[extra]{keys}`: at least one key, and `extra` only with a
    /// single key.
    fn check_cite_arguments(
        name: &str,
        args: &[Option<Argument>],
        pos: Position,
    ) -> Result<(), ParseError> {
        let keys = args
            .get(1)
            .and_then(Option::as_ref)
            .map(|a| parse_cite_keys(&a.verbatim))
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(ParseError::malformed(name, "expected at least one citation key", pos));
        }
        if keys.len() > 1 && args.first().map_or(false, Option::is_some) {
            return Err(ParseError::malformed(
                name,
                "an optional note can only be given with a single citation key",
                pos,
            ));
        }
        Ok(())
    }

    fn parse_arguments(
        &mut self,
        name: &str,
        specs: &[ArgSpec],
        delimited_raw: bool,
        pos: Position,
    ) -> Result<Vec<Option<Argument>>, ParseError> {
        let mut args = Vec::with_capacity(specs.len());
        for spec in specs {
            if *spec != ArgSpec::Star {
                self.lexer.skip_arg_spaces();
            }
            let arg = match spec {
                ArgSpec::Star => self.lexer.eat_char('*').then(Argument::star),
                ArgSpec::Optional => {
                    if self.lexer.peek_char() == Some('[') {
                        Some(self.parse_bracket_argument(pos)?)
                    } else {
                        None
                    }
                }
                ArgSpec::RawOptional => {
                    if self.lexer.peek_char() == Some('[') {
                        Some(Argument::raw(
                            self.lexer.read_raw_optional()?,
                            Delimiter::Bracket,
                        ))
                    } else {
                        None
                    }
                }
                ArgSpec::Raw => Some(self.parse_raw_argument(name, delimited_raw, pos)?),
                ArgSpec::Mandatory => Some(self.parse_mandatory_argument(name, pos)?),
            };
            args.push(arg);
        }
        Ok(args)
    }

    fn parse_bracket_argument(&mut self, pos: Position) -> Result<Argument, ParseError> {
        let open = match self.next_token()? {
            Some(token) => token.pos,
            None => return Err(ParseError::malformed("[", "missing optional argument", pos)),
        };
        let (nodes, end) =
            self.nested(open, |p| p.parse_nodes(Terminator::Bracket { open }))?;
        let verbatim = self.source_between(open.offset + 1, end.offset);
        Ok(Argument::parsed(nodes, verbatim, Delimiter::Bracket))
    }

    fn parse_raw_argument(
        &mut self,
        name: &str,
        delimited_raw: bool,
        pos: Position,
    ) -> Result<Argument, ParseError> {
        match self.lexer.peek_char() {
            Some('{') => Ok(Argument::raw(self.lexer.read_raw_group()?, Delimiter::Brace)),
            None | Some('}') => Err(ParseError::malformed(name, "missing argument", pos)),
            Some(_) if delimited_raw => Ok(Argument::raw(
                self.lexer.read_raw_delimited()?,
                Delimiter::Bare,
            )),
            Some(_) => match self.lexer.read_char() {
                Some((c, _)) => Ok(Argument::raw(c.to_string(), Delimiter::Bare)),
                None => Err(ParseError::malformed(name, "missing argument", pos)),
            },
        }
    }

    fn parse_mandatory_argument(
        &mut self,
        name: &str,
        pos: Position,
    ) -> Result<Argument, ParseError> {
        match self.lexer.peek_char() {
            Some('{') => {
                let open = match self.next_token()? {
                    Some(token) => token.pos,
                    None => return Err(ParseError::malformed(name, "missing argument", pos)),
                };
                let (nodes, end) = self.nested(open, |p| p.parse_nodes(Terminator::Group))?;
                let verbatim = self.source_between(open.offset + 1, end.offset);
                Ok(Argument::parsed(nodes, verbatim, Delimiter::Brace))
            }
            None | Some('}') | Some(']') | Some('%') => {
                Err(ParseError::malformed(name, "missing argument", pos))
            }
            Some('\\') | Some('$') => {
                let start = self.lexer.offset();
                let token = match self.next_token()? {
                    Some(token) => token,
                    None => return Err(ParseError::malformed(name, "missing argument", pos)),
                };
                let node = match token.kind {
                    TokenKind::MacroName(inner) => {
                        self.nested(token.pos, |p| p.parse_macro(&inner, token.pos))?
                    }
                    TokenKind::MathInlineDelim { open: true } => {
                        self.parse_math(None, false, token.pos)?
                    }
                    TokenKind::MathDisplayDelim { open: true } => {
                        self.parse_math(None, true, token.pos)?
                    }
                    _ => {
                        return Err(ParseError::malformed(
                            name,
                            "argument must be a group or a single token",
                            token.pos,
                        ))
                    }
                };
                let verbatim = self.source_between(start, self.lexer.offset());
                Ok(Argument::parsed(vec![node], verbatim, Delimiter::Bare))
            }
            Some(_) => match self.lexer.read_char() {
                Some((c, _)) => Ok(Argument::parsed(
                    vec![Node::Text(c.to_string())],
                    c.to_string(),
                    Delimiter::Bare,
                )),
                None => Err(ParseError::malformed(name, "missing argument", pos)),
            },
        }
    }

    // =========================================================================
    // Environments
    // =========================================================================

    fn parse_environment(&mut self, name: String, pos: Position) -> Result<Node, ParseError> {
        let catalogue = self.catalogue;
        let spec = catalogue
            .lookup_environment(&name)
            .ok_or_else(|| ParseError::UnknownEnvironment {
                name: name.clone(),
                pos,
            })?;

        if spec.is_math() {
            return self.parse_math(Some(name), true, pos);
        }

        let args = self.parse_arguments(&name, &spec.arguments, false, pos)?;

        if spec.verbatim {
            let body = match self.next_token()? {
                Some(Token {
                    kind: TokenKind::Verbatim(body),
                    ..
                }) => body,
                _ => {
                    return Err(LexError::UnterminatedVerbatim { name, pos }.into());
                }
            };
            match self.next_token()? {
                Some(Token {
                    kind: TokenKind::EnvironmentEnd(end),
                    ..
                }) if end == name => {}
                _ => return Err(LexError::UnterminatedVerbatim { name, pos }.into()),
            }
            return Ok(Node::Environment(EnvironmentNode {
                name,
                args,
                body: Body::Verbatim(body),
                pos,
            }));
        }

        let is_list = spec.is_list();
        let (nodes, _) = self.nested(pos, |p| {
            p.scopes.push(is_list);
            let parsed = p.parse_nodes(Terminator::Environment {
                name: name.clone(),
                open: pos,
            });
            p.scopes.pop();
            parsed
        })?;

        let body = if is_list {
            Body::Items(self.split_items(&name, nodes, pos)?)
        } else {
            Body::Nodes(nodes)
        };

        Ok(Node::Environment(EnvironmentNode {
            name,
            args,
            body,
            pos,
        }))
    }

    /// Split a list body into entries at each `\item`.
    fn split_items(
        &mut self,
        env: &str,
        nodes: Vec<Node>,
        pos: Position,
    ) -> Result<Vec<ListItem>, ParseError> {
        let mut items: Vec<ListItem> = Vec::new();
        for node in nodes {
            match node {
                Node::Macro(m) if self.is_item_macro(&m.name) => {
                    items.push(ListItem {
                        tag: m.args.into_iter().next().flatten(),
                        content: Vec::new(),
                        pos: m.pos,
                    });
                }
                other => match items.last_mut() {
                    Some(item) => item.content.push(other),
                    None if other.is_whitespace() || other == Node::ParagraphBreak => {}
                    None => {
                        return Err(ParseError::malformed(
                            env,
                            "content before the first \\item",
                            other.position().unwrap_or(pos),
                        ))
                    }
                },
            }
        }

        if items.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                "empty-list",
                format!("environment '{}' has no \\item", env),
                pos,
            ));
        }
        for item in &items {
            if item
                .content
                .iter()
                .all(|n| n.is_whitespace() || *n == Node::ParagraphBreak)
            {
                self.diagnostics.push(Diagnostic::new(
                    "empty-item",
                    "list item has no content",
                    item.pos,
                ));
            }
        }
        Ok(items)
    }

    fn is_item_macro(&self, name: &str) -> bool {
        self.catalogue
            .lookup_macro(name)
            .is_some_and(|spec| spec.action == MacroAction::Item)
    }

    // =========================================================================
    // Math
    // =========================================================================

    /// Parse a math region whose opening delimiter was already consumed.
    fn parse_math(
        &mut self,
        env: Option<String>,
        display: bool,
        open: Position,
    ) -> Result<Node, ParseError> {
        let mut lines = vec![EquationLine::default()];
        let mut inner_envs = 0usize;

        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None => {
                    return Err(LexError::UnterminatedMath {
                        delimiter: env.clone().unwrap_or_default(),
                        pos: open,
                    }
                    .into())
                }
            };
            let current = lines.len() - 1;
            let line = &mut lines[current];

            match token.kind {
                TokenKind::TextRun(s) => push_math_text(&mut line.nodes, &s),
                TokenKind::Comment(_) => {}
                TokenKind::BeginGroup => {
                    let group = self.nested(token.pos, |p| p.parse_math_group())?;
                    line.nodes.push(Node::Group(group));
                }
                TokenKind::MacroName(name) if display => match name.as_str() {
                    "label" => {
                        self.lexer.skip_arg_spaces();
                        if self.lexer.peek_char() != Some('{') {
                            return Err(ParseError::malformed(
                                "label",
                                "expected {label}",
                                token.pos,
                            ));
                        }
                        let label = self.lexer.read_raw_group()?.trim().to_string();
                        line.labels.push(label);
                    }
                    "tag" => {
                        let star = self.lexer.eat_char('*');
                        self.lexer.skip_arg_spaces();
                        if self.lexer.peek_char() != Some('{') {
                            return Err(ParseError::malformed("tag", "expected {tag}", token.pos));
                        }
                        let tag = self.lexer.read_raw_group()?;
                        line.tag = Some(if star { tag } else { format!("({})", tag) });
                    }
                    "nonumber" | "notag" => line.nonumber = true,
                    "\\" if inner_envs == 0 => lines.push(EquationLine::default()),
                    _ => push_math_text(&mut line.nodes, &format!("\\{}", name)),
                },
                TokenKind::MacroName(name) if name == "label" || name == "tag" => {
                    return Err(ParseError::malformed(
                        &name,
                        format!("\\{} is only allowed in display math", name),
                        token.pos,
                    ));
                }
                TokenKind::MacroName(name) => {
                    push_math_text(&mut line.nodes, &format!("\\{}", name))
                }
                TokenKind::EnvironmentBegin(name) => {
                    inner_envs += 1;
                    push_math_text(&mut line.nodes, &format!("\\begin{{{}}}", name));
                }
                TokenKind::EnvironmentEnd(name) if inner_envs > 0 => {
                    inner_envs -= 1;
                    push_math_text(&mut line.nodes, &format!("\\end{{{}}}", name));
                }
                TokenKind::EnvironmentEnd(name) => {
                    if env.as_deref() == Some(name.as_str()) {
                        break;
                    }
                    return Err(ParseError::MismatchedEnvironment {
                        expected: env.clone().unwrap_or_else(|| "math".to_string()),
                        found: name,
                        opened: open,
                        pos: token.pos,
                    });
                }
                TokenKind::MathInlineDelim { open: false } if env.is_none() && !display => break,
                TokenKind::MathDisplayDelim { open: false } if env.is_none() && display => break,
                other => {
                    return Err(ParseError::malformed(
                        &other.to_string(),
                        "unexpected token in math",
                        token.pos,
                    ))
                }
            }
        }

        // `a \\ b \\` has no third line
        if lines.len() > 1 {
            if let Some(last) = lines.last() {
                if last.labels.is_empty()
                    && last.tag.is_none()
                    && last.nodes.iter().all(Node::is_whitespace)
                {
                    lines.pop();
                }
            }
        }

        for line in &lines {
            if line.nonumber && (!line.labels.is_empty() || line.tag.is_some()) {
                return Err(ParseError::malformed(
                    "nonumber",
                    "\\nonumber cannot be combined with \\label or \\tag on the same line",
                    open,
                ));
            }
        }

        let math = MathNode {
            env,
            lines,
            pos: open,
        };
        Ok(if display {
            Node::MathDisplay(math)
        } else {
            Node::MathInline(math)
        })
    }

    fn parse_math_group(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None => {
                    return Err(ParseError::malformed(
                        "{",
                        "group is never closed",
                        self.lexer.position(),
                    ))
                }
            };
            match token.kind {
                TokenKind::EndGroup => return Ok(nodes),
                TokenKind::BeginGroup => {
                    let group = self.nested(token.pos, |p| p.parse_math_group())?;
                    nodes.push(Node::Group(group));
                }
                TokenKind::Comment(_) => {}
                other => push_math_text(&mut nodes, &other.to_string()),
            }
        }
    }
}

/// Append math source, merging with a preceding text node.
fn push_math_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::DEFAULT_CATALOGUE;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Result<Fragment, ParseError> {
        parse_fragment(input, "test", &DEFAULT_CATALOGUE, DEFAULT_MAX_NESTING_DEPTH)
    }

    fn nodes(input: &str) -> Vec<Node> {
        parse(input).expect("parse").nodes
    }

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(nodes("a  b\nc"), vec![text("a b c")]);
        assert_eq!(
            nodes("a\n  \n\nb"),
            vec![text("a"), Node::ParagraphBreak, text("b")]
        );
    }

    #[test]
    fn test_macro_with_mandatory_argument() {
        let parsed = nodes(r"a \textbf{b} c");
        assert_eq!(parsed.len(), 3);
        match &parsed[1] {
            Node::Macro(m) => {
                assert_eq!(m.name, "textbf");
                assert_eq!(m.arg(0).map(|a| a.verbatim.as_str()), Some("b"));
                assert_eq!(m.pos, Position::new(2, 1, 3));
            }
            other => panic!("expected macro, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_argument() {
        match &nodes(r"\emph xyz")[0] {
            Node::Macro(m) => assert_eq!(m.arg(0).map(|a| a.nodes.clone()), Some(vec![text("x")])),
            other => panic!("expected macro, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_argument_only_when_bracket_follows() {
        let parsed = nodes(r"\section*[Short]{Long title} text");
        match &parsed[0] {
            Node::Macro(m) => {
                assert!(m.has_arg(0));
                assert_eq!(m.arg(1).map(|a| a.verbatim.as_str()), Some("Short"));
                assert_eq!(m.arg(2).map(|a| a.verbatim.as_str()), Some("Long title"));
            }
            other => panic!("expected macro, got {:?}", other),
        }
        match &nodes(r"\section{Title}")[0] {
            Node::Macro(m) => {
                assert!(!m.has_arg(0));
                assert!(!m.has_arg(1));
            }
            other => panic!("expected macro, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_expands_to_text() {
        assert_eq!(nodes(r"50\% off"), vec![text("50"), text("%"), text(" off")]);
    }

    #[test]
    fn test_unknown_macro() {
        let err = parse(r"x \notarealmacro{x}").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownMacro {
                name: "notarealmacro".to_string(),
                pos: Position::new(2, 1, 3),
            }
        );
    }

    #[test]
    fn test_unknown_environment() {
        let err = parse("\\begin{nope}x\\end{nope}").unwrap_err();
        assert!(matches!(err, ParseError::UnknownEnvironment { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_mismatched_environment() {
        let err = parse("\\begin{itemize}\\item a\\end{enumerate}").unwrap_err();
        match err {
            ParseError::MismatchedEnvironment {
                expected,
                found,
                opened,
                ..
            } => {
                assert_eq!(expected, "itemize");
                assert_eq!(found, "enumerate");
                assert_eq!(opened, Position::start());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_environment_reports_opening() {
        let err = parse("intro\n\\begin{itemize}\n\\item a\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::Lex(LexError::UnterminatedEnvironment {
                name: "itemize".to_string(),
                pos: Position::new(6, 2, 1),
            })
        );
    }

    #[test]
    fn test_list_items() {
        let parsed = nodes("\\begin{enumerate}[(a.)]\n  \\item One\n  \\item[x] Two\n\\end{enumerate}");
        match &parsed[0] {
            Node::Environment(env) => {
                assert_eq!(env.arg(0).map(|a| a.verbatim.as_str()), Some("(a.)"));
                match &env.body {
                    Body::Items(items) => {
                        assert_eq!(items.len(), 2);
                        assert!(items[0].tag.is_none());
                        assert_eq!(items[0].content, vec![text("One ")]);
                        assert_eq!(items[1].tag.as_ref().map(|t| t.verbatim.as_str()), Some("x"));
                        assert_eq!(items[1].content, vec![text(" Two ")]);
                    }
                    other => panic!("expected items, got {:?}", other),
                }
            }
            other => panic!("expected environment, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_lists() {
        let parsed = nodes(
            "\\begin{itemize}\\item a \\begin{itemize}\\item b\\end{itemize}\\end{itemize}",
        );
        let Node::Environment(outer) = &parsed[0] else {
            panic!("expected environment");
        };
        let Body::Items(items) = &outer.body else {
            panic!("expected items");
        };
        assert!(items[0]
            .content
            .iter()
            .any(|n| matches!(n, Node::Environment(e) if e.name == "itemize")));
    }

    #[test]
    fn test_content_before_first_item() {
        let err = parse("\\begin{itemize} stray \\item a\\end{itemize}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { .. }));
    }

    #[test]
    fn test_item_outside_list() {
        let err = parse("\\item a").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "item"));
    }

    #[test]
    fn test_item_inside_group_in_list() {
        let err = parse("\\begin{itemize}\\item a {\\item b}\\end{itemize}").unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedArguments {
                name: "item".to_string(),
                message: "\\item can only appear directly inside a list environment".to_string(),
                pos: Position::new(24, 1, 25),
            }
        );
        let err = parse("\\begin{itemize}\\item \\textbf{\\item x}\\end{itemize}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "item"));
        let err = parse("\\begin{itemize}\\item \\textbf\\item\\end{itemize}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "item"));
    }

    #[test]
    fn test_item_in_nested_list_inside_group() {
        let parsed = nodes(
            "\\begin{itemize}\\item {\\begin{enumerate}\\item b\\end{enumerate}}\\end{itemize}",
        );
        assert!(matches!(&parsed[0], Node::Environment(e) if e.name == "itemize"));
    }

    #[test]
    fn test_empty_list_diagnostic() {
        let fragment = parse("\\begin{itemize}\n\\end{itemize}").expect("parse");
        assert_eq!(fragment.diagnostics.len(), 1);
        assert_eq!(fragment.diagnostics[0].kind, "empty-list");
    }

    #[test]
    fn test_display_math_lines() {
        let parsed = nodes(
            "\\begin{align}a &= b \\label{eq:one}\\\\ c &= d \\nonumber\\\\ e \\tag{*}\\end{align}",
        );
        let Node::MathDisplay(math) = &parsed[0] else {
            panic!("expected display math");
        };
        assert_eq!(math.env.as_deref(), Some("align"));
        assert_eq!(math.lines.len(), 3);
        assert_eq!(math.lines[0].labels, vec!["eq:one".to_string()]);
        assert!(math.lines[1].nonumber);
        assert_eq!(math.lines[2].tag.as_deref(), Some("(*)"));
        assert_eq!(math.label(), Some("eq:one"));
        assert_eq!(math.latex(), "a &= b \\\\ c &= d \\\\ e ");
    }

    #[test]
    fn test_math_keeps_source() {
        let parsed = nodes(r"see \(\frac{a}{b} + \alpha x\)");
        let Node::MathInline(math) = &parsed[1] else {
            panic!("expected inline math");
        };
        assert_eq!(math.latex(), r"\frac{a}{b} + \alpha x");
    }

    #[test]
    fn test_nonumber_with_label_is_rejected() {
        let err = parse("\\begin{equation}x \\label{eq:a}\\nonumber\\end{equation}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { .. }));
    }

    #[test]
    fn test_label_in_inline_math_is_rejected() {
        let err = parse(r"\(x\label{q}\)").unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedArguments {
                name: "label".to_string(),
                message: "\\label is only allowed in display math".to_string(),
                pos: Position::new(3, 1, 4),
            }
        );
        let err = parse(r"$x \tag{1}$").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "tag"));
    }

    #[test]
    fn test_cite_arguments() {
        match &nodes(r"\cite[p.~2]{ arXiv:1234 }")[0] {
            Node::Macro(m) => {
                assert!(m.has_arg(0));
                assert_eq!(m.arg(1).map(|a| a.verbatim.as_str()), Some(" arXiv:1234 "));
            }
            other => panic!("expected macro, got {:?}", other),
        }
        let err = parse(r"\cite[p.~2]{a,b}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "cite"));
        let err = parse(r"\cite{ , }").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "cite"));
    }

    #[test]
    fn test_double_backslash_outside_math_is_unknown() {
        let err = parse(r"a \\ b").unwrap_err();
        assert!(matches!(err, ParseError::UnknownMacro { ref name, .. } if name == "\\"));
    }

    #[test]
    fn test_verbatim_environment() {
        let parsed = nodes("\\begin{verbatimcode}\\notamacro{  x }\\end{verbatimcode}");
        match &parsed[0] {
            Node::Environment(env) => {
                assert_eq!(env.body, Body::Verbatim("\\notamacro{  x }".to_string()))
            }
            other => panic!("expected environment, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_verbatim_with_delimiter() {
        match &nodes(r"\verbcode+\x{+")[0] {
            Node::Macro(m) => assert_eq!(m.arg(0).map(|a| a.verbatim.as_str()), Some("\\x{")),
            other => panic!("expected macro, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_too_deep() {
        let input = format!("{}x{}", "{".repeat(10), "}".repeat(10));
        let err = parse_fragment(&input, "deep", &DEFAULT_CATALOGUE, 5).unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { limit: 5, .. }));
        assert!(parse_fragment(&input, "deep", &DEFAULT_CATALOGUE, 10).is_ok());
    }

    #[test]
    fn test_stray_closing_brace() {
        let err = parse("a } b").unwrap_err();
        assert!(matches!(err, ParseError::MalformedArguments { ref name, .. } if name == "}"));
    }
}
