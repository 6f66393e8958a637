//! Tree walker
//!
//! Pass 2: turns a parsed fragment into renderer calls. Block-level nodes
//! (non-math environments, display math and headings of level 1-3) split the
//! content into paragraphs; content without any block-level node or blank
//! line is rendered inline, without a paragraph wrapper.

use flm_ir::{nodes_to_source, Body, EnvironmentNode, ListItem, MacroNode, MathNode, Node, Position};

use super::{
    FloatInfo, HeadingInfo, LinkKind, ListInfo, MathInfo, MathLine, RenderContext,
    RenderedEndnote, RenderedEndnoteGroup, RenderedItem, Renderer,
};
use crate::core::catalogue::{EnvironmentAction, ListKind, MacroAction};
use crate::core::counter::CounterFormatter;
use crate::features::endnotes::{parse_cite_keys, Citation, EndnotesOptions, FootnotePlacement, HeadingRef};
use crate::features::{DefTermManager, EndnotesManager, NodeKey, RefsManager};
use crate::features::refs::HeadingNumbering;
use crate::utils::error::{FlmError, FlmResult, ParseError};

/// Highest heading level rendered as a block.
pub const MAX_BLOCK_HEADING_LEVEL: u8 = 3;

pub struct Walker<'r, 'd, R: Renderer> {
    renderer: &'r R,
    ctx: &'r RenderContext<'d>,
}

impl<'r, 'd, R: Renderer> Walker<'r, 'd, R> {
    pub fn new(renderer: &'r R, ctx: &'r RenderContext<'d>) -> Self {
        Self { renderer, ctx }
    }

    // =========================================================================
    // Flow and paragraphs
    // =========================================================================

    /// Render a sequence of nodes that may contain blocks.
    pub fn render_flow(&self, nodes: &[Node]) -> FlmResult<R::Output> {
        if !self.has_blocks(nodes) {
            return self.render_trimmed(nodes);
        }

        let mut blocks = Vec::new();
        let mut paragraph: Vec<&Node> = Vec::new();
        for node in nodes {
            if matches!(node, Node::ParagraphBreak) {
                self.flush_paragraph(&mut paragraph, &mut blocks)?;
            } else if self.is_block(node) {
                self.flush_paragraph(&mut paragraph, &mut blocks)?;
                let block = self.render_node(node)?;
                if !self.renderer.is_empty(&block) {
                    blocks.push(block);
                }
            } else {
                paragraph.push(node);
            }
        }
        self.flush_paragraph(&mut paragraph, &mut blocks)?;
        Ok(self.renderer.join_blocks(blocks))
    }

    fn flush_paragraph(
        &self,
        paragraph: &mut Vec<&Node>,
        blocks: &mut Vec<R::Output>,
    ) -> FlmResult<()> {
        if paragraph.is_empty() {
            return Ok(());
        }
        let nodes: Vec<Node> = paragraph.drain(..).cloned().collect();
        let content = self.render_trimmed(&nodes)?;
        if !self.renderer.is_empty(&content) {
            blocks.push(self.renderer.render_paragraph(content));
        }
        Ok(())
    }

    /// Render inline content without its leading and trailing spaces.
    pub fn render_trimmed(&self, nodes: &[Node]) -> FlmResult<R::Output> {
        let nodes = trim_edges(nodes);
        let last = nodes.len().saturating_sub(1);
        let parts = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| match node {
                Node::Text(text) => {
                    let mut text = text.as_str();
                    if i == 0 {
                        text = text.trim_start_matches(is_space);
                    }
                    if i == last {
                        text = text.trim_end_matches(is_space);
                    }
                    Ok(self.renderer.render_value(text))
                }
                _ => self.render_node(node),
            })
            .collect::<FlmResult<Vec<_>>>()?;
        Ok(self.renderer.join(parts))
    }

    /// Render inline content as is.
    pub fn render_inline(&self, nodes: &[Node]) -> FlmResult<R::Output> {
        let parts = nodes
            .iter()
            .map(|node| self.render_node(node))
            .collect::<FlmResult<Vec<_>>>()?;
        Ok(self.renderer.join(parts))
    }

    fn has_blocks(&self, nodes: &[Node]) -> bool {
        nodes
            .iter()
            .any(|n| matches!(n, Node::ParagraphBreak) || self.is_block(n))
    }

    fn is_block(&self, node: &Node) -> bool {
        match node {
            Node::Environment(_) | Node::MathDisplay(_) => true,
            Node::Macro(m) => matches!(
                self.ctx.catalogue.lookup_macro(&m.name).map(|s| &s.action),
                Some(MacroAction::Heading { level }) if *level <= MAX_BLOCK_HEADING_LEVEL
            ),
            _ => false,
        }
    }

    fn key(&self, pos: Position) -> NodeKey {
        NodeKey::new(self.ctx.fragment(), pos.offset)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    fn render_node(&self, node: &Node) -> FlmResult<R::Output> {
        match node {
            Node::Text(text) => Ok(self.renderer.render_value(text)),
            Node::Group(nodes) => {
                if self.has_blocks(nodes) {
                    self.render_flow(nodes)
                } else {
                    self.render_inline(nodes)
                }
            }
            Node::Macro(m) => self.render_macro(m),
            Node::Environment(env) => self.render_environment(env),
            Node::MathInline(math) => self.render_math(math, false),
            Node::MathDisplay(math) => self.render_math(math, true),
            // Blocks are split off before this point; a break left inside
            // inline content separates words
            Node::ParagraphBreak => Ok(self.renderer.render_value(" ")),
        }
    }

    fn render_macro(&self, m: &MacroNode) -> FlmResult<R::Output> {
        let spec = self.ctx.catalogue.lookup_macro(&m.name).ok_or_else(|| {
            ParseError::UnknownMacro {
                name: m.name.clone(),
                pos: m.pos,
            }
        })?;
        let r = self.renderer;

        match &spec.action {
            MacroAction::TextFormat(format) => {
                let content = self.render_inline(arg_nodes(m, 0))?;
                Ok(r.render_text_format(*format, content))
            }
            MacroAction::Heading { level } => self.render_heading(m, *level),
            MacroAction::Item | MacroAction::Label => Ok(r.render_nothing()),
            MacroAction::Ref | MacroAction::EqRef => {
                let name = arg_text(m, 0);
                let label = self.refs()?.resolve(name, m.pos)?;
                let display = if spec.action == MacroAction::EqRef {
                    label.eqref_text()
                } else {
                    label.ref_text()
                };
                Ok(r.render_link(
                    LinkKind::Ref,
                    &format!("#{}", label.target_id),
                    r.render_value(&display),
                ))
            }
            MacroAction::HyperRef => {
                let display = self.render_inline(arg_nodes(m, 1))?;
                match m.arg(0) {
                    Some(arg) => {
                        let label = self.refs()?.resolve(arg.verbatim.trim(), m.pos)?;
                        Ok(r.render_link(LinkKind::Ref, &format!("#{}", label.target_id), display))
                    }
                    None => Ok(display),
                }
            }
            MacroAction::Footnote => {
                let note = self.endnotes()?.get(self.key(m.pos)).ok_or_else(|| {
                    FlmError::State(format!("footnote at {} was not registered", m.pos))
                })?;
                match note.placement {
                    FootnotePlacement::Endnote => Ok(r.render_footnote_mark(note)),
                    FootnotePlacement::Inline => {
                        let body = self.render_flow(&note.body)?;
                        Ok(r.render_footnote_inline(note, body))
                    }
                }
            }
            MacroAction::Caption => self.render_trimmed(arg_nodes(m, 0)),
            MacroAction::IncludeGraphics => Ok(r.render_graphics(
                arg_text(m, 1),
                m.arg(0).map(|a| a.verbatim.trim()),
            )),
            MacroAction::Term => {
                let source = m.arg(0).or_else(|| m.arg(1)).map(|a| a.verbatim.as_str()).unwrap_or("");
                let label = self.defterms()?.lookup_term(source, m.pos)?;
                let display = self.render_inline(arg_nodes(m, 1))?;
                Ok(r.render_link(LinkKind::Term, &format!("#{}", label.target_id), display))
            }
            MacroAction::Href => {
                let display = self.render_inline(arg_nodes(m, 1))?;
                Ok(r.render_link(LinkKind::External, arg_text(m, 0), display))
            }
            MacroAction::Url => {
                let url = arg_text(m, 0);
                Ok(r.render_link(LinkKind::External, url, r.render_value(url)))
            }
            MacroAction::InlineVerbatim { code } => {
                let text = m.arg(0).map(|a| a.verbatim.as_str()).unwrap_or("");
                Ok(r.render_verbatim(text, *code, false))
            }
            MacroAction::Cite => self.render_cite(m),
            MacroAction::Constant(text) => Ok(r.render_value(text)),
        }
    }

    /// `[1,2]`, `[1–3,5]` with one link per number, or `[1; p. 2]` with an
    /// optional note.
    fn render_cite(&self, m: &MacroNode) -> FlmResult<R::Output> {
        let manager = self.endnotes()?;
        let mut citations = parse_cite_keys(arg_text(m, 1))
            .iter()
            .map(|key| {
                manager.citation(key).ok_or_else(|| {
                    FlmError::State(format!("citation '{}' at {} was not registered", key, m.pos))
                })
            })
            .collect::<FlmResult<Vec<&Citation>>>()?;
        let r = self.renderer;
        let link = |c: &Citation, display: R::Output| {
            r.render_link(LinkKind::Citation, &format!("#{}", c.target_id()), display)
        };

        if let (Some(extra), [citation]) = (m.arg(0), citations.as_slice()) {
            let display = r.join(vec![
                r.render_value(&format!("[{}; ", citation.marker)),
                self.render_trimmed(&extra.nodes)?,
                r.render_value("]"),
            ]);
            return Ok(link(*citation, display));
        }

        citations.sort_by_key(|c| c.number);
        citations.dedup_by_key(|c| c.number);
        let mut parts = vec![r.render_value("[")];
        for (i, run) in consecutive_runs(&citations).into_iter().enumerate() {
            if i > 0 {
                parts.push(r.render_value(","));
            }
            let (first, last) = (run[0], run[run.len() - 1]);
            parts.push(link(first, r.render_value(&first.marker)));
            match run.len() {
                1 => {}
                2 => parts.push(r.render_value(",")),
                _ => parts.push(r.render_value("–")),
            }
            if run.len() > 1 {
                parts.push(link(last, r.render_value(&last.marker)));
            }
        }
        parts.push(r.render_value("]"));
        Ok(r.join(parts))
    }

    fn render_heading(&self, m: &MacroNode, level: u8) -> FlmResult<R::Output> {
        let anchor = self.refs()?.anchor(self.key(m.pos), 0);
        let number = match (self.ctx.config.heading_numbering, anchor) {
            (HeadingNumbering::Hierarchical { max_level }, Some(anchor))
                if !m.has_arg(0) && level <= max_level =>
            {
                Some(anchor.display.as_str())
            }
            _ => None,
        };
        let info = HeadingInfo {
            level,
            number,
            target_id: anchor.map(|a| a.target_id.as_str()),
            inline: level > MAX_BLOCK_HEADING_LEVEL,
        };
        let title = self.render_trimmed(arg_nodes(m, 2))?;
        Ok(self.renderer.render_heading(&info, title))
    }

    fn render_environment(&self, env: &EnvironmentNode) -> FlmResult<R::Output> {
        let spec = self.ctx.catalogue.lookup_environment(&env.name).ok_or_else(|| {
            ParseError::UnknownEnvironment {
                name: env.name.clone(),
                pos: env.pos,
            }
        })?;
        let r = self.renderer;

        match (&spec.action, &env.body) {
            (EnvironmentAction::List(kind), Body::Items(items)) => {
                self.render_list(*kind, env, items)
            }
            (EnvironmentAction::Float(kind), Body::Nodes(nodes)) => {
                let refs = self.refs()?;
                let anchor = refs.anchor(self.key(env.pos), 0).ok_or_else(|| {
                    FlmError::State(format!("{} at {} was not registered", kind.as_str(), env.pos))
                })?;
                let mut caption = None;
                let mut content = Vec::new();
                for node in nodes {
                    match node {
                        Node::Macro(m) if self.is_action(m, &MacroAction::Caption) => {
                            caption = Some(self.render_macro(m)?);
                        }
                        Node::Macro(m) if self.is_action(m, &MacroAction::Label) => {}
                        _ => content.push(node.clone()),
                    }
                }
                let info = FloatInfo {
                    kind: *kind,
                    display: &anchor.display,
                    target_id: &anchor.target_id,
                };
                let content = self.render_flow(&content)?;
                Ok(r.render_float(&info, content, caption))
            }
            (EnvironmentAction::DefTerm, Body::Nodes(nodes)) => {
                let label = self.defterms()?.term_at(self.key(env.pos)).ok_or_else(|| {
                    FlmError::State(format!("defterm at {} was not registered", env.pos))
                })?;
                let term =
                    self.render_trimmed(env.arg(0).map(|a| a.nodes.as_slice()).unwrap_or(&[]))?;
                let body = self.render_flow(nodes)?;
                Ok(r.render_defterm(term, &label.target_id, body))
            }
            (EnvironmentAction::Verbatim { code }, Body::Verbatim(text)) => {
                Ok(r.render_verbatim(text, *code, true))
            }
            (_, Body::Nodes(nodes)) => {
                let content = self.render_flow(nodes)?;
                Ok(r.render_semantic_block(&env.name, content))
            }
            (_, Body::Verbatim(text)) => Ok(r.render_verbatim(text, false, true)),
            (_, Body::Items(items)) => self.render_list(ListKind::Itemize, env, items),
        }
    }

    fn render_list(
        &self,
        kind: ListKind,
        env: &EnvironmentNode,
        items: &[ListItem],
    ) -> FlmResult<R::Output> {
        let depth = self.ctx.list_depth();
        let lists = &self.ctx.config.lists;
        let template = match env.arg(0) {
            Some(arg) => arg.verbatim.trim(),
            None => match kind {
                ListKind::Itemize => lists.bullet(depth),
                ListKind::Enumerate => lists.enumerate_template(depth),
            },
        };
        let formatter = CounterFormatter::parse(template);

        let rendered = self.ctx.in_list(|| {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| -> FlmResult<RenderedItem<R::Output>> {
                    let tag = match &item.tag {
                        Some(tag) => self.render_trimmed(&tag.nodes)?,
                        None => self.renderer.render_value(&formatter.format(i as u32 + 1)),
                    };
                    let content = self.render_flow(&item.content)?;
                    Ok(RenderedItem { tag, content })
                })
                .collect::<FlmResult<Vec<_>>>()
        })?;
        Ok(self.renderer.render_list(&ListInfo { kind, depth }, rendered))
    }

    fn render_math(&self, math: &MathNode, display: bool) -> FlmResult<R::Output> {
        let key = self.key(math.pos);
        let refs = if display { Some(self.refs()?) } else { None };
        let lines = math
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let anchor = refs.and_then(|refs| refs.anchor(key, i));
                MathLine {
                    latex: nodes_to_source(&line.nodes).trim().to_string(),
                    tag: anchor.map(|a| a.display.clone()),
                    target_id: anchor.map(|a| a.target_id.clone()),
                }
            })
            .collect();
        Ok(self.renderer.render_math(&MathInfo {
            display,
            env: math.env.as_deref(),
            lines,
        }))
    }

    // =========================================================================
    // Endnotes
    // =========================================================================

    /// Render the consolidated endnote lists: footnotes first, then cited
    /// references.
    pub fn render_endnotes(&self, options: &EndnotesOptions) -> FlmResult<R::Output> {
        let footnotes = self.render_footnote_list(options)?;
        let citations = self.render_citation_list(options)?;
        Ok(self.renderer.join_blocks(vec![footnotes, citations]))
    }

    fn render_citation_list(&self, options: &EndnotesOptions) -> FlmResult<R::Output> {
        let citations = self.endnotes()?.citations();
        if citations.is_empty() {
            return Ok(self.renderer.render_nothing());
        }
        let notes = citations
            .iter()
            .map(|citation| {
                Ok(RenderedEndnote {
                    marker: citation.marker.clone(),
                    target_id: citation.target_id(),
                    body: self.render_flow(&citation.body)?,
                })
            })
            .collect::<FlmResult<Vec<_>>>()?;
        let title = options
            .citations_title
            .as_deref()
            .map(|title| (title, options.title_level));
        Ok(self.renderer.render_endnotes_list(
            "citation",
            title,
            vec![RenderedEndnoteGroup { heading: None, notes }],
        ))
    }

    fn render_footnote_list(&self, options: &EndnotesOptions) -> FlmResult<R::Output> {
        let manager = self.endnotes()?;
        let groups = manager.groups(options);
        if groups.is_empty() {
            return Ok(self.renderer.render_nothing());
        }

        let saved = self.ctx.fragment();
        let mut rendered = Vec::with_capacity(groups.len());
        for group in groups {
            let heading = match group.heading {
                Some(heading) => Some((self.render_heading_ref(heading)?, heading.level)),
                None => None,
            };
            let mut notes = Vec::with_capacity(group.notes.len());
            for note in group.notes {
                self.ctx.set_fragment(note.key.fragment);
                notes.push(RenderedEndnote {
                    marker: note.marker.clone(),
                    target_id: note.target_id(),
                    body: self.render_flow(&note.body)?,
                });
            }
            rendered.push(RenderedEndnoteGroup { heading, notes });
        }
        self.ctx.set_fragment(saved);

        let title = options
            .title
            .as_deref()
            .map(|title| (title, options.title_level));
        Ok(self.renderer.render_endnotes_list("footnote", title, rendered))
    }

    fn render_heading_ref(&self, heading: &HeadingRef) -> FlmResult<R::Output> {
        self.ctx.set_fragment(heading.key.fragment);
        let title = self.render_trimmed(&heading.title)?;
        Ok(match &heading.number {
            Some(number) => self.renderer.join(vec![
                self.renderer.render_value(&format!("{} ", number)),
                title,
            ]),
            None => title,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn is_action(&self, m: &MacroNode, action: &MacroAction) -> bool {
        self.ctx
            .catalogue
            .lookup_macro(&m.name)
            .map_or(false, |spec| &spec.action == action)
    }

    fn refs(&self) -> FlmResult<&'d RefsManager> {
        self.ctx
            .features
            .refs()
            .ok_or_else(|| missing_manager(crate::features::refs::NAME))
    }

    fn endnotes(&self) -> FlmResult<&'d EndnotesManager> {
        self.ctx
            .features
            .endnotes()
            .ok_or_else(|| missing_manager(crate::features::endnotes::NAME))
    }

    fn defterms(&self) -> FlmResult<&'d DefTermManager> {
        self.ctx
            .features
            .defterms()
            .ok_or_else(|| missing_manager(crate::features::defterm::NAME))
    }
}

fn missing_manager(name: &str) -> FlmError {
    FlmError::State(format!("feature manager '{}' is not registered", name))
}

fn arg_nodes(m: &MacroNode, index: usize) -> &[Node] {
    m.arg(index).map(|a| a.nodes.as_slice()).unwrap_or(&[])
}

fn arg_text(m: &MacroNode, index: usize) -> &str {
    m.arg(index).map(|a| a.verbatim.trim()).unwrap_or("")
}

fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

fn is_blank(node: &Node) -> bool {
    match node {
        Node::Text(text) => text.chars().all(is_space),
        Node::ParagraphBreak => true,
        _ => false,
    }
}

/// Split citations sorted by number into runs of consecutive numbers.
fn consecutive_runs<'c>(citations: &[&'c Citation]) -> Vec<Vec<&'c Citation>> {
    let mut runs: Vec<Vec<&Citation>> = Vec::new();
    for &citation in citations {
        match runs.last_mut() {
            Some(run) if run.last().map(|c| c.number + 1) == Some(citation.number) => {
                run.push(citation)
            }
            _ => runs.push(vec![citation]),
        }
    }
    runs
}

/// Drop leading and trailing blank text nodes and paragraph breaks.
/// Non-breaking spaces are kept.
pub fn trim_edges(nodes: &[Node]) -> &[Node] {
    let start = nodes.iter().position(|n| !is_blank(n)).unwrap_or(nodes.len());
    let end = nodes.iter().rposition(|n| !is_blank(n)).map_or(start, |i| i + 1);
    &nodes[start..end]
}
