//! Documents
//!
//! A [`Document`] groups fragments that share numbering, labels, footnotes
//! and terms. It moves through three states:
//!
//! - `Created`: fragments parsed, nothing registered
//! - `Registered`: pass 1 has walked every fragment and filled the feature
//!   managers
//! - `Rendered`: at least one pass 2 has run
//!
//! Managers are frozen once registered. There is no way back to `Created`;
//! build a new document to register again.

use flm_ir::{nodes_plain_text, Body, EnvironmentNode, Fragment, MacroNode, MathNode, Node};

use crate::config::Config;
use crate::core::catalogue::{Catalogue, EnvironmentAction, MacroAction};
use crate::core::parser::parse_fragment;
use crate::environment::Environment;
use crate::features::endnotes::{normalize_cite_key, parse_cite_keys, EndnotesOptions, HeadingRef};
use crate::features::refs::HeadingNumbering;
use crate::features::{Anchor, FeatureRegistry, NodeKey};
use crate::render::walker::Walker;
use crate::render::{RenderContext, Renderer};
use crate::utils::error::{FlmError, FlmResult, ResolutionError};

/// Number of heading levels tracked for endnote grouping
const HEADING_LEVELS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Created,
    Registered,
    Rendered,
}

#[derive(Debug)]
pub struct Document<'e> {
    env: &'e Environment,
    fragments: Vec<Fragment>,
    features: FeatureRegistry,
    state: DocumentState,
}

impl<'e> Document<'e> {
    pub fn new(env: &'e Environment, fragments: Vec<Fragment>) -> Self {
        Self {
            env,
            fragments,
            features: env.feature_registry(),
            state: DocumentState::Created,
        }
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    /// Pass 1: assign numbers, collect labels, footnotes and terms.
    pub fn register(&mut self) -> FlmResult<()> {
        if self.state != DocumentState::Created {
            return Err(FlmError::State(format!(
                "document is already {:?}; create a new document to register again",
                self.state
            )));
        }

        let result = {
            let mut registrar = Registrar::new(self.env.catalogue(), self.env.config(), &mut self.features);
            self.fragments
                .iter()
                .enumerate()
                .try_for_each(|(index, fragment)| registrar.register_fragment(index, fragment))
        };
        match result {
            Ok(()) => {
                log::debug!("document: registered {} fragment(s)", self.fragments.len());
                self.state = DocumentState::Registered;
                Ok(())
            }
            Err(err) => {
                self.features.reset();
                Err(err)
            }
        }
    }

    /// Pass 2: render every fragment with `renderer`, registering first if
    /// needed. Rendering again reuses the frozen managers.
    pub fn render<R: Renderer>(&mut self, renderer: &R) -> FlmResult<Rendered<'_, R::Output>> {
        if self.state == DocumentState::Created {
            self.register()?;
        }
        self.state = DocumentState::Rendered;

        let context = RenderContext::new(self.env.catalogue(), self.env.config(), &self.features);
        let walker = Walker::new(renderer, &context);
        let mut blocks = Vec::with_capacity(self.fragments.len());
        for (index, fragment) in self.fragments.iter().enumerate() {
            log::trace!("document: rendering fragment '{}' with {}", fragment.name, renderer.name());
            context.set_fragment(index);
            blocks.push(walker.render_flow(&fragment.nodes)?);
        }
        let output = renderer.join_blocks(blocks);
        Ok(Rendered { output, context })
    }
}

/// Output of [`Document::render`], with the context needed to render the
/// endnotes afterwards.
#[derive(Debug)]
pub struct Rendered<'d, O> {
    pub output: O,
    pub context: RenderContext<'d>,
}

impl<O> Rendered<'_, O> {
    /// Render the consolidated endnote list.
    pub fn render_endnotes<R: Renderer<Output = O>>(
        &self,
        renderer: &R,
        options: &EndnotesOptions,
    ) -> FlmResult<O> {
        Walker::new(renderer, &self.context).render_endnotes(options)
    }

    /// Endnotes with the options from the configuration.
    pub fn render_default_endnotes<R: Renderer<Output = O>>(&self, renderer: &R) -> FlmResult<O> {
        self.render_endnotes(renderer, &self.context.config.endnotes)
    }
}

// =============================================================================
// Pass 1
// =============================================================================

struct Registrar<'a> {
    catalogue: &'a Catalogue,
    config: &'a Config,
    features: &'a mut FeatureRegistry,
    fragment: usize,
    /// Enclosing floats and defined terms, innermost last
    referenceables: Vec<Anchor>,
    last_heading: Option<Anchor>,
    /// Innermost heading at each level
    headings: Vec<Option<HeadingRef>>,
}

impl<'a> Registrar<'a> {
    fn new(catalogue: &'a Catalogue, config: &'a Config, features: &'a mut FeatureRegistry) -> Self {
        Self {
            catalogue,
            config,
            features,
            fragment: 0,
            referenceables: Vec::new(),
            last_heading: None,
            headings: vec![None; HEADING_LEVELS],
        }
    }

    fn register_fragment(&mut self, index: usize, fragment: &Fragment) -> FlmResult<()> {
        self.fragment = index;
        for diagnostic in &fragment.diagnostics {
            log::warn!("{}: {}", fragment.name, diagnostic);
        }
        self.walk(&fragment.nodes)
    }

    fn key(&self, offset: usize) -> NodeKey {
        NodeKey::new(self.fragment, offset)
    }

    fn walk(&mut self, nodes: &[Node]) -> FlmResult<()> {
        for node in nodes {
            match node {
                Node::Text(_) | Node::ParagraphBreak | Node::MathInline(_) => {}
                Node::Group(nodes) => self.walk(nodes)?,
                Node::Macro(m) => self.walk_macro(m)?,
                Node::Environment(env) => self.walk_environment(env)?,
                Node::MathDisplay(math) => self.walk_math(math)?,
            }
        }
        Ok(())
    }

    fn walk_args(&mut self, m: &MacroNode) -> FlmResult<()> {
        for arg in m.args.iter().flatten() {
            self.walk(&arg.nodes)?;
        }
        Ok(())
    }

    fn walk_macro(&mut self, m: &MacroNode) -> FlmResult<()> {
        let action = match self.catalogue.lookup_macro(&m.name) {
            Some(spec) => spec.action.clone(),
            None => return self.walk_args(m),
        };
        let key = self.key(m.pos.offset);

        match action {
            MacroAction::Heading { level } => {
                let title_nodes = m
                    .arg(2)
                    .map(|a| self.without_footnotes(&a.nodes))
                    .unwrap_or_default();
                let title = nodes_plain_text(&title_nodes);
                let starred = m.has_arg(0);
                let numbering = self.config.heading_numbering;
                let anchor = self
                    .features
                    .refs_mut()
                    .ok_or_else(|| missing_manager("refs"))?
                    .add_section(key, level, title.trim(), starred, numbering)
                    .clone();
                let number = match numbering {
                    HeadingNumbering::Hierarchical { max_level } if !starred && level <= max_level => {
                        Some(anchor.display.clone())
                    }
                    _ => None,
                };
                let slot = (level.clamp(1, HEADING_LEVELS as u8) - 1) as usize;
                self.headings[slot] = Some(HeadingRef {
                    key,
                    level,
                    title: title_nodes,
                    number,
                });
                for deeper in self.headings.iter_mut().skip(slot + 1) {
                    *deeper = None;
                }
                self.last_heading = Some(anchor);
                self.walk_args(m)
            }
            MacroAction::Label => {
                let name = m.arg(0).map(|a| a.verbatim.trim()).unwrap_or("");
                let anchor = self
                    .referenceables
                    .last()
                    .or(self.last_heading.as_ref())
                    .cloned()
                    .ok_or_else(|| ResolutionError::UnattachedLabel {
                        name: name.to_string(),
                        pos: m.pos,
                    })?;
                self.features
                    .refs_mut()
                    .ok_or_else(|| missing_manager("refs"))?
                    .attach_label(name, &anchor, m.pos)?;
                Ok(())
            }
            MacroAction::Footnote => {
                let body = m.arg(0).map(|a| a.nodes.clone()).unwrap_or_default();
                let headings = self.headings.clone();
                self.features
                    .endnotes_mut()
                    .ok_or_else(|| missing_manager("endnotes"))?
                    .register(body, key, headings);
                self.walk_args(m)
            }
            MacroAction::Cite => {
                let raw = m.arg(1).map(|a| a.verbatim.as_str()).unwrap_or("");
                for cite_key in parse_cite_keys(raw) {
                    let body = self.bibliography_entry(&cite_key, m)?;
                    self.features
                        .endnotes_mut()
                        .ok_or_else(|| missing_manager("endnotes"))?
                        .register_citation(&cite_key, body);
                }
                self.walk_args(m)
            }
            _ => self.walk_args(m),
        }
    }

    /// Parsed reference text for a normalized citation key.
    fn bibliography_entry(&self, cite_key: &str, m: &MacroNode) -> FlmResult<Vec<Node>> {
        let source = self
            .config
            .bibliography
            .iter()
            .find(|(k, _)| normalize_cite_key(k) == cite_key)
            .map(|(_, v)| v)
            .ok_or_else(|| ResolutionError::UnresolvedCitation {
                key: cite_key.to_string(),
                pos: m.pos,
            })?;
        let name = format!("bibliography:{}", cite_key);
        let fragment = parse_fragment(source, &name, self.catalogue, self.config.max_nesting_depth)?;
        Ok(fragment.nodes)
    }

    /// Copy of `nodes` with every footnote removed, for heading titles used
    /// outside the heading itself.
    fn without_footnotes(&self, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter_map(|node| match node {
                Node::Macro(m) => {
                    let is_footnote = self
                        .catalogue
                        .lookup_macro(&m.name)
                        .map_or(false, |spec| spec.action == MacroAction::Footnote);
                    if is_footnote {
                        return None;
                    }
                    let mut m = m.clone();
                    for arg in m.args.iter_mut().flatten() {
                        arg.nodes = self.without_footnotes(&arg.nodes);
                    }
                    Some(Node::Macro(m))
                }
                Node::Group(inner) => Some(Node::Group(self.without_footnotes(inner))),
                other => Some(other.clone()),
            })
            .collect()
    }

    fn walk_environment(&mut self, env: &EnvironmentNode) -> FlmResult<()> {
        let action = self
            .catalogue
            .lookup_environment(&env.name)
            .map(|spec| spec.action.clone());
        let key = self.key(env.pos.offset);

        match action {
            Some(EnvironmentAction::Float(kind)) => {
                let anchor = self
                    .features
                    .refs_mut()
                    .ok_or_else(|| missing_manager("refs"))?
                    .add_float(key, kind, self.config.float_name(kind))
                    .clone();
                self.walk_scoped(anchor, &env.body)
            }
            Some(EnvironmentAction::DefTerm) => {
                let term = env.arg(0).map(|a| a.verbatim.as_str()).unwrap_or("");
                let anchor = self
                    .features
                    .defterms_mut()
                    .ok_or_else(|| missing_manager("defterm"))?
                    .register_defterm(term, key, env.pos)?;
                let anchor = self
                    .features
                    .refs_mut()
                    .ok_or_else(|| missing_manager("refs"))?
                    .add_anchor(key, anchor)
                    .clone();
                self.walk_scoped(anchor, &env.body)
            }
            _ => self.walk_body(&env.body),
        }
    }

    fn walk_scoped(&mut self, anchor: Anchor, body: &Body) -> FlmResult<()> {
        self.referenceables.push(anchor);
        let result = self.walk_body(body);
        self.referenceables.pop();
        result
    }

    fn walk_body(&mut self, body: &Body) -> FlmResult<()> {
        match body {
            Body::Nodes(nodes) => self.walk(nodes),
            Body::Items(items) => {
                for item in items {
                    if let Some(tag) = &item.tag {
                        self.walk(&tag.nodes)?;
                    }
                    self.walk(&item.content)?;
                }
                Ok(())
            }
            Body::Verbatim(_) => Ok(()),
        }
    }

    fn walk_math(&mut self, math: &MathNode) -> FlmResult<()> {
        let key = self.key(math.pos.offset);
        let numbered_env = math.is_numbered_env();
        let refs = self
            .features
            .refs_mut()
            .ok_or_else(|| missing_manager("refs"))?;

        for (index, line) in math.lines.iter().enumerate() {
            let numbered = line.tag.is_some()
                || (!line.nonumber && (numbered_env || !line.labels.is_empty()));
            if !numbered {
                continue;
            }
            let anchor = refs.add_equation_line(key, index, line.tag.as_deref()).clone();
            for label in &line.labels {
                refs.attach_label(label.trim(), &anchor, math.pos)?;
            }
        }
        Ok(())
    }
}

fn missing_manager(name: &str) -> FlmError {
    FlmError::State(format!("feature manager '{}' is not registered", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HtmlRenderer;

    fn document<'e>(env: &'e Environment, source: &str) -> Document<'e> {
        let fragment = env.make_fragment(source, "test").expect("parse");
        env.make_document(vec![fragment])
    }

    #[test]
    fn test_state_machine() {
        let env = Environment::standard();
        let mut doc = document(&env, "Hello");
        assert_eq!(doc.state(), DocumentState::Created);
        doc.register().expect("register");
        assert_eq!(doc.state(), DocumentState::Registered);
        assert!(matches!(doc.register(), Err(FlmError::State(_))));

        let html = HtmlRenderer::default();
        doc.render(&html).expect("render");
        assert_eq!(doc.state(), DocumentState::Rendered);
        assert!(matches!(doc.register(), Err(FlmError::State(_))));
    }

    #[test]
    fn test_render_registers_first() {
        let env = Environment::standard();
        let mut doc = document(&env, r"See \eqref{eq:a}. \begin{equation}x\label{eq:a}\end{equation}");
        let html = HtmlRenderer::default();
        let output = doc.render(&html).expect("render").output;
        assert!(output.contains(r##"<a href="#equation-1" class="href-ref">(1)</a>"##));
    }

    #[test]
    fn test_unattached_label() {
        let env = Environment::standard();
        let mut doc = document(&env, r"Text \label{nowhere}");
        let err = doc.register().expect_err("unattached");
        assert!(matches!(
            err,
            FlmError::Resolution(ResolutionError::UnattachedLabel { .. })
        ));
        assert_eq!(doc.state(), DocumentState::Created);
    }

    #[test]
    fn test_label_attaches_to_innermost() {
        let env = Environment::standard();
        let mut doc = document(
            &env,
            r"\section{Intro}\label{sec:intro}
\begin{figure}x\caption{C}\label{fig:x}\end{figure}",
        );
        doc.register().expect("register");
        let refs = doc.features().refs().expect("refs");
        let pos = flm_ir::Position::start();
        assert_eq!(refs.resolve("sec:intro", pos).map(|l| l.display.as_str()), Ok("Intro"));
        assert_eq!(refs.resolve("fig:x", pos).map(|l| l.display.as_str()), Ok("Figure 1"));
    }

    #[test]
    fn test_heading_title_skips_footnotes() {
        let env = Environment::standard();
        let mut doc = document(&env, r"\section{Results\footnote{n}}\label{sec:r}");
        doc.register().expect("register");
        let label = doc
            .features()
            .refs()
            .and_then(|refs| refs.resolve("sec:r", flm_ir::Position::start()).ok())
            .cloned()
            .expect("label");
        assert_eq!(label.display, "Results");
        assert_eq!(label.target_id, "sec--Results");
        let notes = doc.features().endnotes().expect("endnotes").notes();
        let heading = notes[0].heading_at(1).expect("heading");
        assert_eq!(nodes_plain_text(&heading.title), "Results");
    }

    #[test]
    fn test_citations_resolve_against_bibliography() {
        let mut config = Config::default();
        config.bibliography.insert("DOI:10.1/x".to_string(), "Entry".to_string());
        let env = Environment::new(config);
        let mut doc = document(&env, r"\cite{doi:10.1/x} and \cite{ doi:10.1/x }");
        doc.register().expect("register");
        let citations = doc.features().endnotes().expect("endnotes").citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].key, "doi:10.1/x");
        assert_eq!(nodes_plain_text(&citations[0].body), "Entry");

        let mut doc = document(&env, r"\cite{doi:10.1/y}");
        let err = doc.register().expect_err("unknown key");
        assert!(matches!(
            err,
            FlmError::Resolution(ResolutionError::UnresolvedCitation { ref key, .. }) if key == "doi:10.1/y"
        ));
        assert!(doc.features().endnotes().expect("endnotes").citations().is_empty());
    }

    #[test]
    fn test_unnumbered_math_numbers_labelled_lines_only() {
        let env = Environment::standard();
        let mut doc = document(
            &env,
            r"\begin{align*}a \\ b \label{eq:b}\end{align*}
\begin{align}c \nonumber \\ d \\ e \tag{*}\end{align}",
        );
        doc.register().expect("register");
        let refs = doc.features().refs().expect("refs");
        let pos = flm_ir::Position::start();
        assert_eq!(refs.resolve("eq:b", pos).map(|l| l.number), Ok(Some(1)));
        assert_eq!(refs.count(crate::features::LabelKind::Equation), 2);
    }
}
