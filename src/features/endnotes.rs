//! Footnotes and endnotes
//!
//! Every `\footnote` gets a sequential id in document order during
//! registration, including footnotes nested in lists, figures or other
//! footnotes. The marker text comes from an injectable counter formatter.
//! Footnotes are either promoted to a consolidated endnote list or rendered
//! in place.
//!
//! Citations form a second endnote category: `\cite{key}` numbers each
//! distinct key on first use and lists the resolved references under their
//! own title.

use std::any::Any;

use flm_ir::Node;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{FeatureManager, NodeKey};
use crate::core::counter::CounterFormatter;

pub const NAME: &str = "endnotes";

/// Where footnote bodies are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootnotePlacement {
    /// A mark in the text, the body in the endnote list
    #[default]
    Endnote,
    /// The body right where the footnote appears
    Inline,
}

/// A heading enclosing a footnote, used to group endnotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingRef {
    pub key: NodeKey,
    pub level: u8,
    pub title: Vec<Node>,
    /// Visible section number, when headings are numbered
    pub number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    /// Sequential id, 1-based
    pub id: u32,
    pub key: NodeKey,
    pub body: Vec<Node>,
    /// Formatted marker, e.g. `3` or `³`
    pub marker: String,
    pub placement: FootnotePlacement,
    /// Innermost enclosing heading at each level 1..=6
    pub headings: Vec<Option<HeadingRef>>,
}

impl Footnote {
    pub fn target_id(&self) -> String {
        format!("footnote-{}", self.id)
    }

    /// The enclosing heading at `level`, if any.
    pub fn heading_at(&self, level: u8) -> Option<&HeadingRef> {
        self.headings
            .get((level as usize).checked_sub(1)?)
            .and_then(Option::as_ref)
    }
}

/// Options for the consolidated endnote list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndnotesOptions {
    /// Group endnotes under the headings of this level.
    pub group_by_heading_level: Option<u8>,
    /// Title above the list; no title when `None`.
    pub title: Option<String>,
    pub title_level: u8,
    /// Title above the citation list; no title when `None`.
    pub citations_title: Option<String>,
}

impl Default for EndnotesOptions {
    fn default() -> Self {
        Self {
            group_by_heading_level: None,
            title: Some("Footnotes".to_string()),
            title_level: 1,
            citations_title: Some("References".to_string()),
        }
    }
}

/// A cited reference, numbered on its first `\cite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// Sequential number, 1-based
    pub number: u32,
    /// Normalized key, e.g. `arxiv:1234.5678`
    pub key: String,
    pub body: Vec<Node>,
    pub marker: String,
}

impl Citation {
    pub fn target_id(&self) -> String {
        format!("citation-{}", self.number)
    }
}

/// Split the raw argument of `\cite` into normalized keys. A `prefix:` is
/// lowercased; empty entries are dropped.
pub fn parse_cite_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(normalize_cite_key)
        .collect()
}

pub fn normalize_cite_key(key: &str) -> String {
    match key.split_once(':') {
        Some((prefix, rest)) => format!("{}:{}", prefix.trim().to_lowercase(), rest.trim()),
        None => key.trim().to_string(),
    }
}

/// Endnotes sharing the same enclosing heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndnoteGroup<'a> {
    pub heading: Option<&'a HeadingRef>,
    pub notes: Vec<&'a Footnote>,
}

#[derive(Debug)]
pub struct EndnotesManager {
    formatter: CounterFormatter,
    placement: FootnotePlacement,
    notes: Vec<Footnote>,
    by_key: FxHashMap<NodeKey, usize>,
    citation_formatter: CounterFormatter,
    citations: Vec<Citation>,
    by_citation_key: FxHashMap<String, usize>,
}

impl EndnotesManager {
    pub fn new(formatter: CounterFormatter, placement: FootnotePlacement) -> Self {
        Self {
            formatter,
            placement,
            notes: Vec::new(),
            by_key: FxHashMap::default(),
            citation_formatter: CounterFormatter::Arabic,
            citations: Vec::new(),
            by_citation_key: FxHashMap::default(),
        }
    }

    pub fn with_citation_counter(mut self, formatter: CounterFormatter) -> Self {
        self.citation_formatter = formatter;
        self
    }

    pub fn placement(&self) -> FootnotePlacement {
        self.placement
    }

    /// Register a footnote body found at `key`; returns its id.
    pub fn register(
        &mut self,
        body: Vec<Node>,
        key: NodeKey,
        headings: Vec<Option<HeadingRef>>,
    ) -> u32 {
        if let Some(&index) = self.by_key.get(&key) {
            return self.notes[index].id;
        }
        let id = self.notes.len() as u32 + 1;
        let marker = self.formatter.format(id);
        log::debug!("endnotes: footnote {} marked '{}'", id, marker);
        self.by_key.insert(key, self.notes.len());
        self.notes.push(Footnote {
            id,
            key,
            body,
            marker,
            placement: self.placement,
            headings,
        });
        id
    }

    pub fn get(&self, key: NodeKey) -> Option<&Footnote> {
        self.by_key.get(&key).map(|&i| &self.notes[i])
    }

    /// All footnotes in id order.
    pub fn notes(&self) -> &[Footnote] {
        &self.notes
    }

    /// Number the citation of `key`, reusing the number of an earlier
    /// citation of the same key.
    pub fn register_citation(&mut self, key: &str, body: Vec<Node>) -> u32 {
        if let Some(&index) = self.by_citation_key.get(key) {
            return self.citations[index].number;
        }
        let number = self.citations.len() as u32 + 1;
        let marker = self.citation_formatter.format(number);
        log::debug!("endnotes: citation '{}' numbered {}", key, marker);
        self.by_citation_key.insert(key.to_string(), self.citations.len());
        self.citations.push(Citation {
            number,
            key: key.to_string(),
            body,
            marker,
        });
        number
    }

    pub fn citation(&self, key: &str) -> Option<&Citation> {
        self.by_citation_key.get(key).map(|&i| &self.citations[i])
    }

    /// All citations in order of first use.
    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    /// Endnotes in id order, grouped by enclosing heading when requested.
    /// Footnotes rendered inline are left out.
    pub fn groups(&self, options: &EndnotesOptions) -> Vec<EndnoteGroup<'_>> {
        let mut groups: Vec<EndnoteGroup<'_>> = Vec::new();
        for note in self
            .notes
            .iter()
            .filter(|n| n.placement == FootnotePlacement::Endnote)
        {
            let heading = options
                .group_by_heading_level
                .and_then(|level| note.heading_at(level));
            match groups.last_mut() {
                Some(group) if group.heading.map(|h| h.key) == heading.map(|h| h.key) => {
                    group.notes.push(note)
                }
                _ => groups.push(EndnoteGroup {
                    heading,
                    notes: vec![note],
                }),
            }
        }
        groups
    }
}

impl FeatureManager for EndnotesManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset(&mut self) {
        self.notes.clear();
        self.by_key.clear();
        self.citations.clear();
        self.by_citation_key.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn heading(offset: usize, level: u8) -> HeadingRef {
        HeadingRef {
            key: NodeKey::new(0, offset),
            level,
            title: vec![Node::Text(format!("H{}", offset))],
            number: None,
        }
    }

    fn trail(h1: Option<HeadingRef>) -> Vec<Option<HeadingRef>> {
        let mut headings = vec![None; 6];
        headings[0] = h1;
        headings
    }

    #[test]
    fn test_sequential_ids_and_markers() {
        let mut mgr = EndnotesManager::new(
            CounterFormatter::UnicodeSuperscript,
            FootnotePlacement::Endnote,
        );
        let ids: Vec<u32> = (0..12)
            .map(|i| mgr.register(Vec::new(), NodeKey::new(0, i * 10), Vec::new()))
            .collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert_eq!(mgr.notes()[11].marker, "¹²");
        assert_eq!(mgr.get(NodeKey::new(0, 20)).map(|n| n.id), Some(3));
    }

    #[test]
    fn test_register_same_node_twice() {
        let mut mgr = EndnotesManager::new(CounterFormatter::Arabic, FootnotePlacement::Endnote);
        assert_eq!(mgr.register(Vec::new(), NodeKey::new(0, 5), Vec::new()), 1);
        assert_eq!(mgr.register(Vec::new(), NodeKey::new(0, 5), Vec::new()), 1);
        assert_eq!(mgr.notes().len(), 1);
    }

    #[test]
    fn test_groups_by_heading() {
        let mut mgr = EndnotesManager::new(CounterFormatter::Arabic, FootnotePlacement::Endnote);
        mgr.register(Vec::new(), NodeKey::new(0, 1), trail(None));
        mgr.register(Vec::new(), NodeKey::new(0, 11), trail(Some(heading(10, 1))));
        mgr.register(Vec::new(), NodeKey::new(0, 12), trail(Some(heading(10, 1))));
        mgr.register(Vec::new(), NodeKey::new(0, 21), trail(Some(heading(20, 1))));

        let grouped = mgr.groups(&EndnotesOptions {
            group_by_heading_level: Some(1),
            ..Default::default()
        });
        let shape: Vec<(Option<usize>, Vec<u32>)> = grouped
            .iter()
            .map(|g| (g.heading.map(|h| h.key.offset), g.notes.iter().map(|n| n.id).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![(None, vec![1]), (Some(10), vec![2, 3]), (Some(20), vec![4])]
        );

        let flat = mgr.groups(&EndnotesOptions::default());
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].notes.len(), 4);
    }

    #[test]
    fn test_citations_are_numbered_once_per_key() {
        let mut mgr = EndnotesManager::new(CounterFormatter::Arabic, FootnotePlacement::Endnote)
            .with_citation_counter(CounterFormatter::Roman);
        assert_eq!(mgr.register_citation("b", Vec::new()), 1);
        assert_eq!(mgr.register_citation("a", Vec::new()), 2);
        assert_eq!(mgr.register_citation("b", Vec::new()), 1);
        assert_eq!(mgr.citations().len(), 2);
        assert_eq!(mgr.citation("a").map(|c| c.marker.as_str()), Some("ii"));
        assert_eq!(mgr.citation("a").map(|c| c.target_id()), Some("citation-2".to_string()));

        mgr.reset();
        assert!(mgr.citations().is_empty());
        assert_eq!(mgr.register_citation("a", Vec::new()), 1);
    }

    #[test]
    fn test_parse_cite_keys() {
        assert_eq!(
            parse_cite_keys(" arXiv:1234.5678 , smith2020,, DOI : 10.1/x "),
            vec!["arxiv:1234.5678", "smith2020", "doi:10.1/x"]
        );
        assert!(parse_cite_keys(" , ").is_empty());
    }

    #[test]
    fn test_inline_notes_are_not_listed() {
        let mut mgr = EndnotesManager::new(CounterFormatter::Arabic, FootnotePlacement::Inline);
        mgr.register(Vec::new(), NodeKey::new(0, 1), Vec::new());
        assert!(mgr.groups(&EndnotesOptions::default()).is_empty());
    }
}
