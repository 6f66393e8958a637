//! Labels and references
//!
//! Sections, equation lines, floats and terms become anchors during
//! registration, each with a number assigned in document order and an HTML
//! target id. `\label{name}` attaches a name to an anchor; `\ref`, `\eqref`
//! and `\hyperref` resolve that name while rendering.

use std::any::Any;

use flm_ir::Position;
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::{safe_id, FeatureManager, NodeKey};
use crate::core::catalogue::FloatKind;
use crate::utils::error::ResolutionError;

pub const NAME: &str = "refs";

const MAX_SLUG_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Equation,
    Figure,
    Table,
    Section,
    Term,
}

impl From<FloatKind> for LabelKind {
    fn from(kind: FloatKind) -> Self {
        match kind {
            FloatKind::Figure => LabelKind::Figure,
            FloatKind::Table => LabelKind::Table,
        }
    }
}

/// How section headings are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingNumbering {
    /// No visible numbers; references show the heading title.
    #[default]
    Unnumbered,
    /// `1`, `1.1`, `1.1.1` down to `max_level`.
    Hierarchical { max_level: u8 },
}

/// A referenceable entity created during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub kind: LabelKind,
    /// Position among anchors of the same kind, 1-based. `None` for
    /// equation lines with a custom `\tag`.
    pub number: Option<u32>,
    /// Display form: `(2)` for equations, `2.1` or the title for sections,
    /// `Figure 3`, or the term itself.
    pub display: String,
    pub target_id: String,
}

/// A named anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub kind: LabelKind,
    pub number: Option<u32>,
    pub display: String,
    pub target_id: String,
}

impl Label {
    /// Text shown by `\ref` and `\hyperref` without explicit text.
    pub fn ref_text(&self) -> String {
        match (self.kind, self.number) {
            (LabelKind::Equation, Some(n)) => n.to_string(),
            (LabelKind::Equation, None) => self
                .display
                .trim_start_matches('(')
                .trim_end_matches(')')
                .to_string(),
            _ => self.display.clone(),
        }
    }

    /// Text shown by `\eqref`.
    pub fn eqref_text(&self) -> String {
        match self.kind {
            LabelKind::Equation => self.display.clone(),
            _ => format!("({})", self.ref_text()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RefsManager {
    labels: FxHashMap<String, Label>,
    /// Keyed by node and equation line (0 for everything but equations)
    anchors: FxHashMap<(NodeKey, usize), Anchor>,
    counters: FxHashMap<LabelKind, u32>,
    section_numbers: Vec<u32>,
    used_ids: FxHashSet<String>,
    custom_tags: u32,
}

impl RefsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next number for `kind`, monotonic in registration order.
    pub fn next_number(&mut self, kind: LabelKind) -> u32 {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Number of anchors of `kind` so far.
    pub fn count(&self, kind: LabelKind) -> u32 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }

    /// Assign the next number of `kind` to a new label `name`.
    pub fn register(
        &mut self,
        kind: LabelKind,
        name: &str,
        pos: Position,
    ) -> Result<u32, ResolutionError> {
        let number = self.next_number(kind);
        let prefix = match kind {
            LabelKind::Equation => "equation",
            LabelKind::Figure => "figure",
            LabelKind::Table => "table",
            LabelKind::Section => "section",
            LabelKind::Term => "defterm",
        };
        let anchor = Anchor {
            kind,
            number: Some(number),
            display: number.to_string(),
            target_id: self.unique_id(format!("{}-{}", prefix, number)),
        };
        self.attach_label(name, &anchor, pos)?;
        Ok(number)
    }

    /// Register a section heading.
    pub fn add_section(
        &mut self,
        key: NodeKey,
        level: u8,
        title: &str,
        starred: bool,
        numbering: HeadingNumbering,
    ) -> &Anchor {
        let number = self.next_number(LabelKind::Section);
        let level = level.max(1) as usize;
        let numbered = matches!(
            numbering,
            HeadingNumbering::Hierarchical { max_level } if !starred && level <= max_level as usize
        );

        // Starred and deeper headings leave the visible numbering untouched
        let display = if numbered {
            self.section_numbers.resize(level, 0);
            self.section_numbers[level - 1] += 1;
            self.section_numbers
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".")
        } else {
            title.to_string()
        };

        let slug = slugify(title);
        let base = if slug.is_empty() {
            format!("sec--{}", number)
        } else {
            format!("sec--{}", slug)
        };
        let target_id = self.unique_id(base);

        log::debug!("refs: section '{}' -> {} ({})", title, display, target_id);
        self.insert_anchor(
            key,
            0,
            Anchor {
                kind: LabelKind::Section,
                number: Some(number),
                display,
                target_id,
            },
        )
    }

    /// Register one line of display math. Lines with a custom tag show the
    /// tag and do not consume a number.
    pub fn add_equation_line(
        &mut self,
        key: NodeKey,
        line: usize,
        custom_tag: Option<&str>,
    ) -> &Anchor {
        let anchor = match custom_tag {
            Some(tag) => {
                self.custom_tags += 1;
                Anchor {
                    kind: LabelKind::Equation,
                    number: None,
                    display: tag.to_string(),
                    target_id: self.unique_id(format!("equation-tag-{}", self.custom_tags)),
                }
            }
            None => {
                let number = self.next_number(LabelKind::Equation);
                Anchor {
                    kind: LabelKind::Equation,
                    number: Some(number),
                    display: format!("({})", number),
                    target_id: self.unique_id(format!("equation-{}", number)),
                }
            }
        };
        log::debug!("refs: equation line {} -> {}", line, anchor.display);
        self.insert_anchor(key, line, anchor)
    }

    /// Register a float. Figures and tables are counted separately.
    pub fn add_float(&mut self, key: NodeKey, kind: FloatKind, float_name: &str) -> &Anchor {
        let label_kind = LabelKind::from(kind);
        let number = self.next_number(label_kind);
        let anchor = Anchor {
            kind: label_kind,
            number: Some(number),
            display: format!("{} {}", float_name, number),
            target_id: self.unique_id(format!("{}-{}", kind.as_str(), number)),
        };
        log::debug!("refs: {} {}", kind.as_str(), number);
        self.insert_anchor(key, 0, anchor)
    }

    /// Register an anchor created by another manager, e.g. a defined term.
    pub fn add_anchor(&mut self, key: NodeKey, anchor: Anchor) -> &Anchor {
        self.used_ids.insert(anchor.target_id.clone());
        self.insert_anchor(key, 0, anchor)
    }

    fn insert_anchor(&mut self, key: NodeKey, line: usize, anchor: Anchor) -> &Anchor {
        self.anchors.entry((key, line)).or_insert(anchor)
    }

    pub fn anchor(&self, key: NodeKey, line: usize) -> Option<&Anchor> {
        self.anchors.get(&(key, line))
    }

    /// Attach the label `name` to `anchor`.
    pub fn attach_label(
        &mut self,
        name: &str,
        anchor: &Anchor,
        pos: Position,
    ) -> Result<(), ResolutionError> {
        if self.labels.contains_key(name) {
            return Err(ResolutionError::DuplicateLabel {
                name: name.to_string(),
                pos,
            });
        }
        log::debug!("refs: label '{}' -> {}", name, anchor.target_id);
        self.labels.insert(
            name.to_string(),
            Label {
                name: name.to_string(),
                kind: anchor.kind,
                number: anchor.number,
                display: anchor.display.clone(),
                target_id: anchor.target_id.clone(),
            },
        );
        Ok(())
    }

    /// Look up a label by exact name.
    pub fn resolve(&self, name: &str, pos: Position) -> Result<&Label, ResolutionError> {
        self.labels
            .get(name)
            .ok_or_else(|| ResolutionError::UnresolvedLabel {
                name: name.to_string(),
                pos,
            })
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.values()
    }

    fn unique_id(&mut self, base: String) -> String {
        let mut id = base.clone();
        let mut n = 2;
        while self.used_ids.contains(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        self.used_ids.insert(id.clone());
        id
    }
}

impl FeatureManager for RefsManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset(&mut self) {
        *self = RefsManager::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Heading slug: alphanumerics kept, whitespace runs turned into `-`,
/// everything else made id-safe, truncated.
fn slugify(title: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    let slug = safe_id(&words.join("-"));
    slug.chars().take(MAX_SLUG_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(offset: usize) -> NodeKey {
        NodeKey::new(0, offset)
    }

    #[test]
    fn test_register_is_monotonic_per_kind() {
        let mut refs = RefsManager::new();
        let pos = Position::start();
        assert_eq!(refs.register(LabelKind::Equation, "eq:a", pos), Ok(1));
        assert_eq!(refs.register(LabelKind::Figure, "fig:a", pos), Ok(1));
        assert_eq!(refs.register(LabelKind::Equation, "eq:b", pos), Ok(2));
        assert_eq!(refs.resolve("eq:b", pos).map(|l| l.number), Ok(Some(2)));
    }

    #[test]
    fn test_duplicate_and_unresolved() {
        let mut refs = RefsManager::new();
        let pos = Position::new(5, 1, 6);
        refs.register(LabelKind::Section, "sec:x", pos).unwrap();
        assert_eq!(
            refs.register(LabelKind::Section, "sec:x", pos),
            Err(ResolutionError::DuplicateLabel {
                name: "sec:x".to_string(),
                pos
            })
        );
        assert!(matches!(
            refs.resolve("sec:y", pos),
            Err(ResolutionError::UnresolvedLabel { .. })
        ));
    }

    #[test]
    fn test_hierarchical_sections() {
        let mut refs = RefsManager::new();
        let numbering = HeadingNumbering::Hierarchical { max_level: 3 };
        assert_eq!(refs.add_section(key(0), 1, "Intro", false, numbering).display, "1");
        assert_eq!(refs.add_section(key(1), 2, "Scope", false, numbering).display, "1.1");
        assert_eq!(refs.add_section(key(2), 2, "Goals", false, numbering).display, "1.2");
        assert_eq!(refs.add_section(key(3), 1, "Methods", false, numbering).display, "2");
        assert_eq!(refs.add_section(key(4), 2, "Data", false, numbering).display, "2.1");
        assert_eq!(refs.add_section(key(5), 4, "Aside", false, numbering).display, "Aside");
        assert_eq!(refs.add_section(key(6), 1, "Notes", true, numbering).display, "Notes");
        assert_eq!(refs.add_section(key(7), 1, "Outlook", false, numbering).display, "3");
    }

    #[test]
    fn test_starred_sections_do_not_advance_numbers() {
        let mut refs = RefsManager::new();
        let numbering = HeadingNumbering::Hierarchical { max_level: 2 };
        assert_eq!(refs.add_section(key(0), 1, "Preface", true, numbering).display, "Preface");
        assert_eq!(refs.add_section(key(1), 1, "Intro", false, numbering).display, "1");
        assert_eq!(refs.add_section(key(2), 2, "Aside", true, numbering).display, "Aside");
        assert_eq!(refs.add_section(key(3), 2, "Scope", false, numbering).display, "1.1");
        assert_eq!(refs.add_section(key(4), 3, "Deep", false, numbering).display, "Deep");
        assert_eq!(refs.add_section(key(5), 2, "Goals", false, numbering).display, "1.2");
    }

    #[test]
    fn test_floats_are_counted_per_kind() {
        let mut refs = RefsManager::new();
        assert_eq!(refs.add_float(key(0), FloatKind::Figure, "Figure").display, "Figure 1");
        let table = refs.add_float(key(1), FloatKind::Table, "Table").clone();
        assert_eq!(table.display, "Table 1");
        assert_eq!(table.target_id, "table-1");
        assert_eq!(table.kind, LabelKind::Table);
        assert_eq!(refs.add_float(key(2), FloatKind::Figure, "Figure").target_id, "figure-2");
    }

    #[test]
    fn test_section_ids_are_unique() {
        let mut refs = RefsManager::new();
        let numbering = HeadingNumbering::Unnumbered;
        let a = refs.add_section(key(0), 1, "Results and discussion", false, numbering).target_id.clone();
        let b = refs.add_section(key(1), 1, "Results and discussion", false, numbering).target_id.clone();
        assert_eq!(a, "sec--Results-and-discussion");
        assert_eq!(b, "sec--Results-and-discussion-2");
    }

    #[test]
    fn test_equation_lines() {
        let mut refs = RefsManager::new();
        assert_eq!(refs.add_equation_line(key(0), 0, None).display, "(1)");
        assert_eq!(refs.add_equation_line(key(0), 1, Some("(*)")).display, "(*)");
        assert_eq!(refs.add_equation_line(key(0), 2, None).target_id, "equation-2");
        assert_eq!(refs.anchor(key(0), 1).map(|a| a.number), Some(None));
    }

    #[test]
    fn test_ref_texts() {
        let label = Label {
            name: "eq:x".to_string(),
            kind: LabelKind::Equation,
            number: Some(3),
            display: "(3)".to_string(),
            target_id: "equation-3".to_string(),
        };
        assert_eq!(label.ref_text(), "3");
        assert_eq!(label.eqref_text(), "(3)");
    }
}
