//! Defined terms
//!
//! `\begin{defterm}{Term}...\end{defterm}` defines a term; `\term{Term}` and
//! `\term[Term]{other text}` link to its definition. Terms are matched on
//! their whitespace-normalised source, so a term may contain inline math.

use std::any::Any;

use flm_ir::Position;
use indexmap::IndexMap;

use super::refs::{Anchor, Label, LabelKind};
use super::{safe_id, FeatureManager, NodeKey};
use crate::utils::error::ResolutionError;

pub const NAME: &str = "defterm";

/// Canonical form of a term's source text.
pub fn canonical_term(source: &str) -> String {
    source.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default)]
pub struct DefTermManager {
    /// Keyed by canonical term, in definition order
    terms: IndexMap<String, Label>,
    keys: IndexMap<NodeKey, String>,
}

impl DefTermManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a term at `key`; returns the anchor to register with refs.
    pub fn register_defterm(
        &mut self,
        term: &str,
        key: NodeKey,
        pos: Position,
    ) -> Result<Anchor, ResolutionError> {
        let canonical = canonical_term(term);
        if self.terms.contains_key(&canonical) {
            return Err(ResolutionError::DuplicateLabel {
                name: canonical,
                pos,
            });
        }
        let number = self.terms.len() as u32 + 1;
        let label = Label {
            name: canonical.clone(),
            kind: LabelKind::Term,
            number: Some(number),
            display: canonical.clone(),
            target_id: format!("defterm-{}", safe_id(&canonical)),
        };
        log::debug!("defterm: '{}' -> {}", canonical, label.target_id);
        let anchor = Anchor {
            kind: LabelKind::Term,
            number: label.number,
            display: label.display.clone(),
            target_id: label.target_id.clone(),
        };
        self.keys.insert(key, canonical.clone());
        self.terms.insert(canonical, label);
        Ok(anchor)
    }

    /// Find a term by its (not necessarily canonical) source.
    pub fn lookup_term(&self, term: &str, pos: Position) -> Result<&Label, ResolutionError> {
        let canonical = canonical_term(term);
        self.terms
            .get(&canonical)
            .ok_or(ResolutionError::UnresolvedTerm {
                term: canonical,
                pos,
            })
    }

    /// The term defined at `key`.
    pub fn term_at(&self, key: NodeKey) -> Option<&Label> {
        self.keys.get(&key).and_then(|t| self.terms.get(t))
    }

    /// All terms in definition order.
    pub fn terms(&self) -> impl Iterator<Item = &Label> {
        self.terms.values()
    }
}

impl FeatureManager for DefTermManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset(&mut self) {
        self.terms.clear();
        self.keys.clear();
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

    #[test]
    fn test_lookup_normalises_whitespace() {
        let mut mgr = DefTermManager::new();
        let pos = Position::start();
        let anchor = mgr
            .register_defterm("Pauli\n   matrix", NodeKey::new(0, 0), pos)
            .expect("register");
        assert_eq!(anchor.target_id, "defterm-Pauli_20Xmatrix");
        assert_eq!(
            mgr.lookup_term("Pauli matrix", pos).map(|l| l.number),
            Ok(Some(1))
        );
    }

    #[test]
    fn test_term_with_math() {
        let mut mgr = DefTermManager::new();
        let pos = Position::start();
        mgr.register_defterm(r"\(n\)-qubit state", NodeKey::new(0, 0), pos)
            .expect("register");
        assert!(mgr.lookup_term(r"\(n\)-qubit  state", pos).is_ok());
        assert_eq!(
            mgr.term_at(NodeKey::new(0, 0)).map(|l| l.display.as_str()),
            Some(r"\(n\)-qubit state")
        );
    }

    #[test]
    fn test_unresolved_and_duplicate() {
        let mut mgr = DefTermManager::new();
        let pos = Position::new(3, 1, 4);
        assert_eq!(
            mgr.lookup_term("nothing", pos),
            Err(ResolutionError::UnresolvedTerm {
                term: "nothing".to_string(),
                pos
            })
        );
        mgr.register_defterm("x", NodeKey::new(0, 0), pos).expect("register");
        assert!(matches!(
            mgr.register_defterm("x", NodeKey::new(0, 9), pos),
            Err(ResolutionError::DuplicateLabel { .. })
        ));
    }
}
