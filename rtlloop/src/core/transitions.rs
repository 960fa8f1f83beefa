//! Data-driven transition table for the flow state machine.

use std::collections::BTreeMap;

use crate::core::types::{Outcome, Stage};

/// Map from `(state, outcome)` to the next state.
///
/// Kept as plain data so routing can be tested without any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<(Stage, Outcome), Stage>,
}

impl TransitionTable {
    /// The generate/review/verify loop.
    ///
    /// `abort` from any non-terminal state routes to `Done`.
    pub fn standard() -> Self {
        let mut edges = BTreeMap::new();
        edges.insert((Stage::Generate, Outcome::Advance), Stage::Review);
        edges.insert((Stage::Review, Outcome::Advance), Stage::Verify);
        edges.insert((Stage::Review, Outcome::Retry), Stage::Generate);
        edges.insert((Stage::Verify, Outcome::Advance), Stage::Done);
        edges.insert((Stage::Verify, Outcome::Retry), Stage::Generate);
        for stage in [Stage::Generate, Stage::Review, Stage::Verify] {
            edges.insert((stage, Outcome::Abort), Stage::Done);
        }
        Self { edges }
    }

    /// A table with exactly the given edges.
    pub fn from_edges(edges: impl IntoIterator<Item = ((Stage, Outcome), Stage)>) -> Self {
        Self {
            edges: edges.into_iter().collect(),
        }
    }

    /// Resolve the next state, or `None` for an undeclared edge.
    pub fn next(&self, from: Stage, outcome: Outcome) -> Option<Stage> {
        self.edges.get(&(from, outcome)).copied()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
