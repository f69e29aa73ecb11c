//! Workflow states and the legal-transition table.
//!
//! Legality is an explicit set of `(from, to)` edges.  Nothing is inferred
//! from the declaration order of [`WorkflowState`], so adding a state or an
//! edge can never silently open a skip.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// States
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Questioning,
    Refining,
    DocumentReview,
    FinalApproval,
    Development,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 5] = [
        Self::Questioning,
        Self::Refining,
        Self::DocumentReview,
        Self::FinalApproval,
        Self::Development,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Questioning => "questioning",
            Self::Refining => "refining",
            Self::DocumentReview => "document_review",
            Self::FinalApproval => "final_approval",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known workflow state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown workflow state {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for WorkflowState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_owned()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The set of legal `(from, to)` state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: HashSet<(WorkflowState, WorkflowState)>,
}

impl TransitionTable {
    /// The canonical workflow:
    /// `questioning -> refining -> document_review -> final_approval -> development`.
    pub fn standard() -> Self {
        use WorkflowState::*;
        Self::from_edges([
            (Questioning, Refining),
            (Refining, DocumentReview),
            (DocumentReview, FinalApproval),
            (FinalApproval, Development),
        ])
    }

    /// Build a table from explicit edges.  Self-loops are discarded: a
    /// transition must always change the state.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (WorkflowState, WorkflowState)>,
    {
        Self {
            edges: edges.into_iter().filter(|(from, to)| from != to).collect(),
        }
    }

    pub fn allows(&self, from: WorkflowState, to: WorkflowState) -> bool {
        self.edges.contains(&(from, to))
    }

    /// States reachable from `from` in one step, in declaration order.
    pub fn next_states(&self, from: WorkflowState) -> Vec<WorkflowState> {
        WorkflowState::ALL
            .into_iter()
            .filter(|to| self.allows(from, *to))
            .collect()
    }

    /// `true` when no edge leaves `state`.
    pub fn is_terminal(&self, state: WorkflowState) -> bool {
        !self.edges.iter().any(|(from, _)| *from == state)
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
