//! Read-only query types for inspecting a running line.
//!
//! Snapshots are owned copies with no references into coordinator storage,
//! suitable for UI and renderer consumers.

use crate::id::{StageId, TokenId};
use crate::stage::{Progress, StageHealth, StageKind};

// ---------------------------------------------------------------------------
// Stage snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub id: StageId,
    pub name: String,
    pub kind: StageKind,
    pub health: StageHealth,
    pub paused: bool,
    pub enabled: bool,
    /// Upstream stage names, in wiring order.
    pub inputs: Vec<String>,
    /// Downstream stage names, in routing order.
    pub outputs: Vec<String>,
    /// Ids of held tokens, oldest first.
    pub held: Vec<TokenId>,
    /// Timer progress, for stages that run one.
    pub progress: Option<Progress>,
    /// Tokens this stage has addressed downstream.
    pub emitted: u64,
}

impl StageSnapshot {
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}
