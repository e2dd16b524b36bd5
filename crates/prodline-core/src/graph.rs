use crate::id::StageId;
use slotmap::SecondaryMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while wiring stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("stage not found: {0:?}")]
    StageNotFound(StageId),
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Adjacency lists for a single stage, in declared order.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    /// Stages that emit into this one.
    inputs: Vec<StageId>,
    /// Stages this one emits into.
    outputs: Vec<StageId>,
}

/// Directed stage-to-stage wiring, built once when the line is constructed.
///
/// Each edge appears at most once: connecting the same pair twice is a
/// no-op. Output order is the routing order used by splitters and gates.
#[derive(Debug, Default)]
pub struct WiringGraph {
    adjacency: SecondaryMap<StageId, Adjacency>,
    edge_count: usize,
}

impl WiringGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: StageId) {
        self.adjacency.insert(stage, Adjacency::default());
    }

    /// Add an edge `from -> to`. Returns `Ok(false)` if the edge already
    /// exists.
    pub fn connect(&mut self, from: StageId, to: StageId) -> Result<bool, GraphError> {
        for stage in [from, to] {
            if !self.adjacency.contains_key(stage) {
                return Err(GraphError::StageNotFound(stage));
            }
        }
        if self.has_edge(from, to) {
            return Ok(false);
        }
        if let Some(source) = self.adjacency.get_mut(from) {
            source.outputs.push(to);
        }
        if let Some(target) = self.adjacency.get_mut(to) {
            target.inputs.push(from);
        }
        self.edge_count += 1;
        Ok(true)
    }

    pub fn inputs(&self, stage: StageId) -> &[StageId] {
        self.adjacency
            .get(stage)
            .map(|a| a.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn outputs(&self, stage: StageId) -> &[StageId] {
        self.adjacency
            .get(stage)
            .map(|a| a.outputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_edge(&self, from: StageId, to: StageId) -> bool {
        self.outputs(from).contains(&to)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
