//! Static pipeline description and the errors found while building it.
//!
//! A [`PipelineConfig`] names every stage, its kind-specific parameters and
//! its ordered outputs. Inputs are derived from the outputs of other stages.

use serde::{Deserialize, Serialize};

use crate::fixed::Ticks;
use crate::token::TokenKind;

// ---------------------------------------------------------------------------
// Pipeline description
// ---------------------------------------------------------------------------

/// Top-level description of a production line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub geometry: Option<GeometryConfig>,
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn new(title: impl Into<String>, stages: Vec<StageConfig>) -> Self {
        Self {
            title: title.into(),
            simulation: SimulationConfig::default(),
            geometry: None,
            stages,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.rng_seed = Some(seed);
        self
    }
}

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub start_paused: bool,
    /// Ring buffer capacity per event kind.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl SimulationConfig {
    pub const DEFAULT_SEED: u64 = 0x5EED;

    pub fn seed(&self) -> u64 {
        self.rng_seed.unwrap_or(Self::DEFAULT_SEED)
    }
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            start_paused: false,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Base box sizes `[width, height, depth]` of the three basic kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    #[serde(default = "unit_box")]
    pub base: [f64; 3],
    #[serde(default = "unit_box")]
    pub body: [f64; 3],
    #[serde(default = "unit_box")]
    pub detail: [f64; 3],
}

fn unit_box() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            base: unit_box(),
            body: unit_box(),
            detail: unit_box(),
        }
    }
}

/// One stage of the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique name. Outputs of other stages refer to it.
    pub name: String,
    pub kind: StageKindConfig,
    /// Downstream stage names, in routing order.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, kind: StageKindConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            outputs: Vec::new(),
        }
    }

    pub fn to<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Kind-specific stage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageKindConfig {
    Provider {
        token: TokenKind,
        /// Ticks between two created tokens.
        interval: Ticks,
        #[serde(default = "default_true")]
        begin_at_start: bool,
    },
    Conveyor {
        /// Units travelled per tick.
        velocity: f64,
        /// Waypoints; the travel length is the sum of segment lengths.
        #[serde(default)]
        path: Vec<[f64; 3]>,
        /// Explicit travel length, overriding `path`.
        #[serde(default)]
        length: Option<f64>,
    },
    Buffer {
        interval: Ticks,
    },
    Assembler {
        first: TokenKind,
        second: TokenKind,
        production_time: Ticks,
    },
    FlowSplitter {
        /// One weight per output.
        weights: Vec<f64>,
    },
    QualityGate {
        /// Largest attribute sum that still passes.
        #[serde(default = "default_threshold")]
        threshold: i32,
    },
    Receiver {
        mode: ReceiverMode,
    },
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> i32 {
    100
}

/// What a receiver does with what it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverMode {
    /// Keep every token.
    Storer,
    /// Keep only the newest `window` tokens, retiring older ones.
    Destroyer {
        #[serde(default = "default_window")]
        window: usize,
        /// Also retire the oldest held token every this many ticks.
        #[serde(default)]
        destroy_interval: Option<Ticks>,
    },
}

fn default_window() -> usize {
    1
}

impl ReceiverMode {
    pub fn destroyer() -> Self {
        ReceiverMode::Destroyer {
            window: default_window(),
            destroy_interval: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Invalid splitter weights.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightError {
    #[error("expected {expected} weights (one per output), got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("weight {index} is {value}; weights must be finite and non-negative")]
    Invalid { index: usize, value: f64 },

    #[error("weight {index} is {value}; it does not fit the fixed-point range")]
    OutOfRange { index: usize, value: f64 },

    #[error("weights sum past the fixed-point range")]
    SumOutOfRange,

    #[error("weights sum to zero")]
    ZeroSum,
}

/// Fatal errors that prevent a line from being built at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("duplicate stage name '{name}'")]
    DuplicateStage { name: String },

    #[error("stage '{stage}' outputs to unknown stage '{output}'")]
    UnknownOutput { stage: String, output: String },

    #[error("splitter '{stage}': {source}")]
    Weights {
        stage: String,
        #[source]
        source: WeightError,
    },

    #[error("{kind} geometry {size:?} is not a valid box size")]
    Geometry { kind: TokenKind, size: [f64; 3] },
}

/// How serious a [`ConfigIssue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Recorded; the stage still works.
    Warning,
    /// The stage is left faulted and does nothing.
    Fault,
}

/// Non-fatal wiring or parameter problems found during build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("stage '{stage}' has no inputs")]
    MissingInput { stage: String },

    #[error("stage '{stage}' has no outputs")]
    MissingOutput { stage: String },

    #[error("provider '{stage}' must not have inputs")]
    UnexpectedInput { stage: String },

    #[error("receiver '{stage}' must not have outputs")]
    UnexpectedOutput { stage: String },

    #[error("stage '{stage}' lists output '{output}' more than once")]
    DuplicateOutput { stage: String, output: String },

    #[error("stage '{stage}' has {count} outputs; only the first is used")]
    ExtraOutputs { stage: String, count: usize },

    #[error("provider '{stage}' cannot create {kind} tokens")]
    NonBasicProvider { stage: String, kind: TokenKind },

    #[error("quality gate '{stage}' needs exactly two outputs, has {count}")]
    QualityGateOutputs { stage: String, count: usize },

    #[error("quality gate '{stage}' has no destroyer output for rejected tokens")]
    NoRejectOutput { stage: String },

    #[error("stage '{stage}': {detail}")]
    InvalidParameter { stage: String, detail: String },

    #[error("assembler '{stage}' has no composition rule for {first} + {second}")]
    NoCompositionRule {
        stage: String,
        first: TokenKind,
        second: TokenKind,
    },
}

impl ConfigIssue {
    pub fn severity(&self) -> Severity {
        match self {
            ConfigIssue::DuplicateOutput { .. }
            | ConfigIssue::ExtraOutputs { .. }
            | ConfigIssue::NoCompositionRule { .. } => Severity::Warning,
            _ => Severity::Fault,
        }
    }

    /// Name of the stage the issue is about.
    pub fn stage(&self) -> &str {
        match self {
            ConfigIssue::MissingInput { stage }
            | ConfigIssue::MissingOutput { stage }
            | ConfigIssue::UnexpectedInput { stage }
            | ConfigIssue::UnexpectedOutput { stage }
            | ConfigIssue::DuplicateOutput { stage, .. }
            | ConfigIssue::ExtraOutputs { stage, .. }
            | ConfigIssue::NonBasicProvider { stage, .. }
            | ConfigIssue::QualityGateOutputs { stage, .. }
            | ConfigIssue::NoRejectOutput { stage }
            | ConfigIssue::InvalidParameter { stage, .. }
            | ConfigIssue::NoCompositionRule { stage, .. } => stage,
        }
    }
}
