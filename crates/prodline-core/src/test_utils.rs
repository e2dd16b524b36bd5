//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{PipelineConfig, ReceiverMode, StageConfig, StageKindConfig};
use crate::coordinator::Coordinator;
use crate::event::{Event, EventKind};
use crate::fixed::Ticks;
use crate::id::StageId;
use crate::token::{Attribute, Dimensions, Token, TokenKind};

// ===========================================================================
// Stage constructors
// ===========================================================================

pub fn provider(name: &str, token: TokenKind, interval: Ticks) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::Provider {
            token,
            interval,
            begin_at_start: true,
        },
    )
}

/// A conveyor whose travel takes exactly `ticks` at velocity 1.
pub fn conveyor(name: &str, ticks: Ticks) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::Conveyor {
            velocity: 1.0,
            path: Vec::new(),
            length: Some(ticks as f64),
        },
    )
}

pub fn buffer(name: &str, interval: Ticks) -> StageConfig {
    StageConfig::new(name, StageKindConfig::Buffer { interval })
}

pub fn assembler(
    name: &str,
    first: TokenKind,
    second: TokenKind,
    production_time: Ticks,
) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::Assembler {
            first,
            second,
            production_time,
        },
    )
}

pub fn splitter(name: &str, weights: &[f64]) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::FlowSplitter {
            weights: weights.to_vec(),
        },
    )
}

pub fn gate(name: &str, threshold: i32) -> StageConfig {
    StageConfig::new(name, StageKindConfig::QualityGate { threshold })
}

pub fn storer(name: &str) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::Receiver {
            mode: ReceiverMode::Storer,
        },
    )
}

pub fn destroyer(name: &str, window: usize) -> StageConfig {
    StageConfig::new(
        name,
        StageKindConfig::Receiver {
            mode: ReceiverMode::Destroyer {
                window,
                destroy_interval: None,
            },
        },
    )
}

// ===========================================================================
// Lines
// ===========================================================================

/// Build a line that is expected to be valid.
pub fn build(title: &str, stages: Vec<StageConfig>) -> Coordinator {
    let config = PipelineConfig::new(title, stages).with_seed(42);
    match Coordinator::build(&config) {
        Ok(line) => line,
        Err(e) => panic!("line '{title}' failed to build: {e}"),
    }
}

/// Two base providers feeding an assembler through conveyors, with the
/// composites checked by a quality gate.
pub fn assembly_line() -> PipelineConfig {
    PipelineConfig::new(
        "assembly",
        vec![
            provider("base_a", TokenKind::Base, 3).to(["belt_a"]),
            provider("base_b", TokenKind::Base, 4).to(["belt_b"]),
            conveyor("belt_a", 5).to(["press"]),
            conveyor("belt_b", 2).to(["press"]),
            assembler("press", TokenKind::Base, TokenKind::Base, 2).to(["gate"]),
            gate("gate", 100).to(["good", "scrap"]),
            storer("good"),
            destroyer("scrap", 1),
        ],
    )
    .with_seed(7)
}

// ===========================================================================
// Tokens
// ===========================================================================

pub fn base_token(id: &str, value: i32) -> Token {
    Token::basic(
        id.into(),
        Attribute::Base(value),
        Dimensions::unit(),
        0,
        StageId::default(),
    )
}

/// A composite of two bases with the given attribute values.
pub fn base_pair(id_a: &str, a: i32, id_b: &str, b: i32) -> Token {
    Token::compose(base_token(id_a, a), base_token(id_b, b), 0, StageId::default())
}

// ===========================================================================
// Event recording
// ===========================================================================

/// Shared log of delivered events.
pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Record every delivered event of `kind`.
pub fn record(line: &mut Coordinator, kind: EventKind) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    line.on_passive(kind, Box::new(move |e: &Event| sink.borrow_mut().push(e.clone())));
    log
}
