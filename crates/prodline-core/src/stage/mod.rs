//! Stage kinds and the context they run in.
//!
//! Every stage is a [`Stage`] wrapping a [`StageBehavior`]. Dispatch is an
//! enum match (no trait objects). During a tick the coordinator lends each
//! stage a [`StageContext`]: the stage may create, compose and retire tokens
//! and push addressed [`Emission`]s into the outbox, which the coordinator
//! delivers after every stage has run.

pub mod assembler;
pub mod buffer;
pub mod conveyor;
pub mod provider;
pub mod quality;
pub mod receiver;
pub mod splitter;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventBus};
use crate::factory::TokenFactory;
use crate::fixed::Ticks;
use crate::id::{StageId, TokenId};
use crate::rng::SimRng;
use crate::token::{Token, TokenKind};
use crate::token_index::TokenIndex;

pub use assembler::{Assembler, AssemblerState};
pub use buffer::Buffer;
pub use conveyor::Conveyor;
pub use provider::{Provider, ProviderState};
pub use quality::QualityGate;
pub use receiver::Receiver;
pub use splitter::FlowSplitter;

// ---------------------------------------------------------------------------
// Kinds and health
// ---------------------------------------------------------------------------

/// The seven stage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Provider,
    Conveyor,
    Buffer,
    Assembler,
    FlowSplitter,
    QualityGate,
    Receiver,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::Provider,
        StageKind::Conveyor,
        StageKind::Buffer,
        StageKind::Assembler,
        StageKind::FlowSplitter,
        StageKind::QualityGate,
        StageKind::Receiver,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Provider => "Provider",
            StageKind::Conveyor => "Conveyor",
            StageKind::Buffer => "Buffer",
            StageKind::Assembler => "Assembler",
            StageKind::FlowSplitter => "FlowSplitter",
            StageKind::QualityGate => "QualityGate",
            StageKind::Receiver => "Receiver",
        }
    }

    /// Parse a kind from its display name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a stage is able to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageHealth {
    Ready,
    /// Misconfigured; the stage does nothing and refuses deliveries.
    Faulted(String),
}

impl StageHealth {
    pub fn is_ready(&self) -> bool {
        matches!(self, StageHealth::Ready)
    }
}

impl std::fmt::Display for StageHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageHealth::Ready => f.write_str("Ready"),
            StageHealth::Faulted(reason) => write!(f, "Faulted ({reason})"),
        }
    }
}

/// Timer progress of a stage, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Progress {
    pub elapsed: Ticks,
    pub total: Ticks,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A token addressed from one stage to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub from: StageId,
    pub to: StageId,
    pub token: Token,
}

/// Why a token was dropped instead of routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("{kind} token fits neither assembler slot")]
    UnexpectedKind { kind: TokenKind },

    #[error("{kind} token cannot be inspected")]
    NotInspectable { kind: TokenKind },

    #[error("stage has no output")]
    NoOutput,

    #[error("stage does not take inputs")]
    NoInput,

    #[error("target stage is disabled")]
    StageDisabled,

    #[error("target stage is faulted")]
    StageFaulted,

    #[error("target stage does not exist")]
    UnknownTarget,
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Everything a stage may touch while it runs. Borrowed from the coordinator
/// for the duration of one tick body or one delivery.
pub struct StageContext<'a> {
    pub tick: Ticks,
    pub stage: StageId,
    pub name: &'a str,
    /// Wired outputs, in routing order.
    pub outputs: &'a [StageId],
    pub rng: &'a mut SimRng,
    pub factory: &'a dyn TokenFactory,
    pub tokens: &'a mut TokenIndex,
    pub events: &'a mut EventBus,
    pub outbox: &'a mut Vec<Emission>,
}

impl StageContext<'_> {
    /// Address a token to `to`. Delivered after all stages have run.
    pub fn emit(&mut self, to: StageId, token: Token) {
        tracing::trace!(stage = %self.name, token = %token.id(), "emit");
        self.events.emit(Event::TokenEmitted {
            from: self.stage,
            to,
            token: token.id().clone(),
            tick: self.tick,
        });
        self.outbox.push(Emission {
            from: self.stage,
            to,
            token,
        });
    }

    /// Address a token to the first output, or reject it if there is none.
    pub fn emit_primary(&mut self, token: Token) {
        match self.outputs.first() {
            Some(&to) => self.emit(to, token),
            None => self.reject(token, RoutingError::NoOutput),
        }
    }

    /// Create and register a new basic token. Returns `None` (after logging)
    /// when `kind` is not a basic kind.
    pub fn create_token(&mut self, kind: TokenKind) -> Option<Token> {
        let Some(attribute) = self.factory.attribute(kind, self.rng) else {
            tracing::error!(stage = %self.name, %kind, "cannot create token of this kind");
            return None;
        };
        let mut id = TokenId(self.rng.alphanumeric(TokenId::LEN));
        while self.tokens.contains(&id) {
            id = TokenId(self.rng.alphanumeric(TokenId::LEN));
        }
        let token = Token::basic(
            id,
            attribute,
            self.factory.geometry(kind),
            self.tick,
            self.stage,
        );
        self.tokens.register(&token, self.name, self.tick, self.events);
        tracing::debug!(stage = %self.name, token = %token.id(), %kind, "created token");
        Some(token)
    }

    /// Combine two tokens. Both inputs leave the live index and the
    /// composite enters it.
    pub fn compose(&mut self, first: Token, second: Token) -> Token {
        self.tokens.retire(first.id(), self.tick, self.events);
        self.tokens.retire(second.id(), self.tick, self.events);
        let composite = Token::compose(first, second, self.tick, self.stage);
        if !self.tokens.register(&composite, self.name, self.tick, self.events) {
            tracing::warn!(stage = %self.name, token = %composite.id(), "composite id already live");
        }
        tracing::debug!(
            stage = %self.name,
            token = %composite.id(),
            kind = %composite.kind(),
            "assembled"
        );
        composite
    }

    /// Remove a token from the line for good.
    pub fn retire(&mut self, token: Token) -> bool {
        self.tokens.retire(token.id(), self.tick, self.events)
    }

    /// Drop a token because of a routing or type error.
    pub fn reject(&mut self, token: Token, reason: RoutingError) {
        tracing::warn!(stage = %self.name, token = %token.id(), %reason, "token rejected");
        self.events.emit(Event::TokenRejected {
            stage: self.stage,
            token: token.id().clone(),
            reason: reason.to_string(),
            tick: self.tick,
        });
        self.retire(token);
    }
}

// ---------------------------------------------------------------------------
// Behaviour dispatch
// ---------------------------------------------------------------------------

/// Kind-specific state and logic of a stage.
#[derive(Debug, Clone)]
pub enum StageBehavior {
    Provider(Provider),
    Conveyor(Conveyor),
    Buffer(Buffer),
    Assembler(Assembler),
    FlowSplitter(FlowSplitter),
    QualityGate(QualityGate),
    Receiver(Receiver),
}

impl StageBehavior {
    pub fn kind(&self) -> StageKind {
        match self {
            StageBehavior::Provider(_) => StageKind::Provider,
            StageBehavior::Conveyor(_) => StageKind::Conveyor,
            StageBehavior::Buffer(_) => StageKind::Buffer,
            StageBehavior::Assembler(_) => StageKind::Assembler,
            StageBehavior::FlowSplitter(_) => StageKind::FlowSplitter,
            StageBehavior::QualityGate(_) => StageKind::QualityGate,
            StageBehavior::Receiver(_) => StageKind::Receiver,
        }
    }

    /// Run one active tick. Returns whether the stage's state changed.
    pub fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        match self {
            StageBehavior::Provider(s) => s.tick(ctx),
            StageBehavior::Conveyor(s) => s.tick(ctx),
            StageBehavior::Buffer(s) => s.tick(ctx),
            StageBehavior::Assembler(s) => s.tick(ctx),
            StageBehavior::FlowSplitter(s) => s.tick(ctx),
            StageBehavior::QualityGate(s) => s.tick(ctx),
            StageBehavior::Receiver(s) => s.tick(ctx),
        }
    }

    /// Take ownership of a delivered token.
    pub fn accept(&mut self, token: Token, ctx: &mut StageContext<'_>) {
        match self {
            StageBehavior::Provider(_) => ctx.reject(token, RoutingError::NoInput),
            StageBehavior::Conveyor(s) => s.accept(token, ctx),
            StageBehavior::Buffer(s) => s.accept(token),
            StageBehavior::Assembler(s) => s.accept(token, ctx),
            StageBehavior::FlowSplitter(s) => s.accept(token),
            StageBehavior::QualityGate(s) => s.accept(token),
            StageBehavior::Receiver(s) => s.accept(token, ctx),
        }
    }

    /// Tokens currently held, oldest first.
    pub fn held_tokens(&self) -> Vec<&Token> {
        match self {
            StageBehavior::Provider(_) => Vec::new(),
            StageBehavior::Conveyor(s) => s.held_tokens(),
            StageBehavior::Buffer(s) => s.held_tokens(),
            StageBehavior::Assembler(s) => s.held_tokens(),
            StageBehavior::FlowSplitter(s) => s.held_tokens(),
            StageBehavior::QualityGate(s) => s.held_tokens(),
            StageBehavior::Receiver(s) => s.held_tokens(),
        }
    }

    /// Timer progress, for stages that run one.
    pub fn progress(&self) -> Option<Progress> {
        match self {
            StageBehavior::Provider(s) => Some(s.progress()),
            StageBehavior::Buffer(s) => Some(s.progress()),
            StageBehavior::Assembler(s) => Some(s.progress()),
            StageBehavior::Receiver(s) => s.progress(),
            StageBehavior::Conveyor(_)
            | StageBehavior::FlowSplitter(_)
            | StageBehavior::QualityGate(_) => None,
        }
    }

    /// Append kind-specific stats lines.
    pub fn describe(&self, out: &mut String) {
        match self {
            StageBehavior::Provider(s) => s.describe(out),
            StageBehavior::Conveyor(s) => s.describe(out),
            StageBehavior::Buffer(s) => s.describe(out),
            StageBehavior::Assembler(s) => s.describe(out),
            StageBehavior::FlowSplitter(s) => s.describe(out),
            StageBehavior::QualityGate(s) => s.describe(out),
            StageBehavior::Receiver(s) => s.describe(out),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A processing node of the line.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub behavior: StageBehavior,
    pub paused: bool,
    /// Disabled stages refuse deliveries.
    pub enabled: bool,
    pub health: StageHealth,
    /// Tokens this stage has addressed downstream.
    pub emitted: u64,
}

impl Stage {
    pub fn new(name: impl Into<String>, behavior: StageBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            paused: false,
            enabled: true,
            health: StageHealth::Ready,
            emitted: 0,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.behavior.kind()
    }

    /// Whether the tick body runs this tick.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.paused && self.health.is_ready()
    }
}

// ---------------------------------------------------------------------------
// Test harness
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::factory::StandardFactory;
    use slotmap::SlotMap;

    /// Owns everything a [`StageContext`] borrows, for driving one stage by
    /// hand.
    pub struct Harness {
        pub ids: Vec<StageId>,
        pub rng: SimRng,
        pub factory: StandardFactory,
        pub tokens: TokenIndex,
        pub events: EventBus,
        pub outbox: Vec<Emission>,
        pub tick: Ticks,
    }

    impl Harness {
        /// `ids[0]` is the stage under test, `ids[1..]` its outputs.
        pub fn new(outputs: usize) -> Self {
            let mut sm = SlotMap::<StageId, ()>::with_key();
            Self {
                ids: (0..=outputs).map(|_| sm.insert(())).collect(),
                rng: SimRng::new(42),
                factory: StandardFactory::default(),
                tokens: TokenIndex::new(),
                events: EventBus::default(),
                outbox: Vec::new(),
                tick: 0,
            }
        }

        pub fn ctx(&mut self) -> StageContext<'_> {
            StageContext {
                tick: self.tick,
                stage: self.ids[0],
                name: "under_test",
                outputs: &self.ids[1..],
                rng: &mut self.rng,
                factory: &self.factory,
                tokens: &mut self.tokens,
                events: &mut self.events,
                outbox: &mut self.outbox,
            }
        }

        /// A registered basic token.
        pub fn token(&mut self, kind: TokenKind) -> Token {
            let mut ctx = self.ctx();
            ctx.create_token(kind).expect("basic kind")
        }

        pub fn output(&self, i: usize) -> StageId {
            self.ids[i + 1]
        }

        pub fn drain(&mut self) -> Vec<Emission> {
            std::mem::take(&mut self.outbox)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::harness::Harness;
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn kind_names_round_trip() {
        for kind in StageKind::ALL {
            assert_eq!(StageKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StageKind::from_name("Mixer"), None);
    }

    #[test]
    fn create_token_registers_and_stamps() {
        let mut h = Harness::new(1);
        h.tick = 9;
        let token = h.token(TokenKind::Base);
        assert_eq!(token.id().as_str().len(), TokenId::LEN);
        assert_eq!(token.created_at(), 9);
        assert_eq!(token.creation_stage(), h.ids[0]);
        assert!(h.tokens.contains(token.id()));
    }

    #[test]
    fn create_token_refuses_composites() {
        let mut h = Harness::new(1);
        let mut ctx = h.ctx();
        assert!(ctx.create_token(TokenKind::Composite2).is_none());
        assert!(h.tokens.is_empty());
    }

    #[test]
    fn compose_swaps_index_entries() {
        let mut h = Harness::new(1);
        let a = h.token(TokenKind::Base);
        let b = h.token(TokenKind::Base);
        let (a_id, b_id) = (a.id().clone(), b.id().clone());
        let c = h.ctx().compose(a, b);
        assert!(!h.tokens.contains(&a_id));
        assert!(!h.tokens.contains(&b_id));
        assert!(h.tokens.contains(c.id()));
        assert_eq!(h.tokens.len(), 1);
    }

    #[test]
    fn reject_retires_and_reports() {
        let mut h = Harness::new(1);
        let t = h.token(TokenKind::Body);
        h.ctx().reject(t, RoutingError::NoOutput);
        assert!(h.tokens.is_empty());
        assert_eq!(h.events.buffered_count(EventKind::TokenRejected), 1);
    }

    #[test]
    fn emit_primary_without_outputs_rejects() {
        let mut h = Harness::new(0);
        let t = h.token(TokenKind::Base);
        h.ctx().emit_primary(t);
        assert!(h.outbox.is_empty());
        assert!(h.tokens.is_empty());
    }

    #[test]
    fn emit_primary_addresses_first_output() {
        let mut h = Harness::new(2);
        let t = h.token(TokenKind::Base);
        h.ctx().emit_primary(t);
        let out = h.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, h.output(0));
        assert_eq!(out[0].from, h.ids[0]);
        assert_eq!(h.events.buffered_count(EventKind::TokenEmitted), 1);
    }
}
