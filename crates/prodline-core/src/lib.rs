//! Prodline Core -- a deterministic discrete-event simulation of a
//! production line.
//!
//! Tokens (bases, bodies, details and the composites assembled from them)
//! flow through a wired line of stages: providers create them, conveyors
//! carry them, buffers meter them, assemblers combine pairs, splitters and
//! quality gates route them, receivers store or destroy them.
//!
//! # Four-Phase Tick Pipeline
//!
//! Each call to [`coordinator::Coordinator::step`] advances the line by one
//! tick through the following phases:
//!
//! 1. **Process** -- Every active stage runs its tick body in declared order.
//! 2. **Deliver** -- Emitted tokens reach their target stages.
//! 3. **Post-tick** -- Changed stages are reported; buffered events are
//!    delivered to listeners.
//! 4. **Bookkeeping** -- Increment the tick counter and compute the state hash.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut line = Coordinator::build(&config)?;
//! line.advance(100);
//! for id in line.live_token_ids() {
//!     println!("{}", line.token_stats(&id));
//! }
//! ```
//!
//! # Key Types
//!
//! - [`coordinator::Coordinator`] -- Owns the line and runs the tick loop.
//! - [`stage::StageBehavior`] -- The seven stage kinds.
//! - [`token::Token`] -- Basic and composite tokens with dimensions.
//! - [`token_index::TokenIndex`] -- Every live token by id.
//! - [`event::EventBus`] -- Per-kind ring buffers with post-tick delivery.
//! - [`config::PipelineConfig`] -- Serde-friendly static line description.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod config;
pub mod coordinator;
pub mod event;
pub mod factory;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod query;
pub mod registry;
pub mod rng;
pub mod sim;
pub mod stage;
pub mod token;
pub mod token_index;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{BuildError, ConfigIssue, PipelineConfig, StageConfig, StageKindConfig};
pub use coordinator::{ControlError, Coordinator};
pub use event::{Event, EventKind};
pub use id::{StageId, TokenId};
pub use stage::StageKind;
pub use token::{Token, TokenKind};
