//! Clock, advance strategy and determinism hash.
//!
//! The coordinator is parameterized by a [`SimulationStrategy`] that
//! determines how time advances. Every strategy runs the same four-phase
//! step; they differ only in how many steps `advance()` runs.

use crate::fixed::{Fixed64, Ticks};

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the coordinator advances time. Chosen at construction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SimulationStrategy {
    /// `advance(n)` runs exactly `n` steps.
    Tick,

    /// Real-time mode. `advance(dt)` accumulates elapsed time and runs as
    /// many fixed steps as fit, carrying the remainder forward.
    Delta {
        /// Duration of one fixed step, in ticks.
        fixed_timestep: Ticks,
    },
}

impl SimulationStrategy {
    /// Number of steps to run for `dt`, updating the accumulator.
    pub fn steps_for(&self, state: &mut SimState, dt: Ticks) -> u64 {
        match *self {
            SimulationStrategy::Tick => dt,
            SimulationStrategy::Delta { fixed_timestep } => {
                let step = fixed_timestep.max(1);
                state.accumulator += dt;
                let steps = state.accumulator / step;
                state.accumulator %= step;
                steps
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable clock state tracked by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Current tick counter. Incremented by 1 for each step.
    pub tick: Ticks,

    /// Time remainder for delta mode. Unused in tick mode.
    pub accumulator: Ticks,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of a `Coordinator::advance()` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Number of steps actually executed.
    pub steps_run: u64,
    /// Emissions delivered across those steps.
    pub delivered: u64,
    /// Tokens rejected at delivery across those steps.
    pub rejected: u64,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// Running 64-bit FNV-1a hash used to compare two runs of a line.
/// Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Strings are length-prefixed so adjacent writes cannot run together.
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write(s.as_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero() {
        let state = SimState::new();
        assert_eq!(state.tick, 0);
        assert_eq!(state.accumulator, 0);
    }

    #[test]
    fn tick_strategy_runs_dt_steps() {
        let mut state = SimState::new();
        assert_eq!(SimulationStrategy::Tick.steps_for(&mut state, 7), 7);
        assert_eq!(state.accumulator, 0);
    }

    #[test]
    fn delta_strategy_carries_remainder() {
        let strategy = SimulationStrategy::Delta { fixed_timestep: 4 };
        let mut state = SimState::new();
        assert_eq!(strategy.steps_for(&mut state, 3), 0);
        assert_eq!(strategy.steps_for(&mut state, 6), 2);
        assert_eq!(state.accumulator, 1);
    }

    #[test]
    fn equal_writes_hash_equal() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_str("belt");

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_str("belt");

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn write_order_changes_hash() {
        let mut h1 = StateHash::new();
        h1.write_u64(1);
        h1.write_u64(2);

        let mut h2 = StateHash::new();
        h2.write_u64(2);
        h2.write_u64(1);

        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_strings_do_not_run_together() {
        let mut h1 = StateHash::new();
        h1.write_str("ab");
        h1.write_str("c");

        let mut h2 = StateHash::new();
        h2.write_str("a");
        h2.write_str("bc");

        assert_ne!(h1.finish(), h2.finish());
    }
}
