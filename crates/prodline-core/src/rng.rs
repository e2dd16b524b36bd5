//! Deterministic PRNG for simulation use (token ids, attributes, splitter
//! routing).
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, excellent
//! statistical properties. The same seed always replays the same line.

use crate::fixed::Fixed64;

const ID_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    pub fn below(&mut self, bound: u64) -> u64 {
        // Multiply-shift reduction: maps the full u64 range onto [0, bound).
        ((self.next_u64() as u128 * bound as u128) >> 64) as u64
    }

    /// Uniform integer in `[low, high)`. Returns `low` when the range is empty.
    pub fn range_i32(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        let span = (high as i64 - low as i64) as u64;
        (low as i64 + self.below(span) as i64) as i32
    }

    /// Uniform fixed-point value in `[0, 1)`.
    pub fn fraction(&mut self) -> Fixed64 {
        // The upper 32 bits become the fractional part of a Q32.32 value
        // whose integer part is zero.
        Fixed64::from_bits((self.next_u64() >> 32) as i64)
    }

    /// Uniform fixed-point value in `[0, bound)` for a positive `bound`.
    pub fn below_fixed(&mut self, bound: Fixed64) -> Fixed64 {
        if bound <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        self.fraction() * bound
    }

    /// Random identifier of `len` characters drawn from `A-Z0-9`.
    pub fn alphanumeric(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| ID_ALPHABET[self.below(ID_ALPHABET.len() as u64) as usize] as char)
            .collect()
    }

    /// Get the internal state (for hashing).
    pub fn state(&self) -> u64 {
        self.state
    }
}
