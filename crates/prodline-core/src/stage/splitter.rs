use std::collections::VecDeque;
use std::fmt::Write;

use crate::config::WeightError;
use crate::fixed::{Fixed64, f64_to_fixed64, fixed64_to_f64};
use crate::rng::SimRng;
use crate::token::Token;

use super::StageContext;

/// Routes each token to one of its outputs by weighted random choice.
#[derive(Debug, Clone)]
pub struct FlowSplitter {
    weights: Vec<Fixed64>,
    total: Fixed64,
    pub queue: VecDeque<Token>,
    /// Tokens sent to each output.
    pub routed: Vec<u64>,
}

/// Check weights against the number of outputs and convert them.
pub fn validate_weights(weights: &[f64], outputs: usize) -> Result<Vec<Fixed64>, WeightError> {
    if weights.len() != outputs {
        return Err(WeightError::LengthMismatch {
            expected: outputs,
            actual: weights.len(),
        });
    }
    let mut fixed = Vec::with_capacity(weights.len());
    let mut total = Fixed64::ZERO;
    for (index, &value) in weights.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(WeightError::Invalid { index, value });
        }
        let weight = f64_to_fixed64(value).ok_or(WeightError::OutOfRange { index, value })?;
        total = total.checked_add(weight).ok_or(WeightError::SumOutOfRange)?;
        fixed.push(weight);
    }
    if total <= Fixed64::ZERO {
        return Err(WeightError::ZeroSum);
    }
    Ok(fixed)
}

fn total_of(weights: &[Fixed64]) -> Fixed64 {
    weights
        .iter()
        .fold(Fixed64::ZERO, |acc, &w| acc.saturating_add(w))
}

/// Pick an output index: draw `x` in `[0, total)` and return the first
/// index whose cumulative weight exceeds it.
pub fn choose_output(weights: &[Fixed64], total: Fixed64, rng: &mut SimRng) -> usize {
    let x = rng.below_fixed(total);
    let mut cumulative = Fixed64::ZERO;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if x < cumulative {
            return i;
        }
    }
    // Rounding can leave x at the very top; fall back to the last
    // output that can be chosen at all.
    weights
        .iter()
        .rposition(|&w| w > Fixed64::ZERO)
        .unwrap_or(0)
}

impl FlowSplitter {
    /// Weights must already be validated.
    pub fn new(weights: Vec<Fixed64>) -> Self {
        let total = total_of(&weights);
        let routed = vec![0; weights.len()];
        Self {
            weights,
            total,
            queue: VecDeque::new(),
            routed,
        }
    }

    pub fn weights(&self) -> &[Fixed64] {
        &self.weights
    }

    /// Replace the weights. Counts stay with their output index.
    pub fn set_weights(&mut self, weights: Vec<Fixed64>) {
        self.total = total_of(&weights);
        self.routed.resize(weights.len(), 0);
        self.weights = weights;
    }

    pub(crate) fn accept(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        let Some(token) = self.queue.pop_front() else {
            return false;
        };
        let index = choose_output(&self.weights, self.total, ctx.rng);
        match ctx.outputs.get(index) {
            Some(&to) => {
                self.routed[index] += 1;
                ctx.emit(to, token);
            }
            None => ctx.emit_primary(token),
        }
        true
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.queue.iter().collect()
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let weights: Vec<String> = self
            .weights
            .iter()
            .map(|&w| format!("{:.2}", fixed64_to_f64(w)))
            .collect();
        let routed: Vec<String> = self.routed.iter().map(u64::to_string).collect();
        let _ = writeln!(out, "Weights: {}", weights.join(", "));
        let _ = writeln!(out, "Queued: {}", self.queue.len());
        let _ = write!(out, "Routed: {}", routed.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::harness::Harness;
    use crate::token::TokenKind;

    fn fixed(ws: &[f64]) -> Vec<Fixed64> {
        validate_weights(ws, ws.len()).unwrap()
    }

    #[test]
    fn validation() {
        assert_eq!(
            validate_weights(&[1.0], 2),
            Err(WeightError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(matches!(
            validate_weights(&[1.0, -1.0], 2),
            Err(WeightError::Invalid { index: 1, .. })
        ));
        assert!(matches!(
            validate_weights(&[f64::NAN, 1.0], 2),
            Err(WeightError::Invalid { index: 0, .. })
        ));
        assert_eq!(validate_weights(&[0.0, 0.0], 2), Err(WeightError::ZeroSum));
        assert!(validate_weights(&[0.0, 3.0], 2).is_ok());
    }

    #[test]
    fn weights_beyond_fixed_range_are_rejected() {
        assert_eq!(
            validate_weights(&[3.0e9, 1.0], 2),
            Err(WeightError::OutOfRange {
                index: 0,
                value: 3.0e9
            })
        );
        assert_eq!(
            validate_weights(&[2.0e9, 2.0e9], 2),
            Err(WeightError::SumOutOfRange)
        );
        assert!(validate_weights(&[1.0e9, 1.0e9], 2).is_ok());
    }

    #[test]
    fn even_split_converges() {
        let weights = fixed(&[0.5, 0.5]);
        let total = weights.iter().copied().sum();
        let mut rng = SimRng::new(2024);
        let mut counts = [0u32; 2];
        for _ in 0..10_000 {
            counts[choose_output(&weights, total, &mut rng)] += 1;
        }
        assert!((4_500..=5_500).contains(&counts[0]), "counts: {counts:?}");
    }

    #[test]
    fn zero_weight_output_never_chosen() {
        let weights = fixed(&[0.0, 1.0, 0.0]);
        let total = weights.iter().copied().sum();
        let mut rng = SimRng::new(8);
        for _ in 0..1_000 {
            assert_eq!(choose_output(&weights, total, &mut rng), 1);
        }
    }

    #[test]
    fn skewed_weights_follow_ratio() {
        let weights = fixed(&[3.0, 1.0]);
        let total = weights.iter().copied().sum();
        let mut rng = SimRng::new(77);
        let first = (0..10_000)
            .filter(|_| choose_output(&weights, total, &mut rng) == 0)
            .count();
        assert!((7_000..=8_000).contains(&first), "first: {first}");
    }

    #[test]
    fn one_token_per_tick() {
        let mut h = Harness::new(2);
        let mut s = FlowSplitter::new(fixed(&[1.0, 1.0]));
        for _ in 0..3 {
            let t = h.token(TokenKind::Base);
            s.accept(t);
        }
        assert!(s.tick(&mut h.ctx()));
        assert_eq!(h.drain().len(), 1);
        assert_eq!(s.queue.len(), 2);
        s.tick(&mut h.ctx());
        s.tick(&mut h.ctx());
        assert!(!s.tick(&mut h.ctx()));
        assert_eq!(s.routed.iter().sum::<u64>(), 3);
    }

    #[test]
    fn set_weights_redirects() {
        let mut h = Harness::new(2);
        let mut s = FlowSplitter::new(fixed(&[1.0, 1.0]));
        s.set_weights(fixed(&[0.0, 1.0]));
        for _ in 0..20 {
            let t = h.token(TokenKind::Base);
            s.accept(t);
            s.tick(&mut h.ctx());
        }
        let out = h.drain();
        assert!(out.iter().all(|e| e.to == h.output(1)));
        assert_eq!(s.routed, vec![0, 20]);
    }
}
