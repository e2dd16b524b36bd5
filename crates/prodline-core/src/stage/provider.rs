use std::fmt::Write;

use crate::fixed::Ticks;
use crate::token::TokenKind;

use super::{Progress, StageContext};

/// Runtime state of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderState {
    /// Not yet ticked.
    #[default]
    Idle,
    /// Counting active ticks towards the next token.
    Producing { elapsed: Ticks },
}

/// Creates a basic token every `interval` active ticks.
#[derive(Debug, Clone)]
pub struct Provider {
    pub kind: TokenKind,
    pub interval: Ticks,
    /// Also produce on the very first active tick.
    pub begin_at_start: bool,
    pub state: ProviderState,
    pub created: u64,
}

impl Provider {
    pub fn new(kind: TokenKind, interval: Ticks, begin_at_start: bool) -> Self {
        Self {
            kind,
            interval,
            begin_at_start,
            state: ProviderState::Idle,
            created: 0,
        }
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        let elapsed = match self.state {
            ProviderState::Idle => {
                self.state = ProviderState::Producing { elapsed: 0 };
                if self.begin_at_start {
                    self.produce(ctx);
                    return true;
                }
                1
            }
            ProviderState::Producing { elapsed } => elapsed + 1,
        };

        if elapsed >= self.interval {
            self.state = ProviderState::Producing { elapsed: 0 };
            self.produce(ctx);
            true
        } else {
            self.state = ProviderState::Producing { elapsed };
            false
        }
    }

    fn produce(&mut self, ctx: &mut StageContext<'_>) {
        if let Some(token) = ctx.create_token(self.kind) {
            self.created += 1;
            ctx.emit_primary(token);
        }
    }

    pub(crate) fn progress(&self) -> Progress {
        let elapsed = match self.state {
            ProviderState::Idle => 0,
            ProviderState::Producing { elapsed } => elapsed,
        };
        Progress {
            elapsed,
            total: self.interval,
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let state = match self.state {
            ProviderState::Idle => "Idle",
            ProviderState::Producing { .. } => "Producing",
        };
        let _ = writeln!(out, "Token kind: {}", self.kind);
        let _ = writeln!(out, "Interval: {} ticks", self.interval);
        let _ = writeln!(out, "State: {state}");
        let _ = write!(out, "Created: {}", self.created);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::harness::Harness;

    fn run(provider: &mut Provider, h: &mut Harness, ticks: Ticks) -> Vec<Ticks> {
        let mut produced_at = Vec::new();
        for t in 1..=ticks {
            h.tick = t;
            provider.tick(&mut h.ctx());
            if !h.drain().is_empty() {
                produced_at.push(t);
            }
        }
        produced_at
    }

    #[test]
    fn produces_every_interval() {
        let mut h = Harness::new(1);
        let mut p = Provider::new(TokenKind::Base, 3, false);
        assert_eq!(run(&mut p, &mut h, 10), vec![3, 6, 9]);
        assert_eq!(p.created, 3);
    }

    #[test]
    fn begin_at_start_produces_on_first_tick() {
        let mut h = Harness::new(1);
        let mut p = Provider::new(TokenKind::Body, 3, true);
        assert_eq!(run(&mut p, &mut h, 8), vec![1, 4, 7]);
    }

    #[test]
    fn interval_of_one_produces_every_tick() {
        let mut h = Harness::new(1);
        let mut p = Provider::new(TokenKind::Detail, 1, false);
        assert_eq!(run(&mut p, &mut h, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn emitted_tokens_are_live_and_of_kind() {
        let mut h = Harness::new(1);
        let mut p = Provider::new(TokenKind::Body, 1, true);
        h.tick = 1;
        p.tick(&mut h.ctx());
        let out = h.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].token.kind(), TokenKind::Body);
        assert_eq!(out[0].to, h.output(0));
        assert!(h.tokens.contains(out[0].token.id()));
    }

    #[test]
    fn composite_kind_creates_nothing() {
        let mut h = Harness::new(1);
        let mut p = Provider::new(TokenKind::Composite3, 1, true);
        run(&mut p, &mut h, 3);
        assert_eq!(p.created, 0);
        assert!(h.tokens.is_empty());
    }
}
