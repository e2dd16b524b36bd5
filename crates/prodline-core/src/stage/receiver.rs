use std::collections::VecDeque;
use std::fmt::Write;

use crate::config::ReceiverMode;
use crate::fixed::Ticks;
use crate::token::Token;

use super::{Progress, StageContext};

/// Terminal stage: stores or destroys what it receives.
#[derive(Debug, Clone)]
pub struct Receiver {
    pub mode: ReceiverMode,
    pub held: VecDeque<Token>,
    pub received: u64,
    pub destroyed: u64,
    /// Active ticks since the last timed destruction.
    pub elapsed: Ticks,
}

impl Receiver {
    pub fn new(mode: ReceiverMode) -> Self {
        Self {
            mode,
            held: VecDeque::new(),
            received: 0,
            destroyed: 0,
            elapsed: 0,
        }
    }

    pub fn storer() -> Self {
        Self::new(ReceiverMode::Storer)
    }

    pub fn destroyer(window: usize) -> Self {
        Self::new(ReceiverMode::Destroyer {
            window,
            destroy_interval: None,
        })
    }

    pub fn is_destroyer(&self) -> bool {
        matches!(self.mode, ReceiverMode::Destroyer { .. })
    }

    fn destroy_oldest(&mut self, ctx: &mut StageContext<'_>) -> bool {
        let Some(token) = self.held.pop_front() else {
            return false;
        };
        tracing::debug!(stage = %ctx.name, token = %token.id(), "destroyed");
        ctx.retire(token);
        self.destroyed += 1;
        true
    }

    pub(crate) fn accept(&mut self, token: Token, ctx: &mut StageContext<'_>) {
        self.held.push_back(token);
        self.received += 1;
        if let ReceiverMode::Destroyer { window, .. } = self.mode {
            while self.held.len() > window {
                self.destroy_oldest(ctx);
            }
        }
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        let ReceiverMode::Destroyer {
            destroy_interval: Some(interval),
            ..
        } = self.mode
        else {
            return false;
        };
        self.elapsed += 1;
        if self.elapsed < interval {
            return false;
        }
        self.elapsed = 0;
        self.destroy_oldest(ctx)
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.held.iter().collect()
    }

    pub(crate) fn progress(&self) -> Option<Progress> {
        match self.mode {
            ReceiverMode::Destroyer {
                destroy_interval: Some(total),
                ..
            } => Some(Progress {
                elapsed: self.elapsed,
                total,
            }),
            _ => None,
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        match self.mode {
            ReceiverMode::Storer => {
                let _ = writeln!(out, "Mode: Storer");
            }
            ReceiverMode::Destroyer { window, .. } => {
                let _ = writeln!(out, "Mode: Destroyer (window {window})");
            }
        }
        let _ = writeln!(out, "Held: {}", self.held.len());
        let _ = write!(out, "Received: {}", self.received);
        if self.is_destroyer() {
            let _ = write!(out, "\nDestroyed: {}", self.destroyed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::harness::Harness;
    use crate::token::TokenKind;

    #[test]
    fn storer_keeps_everything_in_order() {
        let mut h = Harness::new(0);
        let mut r = Receiver::storer();
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let t = h.token(TokenKind::Base);
                let id = t.id().clone();
                r.accept(t, &mut h.ctx());
                id
            })
            .collect();
        let held: Vec<_> = r.held.iter().map(|t| t.id().clone()).collect();
        assert_eq!(held, ids);
        assert_eq!(h.tokens.len(), 3);
        assert_eq!(r.received, 3);
    }

    #[test]
    fn destroyer_window_retires_older_on_second_arrival() {
        let mut h = Harness::new(0);
        let mut r = Receiver::destroyer(1);
        let first = h.token(TokenKind::Base);
        let second = h.token(TokenKind::Base);
        let (first_id, second_id) = (first.id().clone(), second.id().clone());
        r.accept(first, &mut h.ctx());
        assert_eq!(r.held.len(), 1);
        r.accept(second, &mut h.ctx());
        assert_eq!(r.held.len(), 1);
        assert_eq!(r.held[0].id(), &second_id);
        assert!(!h.tokens.contains(&first_id));
        assert_eq!(r.destroyed, 1);
    }

    #[test]
    fn destroy_interval_drains_over_time() {
        let mut h = Harness::new(0);
        let mut r = Receiver::new(ReceiverMode::Destroyer {
            window: 5,
            destroy_interval: Some(2),
        });
        for _ in 0..2 {
            let t = h.token(TokenKind::Base);
            r.accept(t, &mut h.ctx());
        }
        assert!(!r.tick(&mut h.ctx()));
        assert!(r.tick(&mut h.ctx()));
        assert_eq!(r.held.len(), 1);
        r.tick(&mut h.ctx());
        r.tick(&mut h.ctx());
        assert!(r.held.is_empty());
        assert!(h.tokens.is_empty());
        assert_eq!(r.destroyed, 2);
    }

    #[test]
    fn storer_tick_does_nothing() {
        let mut h = Harness::new(0);
        let mut r = Receiver::storer();
        assert!(!r.tick(&mut h.ctx()));
        assert!(r.progress().is_none());
    }
}
