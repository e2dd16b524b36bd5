use std::collections::VecDeque;
use std::fmt::Write;

use crate::fixed::Ticks;
use crate::token::Token;

use super::{Progress, StageContext};

/// FIFO queue releasing its head every `interval` active ticks.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub interval: Ticks,
    pub queue: VecDeque<Token>,
    pub elapsed: Ticks,
}

impl Buffer {
    pub fn new(interval: Ticks) -> Self {
        Self {
            interval,
            queue: VecDeque::new(),
            elapsed: 0,
        }
    }

    pub(crate) fn accept(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        self.elapsed += 1;
        if self.elapsed < self.interval {
            return false;
        }
        // The interval restarts whether or not anything was released.
        self.elapsed = 0;
        match self.queue.pop_front() {
            Some(token) => {
                ctx.emit_primary(token);
                true
            }
            None => false,
        }
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.queue.iter().collect()
    }

    pub(crate) fn progress(&self) -> Progress {
        Progress {
            elapsed: self.elapsed,
            total: self.interval,
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let _ = writeln!(out, "Interval: {} ticks", self.interval);
        let _ = write!(out, "Queued: {}", self.queue.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::harness::Harness;
    use crate::token::TokenKind;

    #[test]
    fn releases_fifo_at_interval() {
        let mut h = Harness::new(1);
        let mut b = Buffer::new(2);
        let first = h.token(TokenKind::Base);
        let second = h.token(TokenKind::Body);
        let (first_id, second_id) = (first.id().clone(), second.id().clone());
        b.accept(first);
        b.accept(second);

        assert!(!b.tick(&mut h.ctx()));
        assert!(b.tick(&mut h.ctx()));
        assert!(!b.tick(&mut h.ctx()));
        assert!(b.tick(&mut h.ctx()));

        let out = h.drain();
        let ids: Vec<_> = out.iter().map(|e| e.token.id().clone()).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }

    #[test]
    fn interval_restarts_when_empty() {
        let mut h = Harness::new(1);
        let mut b = Buffer::new(3);
        for _ in 0..3 {
            b.tick(&mut h.ctx());
        }
        assert_eq!(b.elapsed, 0);
        let t = h.token(TokenKind::Base);
        b.accept(t);
        b.tick(&mut h.ctx());
        b.tick(&mut h.ctx());
        assert!(h.outbox.is_empty());
        b.tick(&mut h.ctx());
        assert_eq!(h.drain().len(), 1);
    }
}
