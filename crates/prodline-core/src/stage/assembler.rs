use std::collections::VecDeque;
use std::fmt::Write;

use crate::fixed::Ticks;
use crate::token::{Token, TokenKind};

use super::{Progress, RoutingError, StageContext};

/// Runtime state of an assembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssemblerState {
    /// Waiting for both slots to hold a token.
    #[default]
    Idle,
    Assembling { elapsed: Ticks },
}

/// Combines one token from each of two slots into a composite.
///
/// When both slots expect the same kind, arrivals alternate strictly
/// between them; otherwise each arrival goes to the slot of its kind.
#[derive(Debug, Clone)]
pub struct Assembler {
    pub kinds: [TokenKind; 2],
    pub production_time: Ticks,
    pub slots: [VecDeque<Token>; 2],
    pub state: AssemblerState,
    /// Slot the next arrival goes to when both kinds are equal.
    next_slot: usize,
    pub assembled: u64,
}

impl Assembler {
    pub fn new(first: TokenKind, second: TokenKind, production_time: Ticks) -> Self {
        Self {
            kinds: [first, second],
            production_time,
            slots: [VecDeque::new(), VecDeque::new()],
            state: AssemblerState::Idle,
            next_slot: 0,
            assembled: 0,
        }
    }

    fn slot_for(&mut self, kind: TokenKind) -> Option<usize> {
        if self.kinds[0] == self.kinds[1] {
            if kind != self.kinds[0] {
                return None;
            }
            let slot = self.next_slot;
            self.next_slot = 1 - slot;
            Some(slot)
        } else {
            self.kinds.iter().position(|&k| k == kind)
        }
    }

    pub(crate) fn accept(&mut self, token: Token, ctx: &mut StageContext<'_>) {
        match self.slot_for(token.kind()) {
            Some(slot) => self.slots[slot].push_back(token),
            None => {
                let kind = token.kind();
                ctx.reject(token, RoutingError::UnexpectedKind { kind });
            }
        }
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        if self.slots.iter().any(VecDeque::is_empty) {
            return false;
        }
        let elapsed = match self.state {
            AssemblerState::Idle => 1,
            AssemblerState::Assembling { elapsed } => elapsed + 1,
        };
        if elapsed < self.production_time {
            let started = self.state == AssemblerState::Idle;
            self.state = AssemblerState::Assembling { elapsed };
            return started;
        }

        self.state = AssemblerState::Idle;
        let [first_slot, second_slot] = &mut self.slots;
        if let (Some(first), Some(second)) = (first_slot.pop_front(), second_slot.pop_front()) {
            let composite = ctx.compose(first, second);
            self.assembled += 1;
            ctx.emit_primary(composite);
        }
        true
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.slots.iter().flatten().collect()
    }

    pub(crate) fn progress(&self) -> Progress {
        let elapsed = match self.state {
            AssemblerState::Idle => 0,
            AssemblerState::Assembling { elapsed } => elapsed,
        };
        Progress {
            elapsed,
            total: self.production_time,
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let state = match self.state {
            AssemblerState::Idle => "Idle".to_string(),
            AssemblerState::Assembling { elapsed } => {
                format!("Assembling ({elapsed}/{})", self.production_time)
            }
        };
        let _ = writeln!(out, "Slots: {} + {}", self.kinds[0], self.kinds[1]);
        let _ = writeln!(
            out,
            "Queued: {} / {}",
            self.slots[0].len(),
            self.slots[1].len()
        );
        let _ = writeln!(out, "Production time: {} ticks", self.production_time);
        let _ = writeln!(out, "State: {state}");
        let _ = write!(out, "Assembled: {}", self.assembled);
    }
}
