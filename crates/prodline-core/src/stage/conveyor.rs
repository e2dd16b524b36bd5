use std::collections::VecDeque;
use std::fmt::Write;

use crate::event::Event;
use crate::fixed::{Fixed64, Ticks, f64_to_fixed64, travel_ticks};
use crate::token::Token;

use super::StageContext;

/// A point on a conveyor path `[x, y, z]`.
pub type Waypoint = [Fixed64; 3];

/// A token riding the belt.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub token: Token,
    /// Active ticks left until arrival.
    pub remaining: Ticks,
}

/// Carries tokens along a path, taking a fixed number of ticks per token.
#[derive(Debug, Clone)]
pub struct Conveyor {
    pub path: Vec<Waypoint>,
    pub duration: Ticks,
    pub in_flight: VecDeque<InFlight>,
    pub delivered: u64,
}

/// Sum of segment lengths along `path`. Initialization only.
pub fn path_length(path: &[[f64; 3]]) -> f64 {
    path.windows(2)
        .map(|seg| {
            let [a, b] = [seg[0], seg[1]];
            ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt()
        })
        .sum()
}

impl Conveyor {
    /// Build from a velocity (units per tick) and either waypoints or an
    /// explicit length. Fails with a description on a non-positive velocity
    /// or a waypoint outside the fixed-point range.
    pub fn new(velocity: f64, path: &[[f64; 3]], length: Option<f64>) -> Result<Self, String> {
        let length = length.unwrap_or_else(|| path_length(path));
        let duration = travel_ticks(length, velocity).ok_or_else(|| {
            format!("conveyor needs a positive velocity and length, got velocity {velocity}, length {length}")
        })?;
        let waypoints = path
            .iter()
            .enumerate()
            .map(|(i, &point)| {
                let [x, y, z] = point.map(f64_to_fixed64);
                match (x, y, z) {
                    (Some(x), Some(y), Some(z)) => Ok([x, y, z]),
                    _ => Err(format!("waypoint {i} {point:?} is out of range")),
                }
            })
            .collect::<Result<Vec<Waypoint>, String>>()?;
        Ok(Self::with_duration(duration, waypoints))
    }

    pub fn with_duration(duration: Ticks, path: Vec<Waypoint>) -> Self {
        Self {
            path,
            duration: duration.max(1),
            in_flight: VecDeque::new(),
            delivered: 0,
        }
    }

    pub(crate) fn accept(&mut self, token: Token, ctx: &mut StageContext<'_>) {
        ctx.events.emit(Event::MotionStarted {
            stage: ctx.stage,
            token: token.id().clone(),
            duration: self.duration,
            path: self.path.clone(),
            tick: ctx.tick,
        });
        self.in_flight.push_back(InFlight {
            token,
            remaining: self.duration,
        });
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        for item in &mut self.in_flight {
            item.remaining = item.remaining.saturating_sub(1);
        }
        let mut arrived = false;
        while self.in_flight.front().is_some_and(|item| item.remaining == 0) {
            let Some(item) = self.in_flight.pop_front() else {
                break;
            };
            ctx.events.emit(Event::TokenArrived {
                stage: ctx.stage,
                token: item.token.id().clone(),
                tick: ctx.tick,
            });
            self.delivered += 1;
            ctx.emit_primary(item.token);
            arrived = true;
        }
        arrived
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.in_flight.iter().map(|item| &item.token).collect()
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let _ = writeln!(out, "Travel time: {} ticks", self.duration);
        let _ = writeln!(out, "In transit: {}", self.in_flight.len());
        let _ = write!(out, "Delivered: {}", self.delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::stage::harness::Harness;
    use crate::token::TokenKind;

    #[test]
    fn duration_from_path() {
        let path = [[0.0, 0.0, 0.0], [6.0, 0.0, 0.0], [6.0, 4.0, 0.0]];
        assert_eq!(path_length(&path), 10.0);
        let c = Conveyor::new(2.0, &path, None).unwrap();
        assert_eq!(c.duration, 5);
        assert_eq!(c.path.len(), 3);
    }

    #[test]
    fn explicit_length_overrides_path() {
        let c = Conveyor::new(3.0, &[], Some(10.0)).unwrap();
        assert_eq!(c.duration, 4);
    }

    #[test]
    fn zero_velocity_is_rejected() {
        assert!(Conveyor::new(0.0, &[], Some(10.0)).is_err());
    }

    #[test]
    fn far_waypoint_is_rejected() {
        let err = Conveyor::new(1.0, &[[0.0, 0.0, 0.0], [1.0e10, 0.0, 0.0]], None).unwrap_err();
        assert!(err.contains("waypoint 1"), "{err}");
    }

    #[test]
    fn emits_exactly_after_duration_in_fifo_order() {
        let mut h = Harness::new(1);
        let mut c = Conveyor::new(2.0, &[], Some(10.0)).unwrap();
        let a = h.token(TokenKind::Base);
        let b = h.token(TokenKind::Base);
        let (a_id, b_id) = (a.id().clone(), b.id().clone());
        c.accept(a, &mut h.ctx());
        c.accept(b, &mut h.ctx());
        assert_eq!(h.events.buffered_count(EventKind::MotionStarted), 2);

        for _ in 0..4 {
            c.tick(&mut h.ctx());
            assert!(h.outbox.is_empty());
        }
        c.tick(&mut h.ctx());
        let out = h.drain();
        let ids: Vec<_> = out.iter().map(|e| e.token.id().clone()).collect();
        assert_eq!(ids, vec![a_id, b_id]);
        assert_eq!(h.events.buffered_count(EventKind::TokenArrived), 2);
        assert_eq!(c.delivered, 2);
    }

    #[test]
    fn staggered_tokens_keep_their_own_countdown() {
        let mut h = Harness::new(1);
        let mut c = Conveyor::with_duration(3, Vec::new());
        let a = h.token(TokenKind::Base);
        c.accept(a, &mut h.ctx());
        c.tick(&mut h.ctx());
        let b = h.token(TokenKind::Base);
        c.accept(b, &mut h.ctx());
        c.tick(&mut h.ctx());
        c.tick(&mut h.ctx());
        assert_eq!(h.drain().len(), 1);
        c.tick(&mut h.ctx());
        assert_eq!(h.drain().len(), 1);
        assert!(c.in_flight.is_empty());
    }
}
