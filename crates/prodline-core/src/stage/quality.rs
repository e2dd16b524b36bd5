use std::collections::VecDeque;
use std::fmt::Write;

use crate::id::StageId;
use crate::token::Token;

use super::{RoutingError, StageContext};

/// Inspects composites of two `Base` tokens and routes them to a pass or a
/// reject output depending on their attribute sum.
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub threshold: i32,
    /// `(pass, reject)` outputs. `None` until resolved at build time.
    pub routes: Option<(StageId, StageId)>,
    pub queue: VecDeque<Token>,
    pub passed: u64,
    pub failed: u64,
}

/// Pick `(pass, reject)` from exactly two outputs. The first output that is
/// a destroyer is the reject path. `None` if neither is.
pub fn resolve_routes(
    outputs: &[StageId],
    is_destroyer: impl Fn(StageId) -> bool,
) -> Option<(StageId, StageId)> {
    let &[a, b] = outputs else {
        return None;
    };
    if is_destroyer(a) {
        Some((b, a))
    } else if is_destroyer(b) {
        Some((a, b))
    } else {
        None
    }
}

impl QualityGate {
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold,
            routes: None,
            queue: VecDeque::new(),
            passed: 0,
            failed: 0,
        }
    }

    /// Whether a composite with these attribute values passes.
    pub fn passes(&self, values: (i32, i32)) -> bool {
        values.0 + values.1 <= self.threshold
    }

    pub(crate) fn accept(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    pub(crate) fn tick(&mut self, ctx: &mut StageContext<'_>) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        let Some((pass, reject)) = self.routes else {
            return false;
        };
        while let Some(token) = self.queue.pop_front() {
            match token.quality_values() {
                Some(values) if self.passes(values) => {
                    self.passed += 1;
                    ctx.emit(pass, token);
                }
                Some(_) => {
                    self.failed += 1;
                    ctx.emit(reject, token);
                }
                None => {
                    let kind = token.kind();
                    ctx.reject(token, RoutingError::NotInspectable { kind });
                }
            }
        }
        true
    }

    pub(crate) fn held_tokens(&self) -> Vec<&Token> {
        self.queue.iter().collect()
    }

    pub(crate) fn describe(&self, out: &mut String) {
        let _ = writeln!(out, "Threshold: {}", self.threshold);
        let _ = writeln!(out, "Queued: {}", self.queue.len());
        let _ = writeln!(out, "Passed: {}", self.passed);
        let _ = write!(out, "Failed: {}", self.failed);
    }
}
