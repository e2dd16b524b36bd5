//! Live-token index: every token currently alive in the line, keyed by id.
//!
//! Holds reporting records, not the tokens themselves; the stages own the
//! tokens. Every change raises a [`Event::TokenChanged`] notification.

use std::collections::BTreeMap;

use crate::event::{Event, EventBus, TokenChange};
use crate::fixed::Ticks;
use crate::id::{StageId, TokenId};
use crate::token::{Dimensions, Token, TokenKind};

/// Reporting snapshot of a live token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: TokenId,
    pub kind: TokenKind,
    pub dimensions: Dimensions,
    /// Attribute or constituents, pre-rendered.
    pub detail: String,
    pub created_at: Ticks,
    pub creation_stage: StageId,
    pub creation_stage_name: String,
    pub current_stage: StageId,
    pub current_stage_name: String,
}

impl TokenRecord {
    fn new(token: &Token, stage_name: &str) -> Self {
        Self {
            id: token.id().clone(),
            kind: token.kind(),
            dimensions: token.dimensions(),
            detail: token.detail(),
            created_at: token.created_at(),
            creation_stage: token.creation_stage(),
            creation_stage_name: stage_name.to_owned(),
            current_stage: token.creation_stage(),
            current_stage_name: stage_name.to_owned(),
        }
    }

    /// Human-readable multi-line summary.
    pub fn stats(&self) -> String {
        format!(
            "Id: {}\nKind: {}\nDimensions: {}\nDetail: {}\nCreated: tick {} at {}\nCurrent stage: {}",
            self.id,
            self.kind,
            self.dimensions,
            self.detail,
            self.created_at,
            self.creation_stage_name,
            self.current_stage_name,
        )
    }
}

/// Index of live tokens, ordered by id.
#[derive(Debug, Default)]
pub struct TokenIndex {
    records: BTreeMap<TokenId, TokenRecord>,
}

impl TokenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created token. Returns `false` (and changes nothing)
    /// if a token with that id is already live.
    pub fn register(
        &mut self,
        token: &Token,
        stage_name: &str,
        tick: Ticks,
        events: &mut EventBus,
    ) -> bool {
        if self.records.contains_key(token.id()) {
            return false;
        }
        let record = TokenRecord::new(token, stage_name);
        events.emit(Event::TokenChanged {
            token: record.id.clone(),
            change: TokenChange::New,
            stats: record.stats(),
            tick,
        });
        self.records.insert(record.id.clone(), record);
        true
    }

    /// Record that a token moved to another stage.
    pub fn update(
        &mut self,
        id: &TokenId,
        stage: StageId,
        stage_name: &str,
        tick: Ticks,
        events: &mut EventBus,
    ) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        record.current_stage = stage;
        record.current_stage_name = stage_name.to_owned();
        events.emit(Event::TokenChanged {
            token: id.clone(),
            change: TokenChange::Updated,
            stats: record.stats(),
            tick,
        });
        true
    }

    /// Remove a token from the index. Idempotent: retiring an unknown or
    /// already retired id returns `false` and raises nothing.
    pub fn retire(&mut self, id: &TokenId, tick: Ticks, events: &mut EventBus) -> bool {
        let Some(record) = self.records.remove(id) else {
            return false;
        };
        events.emit(Event::TokenChanged {
            token: record.id,
            change: TokenChange::Removed,
            stats: String::new(),
            tick,
        });
        true
    }

    pub fn get(&self, id: &TokenId) -> Option<&TokenRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &TokenId) -> bool {
        self.records.contains_key(id)
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> Vec<TokenId> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::token::Attribute;

    fn token(id: &str) -> Token {
        Token::basic(
            id.into(),
            Attribute::Base(12),
            Dimensions::unit(),
            4,
            StageId::default(),
        )
    }

    #[test]
    fn register_raises_new() {
        let mut index = TokenIndex::new();
        let mut bus = EventBus::default();
        assert!(index.register(&token("AAAAAA"), "src", 4, &mut bus));
        assert_eq!(index.len(), 1);
        let events = bus.buffered(EventKind::TokenChanged);
        assert!(matches!(
            &events[0],
            Event::TokenChanged { change: TokenChange::New, tick: 4, .. }
        ));
    }

    #[test]
    fn duplicate_register_is_refused() {
        let mut index = TokenIndex::new();
        let mut bus = EventBus::default();
        assert!(index.register(&token("AAAAAA"), "src", 0, &mut bus));
        assert!(!index.register(&token("AAAAAA"), "src", 0, &mut bus));
        assert_eq!(bus.buffered_count(EventKind::TokenChanged), 1);
    }

    #[test]
    fn retire_is_idempotent() {
        let mut index = TokenIndex::new();
        let mut bus = EventBus::default();
        let id = TokenId::from("AAAAAA");
        index.register(&token("AAAAAA"), "src", 0, &mut bus);
        assert!(index.retire(&id, 1, &mut bus));
        assert!(!index.retire(&id, 2, &mut bus));
        assert!(index.is_empty());
        let removed = bus
            .buffered(EventKind::TokenChanged)
            .into_iter()
            .filter(|e| matches!(e, Event::TokenChanged { change: TokenChange::Removed, .. }))
            .count();
        assert_eq!(removed, 1);
    }

    #[test]
    fn update_moves_current_stage() {
        let mut index = TokenIndex::new();
        let mut bus = EventBus::default();
        let id = TokenId::from("AAAAAA");
        index.register(&token("AAAAAA"), "src", 0, &mut bus);
        assert!(index.update(&id, StageId::default(), "belt", 3, &mut bus));
        let record = index.get(&id).unwrap();
        assert_eq!(record.current_stage_name, "belt");
        assert_eq!(record.creation_stage_name, "src");
        assert!(record.stats().contains("Current stage: belt"));
        assert!(!index.update(&"NOPE00".into(), StageId::default(), "x", 3, &mut bus));
    }

    #[test]
    fn ids_are_sorted() {
        let mut index = TokenIndex::new();
        let mut bus = EventBus::default();
        index.register(&token("ZZZ000"), "src", 0, &mut bus);
        index.register(&token("AAA000"), "src", 0, &mut bus);
        assert_eq!(index.ids(), vec![TokenId::from("AAA000"), TokenId::from("ZZZ000")]);
    }
}
