//! Line notifications for UI and renderer consumers.
//!
//! Events raised during a step are held per kind in a bounded
//! [`EventBuffer`] and handed to passive listeners in the post-tick phase.
//! A suppressed kind ([`EventBus::suppress`]) is never buffered.

use std::collections::VecDeque;

use crate::fixed::Ticks;
use crate::id::{StageId, TokenId};
use crate::stage::StageKind;
use crate::stage::conveyor::Waypoint;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// What happened to a live token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenChange {
    New,
    Updated,
    Removed,
}

/// A pipeline event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Lifecycle --
    /// The line was built and initialised.
    ObjectsLoaded { stages: usize, tick: Ticks },
    SimulationPaused { paused: bool, tick: Ticks },

    // -- Reporting --
    StageChanged {
        stage: StageId,
        kind: StageKind,
        name: String,
        stats: String,
        tick: Ticks,
    },
    TokenChanged {
        token: TokenId,
        change: TokenChange,
        stats: String,
        tick: Ticks,
    },

    // -- Flow --
    TokenEmitted {
        from: StageId,
        to: StageId,
        token: TokenId,
        tick: Ticks,
    },
    MotionStarted {
        stage: StageId,
        token: TokenId,
        duration: Ticks,
        path: Vec<Waypoint>,
        tick: Ticks,
    },
    TokenArrived {
        stage: StageId,
        token: TokenId,
        tick: Ticks,
    },
    /// A token was dropped by a routing or type error and retired.
    TokenRejected {
        stage: StageId,
        token: TokenId,
        reason: String,
        tick: Ticks,
    },

    // -- Selection --
    StageSelected {
        stage: StageId,
        kind: StageKind,
        name: String,
        stats: String,
        tick: Ticks,
    },
    TokenSelected {
        token: TokenId,
        stats: String,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ObjectsLoaded,
    SimulationPaused,
    StageChanged,
    TokenChanged,
    TokenEmitted,
    MotionStarted,
    TokenArrived,
    TokenRejected,
    StageSelected,
    TokenSelected,
}

const EVENT_KIND_COUNT: usize = 10;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ObjectsLoaded { .. } => EventKind::ObjectsLoaded,
            Event::SimulationPaused { .. } => EventKind::SimulationPaused,
            Event::StageChanged { .. } => EventKind::StageChanged,
            Event::TokenChanged { .. } => EventKind::TokenChanged,
            Event::TokenEmitted { .. } => EventKind::TokenEmitted,
            Event::MotionStarted { .. } => EventKind::MotionStarted,
            Event::TokenArrived { .. } => EventKind::TokenArrived,
            Event::TokenRejected { .. } => EventKind::TokenRejected,
            Event::StageSelected { .. } => EventKind::StageSelected,
            Event::TokenSelected { .. } => EventKind::TokenSelected,
        }
    }

    /// Tick at which the event occurred.
    pub fn tick(&self) -> Ticks {
        match self {
            Event::ObjectsLoaded { tick, .. }
            | Event::SimulationPaused { tick, .. }
            | Event::StageChanged { tick, .. }
            | Event::TokenChanged { tick, .. }
            | Event::TokenEmitted { tick, .. }
            | Event::MotionStarted { tick, .. }
            | Event::TokenArrived { tick, .. }
            | Event::TokenRejected { tick, .. }
            | Event::StageSelected { tick, .. }
            | Event::TokenSelected { tick, .. } => *tick,
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ObjectsLoaded,
        EventKind::SimulationPaused,
        EventKind::StageChanged,
        EventKind::TokenChanged,
        EventKind::TokenEmitted,
        EventKind::MotionStarted,
        EventKind::TokenArrived,
        EventKind::TokenRejected,
        EventKind::StageSelected,
        EventKind::TokenSelected,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Bounded per-kind event queue. Once full, each push evicts the oldest
/// entry.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    /// Lifetime push count, evictions included.
    total_written: u64,
}

impl EventBuffer {
    /// Capacity is at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter()
    }

    /// Drop buffered events; the lifetime count survives.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    listener: PassiveListener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, listener lists, and suppression
/// flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// `default_capacity` bounds each per-kind buffer.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: Default::default(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Stop buffering `kind`. Anything already buffered is dropped.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event for delivery. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, SubscriberPriority::Normal, None, listener);
    }

    /// Listeners with a filter only see events it accepts.
    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.subscribers[kind.index()].push(SubscriberEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
    }

    /// Deliver all buffered events to listeners, then clear the buffers.
    ///
    /// Kinds are visited in [`EventKind::ALL`] order. Within a kind, listeners
    /// run in `(priority, insertion_order)` order and see events oldest first.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.suppressed[idx] {
                continue;
            }
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            let events: Vec<Event> = buffer.iter().cloned().collect();
            buffer.clear();

            let subscribers = &mut self.subscribers[idx];
            subscribers.sort_by_key(|entry| (entry.priority, entry.insertion_order));
            for entry in subscribers.iter_mut() {
                for event in &events {
                    if let Some(filter) = &entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    /// Events currently buffered for a kind, oldest first.
    pub fn buffered(&self, kind: EventKind) -> Vec<Event> {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
