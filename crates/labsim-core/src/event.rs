//! Typed event system with pre-allocated ring buffers.
//!
//! The bus carries both the signals the lab consumes from collaborators
//! (attachment detection, heat plate, pour detection) and the events it
//! produces for them (content changes, reaction phases, procedure progress).
//! Events are buffered while a tick runs and delivered in batch at the end of
//! the tick. Each event kind has its own [`EventBuffer`] ring buffer with a
//! configurable capacity, so delivery is grouped by kind rather than in
//! emission order.
//!
//! # Subscription lifecycle
//!
//! [`EventBus::subscribe`] returns a [`SubscriptionId`]. Components subscribe
//! when they are constructed and hand the ID back to
//! [`EventBus::unsubscribe`] when they are torn down. There is no global bus;
//! producers and consumers receive the bus (or the lab owning it) explicitly.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind.

use crate::id::{ContainerId, SubscriptionId};
use crate::reaction::ReactionEffect;
use crate::sim::Ticks;
use crate::solid::SolidHolder;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A lab event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabEvent {
    // -- Inbound signals --
    /// `child` became attached to the snap zone or support `parent`.
    ObjectAttached {
        child: String,
        parent: String,
        tick: Ticks,
    },
    /// The heat plate was switched on or off.
    HeatSourceStateChanged { is_on: bool, tick: Ticks },
    /// Orientation/proximity detection for a tilted vessel. `target` is the
    /// candidate receiver, if any was found near the pour point.
    PourSignal {
        source: String,
        target: Option<String>,
        active: bool,
        tick: Ticks,
    },

    // -- Liquids --
    /// Volume, composition, or color of a container changed.
    ContentChanged { container: ContainerId, tick: Ticks },
    /// A source began delivering liquid into a target.
    PourStarted {
        source: ContainerId,
        target: ContainerId,
        tick: Ticks,
    },
    /// A source stopped delivering liquid.
    PourStopped { source: ContainerId, tick: Ticks },

    // -- Solids --
    /// One solid unit moved between holders.
    SolidUnitMoved {
        from: SolidHolder,
        to: SolidHolder,
        tick: Ticks,
    },

    // -- Reaction --
    ReactionPhaseStarted {
        flask: ContainerId,
        phase_index: usize,
        tick: Ticks,
    },
    /// An audio/particle effect should be played for a flask.
    ReactionEffect {
        flask: ContainerId,
        effect: ReactionEffect,
        tick: Ticks,
    },
    ReactionCompleted { flask: ContainerId, tick: Ticks },

    // -- Procedure --
    StepAdvanced {
        step_index: usize,
        step_id: String,
        tick: Ticks,
    },
    ProcedureCompleted { tick: Ticks },
}

/// Discriminant tag for event types, used for subscription and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ObjectAttached,
    HeatSourceStateChanged,
    PourSignal,
    ContentChanged,
    PourStarted,
    PourStopped,
    SolidUnitMoved,
    ReactionPhaseStarted,
    ReactionEffect,
    ReactionCompleted,
    StepAdvanced,
    ProcedureCompleted,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 12;

impl LabEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            LabEvent::ObjectAttached { .. } => EventKind::ObjectAttached,
            LabEvent::HeatSourceStateChanged { .. } => EventKind::HeatSourceStateChanged,
            LabEvent::PourSignal { .. } => EventKind::PourSignal,
            LabEvent::ContentChanged { .. } => EventKind::ContentChanged,
            LabEvent::PourStarted { .. } => EventKind::PourStarted,
            LabEvent::PourStopped { .. } => EventKind::PourStopped,
            LabEvent::SolidUnitMoved { .. } => EventKind::SolidUnitMoved,
            LabEvent::ReactionPhaseStarted { .. } => EventKind::ReactionPhaseStarted,
            LabEvent::ReactionEffect { .. } => EventKind::ReactionEffect,
            LabEvent::ReactionCompleted { .. } => EventKind::ReactionCompleted,
            LabEvent::StepAdvanced { .. } => EventKind::StepAdvanced,
            LabEvent::ProcedureCompleted { .. } => EventKind::ProcedureCompleted,
        }
    }

    /// The tick at which the event occurred.
    pub fn tick(&self) -> Ticks {
        match self {
            LabEvent::ObjectAttached { tick, .. }
            | LabEvent::HeatSourceStateChanged { tick, .. }
            | LabEvent::PourSignal { tick, .. }
            | LabEvent::ContentChanged { tick, .. }
            | LabEvent::PourStarted { tick, .. }
            | LabEvent::PourStopped { tick, .. }
            | LabEvent::SolidUnitMoved { tick, .. }
            | LabEvent::ReactionPhaseStarted { tick, .. }
            | LabEvent::ReactionEffect { tick, .. }
            | LabEvent::ReactionCompleted { tick, .. }
            | LabEvent::StepAdvanced { tick, .. }
            | LabEvent::ProcedureCompleted { tick } => *tick,
        }
    }
}

impl EventKind {
    /// Every kind, in discriminant order.
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ObjectAttached,
        EventKind::HeatSourceStateChanged,
        EventKind::PourSignal,
        EventKind::ContentChanged,
        EventKind::PourStarted,
        EventKind::PourStopped,
        EventKind::SolidUnitMoved,
        EventKind::ReactionPhaseStarted,
        EventKind::ReactionEffect,
        EventKind::ReactionCompleted,
        EventKind::StepAdvanced,
        EventKind::ProcedureCompleted,
    ];

    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer -- pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<LabEvent>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: LabEvent) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events that were dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head points to the next write position, which is the oldest entry
            self.head
        };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    /// Clear all events from the buffer. `total_written` is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over events in an [`EventBuffer`], from oldest to newest.
pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a LabEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A listener receives events read-only.
pub type Listener = Box<dyn FnMut(&LabEvent)>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&LabEvent) -> bool>;

/// Priority level for event subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    id: SubscriptionId,
    listener: Listener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field(
                "filter",
                &if self.filter.is_some() {
                    "Some(<fn>)"
                } else {
                    "None"
                },
            )
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The event bus. Holds one ring buffer per event kind, subscriber lists,
/// and suppression flags.
pub struct EventBus {
    /// One ring buffer per event kind, allocated on first emit.
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],

    /// Suppressed event kinds. Suppressed events are never buffered.
    suppressed: [bool; EVENT_KIND_COUNT],

    /// Subscribers indexed by event kind, kept sorted by `(priority, id)`.
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],

    /// Default buffer capacity for new event buffers.
    default_capacity: usize,

    /// Monotonic source of subscription IDs; doubles as insertion order.
    next_subscription: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("subscriber_count", &self.subscriber_count())
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: Default::default(),
            default_capacity,
            next_subscription: 0,
        }
    }

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event for delivery. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: LabEvent) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Buffer several events, preserving their order.
    pub fn emit_all(&mut self, events: impl IntoIterator<Item = LabEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Subscribe to an event kind with Normal priority and no filter.
    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.subscribe_filtered(kind, SubscriberPriority::Normal, None, listener)
    }

    /// Subscribe with explicit priority and optional filter. Subscribers of
    /// equal priority run in subscription order.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let list = &mut self.subscribers[kind.index()];
        list.push(SubscriberEntry {
            id,
            listener,
            priority,
            filter,
        });
        list.sort_by_key(|entry| (entry.priority, entry.id));
        id
    }

    /// Remove a subscription. Returns `false` if the ID was unknown (for
    /// example, already unsubscribed).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for list in &mut self.subscribers {
            if let Some(pos) = list.iter().position(|entry| entry.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Total number of live subscriptions across all kinds.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().map(Vec::len).sum()
    }

    /// Deliver all buffered events to subscribers, then clear the buffers.
    ///
    /// Kinds are delivered in [`EventKind`] declaration order; within a
    /// kind, each subscriber sees the events oldest-to-newest. Emission
    /// order across kinds is not kept: a listener subscribed to several
    /// kinds sees all of one kind before the next. Order across kinds by
    /// `tick` if needed.
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

            let events: Vec<LabEvent> = buffer.iter().cloned().collect();
            buffer.clear();

            for entry in &mut self.subscribers[idx] {
                for event in &events {
                    if let Some(ref filter) = entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    /// Get the event buffer for a specific event kind (read-only).
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Count of events currently buffered for a kind.
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

    /// Clear all buffers. Does not remove subscribers or suppression settings.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_container_id() -> ContainerId {
        let mut sm = SlotMap::<ContainerId, ()>::with_key();
        sm.insert(())
    }

    fn attached(child: &str, parent: &str, tick: Ticks) -> LabEvent {
        LabEvent::ObjectAttached {
            child: child.to_string(),
            parent: parent.to_string(),
            tick,
        }
    }

    #[test]
    fn event_buffer_push_and_iterate() {
        let mut buf = EventBuffer::new(4);
        for tick in 0..3 {
            buf.push(LabEvent::ProcedureCompleted { tick });
        }
        assert_eq!(buf.len(), 3);
        let ticks: Vec<Ticks> = buf.iter().map(LabEvent::tick).collect();
        assert_eq!(ticks, vec![0, 1, 2]);
        assert_eq!(buf.iter().len(), 3);
    }

    #[test]
    fn event_buffer_ring_wraps_and_drops_oldest() {
        let mut buf = EventBuffer::new(3);
        for tick in 0..5 {
            buf.push(LabEvent::ProcedureCompleted { tick });
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.total_written(), 5);
        assert_eq!(buf.dropped_count(), 2);
        let ticks: Vec<Ticks> = buf.iter().map(LabEvent::tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn event_buffer_zero_capacity_clamped() {
        let mut buf = EventBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(LabEvent::ProcedureCompleted { tick: 1 });
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.total_written(), 1);
    }

    #[test]
    fn emit_and_count() {
        let mut bus = EventBus::new(16);
        let flask = make_container_id();
        bus.emit(LabEvent::ContentChanged { container: flask, tick: 1 });
        bus.emit(LabEvent::ContentChanged { container: flask, tick: 2 });
        bus.emit(attached("flask", "support", 2));

        assert_eq!(bus.buffered_count(EventKind::ContentChanged), 2);
        assert_eq!(bus.buffered_count(EventKind::ObjectAttached), 1);
        assert_eq!(bus.buffered_count(EventKind::StepAdvanced), 0);
        assert!(bus.buffer(EventKind::StepAdvanced).is_none());
    }

    #[test]
    fn suppressed_events_are_never_buffered() {
        let mut bus = EventBus::new(16);
        bus.suppress(EventKind::PourSignal);
        for tick in 0..10 {
            bus.emit(LabEvent::PourSignal {
                source: "beaker".into(),
                target: None,
                active: true,
                tick,
            });
        }
        assert!(bus.is_suppressed(EventKind::PourSignal));
        assert_eq!(bus.total_emitted(EventKind::PourSignal), 0);
        assert!(bus.buffer(EventKind::PourSignal).is_none());
    }

    #[test]
    fn listeners_run_in_priority_then_subscription_order() {
        let mut bus = EventBus::new(16);
        let order = Rc::new(RefCell::new(Vec::new()));

        for (tag, priority) in [
            ('A', SubscriberPriority::Normal),
            ('B', SubscriberPriority::Post),
            ('C', SubscriberPriority::Pre),
            ('D', SubscriberPriority::Normal),
        ] {
            let order = order.clone();
            bus.subscribe_filtered(
                EventKind::ProcedureCompleted,
                priority,
                None,
                Box::new(move |_| order.borrow_mut().push(tag)),
            );
        }

        bus.emit(LabEvent::ProcedureCompleted { tick: 0 });
        bus.deliver();
        assert_eq!(*order.borrow(), vec!['C', 'A', 'D', 'B']);
    }

    #[test]
    fn filter_skips_events() {
        let mut bus = EventBus::new(16);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.subscribe_filtered(
            EventKind::ObjectAttached,
            SubscriberPriority::Normal,
            Some(Box::new(
                |e| matches!(e, LabEvent::ObjectAttached { parent, .. } if parent == "support"),
            )),
            Box::new(move |e| seen_clone.borrow_mut().push(e.tick())),
        );

        bus.emit(attached("flask", "table", 1));
        bus.emit(attached("flask", "support", 2));
        bus.deliver();
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new(16);
        let count = Rc::new(RefCell::new(0u32));
        let c = count.clone();
        let id = bus.subscribe(
            EventKind::ProcedureCompleted,
            Box::new(move |_| *c.borrow_mut() += 1),
        );
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(LabEvent::ProcedureCompleted { tick: 0 });
        bus.deliver();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        bus.emit(LabEvent::ProcedureCompleted { tick: 1 });
        bus.deliver();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn delivery_clears_buffers() {
        let mut bus = EventBus::new(16);
        bus.emit(LabEvent::HeatSourceStateChanged { is_on: true, tick: 0 });
        assert_eq!(bus.buffered_count(EventKind::HeatSourceStateChanged), 1);
        bus.deliver();
        assert_eq!(bus.buffered_count(EventKind::HeatSourceStateChanged), 0);
        assert_eq!(bus.total_emitted(EventKind::HeatSourceStateChanged), 1);
    }

    #[test]
    fn event_kind_discriminant_matches_all_table() {
        for (i, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        let flask = make_container_id();
        assert_eq!(
            LabEvent::ReactionCompleted { flask, tick: 3 }.kind(),
            EventKind::ReactionCompleted
        );
        assert_eq!(LabEvent::ReactionCompleted { flask, tick: 3 }.tick(), 3);
    }

    #[test]
    fn delivery_groups_by_kind_not_emission_order() {
        let mut bus = EventBus::new(16);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::ProcedureCompleted, EventKind::ObjectAttached] {
            let s = seen.clone();
            bus.subscribe(kind, Box::new(move |e| s.borrow_mut().push((e.kind(), e.tick()))));
        }
        bus.emit(LabEvent::ProcedureCompleted { tick: 1 });
        bus.emit(attached("flask", "support", 2));
        bus.emit(LabEvent::ProcedureCompleted { tick: 3 });
        bus.deliver();
        assert_eq!(
            *seen.borrow(),
            vec![
                (EventKind::ObjectAttached, 2),
                (EventKind::ProcedureCompleted, 1),
                (EventKind::ProcedureCompleted, 3),
            ]
        );
    }

    #[test]
    fn listener_receives_event_data() {
        let mut bus = EventBus::new(16);
        let received = Rc::new(RefCell::new(Vec::new()));
        let r = received.clone();
        bus.subscribe(
            EventKind::StepAdvanced,
            Box::new(move |e| {
                if let LabEvent::StepAdvanced { step_index, step_id, .. } = e {
                    r.borrow_mut().push((*step_index, step_id.clone()));
                }
            }),
        );
        bus.emit(LabEvent::StepAdvanced {
            step_index: 0,
            step_id: "place_flask".into(),
            tick: 4,
        });
        bus.deliver();
        assert_eq!(*received.borrow(), vec![(0, "place_flask".to_string())]);
    }
}
