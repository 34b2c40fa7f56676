//! Application-visible touch events.

use bitfield::bitfield;
use heapless::Deque;

use crate::channel::ChannelId;

/// Capacity of the pending event queue
pub const EVENT_QUEUE_LEN: usize = 32;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchEvent {
    /// A sample on this channel went through the pipeline
    Done(ChannelId),
    /// The channel committed to active
    Active(ChannelId),
    /// The channel committed to inactive
    Inactive(ChannelId),
    /// Every channel with a new sample in this scan has been processed
    ScanDone,
    /// The channel's sample exceeded the timeout and was dropped
    Timeout(ChannelId),
    /// A proximity window completed
    ProximityDone { channel: ChannelId, detected: bool },
}

bitfield! {
    /// Set of event kinds that are queued for the application.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct EventMask(u8);
    impl Debug;

    /// Per-channel sample processed
    pub done, set_done: 0;
    /// Channel became active
    pub active, set_active: 1;
    /// Channel became inactive
    pub inactive, set_inactive: 2;
    /// Scan complete
    pub scan_done, set_scan_done: 3;
    /// Measurement timeout
    pub timeout, set_timeout: 4;
    /// Proximity window complete
    pub proximity_done, set_proximity_done: 5;
}

impl EventMask {
    pub const ALL: Self = Self(0x3f);
    pub const NONE: Self = Self(0);

    /// Whether events of this kind pass the mask
    pub fn allows(&self, event: &TouchEvent) -> bool {
        match event {
            TouchEvent::Done(_) => self.done(),
            TouchEvent::Active(_) => self.active(),
            TouchEvent::Inactive(_) => self.inactive(),
            TouchEvent::ScanDone => self.scan_done(),
            TouchEvent::Timeout(_) => self.timeout(),
            TouchEvent::ProximityDone { .. } => self.proximity_done(),
        }
    }
}

impl Default for EventMask {
    /// Everything except the per-channel `Done` event
    fn default() -> Self {
        let mut mask = Self::ALL;
        mask.set_done(false);
        mask
    }
}

/// Bounded FIFO of events; when full, the oldest event is dropped
pub struct EventQueue {
    queue: Deque<TouchEvent, EVENT_QUEUE_LEN>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Queue an event. Returns the event that was dropped to make room, if any.
    pub fn push(&mut self, event: TouchEvent) -> Option<TouchEvent> {
        let dropped = if self.queue.is_full() {
            self.queue.pop_front()
        } else {
            None
        };
        // Cannot fail, room was made above
        let _ = self.queue.push_back(event);
        dropped
    }

    pub fn pop(&mut self) -> Option<TouchEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
