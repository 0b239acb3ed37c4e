//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - GPIO ISRs (mode button, factory-reset button)
//! - Radio callbacks (credential writes, link up/down)
//! - Wi-Fi driver callbacks (association, disconnect)
//! - Software (timers in the main loop)
//!
//! Events are consumed by the main control loop, which processes them
//! one at a time in priority order.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR     │────▶│              │     │              │
//! │ Radio stack  │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Wi-Fi driver │────▶│  (lock-free) │     │  (consumer)  │
//! │ Software     │────▶│              │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 16;

/// System event types, ordered by rough priority.
/// Lower discriminant = higher priority when multiple events
/// are pending simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── User intent (highest priority) ────────────────────
    /// Factory-reset button held past the hold threshold.
    FactoryResetRequested = 0,
    /// Debounced short press on the mode button.
    ModeButtonPress       = 1,

    // ── Radio link ────────────────────────────────────────
    /// A central wrote the credentials characteristic.
    CredentialsWritten    = 10,
    /// A central connected to the radio link.
    RadioConnected        = 11,
    /// The central disconnected.
    RadioDisconnected     = 12,

    // ── Connectivity ──────────────────────────────────────
    /// Wi-Fi station got an IP.
    WifiGotIp             = 20,
    /// Wi-Fi station dropped off the network.
    WifiLost              = 21,

    // ── Control ───────────────────────────────────────────
    /// Main control loop tick (5 Hz).
    ControlTick           = 30,
}

// ── Lock-free MPSC ring buffer ────────────────────────────────
//
// Producers are concurrent: the GPIO ISRs, the Bluedroid task, the
// Wi-Fi driver task, and the main loop itself all push. The main loop
// is the only consumer. A producer claims its slot index with a
// compare-exchange on the head, then publishes the payload with a
// Release store into the slot's own atomic; a slot still holding the
// empty sentinel is a claimed-but-unwritten slot the consumer must not
// touch yet. Kept in statics so ISR callbacks can reach it.

/// Slot sentinel; no event discriminant uses it.
const SLOT_EMPTY: u8 = 0xFF;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicU8 = AtomicU8::new(SLOT_EMPTY);

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_SLOTS: [AtomicU8; EVENT_QUEUE_CAP] = [EMPTY_SLOT; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free) and from multiple
/// producers concurrently.
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    loop {
        let head = EVENT_HEAD.load(Ordering::Relaxed);
        let tail = EVENT_TAIL.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false; // Queue full — drop event.
        }

        // Claim the slot index; only the winner writes it.
        if EVENT_HEAD
            .compare_exchange(head, next_head, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            EVENT_SLOTS[head as usize].store(event as u8, Ordering::Release);
            return true;
        }
    }
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = EVENT_SLOTS[tail as usize].load(Ordering::Acquire);
    if raw == SLOT_EMPTY {
        // A producer claimed this slot but has not finished writing it;
        // it will be picked up on the next drain.
        return None;
    }

    EVENT_SLOTS[tail as usize].store(SLOT_EMPTY, Ordering::Relaxed);
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback.
/// Processes events in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Check if the event queue is empty.
pub fn queue_is_empty() -> bool {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);
    tail == head
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0  => Some(Event::FactoryResetRequested),
        1  => Some(Event::ModeButtonPress),
        10 => Some(Event::CredentialsWritten),
        11 => Some(Event::RadioConnected),
        12 => Some(Event::RadioDisconnected),
        20 => Some(Event::WifiGotIp),
        21 => Some(Event::WifiLost),
        30 => Some(Event::ControlTick),
        _  => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The queue is a process-wide static, so everything runs inside one
    // test body on one thread.
    #[test]
    fn queue_is_fifo_and_bounded() {
        drain_events(|_| {});
        assert!(queue_is_empty());

        assert!(push_event(Event::FactoryResetRequested));
        assert!(push_event(Event::ControlTick));
        assert_eq!(pop_event(), Some(Event::FactoryResetRequested));
        assert_eq!(pop_event(), Some(Event::ControlTick));
        assert_eq!(pop_event(), None);

        // One slot stays open to tell full from empty.
        for _ in 0..EVENT_QUEUE_CAP - 1 {
            assert!(push_event(Event::ControlTick));
        }
        assert!(!push_event(Event::WifiGotIp));

        let mut drained = 0;
        drain_events(|event| {
            assert_eq!(event, Event::ControlTick);
            drained += 1;
        });
        assert_eq!(drained, EVENT_QUEUE_CAP - 1);
        assert!(queue_is_empty());
    }
}
