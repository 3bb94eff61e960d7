//! Link counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Relaxed atomic counters updated by an [`Endpoint`](super::Endpoint).
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Frames handed to the transport successfully.
    pub frames_sent: AtomicUsize,
    /// Frames delivered by the transport.
    pub frames_received: AtomicUsize,
    /// Messages fully transmitted.
    pub messages_sent: AtomicUsize,
    /// Messages rebuilt and delivered to the handler.
    pub messages_completed: AtomicUsize,
    /// Duplicate fragments ignored.
    pub duplicates: AtomicUsize,
    /// Fragments dropped as protocol violations.
    pub malformed: AtomicUsize,
    /// Fragments or messages dropped for lack of slots or memory.
    pub resource_drops: AtomicUsize,
    /// Sends aborted by a transport error.
    pub send_failures: AtomicUsize,
    /// Slots freed by the stale sweep.
    pub stale_slots: AtomicUsize,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    /// Frames handed to the transport successfully.
    pub frames_sent: usize,
    /// Frames fed to the reassembly engine.
    pub frames_received: usize,
    /// Messages whose every fragment went out.
    pub messages_sent: usize,
    /// Messages reassembled and delivered.
    pub messages_completed: usize,
    /// Fragments received twice.
    pub duplicates: usize,
    /// Fragments dropped as protocol violations.
    pub malformed: usize,
    /// Fragments dropped for lack of a slot or buffer.
    pub resource_drops: usize,
    /// Sends aborted by a transport error.
    pub send_failures: usize,
    /// Stalled slots freed by the sweep.
    pub stale_slots: usize,
}

impl LinkStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_completed: self.messages_completed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            resource_drops: self.resource_drops.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            stale_slots: self.stale_slots.load(Ordering::Relaxed),
        }
    }
}
