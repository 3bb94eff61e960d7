//! Bounded reassembly of fragmented messages.
//!
//! The engine owns a fixed pool of `max_inflight` slots. A slot is keyed by
//! `(source address, message id)` and accumulates fragments into a buffer of
//! `total_frags × fragment_payload` bytes (capped at the maximum message
//! size) until every fragment has arrived.
//!
//! # Policies
//!
//! - **No eviction**: when every slot is busy, fragments of a new key are
//!   dropped and that message never completes.
//! - **Last writer wins**: a fragment whose `total_frags` disagrees with the
//!   slot holding its key restarts the slot as a new message.
//! - **Duplicates** are ignored without touching counters or the buffer.
//! - **Stalled slots** are held until their key is reused, unless the owner
//!   calls [`Reassembler::sweep_stale`].
//!
//! The engine is plain data with no locking; [`Endpoint`](super::Endpoint)
//! wraps it in its mutex.

use super::frame::{Fragment, FrameError};
use super::MacAddress;
use crate::config::LinkConfig;
use log::{debug, warn};
use std::time::{Duration, Instant};

/// What happens when a fragment's `total_frags` disagrees with the slot
/// already holding its `(source, msg_id)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupersedePolicy {
    /// Discard the partial message and restart the slot with the new one.
    LastWriterWins,
}

/// The policy applied by [`Reassembler`].
pub const SUPERSEDE_POLICY: SupersedePolicy = SupersedePolicy::LastWriterWins;

/// Why a fragment (or a whole message) was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Header failed validation.
    Malformed(FrameError),
    /// Payload longer than the per-fragment payload size.
    PayloadTooLarge(usize),
    /// Payload would land outside the capped reassembly buffer.
    BufferOverflow,
    /// Every slot is busy.
    PoolFull,
    /// The reassembly buffer could not be allocated; the slot was freed.
    AllocationFailed,
    /// All fragments arrived but their lengths are inconsistent; the slot was freed.
    Inconsistent,
}

impl DropReason {
    /// True for protocol violations (as opposed to resource exhaustion).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_)
                | Self::PayloadTooLarge(_)
                | Self::BufferOverflow
                | Self::Inconsistent
        )
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed fragment: {}", e),
            Self::PayloadTooLarge(len) => write!(f, "payload of {} bytes too large", len),
            Self::BufferOverflow => write!(f, "payload outside reassembly buffer"),
            Self::PoolFull => write!(f, "no free reassembly slot"),
            Self::AllocationFailed => write!(f, "reassembly buffer allocation failed"),
            Self::Inconsistent => write!(f, "fragment lengths inconsistent"),
        }
    }
}

/// Result of feeding one frame to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Fragment stored; more are needed.
    Pending,
    /// Fragment already received; nothing changed.
    Duplicate,
    /// Last fragment arrived; the rebuilt message.
    Complete(Vec<u8>),
    /// Fragment discarded.
    Dropped(DropReason),
}

#[derive(Debug)]
struct Slot {
    source: MacAddress,
    msg_id: u16,
    total_frags: u16,
    received: u16,
    total_bytes: usize,
    /// One bit per fragment index.
    present: Vec<u64>,
    /// Allocated on first write.
    buffer: Vec<u8>,
    last_touched: Instant,
}

impl Slot {
    fn new(source: MacAddress, msg_id: u16, total_frags: u16, now: Instant) -> Self {
        Self {
            source,
            msg_id,
            total_frags,
            received: 0,
            total_bytes: 0,
            present: vec![0; (total_frags as usize).div_ceil(64)],
            buffer: Vec::new(),
            last_touched: now,
        }
    }

    fn has(&self, seq: u16) -> bool {
        let seq = seq as usize;
        self.present[seq / 64] & (1 << (seq % 64)) != 0
    }

    fn mark(&mut self, seq: u16) {
        let seq = seq as usize;
        self.present[seq / 64] |= 1 << (seq % 64);
    }

    fn all_present(&self) -> bool {
        (0..self.total_frags).all(|seq| self.has(seq))
    }
}

/// Fixed-capacity reassembly engine.
#[derive(Debug)]
pub struct Reassembler {
    slots: Vec<Option<Slot>>,
    config: LinkConfig,
}

impl Reassembler {
    /// Create an engine with `config.max_inflight` empty slots.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            slots: (0..config.max_inflight).map(|_| None).collect(),
            config: *config,
        }
    }

    /// Number of slots currently holding a partial message.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Free every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Feed one received frame from `source`.
    pub fn accept(&mut self, source: MacAddress, frame: &[u8], now: Instant) -> Accepted {
        let fragment_payload = self.config.fragment_payload;
        let fragment = match Fragment::decode(frame, self.config.max_fragments) {
            Ok(f) => f,
            Err(e) => return Accepted::Dropped(DropReason::Malformed(e)),
        };
        let header = fragment.header;

        if fragment.payload.len() > fragment_payload {
            return Accepted::Dropped(DropReason::PayloadTooLarge(fragment.payload.len()));
        }

        let index = match self.find(source, header.msg_id) {
            Some(i) => {
                let stale_shape = self.slots[i]
                    .as_ref()
                    .is_some_and(|s| s.total_frags != header.total_frags);
                if stale_shape {
                    match SUPERSEDE_POLICY {
                        SupersedePolicy::LastWriterWins => {
                            debug!(
                                "Message {} from {} restarted ({} fragments)",
                                header.msg_id, source, header.total_frags
                            );
                            self.slots[i] =
                                Some(Slot::new(source, header.msg_id, header.total_frags, now));
                        }
                    }
                }
                i
            }
            None => match self.slots.iter().position(|s| s.is_none()) {
                Some(i) => {
                    self.slots[i] = Some(Slot::new(source, header.msg_id, header.total_frags, now));
                    i
                }
                None => return Accepted::Dropped(DropReason::PoolFull),
            },
        };

        let buffer_size = self.config.buffer_size_for(header.total_frags as usize);

        let Some(slot) = self.slots[index].as_mut() else {
            return Accepted::Dropped(DropReason::PoolFull);
        };
        slot.last_touched = now;

        if slot.has(header.seq_idx) {
            return Accepted::Duplicate;
        }

        let offset = header.seq_idx as usize * fragment_payload;
        if offset + fragment.payload.len() > buffer_size {
            return Accepted::Dropped(DropReason::BufferOverflow);
        }

        if slot.buffer.is_empty() {
            if slot.buffer.try_reserve_exact(buffer_size).is_err() {
                warn!(
                    "Cannot allocate {} bytes for message {} from {}",
                    buffer_size, header.msg_id, source
                );
                self.slots[index] = None;
                return Accepted::Dropped(DropReason::AllocationFailed);
            }
            slot.buffer.resize(buffer_size, 0);
        }

        slot.buffer[offset..offset + fragment.payload.len()].copy_from_slice(fragment.payload);
        slot.mark(header.seq_idx);
        slot.received += 1;
        slot.total_bytes += fragment.payload.len();

        if slot.received < slot.total_frags {
            return Accepted::Pending;
        }

        // Complete: the slot is freed whatever the outcome.
        let result = self.slots[index].take().and_then(|s| assemble(&s, fragment_payload));
        match result {
            Some(message) => Accepted::Complete(message),
            None => Accepted::Dropped(DropReason::Inconsistent),
        }
    }

    /// Free slots not touched within `timeout` of `now`. Returns how many were freed.
    pub fn sweep_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut freed = 0;
        for entry in self.slots.iter_mut() {
            let expired = entry
                .as_ref()
                .is_some_and(|s| now.saturating_duration_since(s.last_touched) > timeout);
            if expired {
                if let Some(slot) = entry.take() {
                    debug!(
                        "Freed stale slot for message {} from {} ({}/{} fragments)",
                        slot.msg_id, slot.source, slot.received, slot.total_frags
                    );
                }
                freed += 1;
            }
        }
        freed
    }

    fn find(&self, source: MacAddress, msg_id: u16) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|s| s.source == source && s.msg_id == msg_id)
        })
    }
}

/// Copy each fragment region into a tightly sized message.
///
/// The last fragment's length is `total_bytes - (total_frags - 1) * payload`.
fn assemble(slot: &Slot, fragment_payload: usize) -> Option<Vec<u8>> {
    if !slot.all_present() {
        return None;
    }
    let total = slot.total_frags as usize;
    let last_len = slot
        .total_bytes
        .checked_sub((total - 1) * fragment_payload)?;
    if last_len > fragment_payload {
        return None;
    }

    let mut message = Vec::with_capacity(slot.total_bytes);
    for seq in 0..total {
        let offset = seq * fragment_payload;
        let len = if seq + 1 == total {
            last_len
        } else {
            fragment_payload
        };
        message.extend_from_slice(slot.buffer.get(offset..offset + len)?);
    }
    Some(message)
}
