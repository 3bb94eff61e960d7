//! Outbound fragmentation.
//!
//! A message is split into `ceil(len / fragment_payload)` frames (at least
//! one, so an empty message travels as a single frame with
//! `payload_len = 0`). All frames of one message share a fresh message id.

use super::frame::{Fragment, FragmentHeader};
use super::LinkError;
use crate::config::LinkConfig;

/// Per-sender message id counter.
///
/// Ids start at 1, increment per message and wrap around skipping zero.
#[derive(Debug, Clone)]
pub struct MessageIds {
    next: u16,
}

impl MessageIds {
    /// Create a counter whose first id is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next message id.
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = match self.next.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        id
    }
}

impl Default for MessageIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits messages into fragment frames.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    config: LinkConfig,
}

impl Fragmenter {
    /// Create a fragmenter using the limits of `config`.
    pub fn new(config: &LinkConfig) -> Self {
        Self { config: *config }
    }

    /// Check a message against the send limits and return its fragment count.
    ///
    /// Runs before any id is allocated or frame is transmitted.
    pub fn plan(&self, len: usize) -> Result<u16, LinkError> {
        let max_fragments = self.config.max_fragments;
        if len > self.config.max_message_size {
            return Err(LinkError::MessageTooLarge {
                len,
                max: self.config.max_message_size,
            });
        }
        let fragments = self.config.fragments_for(len);
        if fragments > max_fragments {
            return Err(LinkError::TooManyFragments {
                fragments,
                max: max_fragments,
            });
        }
        u16::try_from(fragments).map_err(|_| LinkError::TooManyFragments {
            fragments,
            max: max_fragments,
        })
    }

    /// Fragment `data` under `msg_id`.
    ///
    /// Returns an iterator yielding complete frames in sequence order.
    pub fn fragment<'a>(&self, msg_id: u16, data: &'a [u8]) -> Result<Frames<'a>, LinkError> {
        let total_frags = self.plan(data.len())?;
        Ok(Frames {
            data,
            msg_id,
            total_frags,
            next_seq: 0,
            fragment_payload: self.config.fragment_payload,
        })
    }
}

/// Iterator over the frames of one message.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    data: &'a [u8],
    msg_id: u16,
    total_frags: u16,
    next_seq: u16,
    fragment_payload: usize,
}

impl Frames<'_> {
    /// Total fragment count of the message.
    pub fn total(&self) -> u16 {
        self.total_frags
    }
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_seq >= self.total_frags {
            return None;
        }
        let offset = self.next_seq as usize * self.fragment_payload;
        let end = (offset + self.fragment_payload).min(self.data.len());
        let payload = self.data.get(offset..end).unwrap_or(&[]);

        // LinkConfig::validate bounds fragment_payload by the MTU
        let fragment = Fragment {
            header: FragmentHeader {
                msg_id: self.msg_id,
                seq_idx: self.next_seq,
                total_frags: self.total_frags,
                payload_len: payload.len() as u16,
            },
            payload,
        };
        let frame = fragment.encode().ok()?;

        self.next_seq += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total_frags - self.next_seq) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::frame::HEADER_SIZE;

    fn fragmenter() -> Fragmenter {
        Fragmenter::new(&LinkConfig::default())
    }

    #[test]
    fn test_message_ids_start_at_one_and_skip_zero() {
        let mut ids = MessageIds::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);

        let mut ids = MessageIds { next: u16::MAX };
        assert_eq!(ids.next_id(), u16::MAX);
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn test_empty_message_is_one_frame() {
        let frames: Vec<_> = fragmenter().fragment(7, &[]).unwrap().collect();
        assert_eq!(frames.len(), 1);
        let decoded = Fragment::decode(&frames[0], 128).unwrap();
        assert_eq!(decoded.header.total_frags, 1);
        assert_eq!(decoded.header.payload_len, 0);
        assert_eq!(decoded.header.msg_id, 7);
    }

    #[test]
    fn test_max_message_splits_into_41_fragments() {
        let data: Vec<u8> = (0..8192).map(|i| (i % 251) as u8).collect();
        let frames = fragmenter().fragment(1, &data).unwrap();
        assert_eq!(frames.len(), 41);

        let frames: Vec<_> = frames.collect();
        for (i, frame) in frames.iter().enumerate() {
            let decoded = Fragment::decode(frame, 128).unwrap();
            assert_eq!(decoded.header.seq_idx as usize, i);
            assert_eq!(decoded.header.total_frags, 41);
            if i < 40 {
                assert_eq!(decoded.payload.len(), 200);
            } else {
                assert_eq!(decoded.payload.len(), 192);
            }
        }
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let frames: Vec<_> = fragmenter().fragment(1, &[0u8; 400]).unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].len(), HEADER_SIZE + 200);
    }

    #[test]
    fn test_fragment_ceiling_rejected() {
        let config = LinkConfig {
            max_fragments: 2,
            ..Default::default()
        };
        let fragmenter = Fragmenter::new(&config);
        assert_eq!(fragmenter.plan(400), Ok(2));
        assert_eq!(
            fragmenter.plan(401),
            Err(LinkError::TooManyFragments {
                fragments: 3,
                max: 2
            })
        );
    }

    #[test]
    fn test_message_size_limit_rejected() {
        assert_eq!(
            fragmenter().plan(8193),
            Err(LinkError::MessageTooLarge {
                len: 8193,
                max: 8192
            })
        );
    }
}
