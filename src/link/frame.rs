//! Fragment frame codec.
//!
//! # Fragment Format
//!
//! Each radio frame carries an 8-byte header followed by the payload:
//! ```text
//! [msg_id: u16][seq_idx: u16][total_frags: u16][payload_len: u16][payload: payload_len bytes]
//! ```
//!
//! All fields are little-endian (the native order of the ESP32 that defined
//! the format). A frame is valid when `total_frags >= 1`,
//! `seq_idx < total_frags` and the header plus `payload_len` exactly matches
//! the received frame length.

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Errors raised while decoding a fragment frame.
///
/// All of these are protocol violations: the frame is dropped and nothing
/// is reported to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is shorter than the header.
    TooShort(usize),
    /// `total_frags` is zero.
    ZeroFragments,
    /// `total_frags` exceeds the configured ceiling.
    TooManyFragments {
        /// Fragment count claimed by the header.
        total: u16,
        /// Configured ceiling.
        max: usize,
    },
    /// `seq_idx` is not below `total_frags`.
    SequenceOutOfRange {
        /// Sequence index claimed by the header.
        seq: u16,
        /// Fragment count claimed by the header.
        total: u16,
    },
    /// `payload_len` disagrees with the received frame length.
    LengthMismatch {
        /// Payload length claimed by the header.
        declared: u16,
        /// Payload bytes actually present.
        actual: usize,
    },
    /// Output buffer too small for serialization.
    BufferTooSmall,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "frame too short ({} bytes)", len),
            Self::ZeroFragments => write!(f, "total fragment count is zero"),
            Self::TooManyFragments { total, max } => {
                write!(f, "{} fragments exceeds maximum of {}", total, max)
            }
            Self::SequenceOutOfRange { seq, total } => {
                write!(f, "sequence {} out of range for {} fragments", seq, total)
            }
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "length mismatch: header says {} bytes, frame carries {}",
                declared, actual
            ),
            Self::BufferTooSmall => write!(f, "buffer too small for fragment"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Sender-scoped message id (never zero when produced by a sender).
    pub msg_id: u16,
    /// Index of this fragment, `0..total_frags`.
    pub seq_idx: u16,
    /// Total fragment count of the message.
    pub total_frags: u16,
    /// Payload bytes carried by this frame.
    pub payload_len: u16,
}

impl FragmentHeader {
    /// Serialize the header into the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::BufferTooSmall);
        }
        buf[0..2].copy_from_slice(&self.msg_id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.seq_idx.to_le_bytes());
        buf[4..6].copy_from_slice(&self.total_frags.to_le_bytes());
        buf[6..8].copy_from_slice(&self.payload_len.to_le_bytes());
        Ok(())
    }

    /// Parse the header fields without validating them.
    pub fn read_from(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TooShort(bytes.len()));
        }
        Ok(Self {
            msg_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            seq_idx: u16::from_le_bytes([bytes[2], bytes[3]]),
            total_frags: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload_len: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    /// Check the header invariants against a received frame length.
    pub fn validate(&self, frame_len: usize, max_fragments: usize) -> Result<(), FrameError> {
        if self.total_frags == 0 {
            return Err(FrameError::ZeroFragments);
        }
        if self.total_frags as usize > max_fragments {
            return Err(FrameError::TooManyFragments {
                total: self.total_frags,
                max: max_fragments,
            });
        }
        if self.seq_idx >= self.total_frags {
            return Err(FrameError::SequenceOutOfRange {
                seq: self.seq_idx,
                total: self.total_frags,
            });
        }
        if HEADER_SIZE + self.payload_len as usize != frame_len {
            return Err(FrameError::LengthMismatch {
                declared: self.payload_len,
                actual: frame_len.saturating_sub(HEADER_SIZE),
            });
        }
        Ok(())
    }
}

/// A decoded fragment borrowing its payload from the received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Parsed and validated header.
    pub header: FragmentHeader,
    /// Payload bytes (exactly `header.payload_len` long).
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Decode and validate a received frame.
    pub fn decode(frame: &'a [u8], max_fragments: usize) -> Result<Self, FrameError> {
        let header = FragmentHeader::read_from(frame)?;
        header.validate(frame.len(), max_fragments)?;
        Ok(Self {
            header,
            payload: &frame[HEADER_SIZE..],
        })
    }

    /// Encode header and payload into one frame.
    ///
    /// Fails if `header.payload_len` disagrees with the payload.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.header.payload_len as usize != self.payload.len() {
            return Err(FrameError::LengthMismatch {
                declared: self.header.payload_len,
                actual: self.payload.len(),
            });
        }
        let mut bytes = vec![0u8; HEADER_SIZE + self.payload.len()];
        self.header.write_to(&mut bytes)?;
        bytes[HEADER_SIZE..].copy_from_slice(self.payload);
        Ok(bytes)
    }
}
