//! Discovery frame codec.
//!
//! ```text
//! [type: u8][version: u8][flags: u16 LE][token: remaining bytes]
//! ```

/// HELLO frame type (periodic broadcast).
pub const TYPE_HELLO: u8 = 1;

/// ACK frame type (unicast reply to a HELLO).
pub const TYPE_ACK: u8 = 2;

/// Protocol version spoken by this implementation.
pub const DISCOVERY_VERSION: u8 = 1;

/// Fixed header length before the token.
pub const DISCOVERY_HEADER_SIZE: usize = 4;

/// Discovery frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// Announcement.
    Hello,
    /// Reply to an announcement.
    Ack,
}

impl DiscoveryKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Hello => TYPE_HELLO,
            Self::Ack => TYPE_ACK,
        }
    }
}

/// Discovery decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Frame shorter than the fixed header.
    TooShort(usize),
    /// Unknown frame type byte.
    UnknownType(u8),
    /// Version other than [`DISCOVERY_VERSION`].
    UnsupportedVersion(u8),
    /// Token differs from ours.
    TokenMismatch,
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "discovery frame too short ({} bytes)", len),
            Self::UnknownType(t) => write!(f, "unknown discovery frame type {}", t),
            Self::UnsupportedVersion(v) => write!(f, "unsupported discovery version {}", v),
            Self::TokenMismatch => write!(f, "discovery token mismatch"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// A decoded discovery frame borrowing its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryFrame<'a> {
    /// Frame kind.
    pub kind: DiscoveryKind,
    /// Reserved flags, sent as zero.
    pub flags: u16,
    /// Admission token.
    pub token: &'a [u8],
}

impl<'a> DiscoveryFrame<'a> {
    /// Build a frame with zero flags.
    pub fn new(kind: DiscoveryKind, token: &'a [u8]) -> Self {
        Self {
            kind,
            flags: 0,
            token,
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(DISCOVERY_HEADER_SIZE + self.token.len());
        bytes.push(self.kind.to_byte());
        bytes.push(DISCOVERY_VERSION);
        bytes.extend_from_slice(&self.flags.to_le_bytes());
        bytes.extend_from_slice(self.token);
        bytes
    }

    /// Parse a frame. The token may be empty.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DiscoveryError> {
        if bytes.len() < DISCOVERY_HEADER_SIZE {
            return Err(DiscoveryError::TooShort(bytes.len()));
        }
        let kind = match bytes[0] {
            TYPE_HELLO => DiscoveryKind::Hello,
            TYPE_ACK => DiscoveryKind::Ack,
            other => return Err(DiscoveryError::UnknownType(other)),
        };
        if bytes[1] != DISCOVERY_VERSION {
            return Err(DiscoveryError::UnsupportedVersion(bytes[1]));
        }
        Ok(Self {
            kind,
            flags: u16::from_le_bytes([bytes[2], bytes[3]]),
            token: &bytes[DISCOVERY_HEADER_SIZE..],
        })
    }
}
