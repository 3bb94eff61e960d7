//! Fragmentation, reassembly and peer table limits.

use super::ConfigError;
use crate::link::HEADER_SIZE;
use std::time::Duration;

/// Largest frame the radio accepts in a single datagram (ESP-NOW v1 limit).
pub const RADIO_MTU: usize = 250;

/// Largest message the reassembly engine will rebuild.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Concurrent reassemblies held at once.
pub const DEFAULT_MAX_INFLIGHT: usize = 4;

/// Peers the peer table admits.
pub const DEFAULT_MAX_PEERS: usize = 1;

/// Fragment ceiling per message (bounds the presence bitmap).
pub const DEFAULT_MAX_FRAGMENTS: usize = 128;

/// Payload bytes per fragment. Header plus payload stays well under the MTU.
pub const DEFAULT_FRAGMENT_PAYLOAD: usize = 200;

/// Limits for a single link endpoint.
///
/// Note: This is `Copy` for efficient passing to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Maximum size of a reassembled (and of a sent) message in bytes.
    pub max_message_size: usize,
    /// Number of reassembly slots.
    pub max_inflight: usize,
    /// Capacity of the peer table.
    pub max_peers: usize,
    /// Maximum fragments a single message may be split into.
    pub max_fragments: usize,
    /// Payload bytes carried by each fragment.
    pub fragment_payload: usize,
    /// Free reassembly slots idle for longer than this.
    ///
    /// `None` keeps stalled slots until a new message reuses their key,
    /// which is the behaviour of the deployed firmware.
    pub stale_slot_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            max_peers: DEFAULT_MAX_PEERS,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            fragment_payload: DEFAULT_FRAGMENT_PAYLOAD,
            stale_slot_timeout: None,
        }
    }
}

impl LinkConfig {
    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero, if a full fragment frame would
    /// not fit the radio MTU, or if the fragment ceiling does not fit the
    /// 16-bit header fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be > 0"));
        }
        if self.max_inflight == 0 {
            return Err(ConfigError::Invalid("max_inflight must be > 0"));
        }
        if self.max_peers == 0 {
            return Err(ConfigError::Invalid("max_peers must be > 0"));
        }
        if self.max_fragments == 0 {
            return Err(ConfigError::Invalid("max_fragments must be > 0"));
        }
        if self.max_fragments > u16::MAX as usize {
            return Err(ConfigError::Invalid("max_fragments must fit in 16 bits"));
        }
        if self.fragment_payload == 0 {
            return Err(ConfigError::Invalid("fragment_payload must be > 0"));
        }
        if HEADER_SIZE + self.fragment_payload > RADIO_MTU {
            return Err(ConfigError::Invalid(
                "fragment header plus payload must fit the radio MTU",
            ));
        }
        if matches!(self.stale_slot_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigError::Invalid("stale_slot_timeout must be > 0"));
        }
        Ok(())
    }

    /// Number of fragments needed for a message of `len` bytes (at least 1).
    pub fn fragments_for(&self, len: usize) -> usize {
        len.div_ceil(self.fragment_payload).max(1)
    }

    /// Size of the reassembly buffer for a message of `total_frags` fragments.
    pub fn buffer_size_for(&self, total_frags: usize) -> usize {
        total_frags
            .saturating_mul(self.fragment_payload)
            .min(self.max_message_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_message_size, 8192);
        assert_eq!(config.max_inflight, 4);
        assert_eq!(config.max_peers, 1);
        assert_eq!(config.max_fragments, 128);
        assert_eq!(config.fragment_payload, 200);
        assert_eq!(config.stale_slot_timeout, None);
    }

    #[test]
    fn test_zero_limits_rejected() {
        for config in [
            LinkConfig {
                max_message_size: 0,
                ..Default::default()
            },
            LinkConfig {
                max_inflight: 0,
                ..Default::default()
            },
            LinkConfig {
                max_peers: 0,
                ..Default::default()
            },
            LinkConfig {
                max_fragments: 0,
                ..Default::default()
            },
            LinkConfig {
                fragment_payload: 0,
                ..Default::default()
            },
            LinkConfig {
                stale_slot_timeout: Some(Duration::ZERO),
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_payload_must_fit_mtu() {
        let config = LinkConfig {
            fragment_payload: RADIO_MTU - HEADER_SIZE,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = LinkConfig {
            fragment_payload: RADIO_MTU - HEADER_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fragment_ceiling_fits_header() {
        let config = LinkConfig {
            max_fragments: u16::MAX as usize + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fragments_for() {
        let config = LinkConfig::default();
        assert_eq!(config.fragments_for(0), 1);
        assert_eq!(config.fragments_for(1), 1);
        assert_eq!(config.fragments_for(200), 1);
        assert_eq!(config.fragments_for(201), 2);
        assert_eq!(config.fragments_for(8192), 41);
    }

    #[test]
    fn test_buffer_size_capped() {
        let config = LinkConfig::default();
        assert_eq!(config.buffer_size_for(1), 200);
        assert_eq!(config.buffer_size_for(41), 8192);
        assert_eq!(config.buffer_size_for(128), 8192);
    }
}
