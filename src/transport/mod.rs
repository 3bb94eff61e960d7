//! Raw radio transport abstraction.
//!
//! The link layer only needs a connectionless datagram primitive addressed
//! by hardware address: send one frame of at most [`RADIO_MTU`] bytes,
//! register and unregister peers (optionally with a per-peer key), and
//! deliver received frames to a callback. This trait abstracts over
//! platform-specific drivers so the same link code runs on ESP32 (ESP-NOW)
//! and on the host (in-memory loopback medium).
//!
//! [`RADIO_MTU`]: crate::config::RADIO_MTU

use crate::link::{LinkKey, MacAddress};
use std::sync::Arc;

mod loopback;

#[cfg(feature = "esp32")]
mod espnow;

pub use loopback::{LoopbackMedium, LoopbackTransport};

#[cfg(feature = "esp32")]
pub use espnow::EspNowTransport;

/// Callback receiving `(source, frame)` for every frame the radio delivers.
///
/// Drivers may invoke it from their own execution context (the ESP-NOW
/// receive task on the device), so it must not block.
pub type FrameSink = Arc<dyn Fn(MacAddress, &[u8]) + Send + Sync>;

/// Peer registration passed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRegistration {
    /// Peer hardware address.
    pub address: MacAddress,
    /// Per-peer key, used when `encrypt` is set.
    pub key: Option<LinkKey>,
    /// Encrypt unicast frames to this peer.
    pub encrypt: bool,
}

impl PeerRegistration {
    /// Unencrypted registration (the discovery default).
    pub fn open(address: MacAddress) -> Self {
        Self {
            address,
            key: None,
            encrypt: false,
        }
    }
}

/// Raw transport abstraction.
///
/// Implementations must be callable from any thread. `send_frame` is
/// synchronous: it returns once the driver accepted (or rejected) the frame.
pub trait RawTransport: Send + Sync {
    /// Transmit one frame to `dest` (a registered peer or the broadcast address).
    fn send_frame(&self, dest: MacAddress, frame: &[u8]) -> Result<(), TransportError>;

    /// Register a peer, replacing any existing registration for its address.
    fn add_peer(&self, peer: &PeerRegistration) -> Result<(), TransportError>;

    /// Unregister a peer.
    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError>;

    /// Install the link-wide key (PMK).
    fn set_shared_key(&self, key: &LinkKey) -> Result<(), TransportError>;

    /// Hardware address of this station.
    fn local_address(&self) -> MacAddress;

    /// Install the receive callback, replacing any previous one.
    fn set_receiver(&self, sink: FrameSink) -> Result<(), TransportError>;

    /// Stop delivering frames and release driver resources.
    fn shutdown(&self) -> Result<(), TransportError>;
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Frame exceeds the radio MTU.
    FrameTooLarge(usize),
    /// Unicast to, or removal of, an unregistered peer.
    UnknownPeer(MacAddress),
    /// Driver has been shut down or was never started.
    NotReady,
    /// Driver rejected the operation with a platform error code.
    Driver(i32),
    /// Injected or simulated send failure.
    SendFailed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameTooLarge(len) => write!(f, "frame of {} bytes exceeds radio MTU", len),
            Self::UnknownPeer(addr) => write!(f, "peer {} is not registered", addr),
            Self::NotReady => write!(f, "transport not ready"),
            Self::Driver(code) => write!(f, "driver error {}", code),
            Self::SendFailed => write!(f, "frame transmission failed"),
        }
    }
}

impl std::error::Error for TransportError {}
