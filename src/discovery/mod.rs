//! Peer discovery over broadcast.
//!
//! Each node periodically broadcasts a HELLO carrying a shared token. A node
//! receiving a HELLO with the right version and token registers the sender
//! and answers with a unicast ACK; a node receiving a matching ACK registers
//! the sender too, which covers a HELLO that was lost on the air.
//!
//! The token is a plaintext admission gate, not a credential. It offers no
//! protection against eavesdropping, replay or forgery and is only suitable
//! on a physically trusted short-range segment.

mod frame;
mod service;

pub use frame::{
    DiscoveryError, DiscoveryFrame, DiscoveryKind, DISCOVERY_HEADER_SIZE, DISCOVERY_VERSION,
    TYPE_ACK, TYPE_HELLO,
};
pub use service::{Discovery, DiscoveryOutcome};
