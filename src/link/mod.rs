//! Fragmenting link layer.
//!
//! The radio caps each datagram at about 250 bytes. This module splits
//! application messages into self-describing fragment frames, rebuilds them
//! on the receiving side under bounded memory, and keeps the table of known
//! peers. Delivery is best effort: there is no acknowledgement, no
//! retransmission and no ordering across messages.
//!
//! # Components
//!
//! - [`frame`] - fragment header codec
//! - [`Fragmenter`] / [`MessageIds`] - outbound splitting
//! - [`Reassembler`] - fixed pool of reassembly slots
//! - [`PeerTable`] - bounded peer registry
//! - [`Endpoint`] - the instance object combining all of the above with a
//!   [`RawTransport`](crate::transport::RawTransport)

mod address;
mod endpoint;
mod error;
pub mod frame;
mod peers;
mod reassembly;
mod sender;
mod stats;

pub use address::{LinkKey, MacAddress, KEY_LEN};
pub use endpoint::{Endpoint, MessageHandler};
pub use error::LinkError;
pub use frame::{Fragment, FragmentHeader, FrameError, HEADER_SIZE};
pub use peers::{PeerEntry, PeerTable};
pub use reassembly::{Accepted, DropReason, Reassembler, SupersedePolicy, SUPERSEDE_POLICY};
pub use sender::{Fragmenter, Frames, MessageIds};
pub use stats::{LinkStats, LinkStatsSnapshot};
