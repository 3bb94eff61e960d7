//! ESP-NOW link firmware library.
//!
//! A fragmenting message layer over a connectionless radio with a ~250 byte
//! MTU, broadcast peer discovery gated by a shared token, and the
//! controller/car role protocol built on top of it. Everything except the
//! ESP-NOW driver adapter is platform-independent and tested on the host.

pub mod command;
pub mod config;
pub mod discovery;
pub mod link;
pub mod node;
pub mod transport;

// Re-export commonly used items
pub use command::{JoystickCommand, LoggingMotor, Role};
pub use config::{ConfigError, LinkConfig, NodeConfig};
pub use discovery::Discovery;
pub use link::{Endpoint, LinkError, LinkKey, MacAddress};
pub use node::{Node, NodeError};
pub use transport::{LoopbackMedium, RawTransport, TransportError};
