//! Link and node configuration.
//!
//! Every limit the link layer enforces is a compile-time default that can be
//! overridden per instance. Configuration structs validate themselves before
//! an [`Endpoint`](crate::link::Endpoint) or [`Node`](crate::node::Node) is
//! built from them.
//!
//! # Components
//!
//! - [`LinkConfig`] - fragmentation, reassembly and peer table limits
//! - [`DiscoveryConfig`] - shared token and HELLO cadence
//! - [`RoleConfig`] - role decision window and activity detection
//! - [`NodeConfig`] - everything a node runtime needs

mod link;
mod node;

pub use link::{
    LinkConfig, DEFAULT_FRAGMENT_PAYLOAD, DEFAULT_MAX_FRAGMENTS, DEFAULT_MAX_INFLIGHT,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_PEERS, RADIO_MTU,
};
pub use node::{
    DiscoveryConfig, NodeConfig, RoleConfig, DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_DECISION_WINDOW,
    DEFAULT_HELLO_INTERVAL, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TOKEN, MAX_TOKEN_LEN,
};

/// Error returned when a configuration value is out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration parameter.
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
