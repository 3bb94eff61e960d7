use super::MacAddress;
use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors returned synchronously by [`Endpoint`](super::Endpoint) operations.
///
/// Receive-side failures never appear here: they are logged and counted
/// in [`LinkStats`](super::LinkStats) only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Operation attempted after [`deinit`](super::Endpoint::deinit).
    NotInitialized,
    /// Invalid argument (e.g. a non-unicast peer address).
    InvalidArgument(&'static str),
    /// Message longer than the reassembly limit.
    MessageTooLarge {
        /// Message length in bytes.
        len: usize,
        /// Configured maximum message size.
        max: usize,
    },
    /// Message needs more fragments than the configured ceiling.
    TooManyFragments {
        /// Fragments required.
        fragments: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Peer table is at capacity.
    PeerTableFull {
        /// Table capacity.
        capacity: usize,
    },
    /// No peer entry for this address.
    PeerNotFound(MacAddress),
    /// Underlying transport failure.
    Transport(TransportError),
    /// Invalid configuration.
    Config(ConfigError),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "link not initialized"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::MessageTooLarge { len, max } => {
                write!(f, "message of {} bytes exceeds maximum of {}", len, max)
            }
            Self::TooManyFragments { fragments, max } => {
                write!(f, "message needs {} fragments, maximum is {}", fragments, max)
            }
            Self::PeerTableFull { capacity } => {
                write!(f, "peer table full ({} entries)", capacity)
            }
            Self::PeerNotFound(addr) => write!(f, "peer {} not found", addr),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for LinkError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ConfigError> for LinkError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
