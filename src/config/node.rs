//! Discovery, role negotiation and node runtime settings.

use super::{ConfigError, LinkConfig};
use std::time::Duration;

/// Token used when none is provisioned.
pub const DEFAULT_TOKEN: &[u8] = b"rc-link-v1";

/// Longest discovery token accepted. Keeps a HELLO within one fragment.
pub const MAX_TOKEN_LEN: usize = 64;

/// How often HELLO is broadcast.
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(2);

/// How long after boot local activity can claim the controller role.
pub const DEFAULT_DECISION_WINDOW: Duration = Duration::from_millis(5000);

/// Input sampling and command transmit period.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// Change in percentage points that must be exceeded to count as stick movement.
pub const DEFAULT_ACTIVITY_THRESHOLD: u8 = 8;

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Shared plaintext admission token.
    pub token: Vec<u8>,
    /// Period between HELLO broadcasts.
    pub hello_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN.to_vec(),
            hello_interval: DEFAULT_HELLO_INTERVAL,
        }
    }
}

impl DiscoveryConfig {
    /// Create a discovery config with the given token and default cadence.
    pub fn with_token(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::Invalid("discovery token must not be empty"));
        }
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(ConfigError::Invalid("discovery token too long"));
        }
        if self.hello_interval.is_zero() {
            return Err(ConfigError::Invalid("hello_interval must be > 0"));
        }
        Ok(())
    }
}

/// Role negotiation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleConfig {
    /// Window after boot during which local activity is observed.
    pub decision_window: Duration,
    /// A change of more than this many percentage points on either axis
    /// counts as activity.
    pub activity_threshold: u8,
    /// Sampling period of the local input.
    pub sample_interval: Duration,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            decision_window: DEFAULT_DECISION_WINDOW,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

impl RoleConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Invalid("sample_interval must be > 0"));
        }
        // Axes span -100..=100, so a larger step can never be observed.
        if self.activity_threshold == 0 || self.activity_threshold > 200 {
            return Err(ConfigError::Invalid(
                "activity_threshold must be within 1..=200",
            ));
        }
        Ok(())
    }
}

/// Complete configuration for a [`Node`](crate::node::Node).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    /// Link layer limits.
    pub link: LinkConfig,
    /// Discovery settings.
    pub discovery: DiscoveryConfig,
    /// Role negotiation settings.
    pub role: RoleConfig,
}

impl NodeConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link.validate()?;
        self.discovery.validate()?;
        self.role.validate()
    }
}
