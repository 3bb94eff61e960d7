//! Discovery service: periodic HELLO and admission of token-matching peers.

use super::frame::{DiscoveryError, DiscoveryFrame, DiscoveryKind};
use crate::config::DiscoveryConfig;
use crate::link::{Endpoint, LinkError, MacAddress};
use log::{debug, info, warn};

/// What handling one discovery frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Frame rejected; no peer added and nothing sent.
    Ignored(DiscoveryError),
    /// HELLO accepted and answered.
    HelloAnswered {
        /// Sender was not known before.
        newly_added: bool,
        /// The unicast ACK was transmitted.
        ack_sent: bool,
    },
    /// ACK accepted.
    AckAccepted {
        /// Sender was not known before.
        newly_added: bool,
    },
}

/// Discovery protocol state: the shared token and the prebuilt frames.
#[derive(Debug, Clone)]
pub struct Discovery {
    token: Vec<u8>,
    hello: Vec<u8>,
    ack: Vec<u8>,
}

impl Discovery {
    /// Create the service for an already validated config.
    pub fn new(config: &DiscoveryConfig) -> Self {
        let token = config.token.clone();
        Self {
            hello: DiscoveryFrame::new(DiscoveryKind::Hello, &token).encode(),
            ack: DiscoveryFrame::new(DiscoveryKind::Ack, &token).encode(),
            token,
        }
    }

    /// Encoded HELLO frame.
    pub fn hello_frame(&self) -> &[u8] {
        &self.hello
    }

    /// Encoded ACK frame.
    pub fn ack_frame(&self) -> &[u8] {
        &self.ack
    }

    /// Broadcast one HELLO.
    pub fn announce(&self, endpoint: &Endpoint) -> Result<(), LinkError> {
        endpoint.send(MacAddress::BROADCAST, &self.hello)
    }

    /// Handle a completed message that is not a command frame.
    pub fn handle(&self, endpoint: &Endpoint, src: MacAddress, data: &[u8]) -> DiscoveryOutcome {
        let frame = match DiscoveryFrame::decode(data) {
            Ok(frame) if frame.token == self.token.as_slice() => frame,
            Ok(_) => return self.ignore(src, DiscoveryError::TokenMismatch),
            Err(e) => return self.ignore(src, e),
        };

        match frame.kind {
            DiscoveryKind::Hello => {
                let newly_added = admit(endpoint, src);
                let ack_sent = match endpoint.send(src, &self.ack) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to ACK HELLO from {}: {}", src, e);
                        false
                    }
                };
                DiscoveryOutcome::HelloAnswered {
                    newly_added,
                    ack_sent,
                }
            }
            DiscoveryKind::Ack => DiscoveryOutcome::AckAccepted {
                newly_added: admit(endpoint, src),
            },
        }
    }

    fn ignore(&self, src: MacAddress, reason: DiscoveryError) -> DiscoveryOutcome {
        debug!("Ignoring discovery frame from {}: {}", src, reason);
        DiscoveryOutcome::Ignored(reason)
    }
}

/// Register `src` unencrypted if it is not yet known.
fn admit(endpoint: &Endpoint, src: MacAddress) -> bool {
    if endpoint.is_known_peer(src) {
        return false;
    }
    match endpoint.add_peer(src, None, false) {
        Ok(added) => {
            if added {
                info!("Discovered peer {}", src);
            }
            added
        }
        Err(LinkError::PeerTableFull { capacity }) => {
            warn!(
                "Peer table full ({} entries), not admitting {}",
                capacity, src
            );
            false
        }
        Err(e) => {
            warn!("Failed to admit peer {}: {}", src, e);
            false
        }
    }
}
