//! Node runtime: one link endpoint plus discovery and the role layer.
//!
//! A `Node` owns an [`Endpoint`] whose message handler routes completed
//! messages (command frames first, recognised by their magic, everything
//! else to discovery) and a background task that
//!
//! - broadcasts a HELLO every discovery interval, the first one at start,
//! - samples the local joystick every sampling tick, feeds the role
//!   resolver and sends the sample while this node is the controller,
//! - frees stalled reassembly slots when a timeout is configured.
//!
//! Multiple nodes can share one [`LoopbackMedium`](crate::transport::LoopbackMedium)
//! to exercise the whole protocol in a single process.
//!
//! # Example
//!
//! ```ignore
//! let medium = LoopbackMedium::new();
//! let car = Node::start(
//!     NodeConfig::default(),
//!     medium.attach(CAR_MAC),
//!     Box::new(NeutralInput),
//!     Arc::new(LoggingMotor),
//! )?;
//! ```

use crate::command::{
    send_command, CommandFrame, CommandHandler, JoystickInput, MotorSink, Role, RoleCell,
    RoleResolver,
};
use crate::config::{ConfigError, NodeConfig};
use crate::discovery::Discovery;
use crate::link::{Endpoint, LinkError, MacAddress};
use crate::transport::RawTransport;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Error type for Node operations.
#[derive(Debug)]
pub enum NodeError {
    /// Configuration rejected.
    Config(ConfigError),
    /// Link endpoint could not start.
    Link(LinkError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::Config(e) => write!(f, "{}", e),
            NodeError::Link(e) => write!(f, "link error: {}", e),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeError::Config(e) => Some(e),
            NodeError::Link(e) => Some(e),
        }
    }
}

impl From<ConfigError> for NodeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LinkError> for NodeError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

/// A running node.
pub struct Node {
    /// Link endpoint shared with the background task.
    endpoint: Arc<Endpoint>,
    /// Role decided by the sampling loop or by an incoming command.
    role: Arc<RoleCell>,
    /// Cancellation token for shutdown.
    cancel: CancellationToken,
    /// Background task handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Node {
    /// Start a node on `transport`.
    ///
    /// Must be called from within a tokio runtime. The decision window
    /// starts now.
    pub fn start(
        config: NodeConfig,
        transport: Arc<dyn RawTransport>,
        input: Box<dyn JoystickInput>,
        motor: Arc<dyn MotorSink>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let role = Arc::new(RoleCell::new());
        let discovery = Arc::new(Discovery::new(&config.discovery));
        let commands = CommandHandler::new(role.clone(), motor);

        let router_discovery = discovery.clone();
        let endpoint = Endpoint::start(transport, config.link, move |ep, src, data: &[u8]| {
            if CommandFrame::has_magic(data) {
                if let Err(e) = commands.handle(src, data) {
                    debug!("Ignoring command from {}: {}", src, e);
                }
            } else {
                router_discovery.handle(ep, src, data);
            }
        })?;

        let resolver = RoleResolver::new(&config.role, Instant::now().into_std());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            endpoint.clone(),
            discovery,
            role.clone(),
            resolver,
            input,
            config,
            cancel.clone(),
        ));

        Ok(Self {
            endpoint,
            role,
            cancel,
            task: Some(task),
        })
    }

    /// Current role.
    pub fn role(&self) -> Role {
        self.role.get()
    }

    /// The node's link endpoint.
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Hardware address of this node.
    pub fn address(&self) -> Result<MacAddress, LinkError> {
        self.endpoint.local_address()
    }

    /// Stop the background task and deinitialize the link.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Node task ended abnormally: {}", e);
            }
        }
        self.endpoint.deinit();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background loop: HELLO timer, sampling tick and stale-slot sweep.
async fn run(
    endpoint: Arc<Endpoint>,
    discovery: Arc<Discovery>,
    role: Arc<RoleCell>,
    mut resolver: RoleResolver,
    mut input: Box<dyn JoystickInput>,
    config: NodeConfig,
    cancel: CancellationToken,
) {
    let mut hello = tokio::time::interval(config.discovery.hello_interval);
    let mut sample = tokio::time::interval(config.role.sample_interval);
    sample.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Node running: HELLO every {:?}, sampling every {:?}",
        config.discovery.hello_interval, config.role.sample_interval
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Node task shutting down");
                break;
            }

            _ = hello.tick() => {
                if let Err(e) = discovery.announce(&endpoint) {
                    warn!("HELLO broadcast failed: {}", e);
                }
                endpoint.sweep_stale();
            }

            _ = sample.tick() => {
                let cmd = input.sample();
                let now = Instant::now().into_std();
                if resolver.observe(&role, cmd, now) == Role::Controller {
                    send_command(&endpoint, &cmd);
                }
            }
        }
    }
}
