//! Link endpoint: the instance object tying the sender, the reassembly
//! engine and the peer table to one raw transport.
//!
//! # Locking
//!
//! A single mutex guards the reassembly slots, the peer table, the message
//! id counter and the initialized flag. It is never held across a transport
//! call or while the message handler runs, so the receive path never waits
//! on the radio driver and the handler may call [`Endpoint::send`]
//! (discovery answers a HELLO this way).
//!
//! # Example
//!
//! ```
//! use espnow_link_esp32::config::LinkConfig;
//! use espnow_link_esp32::link::{Endpoint, MacAddress};
//! use espnow_link_esp32::transport::LoopbackMedium;
//! use std::sync::{Arc, Mutex};
//!
//! let medium = LoopbackMedium::new();
//! let a = medium.attach(MacAddress::new([0x02, 0, 0, 0, 0, 1]));
//! let b = medium.attach(MacAddress::new([0x02, 0, 0, 0, 0, 2]));
//!
//! let inbox = Arc::new(Mutex::new(Vec::new()));
//! let sink = inbox.clone();
//! let _rx = Endpoint::start(b, LinkConfig::default(), move |_, _, msg: &[u8]| {
//!     sink.lock().unwrap().push(msg.to_vec());
//! })
//! .unwrap();
//! let tx = Endpoint::start(a, LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap();
//!
//! tx.send(MacAddress::BROADCAST, &[0x42; 1000]).unwrap();
//! assert_eq!(inbox.lock().unwrap()[0].len(), 1000);
//! ```

use super::peers::{PeerEntry, PeerTable};
use super::reassembly::{Accepted, Reassembler};
use super::sender::{Fragmenter, MessageIds};
use super::stats::LinkStats;
use super::{LinkError, LinkKey, MacAddress};
use crate::config::LinkConfig;
use crate::transport::{PeerRegistration, RawTransport};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Callback receiving every completed message.
///
/// Runs on the transport's receive context, outside the endpoint lock.
pub type MessageHandler = Box<dyn Fn(&Endpoint, MacAddress, &[u8]) + Send + Sync>;

struct Inner {
    initialized: bool,
    ids: MessageIds,
    reassembler: Reassembler,
    peers: PeerTable,
}

/// A fragmenting link over one raw transport.
pub struct Endpoint {
    transport: Arc<dyn RawTransport>,
    config: LinkConfig,
    fragmenter: Fragmenter,
    inner: Mutex<Inner>,
    handler: MessageHandler,
    stats: LinkStats,
}

impl Endpoint {
    /// Validate `config`, register the broadcast peer with the transport and
    /// start delivering completed messages to `handler`.
    pub fn start<H>(
        transport: Arc<dyn RawTransport>,
        config: LinkConfig,
        handler: H,
    ) -> Result<Arc<Self>, LinkError>
    where
        H: Fn(&Endpoint, MacAddress, &[u8]) + Send + Sync + 'static,
    {
        config.validate()?;
        transport.add_peer(&PeerRegistration::open(MacAddress::BROADCAST))?;

        let endpoint = Arc::new(Self {
            transport: transport.clone(),
            config,
            fragmenter: Fragmenter::new(&config),
            inner: Mutex::new(Inner {
                initialized: true,
                ids: MessageIds::new(),
                reassembler: Reassembler::new(&config),
                peers: PeerTable::new(config.max_peers),
            }),
            handler: Box::new(handler),
            stats: LinkStats::new(),
        });

        let weak = Arc::downgrade(&endpoint);
        let receiver = transport.set_receiver(Arc::new(move |src, frame: &[u8]| {
            if let Some(endpoint) = weak.upgrade() {
                endpoint.receive_frame(src, frame);
            }
        }));
        if let Err(e) = receiver {
            if let Err(cleanup) = transport.remove_peer(MacAddress::BROADCAST) {
                debug!("Failed to unregister broadcast peer: {}", cleanup);
            }
            return Err(e.into());
        }

        info!(
            "Link up on {} ({} slots, {} peers, {} byte fragments)",
            transport.local_address(),
            config.max_inflight,
            config.max_peers,
            config.fragment_payload
        );
        Ok(endpoint)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Link state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Send `data` to `dest` (a peer or [`MacAddress::BROADCAST`]).
    ///
    /// Fragments go out in index order. The first transport failure aborts
    /// the remaining fragments and is returned; the receiver keeps the
    /// partial message. Zero-length messages are allowed.
    pub fn send(&self, dest: MacAddress, data: &[u8]) -> Result<(), LinkError> {
        if !dest.is_broadcast() && !dest.is_unicast() {
            return Err(LinkError::InvalidArgument(
                "destination must be unicast or broadcast",
            ));
        }

        let msg_id = {
            let mut inner = self.lock();
            if !inner.initialized {
                return Err(LinkError::NotInitialized);
            }
            self.fragmenter.plan(data.len())?;
            inner.ids.next_id()
        };

        let frames = self.fragmenter.fragment(msg_id, data)?;
        let total = frames.total();
        for (seq, frame) in frames.enumerate() {
            if let Err(e) = self.transport.send_frame(dest, &frame) {
                LinkStats::bump(&self.stats.send_failures);
                error!(
                    "Send of message {} to {} aborted at fragment {}/{}: {}",
                    msg_id, dest, seq, total, e
                );
                return Err(e.into());
            }
            LinkStats::bump(&self.stats.frames_sent);
        }

        LinkStats::bump(&self.stats.messages_sent);
        debug!(
            "Sent message {} ({} bytes, {} fragments) to {}",
            msg_id,
            data.len(),
            total,
            dest
        );
        Ok(())
    }

    /// Feed one raw frame received from `src`.
    ///
    /// The transport's receive callback calls this; it is public so other
    /// drivers can push frames directly.
    pub fn receive_frame(&self, src: MacAddress, frame: &[u8]) {
        let outcome = {
            let mut inner = self.lock();
            if !inner.initialized {
                return;
            }
            inner.reassembler.accept(src, frame, Instant::now())
        };
        LinkStats::bump(&self.stats.frames_received);

        match outcome {
            Accepted::Pending => {}
            Accepted::Duplicate => {
                LinkStats::bump(&self.stats.duplicates);
                debug!("Duplicate fragment from {}", src);
            }
            Accepted::Complete(message) => {
                LinkStats::bump(&self.stats.messages_completed);
                debug!("Message of {} bytes from {}", message.len(), src);
                (self.handler)(self, src, &message);
            }
            Accepted::Dropped(reason) => {
                if reason.is_protocol_violation() {
                    LinkStats::bump(&self.stats.malformed);
                } else {
                    LinkStats::bump(&self.stats.resource_drops);
                }
                warn!("Dropped fragment from {}: {}", src, reason);
            }
        }
    }

    /// Register a peer, replacing any existing entry for `address`.
    ///
    /// Returns `true` if the peer was not known before. Encryption requires
    /// a per-peer key.
    pub fn add_peer(
        &self,
        address: MacAddress,
        key: Option<LinkKey>,
        encrypt: bool,
    ) -> Result<bool, LinkError> {
        if !address.is_unicast() {
            return Err(LinkError::InvalidArgument("peer address must be unicast"));
        }
        if encrypt && key.is_none() {
            return Err(LinkError::InvalidArgument("encrypted peer needs a key"));
        }

        {
            let inner = self.lock();
            if !inner.initialized {
                return Err(LinkError::NotInitialized);
            }
            inner.peers.can_admit(address)?;
        }

        let registration = PeerRegistration {
            address,
            key,
            encrypt,
        };
        self.transport.add_peer(&registration)?;

        // The table may have filled, or the link gone down, while the driver ran.
        let upserted = {
            let mut inner = self.lock();
            if inner.initialized {
                inner.peers.upsert(PeerEntry {
                    address,
                    encrypt,
                    key: registration.key.clone(),
                })
            } else {
                Err(LinkError::NotInitialized)
            }
        };
        match upserted {
            Ok(added) => {
                if added {
                    info!("Peer {} added (encrypt={})", address, encrypt);
                }
                Ok(added)
            }
            Err(e) => {
                if let Err(cleanup) = self.transport.remove_peer(address) {
                    debug!("Failed to roll back peer {}: {}", address, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Unregister a peer.
    pub fn remove_peer(&self, address: MacAddress) -> Result<(), LinkError> {
        {
            let inner = self.lock();
            if !inner.initialized {
                return Err(LinkError::NotInitialized);
            }
            if !inner.peers.contains(address) {
                return Err(LinkError::PeerNotFound(address));
            }
        }
        self.transport.remove_peer(address)?;
        self.lock().peers.remove(address)?;
        info!("Peer {} removed", address);
        Ok(())
    }

    /// Check if `address` is in the peer table.
    pub fn is_known_peer(&self, address: MacAddress) -> bool {
        self.lock().peers.contains(address)
    }

    /// Snapshot of known peer addresses.
    pub fn peers(&self) -> Vec<MacAddress> {
        self.lock().peers.addresses()
    }

    /// Hardware address of this station.
    pub fn local_address(&self) -> Result<MacAddress, LinkError> {
        self.check_initialized()?;
        Ok(self.transport.local_address())
    }

    /// Install the link-wide key (PMK).
    pub fn set_shared_key(&self, key: &LinkKey) -> Result<(), LinkError> {
        self.check_initialized()?;
        self.transport.set_shared_key(key)?;
        Ok(())
    }

    fn check_initialized(&self) -> Result<(), LinkError> {
        if self.lock().initialized {
            Ok(())
        } else {
            Err(LinkError::NotInitialized)
        }
    }

    /// Free stalled reassembly slots if a timeout is configured.
    ///
    /// Returns the number of slots freed.
    pub fn sweep_stale(&self) -> usize {
        self.sweep_stale_at(Instant::now())
    }

    /// [`sweep_stale`](Self::sweep_stale) against an explicit clock reading.
    pub fn sweep_stale_at(&self, now: Instant) -> usize {
        let Some(timeout) = self.config.stale_slot_timeout else {
            return 0;
        };
        let freed = self.lock().reassembler.sweep_stale(now, timeout);
        if freed > 0 {
            LinkStats::add(&self.stats.stale_slots, freed);
            warn!("Freed {} stalled reassembly slot(s)", freed);
        }
        freed
    }

    /// Number of partially received messages.
    pub fn in_flight(&self) -> usize {
        self.lock().reassembler.in_flight()
    }

    /// Link counters.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Active limits.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Check if the endpoint is still usable.
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Release all slots and peers and shut the transport down.
    ///
    /// Idempotent. Afterwards every operation fails with
    /// [`LinkError::NotInitialized`] and received frames are ignored.
    pub fn deinit(&self) {
        let peers = {
            let mut inner = self.lock();
            if !inner.initialized {
                return;
            }
            inner.initialized = false;
            inner.reassembler.clear();
            inner.peers.drain()
        };
        for peer in &peers {
            if let Err(e) = self.transport.remove_peer(peer.address) {
                warn!("Failed to unregister peer {}: {}", peer.address, e);
            }
        }
        if let Err(e) = self.transport.remove_peer(MacAddress::BROADCAST) {
            debug!("Failed to unregister broadcast peer: {}", e);
        }
        if let Err(e) = self.transport.shutdown() {
            warn!("Transport shutdown failed: {}", e);
        }
        info!("Link down ({} peers released)", peers.len());
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("local", &self.transport.local_address())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::frame::{FragmentHeader, HEADER_SIZE};
    use crate::transport::{FrameSink, LoopbackMedium, LoopbackTransport, TransportError};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const A: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0A]);
    const B: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0B]);
    const C: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0C]);

    type Inbox = Arc<Mutex<Vec<(MacAddress, Vec<u8>)>>>;

    fn collecting(
        transport: Arc<LoopbackTransport>,
        config: LinkConfig,
    ) -> (Arc<Endpoint>, Inbox) {
        let inbox: Inbox = Arc::default();
        let sink = inbox.clone();
        let endpoint = Endpoint::start(transport, config, move |_, src, msg: &[u8]| {
            sink.lock().unwrap().push((src, msg.to_vec()));
        })
        .unwrap();
        (endpoint, inbox)
    }

    fn silent(transport: Arc<LoopbackTransport>) -> Arc<Endpoint> {
        Endpoint::start(transport, LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap()
    }

    const DRIVER_STALL: Duration = Duration::from_millis(300);

    /// Loopback station whose driver stalls once inside a peer or key call.
    struct StallingDriver {
        station: Arc<LoopbackTransport>,
        armed: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl StallingDriver {
        fn new(station: Arc<LoopbackTransport>) -> Arc<Self> {
            Arc::new(Self {
                station,
                armed: Mutex::new(None),
            })
        }

        /// Stall the next peer or key call; the receiver fires when it starts.
        fn stall_next(&self) -> mpsc::Receiver<()> {
            let (tx, rx) = mpsc::channel();
            *self.armed.lock().unwrap() = Some(tx);
            rx
        }

        fn stall_if_armed(&self) {
            let armed = self.armed.lock().unwrap().take();
            if let Some(entered) = armed {
                entered.send(()).unwrap();
                thread::sleep(DRIVER_STALL);
            }
        }
    }

    impl RawTransport for StallingDriver {
        fn send_frame(&self, dest: MacAddress, frame: &[u8]) -> Result<(), TransportError> {
            self.station.send_frame(dest, frame)
        }

        fn add_peer(&self, peer: &PeerRegistration) -> Result<(), TransportError> {
            self.stall_if_armed();
            self.station.add_peer(peer)
        }

        fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
            self.stall_if_armed();
            self.station.remove_peer(address)
        }

        fn set_shared_key(&self, key: &LinkKey) -> Result<(), TransportError> {
            self.stall_if_armed();
            self.station.set_shared_key(key)
        }

        fn local_address(&self) -> MacAddress {
            self.station.local_address()
        }

        fn set_receiver(&self, sink: FrameSink) -> Result<(), TransportError> {
            self.station.set_receiver(sink)
        }

        fn shutdown(&self) -> Result<(), TransportError> {
            self.station.shutdown()
        }
    }

    /// Once the driver stall has begun, a received frame must be handled
    /// without waiting for it.
    fn assert_receive_not_blocked(endpoint: &Endpoint, entered: mpsc::Receiver<()>) {
        entered.recv().unwrap();
        let frame = Fragmenter::new(&LinkConfig::default())
            .fragment(1, b"ping")
            .unwrap()
            .next()
            .unwrap();
        let started = Instant::now();
        endpoint.receive_frame(C, &frame);
        assert!(
            started.elapsed() < DRIVER_STALL / 3,
            "receive path waited {:?} on the driver",
            started.elapsed()
        );
    }

    #[test]
    fn test_round_trip_lengths() {
        let medium = LoopbackMedium::new();
        let tx = silent(medium.attach(A));
        let (_rx, inbox) = collecting(medium.attach(B), LinkConfig::default());

        for len in [0usize, 1, 199, 200, 201, 4096, 8192] {
            let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            tx.send(MacAddress::BROADCAST, &data).unwrap();
            let (src, got) = inbox.lock().unwrap().pop().unwrap();
            assert_eq!(src, A);
            assert_eq!(got, data, "len {}", len);
        }
        assert_eq!(tx.stats().snapshot().messages_sent, 7);
    }

    #[test]
    fn test_max_message_is_41_frames() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let (_rx, inbox) = collecting(medium.attach(B), LinkConfig::default());

        tx.send(MacAddress::BROADCAST, &[0x77; 8192]).unwrap();
        assert_eq!(a.frames_sent(), 41);
        assert_eq!(inbox.lock().unwrap()[0].1, vec![0x77; 8192]);
    }

    #[test]
    fn test_fragment_ceiling_rejects_before_transmit() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let config = LinkConfig {
            max_fragments: 4,
            ..Default::default()
        };
        let tx = Endpoint::start(a.clone(), config, |_, _, _: &[u8]| {}).unwrap();

        assert_eq!(
            tx.send(MacAddress::BROADCAST, &[0; 801]),
            Err(LinkError::TooManyFragments {
                fragments: 5,
                max: 4
            })
        );
        assert_eq!(
            tx.send(MacAddress::BROADCAST, &[0; 8193]),
            Err(LinkError::MessageTooLarge {
                len: 8193,
                max: 8192
            })
        );
        assert_eq!(a.frames_sent(), 0);
    }

    #[test]
    fn test_transport_failure_aborts_remaining_fragments() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let (rx, inbox) = collecting(medium.attach(B), LinkConfig::default());

        a.fail_after(2);
        assert_eq!(
            tx.send(MacAddress::BROADCAST, &[1; 1000]),
            Err(LinkError::Transport(TransportError::SendFailed))
        );
        assert_eq!(a.frames_sent(), 2);
        assert!(inbox.lock().unwrap().is_empty());
        assert_eq!(rx.in_flight(), 1);
        assert_eq!(tx.stats().snapshot().send_failures, 1);
    }

    #[test]
    fn test_unicast_to_unregistered_peer_fails() {
        let medium = LoopbackMedium::new();
        let tx = silent(medium.attach(A));
        let _rx = silent(medium.attach(B));

        assert_eq!(
            tx.send(B, b"hi"),
            Err(LinkError::Transport(TransportError::UnknownPeer(B)))
        );
        tx.add_peer(B, None, false).unwrap();
        assert!(tx.send(B, b"hi").is_ok());
    }

    #[test]
    fn test_unicast_reaches_only_destination() {
        let medium = LoopbackMedium::new();
        let tx = silent(medium.attach(A));
        let (_b, inbox_b) = collecting(medium.attach(B), LinkConfig::default());
        let (_c, inbox_c) = collecting(medium.attach(C), LinkConfig::default());

        tx.add_peer(B, None, false).unwrap();
        tx.send(B, b"for b").unwrap();
        assert_eq!(inbox_b.lock().unwrap().len(), 1);
        assert!(inbox_c.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_destination_rejected() {
        let medium = LoopbackMedium::new();
        let tx = silent(medium.attach(A));
        assert!(matches!(
            tx.send(MacAddress::zero(), b"x"),
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(matches!(
            tx.add_peer(MacAddress::BROADCAST, None, false),
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(matches!(
            tx.add_peer(B, None, true),
            Err(LinkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_peer_table_bounded_and_replaced() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());

        assert_eq!(tx.add_peer(B, None, false), Ok(true));
        assert_eq!(
            tx.add_peer(C, None, false),
            Err(LinkError::PeerTableFull { capacity: 1 })
        );
        assert!(!a.is_registered(C));

        // Replace with an encrypted entry
        let key = LinkKey::new([3; 16]);
        assert_eq!(tx.add_peer(B, Some(key.clone()), true), Ok(false));
        assert_eq!(tx.peers(), vec![B]);
        let registration = a.registration(B).unwrap();
        assert!(registration.encrypt);
        assert_eq!(registration.key, Some(key));

        tx.remove_peer(B).unwrap();
        assert!(!a.is_registered(B));
        assert_eq!(tx.remove_peer(B), Err(LinkError::PeerNotFound(B)));
        assert_eq!(tx.add_peer(C, None, false), Ok(true));
    }

    #[test]
    fn test_receive_not_blocked_by_slow_peer_registration() {
        let medium = LoopbackMedium::new();
        let driver = StallingDriver::new(medium.attach(A));
        let endpoint =
            Endpoint::start(driver.clone(), LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap();

        let entered = driver.stall_next();
        let adder = {
            let endpoint = endpoint.clone();
            thread::spawn(move || endpoint.add_peer(B, None, false))
        };
        assert_receive_not_blocked(&endpoint, entered);

        assert_eq!(adder.join().unwrap(), Ok(true));
        assert_eq!(endpoint.peers(), vec![B]);
        assert_eq!(endpoint.stats().snapshot().messages_completed, 1);
    }

    #[test]
    fn test_receive_not_blocked_by_slow_shared_key() {
        let medium = LoopbackMedium::new();
        let driver = StallingDriver::new(medium.attach(A));
        let endpoint =
            Endpoint::start(driver.clone(), LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap();

        let entered = driver.stall_next();
        let setter = {
            let endpoint = endpoint.clone();
            thread::spawn(move || endpoint.set_shared_key(&LinkKey::new([4; 16])))
        };
        assert_receive_not_blocked(&endpoint, entered);
        assert_eq!(setter.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_receive_not_blocked_by_slow_deinit() {
        let medium = LoopbackMedium::new();
        let driver = StallingDriver::new(medium.attach(A));
        let endpoint =
            Endpoint::start(driver.clone(), LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap();
        endpoint.add_peer(B, None, false).unwrap();

        let entered = driver.stall_next();
        let closer = {
            let endpoint = endpoint.clone();
            thread::spawn(move || endpoint.deinit())
        };
        assert_receive_not_blocked(&endpoint, entered);
        closer.join().unwrap();

        assert!(!endpoint.is_initialized());
        assert!(!driver.station.is_registered(B));
        // Link was already down when the frame arrived
        assert_eq!(endpoint.stats().snapshot().frames_received, 0);
    }

    #[test]
    fn test_peer_added_during_deinit_is_rolled_back() {
        let medium = LoopbackMedium::new();
        let driver = StallingDriver::new(medium.attach(A));
        let endpoint =
            Endpoint::start(driver.clone(), LinkConfig::default(), |_, _, _: &[u8]| {}).unwrap();

        let entered = driver.stall_next();
        let adder = {
            let endpoint = endpoint.clone();
            thread::spawn(move || endpoint.add_peer(B, None, false))
        };
        entered.recv().unwrap();
        endpoint.deinit();

        assert_eq!(adder.join().unwrap(), Err(LinkError::NotInitialized));
        assert!(!driver.station.is_registered(B));
        assert!(endpoint.peers().is_empty());
    }

    #[test]
    fn test_failed_start_unregisters_broadcast() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        a.shutdown().unwrap();

        let result = Endpoint::start(a.clone(), LinkConfig::default(), |_, _, _: &[u8]| {});
        assert_eq!(
            result.err(),
            Some(LinkError::Transport(TransportError::NotReady))
        );
        assert!(!a.is_registered(MacAddress::BROADCAST));
    }

    #[test]
    fn test_handler_may_send_from_callback() {
        let medium = LoopbackMedium::new();
        let (a, inbox_a) = collecting(medium.attach(A), LinkConfig::default());
        let echo = Endpoint::start(medium.attach(B), LinkConfig::default(), |ep, src, msg| {
            if !ep.is_known_peer(src) {
                ep.add_peer(src, None, false).unwrap();
            }
            ep.send(src, msg).unwrap();
        })
        .unwrap();

        a.add_peer(B, None, false).unwrap();
        a.send(B, &[9; 650]).unwrap();
        assert_eq!(inbox_a.lock().unwrap()[0], (B, vec![9; 650]));
        assert!(echo.is_known_peer(A));
    }

    #[test]
    fn test_malformed_frame_counted() {
        let medium = LoopbackMedium::new();
        let (rx, inbox) = collecting(medium.attach(B), LinkConfig::default());

        let mut frame = vec![0u8; HEADER_SIZE + 3];
        FragmentHeader {
            msg_id: 1,
            seq_idx: 1,
            total_frags: 1,
            payload_len: 3,
        }
        .write_to(&mut frame)
        .unwrap();
        rx.receive_frame(A, &frame);

        assert!(inbox.lock().unwrap().is_empty());
        let snap = rx.stats().snapshot();
        assert_eq!(snap.frames_received, 1);
        assert_eq!(snap.malformed, 1);
    }

    #[test]
    fn test_sweep_frees_stalled_slot_when_enabled() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let config = LinkConfig {
            stale_slot_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let (rx, _) = collecting(medium.attach(B), config);

        a.fail_after(1);
        assert!(tx.send(MacAddress::BROADCAST, &[0; 500]).is_err());
        assert_eq!(rx.in_flight(), 1);

        assert_eq!(rx.sweep_stale_at(Instant::now()), 0);
        assert_eq!(rx.sweep_stale_at(Instant::now() + Duration::from_secs(2)), 1);
        assert_eq!(rx.in_flight(), 0);
        assert_eq!(rx.stats().snapshot().stale_slots, 1);
    }

    #[test]
    fn test_sweep_disabled_by_default() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let (rx, _) = collecting(medium.attach(B), LinkConfig::default());

        a.fail_after(1);
        assert!(tx.send(MacAddress::BROADCAST, &[0; 500]).is_err());
        assert_eq!(rx.sweep_stale_at(Instant::now() + Duration::from_secs(3600)), 0);
        assert_eq!(rx.in_flight(), 1);
    }

    #[test]
    fn test_deinit_is_idempotent_and_final() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let (rx, inbox) = collecting(medium.attach(B), LinkConfig::default());
        tx.add_peer(B, None, false).unwrap();

        tx.deinit();
        tx.deinit();
        assert!(!tx.is_initialized());
        assert!(!a.is_registered(B));
        assert_eq!(tx.send(B, b"x"), Err(LinkError::NotInitialized));
        assert_eq!(tx.add_peer(B, None, false), Err(LinkError::NotInitialized));
        assert_eq!(tx.local_address(), Err(LinkError::NotInitialized));
        assert_eq!(
            tx.set_shared_key(&LinkKey::new([1; 16])),
            Err(LinkError::NotInitialized)
        );

        // A deinitialized receiver ignores frames and does not count them
        rx.deinit();
        let other = silent(medium.attach(C));
        other.send(MacAddress::BROADCAST, b"late").unwrap();
        assert!(inbox.lock().unwrap().is_empty());
        assert_eq!(rx.stats().snapshot().frames_received, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let medium = LoopbackMedium::new();
        let config = LinkConfig {
            max_inflight: 0,
            ..Default::default()
        };
        let result = Endpoint::start(medium.attach(A), config, |_, _, _: &[u8]| {});
        assert!(matches!(result, Err(LinkError::Config(_))));
    }

    #[test]
    fn test_shared_key_reaches_transport() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let tx = silent(a.clone());
        let key = LinkKey::new([0x5C; 16]);
        tx.set_shared_key(&key).unwrap();
        assert_eq!(a.shared_key(), Some(key));
        assert_eq!(tx.local_address(), Ok(A));
    }
}
