//! In-memory radio medium for host runs and tests.
//!
//! Every [`LoopbackTransport`] attached to a [`LoopbackMedium`] behaves like
//! a station on the same channel: broadcast frames reach every other
//! station, unicast frames reach the station with the destination address.
//! Delivery is synchronous on the sender's thread, like a driver calling its
//! receive callback from the send path. Encryption is not simulated.

use super::{FrameSink, PeerRegistration, RawTransport, TransportError};
use crate::config::RADIO_MTU;
use crate::link::{LinkKey, MacAddress};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Station {
    address: MacAddress,
    sink: Option<FrameSink>,
}

/// Shared in-memory channel.
#[derive(Default)]
pub struct LoopbackMedium {
    stations: Mutex<Vec<Station>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Loopback mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl LoopbackMedium {
    /// Create an empty medium.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a station with the given hardware address.
    pub fn attach(self: &Arc<Self>, address: MacAddress) -> Arc<LoopbackTransport> {
        lock(&self.stations).push(Station {
            address,
            sink: None,
        });
        Arc::new(LoopbackTransport {
            medium: self.clone(),
            address,
            peers: Mutex::new(Vec::new()),
            shared_key: Mutex::new(None),
            up: AtomicBool::new(true),
            frames_sent: AtomicUsize::new(0),
            fail_after: Mutex::new(None),
            capture: Mutex::new(None),
        })
    }

    fn set_sink(&self, address: MacAddress, sink: Option<FrameSink>) {
        for station in lock(&self.stations).iter_mut() {
            if station.address == address {
                station.sink = sink.clone();
            }
        }
    }

    fn deliver(&self, src: MacAddress, dest: MacAddress, frame: &[u8]) {
        // Collect sinks first; they may send again from inside the callback.
        let sinks: Vec<FrameSink> = lock(&self.stations)
            .iter()
            .filter(|s| s.address != src && (dest.is_broadcast() || s.address == dest))
            .filter_map(|s| s.sink.clone())
            .collect();
        for sink in sinks {
            sink(src, frame);
        }
    }
}

/// One station on a [`LoopbackMedium`].
pub struct LoopbackTransport {
    medium: Arc<LoopbackMedium>,
    address: MacAddress,
    peers: Mutex<Vec<PeerRegistration>>,
    shared_key: Mutex<Option<LinkKey>>,
    up: AtomicBool,
    frames_sent: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    capture: Mutex<Option<Vec<(MacAddress, Vec<u8>)>>>,
}

impl LoopbackTransport {
    /// Frames transmitted successfully.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Let the next `n` frames through, then fail every send.
    pub fn fail_after(&self, n: usize) {
        *lock(&self.fail_after) = Some(n);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        *lock(&self.fail_after) = None;
    }

    /// Start recording transmitted frames.
    pub fn start_capture(&self) {
        *lock(&self.capture) = Some(Vec::new());
    }

    /// Take the frames recorded since the last call.
    pub fn take_captured(&self) -> Vec<(MacAddress, Vec<u8>)> {
        lock(&self.capture)
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Check if `address` is registered with this station.
    pub fn is_registered(&self, address: MacAddress) -> bool {
        lock(&self.peers).iter().any(|p| p.address == address)
    }

    /// Registration for `address`, if any.
    #[cfg(test)]
    pub(crate) fn registration(&self, address: MacAddress) -> Option<PeerRegistration> {
        lock(&self.peers).iter().find(|p| p.address == address).cloned()
    }

    /// Installed link-wide key.
    pub fn shared_key(&self) -> Option<LinkKey> {
        lock(&self.shared_key).clone()
    }
}

impl RawTransport for LoopbackTransport {
    fn send_frame(&self, dest: MacAddress, frame: &[u8]) -> Result<(), TransportError> {
        if !self.up.load(Ordering::Acquire) {
            return Err(TransportError::NotReady);
        }
        if frame.len() > RADIO_MTU {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        if !self.is_registered(dest) {
            return Err(TransportError::UnknownPeer(dest));
        }
        {
            let mut fail_after = lock(&self.fail_after);
            match fail_after.as_mut() {
                Some(0) => return Err(TransportError::SendFailed),
                Some(n) => *n -= 1,
                None => {}
            }
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = lock(&self.capture).as_mut() {
            log.push((dest, frame.to_vec()));
        }
        self.medium.deliver(self.address, dest, frame);
        Ok(())
    }

    fn add_peer(&self, peer: &PeerRegistration) -> Result<(), TransportError> {
        let mut peers = lock(&self.peers);
        peers.retain(|p| p.address != peer.address);
        peers.push(peer.clone());
        debug!("{}: registered peer {}", self.address, peer.address);
        Ok(())
    }

    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
        let mut peers = lock(&self.peers);
        let before = peers.len();
        peers.retain(|p| p.address != address);
        if peers.len() == before {
            return Err(TransportError::UnknownPeer(address));
        }
        Ok(())
    }

    fn set_shared_key(&self, key: &LinkKey) -> Result<(), TransportError> {
        *lock(&self.shared_key) = Some(key.clone());
        Ok(())
    }

    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn set_receiver(&self, sink: FrameSink) -> Result<(), TransportError> {
        if !self.up.load(Ordering::Acquire) {
            return Err(TransportError::NotReady);
        }
        self.medium.set_sink(self.address, Some(sink));
        Ok(())
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        self.up.store(false, Ordering::Release);
        self.medium.set_sink(self.address, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0A]);
    const B: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0B]);
    const C: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0C]);

    fn recorder(transport: &LoopbackTransport) -> Arc<Mutex<Vec<(MacAddress, Vec<u8>)>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        transport
            .set_receiver(Arc::new(move |src, frame: &[u8]| {
                sink.lock().unwrap().push((src, frame.to_vec()));
            }))
            .unwrap();
        received
    }

    #[test]
    fn test_broadcast_reaches_others_only() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let b = medium.attach(B);
        let c = medium.attach(C);
        let at_a = recorder(&a);
        let at_b = recorder(&b);
        let at_c = recorder(&c);

        a.add_peer(&PeerRegistration::open(MacAddress::BROADCAST)).unwrap();
        a.send_frame(MacAddress::BROADCAST, b"hello").unwrap();

        assert!(at_a.lock().unwrap().is_empty());
        assert_eq!(at_b.lock().unwrap()[0], (A, b"hello".to_vec()));
        assert_eq!(at_c.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unicast_needs_registration() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let b = medium.attach(B);
        let c = medium.attach(C);
        let at_b = recorder(&b);
        let at_c = recorder(&c);

        assert_eq!(a.send_frame(B, b"x"), Err(TransportError::UnknownPeer(B)));
        a.add_peer(&PeerRegistration::open(B)).unwrap();
        a.send_frame(B, b"x").unwrap();
        assert_eq!(at_b.lock().unwrap().len(), 1);
        assert!(at_c.lock().unwrap().is_empty());

        a.remove_peer(B).unwrap();
        assert_eq!(a.remove_peer(B), Err(TransportError::UnknownPeer(B)));
    }

    #[test]
    fn test_mtu_enforced() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        a.add_peer(&PeerRegistration::open(MacAddress::BROADCAST)).unwrap();
        assert_eq!(
            a.send_frame(MacAddress::BROADCAST, &[0; RADIO_MTU + 1]),
            Err(TransportError::FrameTooLarge(RADIO_MTU + 1))
        );
        assert!(a.send_frame(MacAddress::BROADCAST, &[0; RADIO_MTU]).is_ok());
    }

    #[test]
    fn test_fault_injection_and_capture() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        a.add_peer(&PeerRegistration::open(MacAddress::BROADCAST)).unwrap();
        a.start_capture();
        a.fail_after(1);

        assert!(a.send_frame(MacAddress::BROADCAST, b"1").is_ok());
        assert_eq!(
            a.send_frame(MacAddress::BROADCAST, b"2"),
            Err(TransportError::SendFailed)
        );
        a.heal();
        assert!(a.send_frame(MacAddress::BROADCAST, b"3").is_ok());

        assert_eq!(a.frames_sent(), 2);
        let captured = a.take_captured();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[1].1, b"3".to_vec());
        assert!(a.take_captured().is_empty());
    }

    #[test]
    fn test_shutdown_stops_traffic() {
        let medium = LoopbackMedium::new();
        let a = medium.attach(A);
        let b = medium.attach(B);
        let at_b = recorder(&b);
        a.add_peer(&PeerRegistration::open(MacAddress::BROADCAST)).unwrap();

        b.shutdown().unwrap();
        a.send_frame(MacAddress::BROADCAST, b"x").unwrap();
        assert!(at_b.lock().unwrap().is_empty());

        a.shutdown().unwrap();
        assert_eq!(
            a.send_frame(MacAddress::BROADCAST, b"x"),
            Err(TransportError::NotReady)
        );
    }
}
