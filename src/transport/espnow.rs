//! ESP-NOW driver adapter.
//!
//! Wi-Fi must already be started (station or AP mode) before
//! [`EspNowTransport::new`] is called; this module does not change the Wi-Fi
//! configuration. Peers are registered on the station interface with
//! channel 0, i.e. whatever channel the interface currently uses.

use super::{FrameSink, PeerRegistration, RawTransport, TransportError};
use crate::config::RADIO_MTU;
use crate::link::{LinkKey, MacAddress};
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo};
use esp_idf_sys::{esp, wifi_interface_t_WIFI_IF_STA, EspError};
use log::{info, warn};
use std::sync::{Mutex, MutexGuard};

impl From<EspError> for TransportError {
    fn from(e: EspError) -> Self {
        Self::Driver(e.code())
    }
}

/// [`RawTransport`] backed by the ESP-IDF ESP-NOW driver.
pub struct EspNowTransport {
    driver: Mutex<Option<EspNow<'static>>>,
    address: MacAddress,
}

impl EspNowTransport {
    /// Initialize ESP-NOW and read the station MAC address.
    pub fn new() -> Result<Self, TransportError> {
        let mut mac = [0u8; 6];
        // SAFETY: `mac` is a valid 6-byte buffer for the duration of the call.
        esp!(unsafe {
            esp_idf_sys::esp_wifi_get_mac(wifi_interface_t_WIFI_IF_STA, mac.as_mut_ptr())
        })?;

        let driver = EspNow::take()?;
        let address = MacAddress::new(mac);
        info!("ESP-NOW initialized on {}", address);

        Ok(Self {
            driver: Mutex::new(Some(driver)),
            address,
        })
    }

    fn driver(&self) -> MutexGuard<'_, Option<EspNow<'static>>> {
        match self.driver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("ESP-NOW driver mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl RawTransport for EspNowTransport {
    fn send_frame(&self, dest: MacAddress, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > RADIO_MTU {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        let driver = self.driver();
        let espnow = driver.as_ref().ok_or(TransportError::NotReady)?;
        espnow.send(*dest.as_bytes(), frame)?;
        Ok(())
    }

    fn add_peer(&self, peer: &PeerRegistration) -> Result<(), TransportError> {
        let driver = self.driver();
        let espnow = driver.as_ref().ok_or(TransportError::NotReady)?;

        let mut info = PeerInfo {
            peer_addr: *peer.address.as_bytes(),
            channel: 0,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt: peer.encrypt,
            ..Default::default()
        };
        if let Some(key) = &peer.key {
            info.lmk = *key.as_bytes();
        }

        // The driver refuses to add an existing peer; replace it instead.
        if espnow.peer_exists(*peer.address.as_bytes())? {
            espnow.del_peer(*peer.address.as_bytes())?;
        }
        espnow.add_peer(info)?;
        Ok(())
    }

    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
        let driver = self.driver();
        let espnow = driver.as_ref().ok_or(TransportError::NotReady)?;
        espnow.del_peer(*address.as_bytes())?;
        Ok(())
    }

    fn set_shared_key(&self, key: &LinkKey) -> Result<(), TransportError> {
        let driver = self.driver();
        let espnow = driver.as_ref().ok_or(TransportError::NotReady)?;
        espnow.set_pmk(key.as_bytes())?;
        Ok(())
    }

    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn set_receiver(&self, sink: FrameSink) -> Result<(), TransportError> {
        let driver = self.driver();
        let espnow = driver.as_ref().ok_or(TransportError::NotReady)?;
        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            sink(MacAddress::new(*info.src_addr), data);
        })?;
        Ok(())
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        if let Some(espnow) = self.driver().take() {
            espnow.unregister_recv_cb()?;
            // Dropping the driver deinitializes ESP-NOW.
            drop(espnow);
            info!("ESP-NOW deinitialized");
        }
        Ok(())
    }
}
