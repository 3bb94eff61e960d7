//! Bounded peer table.

use super::{LinkError, LinkKey, MacAddress};

/// A known peer and its encryption settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    /// Peer hardware address.
    pub address: MacAddress,
    /// Encrypt unicast frames to this peer.
    pub encrypt: bool,
    /// Per-peer key (LMK).
    pub key: Option<LinkKey>,
}

/// Fixed-capacity registry of known peers.
///
/// Entries are kept in insertion order. The table never evicts: once full,
/// new peers are refused until one is removed.
#[derive(Debug)]
pub struct PeerTable {
    entries: Vec<PeerEntry>,
    capacity: usize,
}

impl PeerTable {
    /// Create an empty table admitting up to `capacity` peers.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a peer, replacing any entry with the same address.
    ///
    /// Returns `true` if the address was not previously known.
    pub fn upsert(&mut self, entry: PeerEntry) -> Result<bool, LinkError> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.address == entry.address) {
            *existing = entry;
            return Ok(false);
        }
        if self.entries.len() >= self.capacity {
            return Err(LinkError::PeerTableFull {
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(true)
    }

    /// Check that `address` could be inserted without error.
    pub fn can_admit(&self, address: MacAddress) -> Result<(), LinkError> {
        if self.contains(address) || self.entries.len() < self.capacity {
            Ok(())
        } else {
            Err(LinkError::PeerTableFull {
                capacity: self.capacity,
            })
        }
    }

    /// Remove the entry for `address`.
    pub fn remove(&mut self, address: MacAddress) -> Result<PeerEntry, LinkError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.address == address)
            .ok_or(LinkError::PeerNotFound(address))?;
        Ok(self.entries.remove(index))
    }

    /// Check if `address` is known.
    pub fn contains(&self, address: MacAddress) -> bool {
        self.entries.iter().any(|e| e.address == address)
    }

    /// Addresses of all known peers, in insertion order.
    pub fn addresses(&self) -> Vec<MacAddress> {
        self.entries.iter().map(|e| e.address).collect()
    }

    /// Remove every entry, returning them.
    pub fn drain(&mut self) -> Vec<PeerEntry> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(last: u8) -> PeerEntry {
        PeerEntry {
            address: MacAddress::new([0x02, 0, 0, 0, 0, last]),
            encrypt: false,
            key: None,
        }
    }

    #[test]
    fn test_add_until_full() {
        let mut table = PeerTable::new(2);
        assert_eq!(table.upsert(peer(1)), Ok(true));
        assert_eq!(table.upsert(peer(2)), Ok(true));
        assert_eq!(
            table.upsert(peer(3)),
            Err(LinkError::PeerTableFull { capacity: 2 })
        );
        assert_eq!(table.addresses().len(), 2);
        assert!(table.can_admit(peer(1).address).is_ok());
        assert!(table.can_admit(peer(3).address).is_err());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut table = PeerTable::new(1);
        assert_eq!(table.upsert(peer(1)), Ok(true));

        let mut encrypted = peer(1);
        encrypted.encrypt = true;
        encrypted.key = Some(LinkKey::new([9; 16]));
        // Replacing does not need a free entry
        assert_eq!(table.upsert(encrypted.clone()), Ok(false));
        assert_eq!(table.drain(), vec![encrypted]);
    }

    #[test]
    fn test_remove_frees_entry() {
        let mut table = PeerTable::new(1);
        table.upsert(peer(1)).unwrap();
        assert_eq!(table.remove(peer(1).address), Ok(peer(1)));
        assert!(table.addresses().is_empty());
        assert_eq!(
            table.remove(peer(1).address),
            Err(LinkError::PeerNotFound(peer(1).address))
        );
        assert_eq!(table.upsert(peer(2)), Ok(true));
        assert_eq!(table.addresses(), vec![peer(2).address]);
    }
}
