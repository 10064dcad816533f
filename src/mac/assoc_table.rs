//! The coordinator's bounded table of associated peers.
//!
//! The table is touched both from the radio receive callback and from
//! administrative context, so every operation runs inside one short
//! critical section covering only the array scan. Nothing inside the
//! section logs, allocates or blocks.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::{consts::MAX_PEERS, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum AssocError {
    /// Peer long ids are non-zero by definition.
    InvalidPeerId,
    /// The table already holds `max_peers` entries; nothing was mutated.
    CapacityExceeded,
    NotFound,
}

/// One associated peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PeerEntry {
    pub peer_long_id: u32,
    pub peer_short_id: u16,
    pub last_rssi: i8,
    pub last_seen: Instant,
}

/// Map from peer long id to an assigned slot index.
///
/// The slot index of an entry is its array position + 1 and stays stable
/// for the lifetime of the association; it is reused only after an explicit
/// [remove](Self::remove).
pub struct AssociationTable {
    max_peers: u8,
    entries: Mutex<RefCell<[Option<PeerEntry>; MAX_PEERS]>>,
}

impl AssociationTable {
    /// `max_peers` is clamped to `1..=`[MAX_PEERS].
    pub const fn new(max_peers: u8) -> Self {
        let max_peers = if max_peers == 0 {
            1
        } else if max_peers > MAX_PEERS as u8 {
            MAX_PEERS as u8
        } else {
            max_peers
        };

        Self {
            max_peers,
            entries: Mutex::new(RefCell::new([None; MAX_PEERS])),
        }
    }

    /// Install or refresh a peer and return its slot index (1-based).
    ///
    /// An already-present peer is updated in place and keeps its index; a
    /// new peer takes the first free slot. When the table is full nothing
    /// is mutated.
    pub fn upsert(
        &self,
        peer_long_id: u32,
        peer_short_id: u16,
        rssi: i8,
        now: Instant,
    ) -> Result<u8, AssocError> {
        if peer_long_id == 0 {
            return Err(AssocError::InvalidPeerId);
        }

        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            let limit = self.max_peers as usize;

            for (i, slot) in entries[..limit].iter_mut().enumerate() {
                if let Some(entry) = slot {
                    if entry.peer_long_id == peer_long_id {
                        entry.peer_short_id = peer_short_id;
                        entry.last_rssi = rssi;
                        entry.last_seen = now;
                        return Ok(i as u8 + 1);
                    }
                }
            }

            for (i, slot) in entries[..limit].iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = Some(PeerEntry {
                        peer_long_id,
                        peer_short_id,
                        last_rssi: rssi,
                        last_seen: now,
                    });
                    return Ok(i as u8 + 1);
                }
            }

            Err(AssocError::CapacityExceeded)
        })
    }

    /// Slot index of a peer, if associated.
    pub fn lookup_index(&self, peer_long_id: u32) -> Option<u8> {
        if peer_long_id == 0 {
            return None;
        }

        critical_section::with(|cs| {
            let entries = self.entries.borrow_ref(cs);
            entries[..self.max_peers as usize]
                .iter()
                .position(|slot| {
                    matches!(slot, Some(entry) if entry.peer_long_id == peer_long_id)
                })
                .map(|i| i as u8 + 1)
        })
    }

    pub fn is_associated(&self, peer_long_id: u32) -> bool {
        self.lookup_index(peer_long_id).is_some()
    }

    /// Free a peer's slot for reuse by a future [upsert](Self::upsert).
    pub fn remove(&self, peer_long_id: u32) -> Result<(), AssocError> {
        if peer_long_id == 0 {
            return Err(AssocError::InvalidPeerId);
        }

        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            for slot in entries[..self.max_peers as usize].iter_mut() {
                if matches!(slot, Some(entry) if entry.peer_long_id == peer_long_id) {
                    *slot = None;
                    return Ok(());
                }
            }
            Err(AssocError::NotFound)
        })
    }

    pub fn count(&self) -> usize {
        critical_section::with(|cs| {
            let entries = self.entries.borrow_ref(cs);
            entries[..self.max_peers as usize]
                .iter()
                .filter(|slot| slot.is_some())
                .count()
        })
    }

    pub fn clear_all(&self) {
        critical_section::with(|cs| {
            *self.entries.borrow_ref_mut(cs) = [None; MAX_PEERS];
        });
    }

    /// Copy of the table for operator display, `(slot_index, entry)` pairs.
    pub fn status_snapshot(&self) -> heapless::Vec<(u8, PeerEntry), MAX_PEERS> {
        critical_section::with(|cs| {
            let entries = self.entries.borrow_ref(cs);
            entries[..self.max_peers as usize]
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.map(|entry| (i as u8 + 1, entry)))
                .collect()
        })
    }
}
