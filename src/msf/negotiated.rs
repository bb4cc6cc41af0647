//! Negotiated TX cells and their transmission statistics.
//!
//! Each neighbor keeps its negotiated TX cells in a chain sorted by
//! descending timeslot. The chain mirrors the TX links installed in the
//! negotiated slotframe; negotiated RX cells live in the schedule only.
//!
//! Statistics blocks are a fixed pool shared by all neighbors. A TX cell
//! cannot be committed without one.

use std::collections::HashMap;

use crate::core::constants::{NUM_TX_RESCALE_AT, NUM_TX_RESCALED};
use crate::core::{Cell, LinkAddr, MsfError, MsfResult};
use crate::sixp::SixpCell;

/// NumTx/NumTxAck counters of one negotiated TX cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCellStats {
    num_tx: u16,
    num_tx_ack: u16,
}

impl TxCellStats {
    /// Transmissions counted on this cell.
    pub fn num_tx(&self) -> u16 {
        self.num_tx
    }

    /// Acknowledged transmissions counted on this cell.
    pub fn num_tx_ack(&self) -> u16 {
        self.num_tx_ack
    }

    /// Count one transmission.
    ///
    /// At 255 both counters are rescaled: NumTx drops to 128 and NumTxAck is
    /// halved, keeping the ratio roughly intact.
    pub fn record_tx(&mut self) {
        if self.num_tx == NUM_TX_RESCALE_AT {
            self.num_tx = NUM_TX_RESCALED;
            self.num_tx_ack /= 2;
        } else {
            self.num_tx += 1;
        }
    }

    /// Count one acknowledgement.
    pub fn record_ack(&mut self) {
        self.num_tx_ack = self.num_tx_ack.saturating_add(1);
    }

    /// Packet delivery ratio in percent, if anything was sent.
    pub fn pdr(&self) -> Option<u16> {
        if self.num_tx == 0 {
            return None;
        }
        let pdr = u32::from(self.num_tx_ack) * 100 / u32::from(self.num_tx);
        Some(pdr.min(u32::from(u16::MAX)) as u16)
    }
}

/// A committed negotiated TX cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedTxCell {
    /// Slot offset.
    pub timeslot: u16,
    /// Channel offset.
    pub channel_offset: u16,
    /// Transmission statistics.
    pub stats: TxCellStats,
}

impl NegotiatedTxCell {
    /// Coordinates as a 6P cell descriptor.
    pub fn as_sixp_cell(&self) -> SixpCell {
        SixpCell::new(self.timeslot, self.channel_offset)
    }
}

#[derive(Debug, Clone, Default)]
struct NeighborCells {
    /// Sorted by descending timeslot.
    tx_chain: Vec<NegotiatedTxCell>,
    autonomous_tx: Option<Cell>,
}

impl NeighborCells {
    fn is_empty(&self) -> bool {
        self.tx_chain.is_empty() && self.autonomous_tx.is_none()
    }
}

/// Per-neighbor TX cell chains plus autonomous TX cell references.
#[derive(Debug, Clone)]
pub struct NegotiatedCellStore {
    neighbors: HashMap<LinkAddr, NeighborCells>,
    capacity: usize,
    in_use: usize,
}

impl NegotiatedCellStore {
    /// Create a store with `capacity` statistics blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            neighbors: HashMap::new(),
            capacity,
            in_use: 0,
        }
    }

    /// Number of statistics blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of negotiated TX cells across all neighbors.
    pub fn total_tx_cells(&self) -> usize {
        self.in_use
    }

    /// Check if another TX cell can be committed.
    pub fn has_free_stats(&self) -> bool {
        self.in_use < self.capacity
    }

    /// Insert a committed TX cell, keeping the chain in descending order.
    pub fn insert_tx(&mut self, peer: &LinkAddr, timeslot: u16, channel_offset: u16) -> MsfResult<()> {
        if !self.has_free_stats() {
            return Err(MsfError::StatsExhausted {
                capacity: self.capacity,
            });
        }
        let chain = &mut self.neighbors.entry(*peer).or_default().tx_chain;
        let cell = NegotiatedTxCell {
            timeslot,
            channel_offset,
            stats: TxCellStats::default(),
        };
        match chain.iter().position(|c| timeslot > c.timeslot) {
            Some(idx) => chain.insert(idx, cell),
            None => chain.push(cell),
        }
        self.in_use += 1;
        Ok(())
    }

    /// Remove the TX cell at `cell` from `peer`'s chain.
    pub fn remove_tx(&mut self, peer: &LinkAddr, cell: &SixpCell) -> Option<NegotiatedTxCell> {
        let entry = self.neighbors.get_mut(peer)?;
        let idx = entry
            .tx_chain
            .iter()
            .position(|c| c.timeslot == cell.timeslot && c.channel_offset == cell.channel_offset)?;
        let removed = entry.tx_chain.remove(idx);
        self.in_use -= 1;
        if entry.is_empty() {
            self.neighbors.remove(peer);
        }
        Some(removed)
    }

    /// Remove and return `peer`'s whole chain.
    pub fn take_tx_chain(&mut self, peer: &LinkAddr) -> Vec<NegotiatedTxCell> {
        let Some(entry) = self.neighbors.get_mut(peer) else {
            return Vec::new();
        };
        let chain = std::mem::take(&mut entry.tx_chain);
        self.in_use -= chain.len();
        if entry.is_empty() {
            self.neighbors.remove(peer);
        }
        chain
    }

    /// Drop every chain. Autonomous TX references are kept.
    pub fn clear_tx(&mut self) {
        for entry in self.neighbors.values_mut() {
            entry.tx_chain.clear();
        }
        self.neighbors.retain(|_, entry| !entry.is_empty());
        self.in_use = 0;
    }

    /// `peer`'s chain, highest timeslot first.
    pub fn tx_chain(&self, peer: &LinkAddr) -> &[NegotiatedTxCell] {
        self.neighbors
            .get(peer)
            .map(|n| n.tx_chain.as_slice())
            .unwrap_or(&[])
    }

    /// Number of negotiated TX cells toward `peer`.
    pub fn num_tx_cells(&self, peer: &LinkAddr) -> usize {
        self.tx_chain(peer).len()
    }

    /// Head of `peer`'s chain (the highest timeslot).
    pub fn head(&self, peer: &LinkAddr) -> Option<&NegotiatedTxCell> {
        self.tx_chain(peer).first()
    }

    /// Account `num_tx` transmissions that ended on `slot_offset`.
    ///
    /// Transmissions are spread along the chain starting at the cell in
    /// `slot_offset`, wrapping at the tail; the acknowledgement, if any, is
    /// credited to that cell. Returns `false` if no cell is at `slot_offset`.
    pub fn record_transmission(&mut self, peer: &LinkAddr, slot_offset: u16, num_tx: u16, acked: bool) -> bool {
        let Some(entry) = self.neighbors.get_mut(peer) else {
            return false;
        };
        let chain = &mut entry.tx_chain;
        let Some(last_used) = chain.iter().position(|c| c.timeslot == slot_offset) else {
            return false;
        };
        let len = chain.len();
        for i in 0..usize::from(num_tx) {
            chain[(last_used + i) % len].stats.record_tx();
        }
        if acked {
            chain[last_used].stats.record_ack();
        }
        true
    }

    /// The autonomous TX cell installed toward `peer`.
    pub fn autonomous_tx(&self, peer: &LinkAddr) -> Option<Cell> {
        self.neighbors.get(peer).and_then(|n| n.autonomous_tx)
    }

    /// Remember the autonomous TX cell toward `peer`.
    pub fn set_autonomous_tx(&mut self, peer: &LinkAddr, cell: Cell) {
        self.neighbors.entry(*peer).or_default().autonomous_tx = Some(cell);
    }

    /// Forget and return the autonomous TX cell toward `peer`.
    pub fn take_autonomous_tx(&mut self, peer: &LinkAddr) -> Option<Cell> {
        let entry = self.neighbors.get_mut(peer)?;
        let cell = entry.autonomous_tx.take();
        if entry.is_empty() {
            self.neighbors.remove(peer);
        }
        cell
    }

    /// Forget every autonomous TX cell reference.
    pub fn clear_autonomous_tx(&mut self) {
        for entry in self.neighbors.values_mut() {
            entry.autonomous_tx = None;
        }
        self.neighbors.retain(|_, entry| !entry.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer() -> LinkAddr {
        LinkAddr::from_node_id(1)
    }

    fn timeslots(store: &NegotiatedCellStore) -> Vec<u16> {
        store.tx_chain(&peer()).iter().map(|c| c.timeslot).collect()
    }

    #[test]
    fn test_chain_sorted_descending() {
        let mut store = NegotiatedCellStore::new(10);
        for ts in [20, 50, 5, 30] {
            store.insert_tx(&peer(), ts, 1).unwrap();
        }
        assert_eq!(timeslots(&store), vec![50, 30, 20, 5]);
        assert_eq!(store.head(&peer()).unwrap().timeslot, 50);
        assert_eq!(store.num_tx_cells(&peer()), 4);
    }

    #[test]
    fn test_stats_capacity_shared() {
        let mut store = NegotiatedCellStore::new(2);
        let other = LinkAddr::from_node_id(2);
        store.insert_tx(&peer(), 10, 0).unwrap();
        store.insert_tx(&other, 11, 0).unwrap();
        assert_eq!(
            store.insert_tx(&peer(), 12, 0),
            Err(MsfError::StatsExhausted { capacity: 2 })
        );

        store.remove_tx(&other, &SixpCell::new(11, 0)).unwrap();
        assert!(store.insert_tx(&peer(), 12, 0).is_ok());
        assert_eq!(store.total_tx_cells(), 2);
    }

    #[test]
    fn test_remove_requires_matching_channel() {
        let mut store = NegotiatedCellStore::new(4);
        store.insert_tx(&peer(), 10, 3).unwrap();
        assert!(store.remove_tx(&peer(), &SixpCell::new(10, 4)).is_none());
        assert!(store.remove_tx(&peer(), &SixpCell::new(10, 3)).is_some());
        assert!(store.tx_chain(&peer()).is_empty());
        assert_eq!(store.total_tx_cells(), 0);
    }

    #[test]
    fn test_num_tx_rescale() {
        let mut stats = TxCellStats::default();
        for _ in 0..255 {
            stats.record_tx();
            stats.record_ack();
        }
        assert_eq!(stats.num_tx(), 255);
        assert_eq!(stats.num_tx_ack(), 255);

        stats.record_tx();
        assert_eq!(stats.num_tx(), 128);
        assert_eq!(stats.num_tx_ack(), 127);
        assert_eq!(stats.pdr(), Some(99));
    }

    #[test]
    fn test_pdr_needs_samples() {
        assert_eq!(TxCellStats::default().pdr(), None);
    }

    #[test]
    fn test_record_transmission_wraps() {
        let mut store = NegotiatedCellStore::new(4);
        for ts in [30, 20, 10] {
            store.insert_tx(&peer(), ts, 0).unwrap();
        }
        // three attempts ending on slot 10: 10, then wrap to 30, then 20
        assert!(store.record_transmission(&peer(), 10, 3, true));
        let chain = store.tx_chain(&peer());
        assert_eq!(chain[0].stats.num_tx(), 1);
        assert_eq!(chain[1].stats.num_tx(), 1);
        assert_eq!(chain[2].stats.num_tx(), 1);
        assert_eq!(chain[2].stats.num_tx_ack(), 1);
        assert_eq!(chain[0].stats.num_tx_ack(), 0);

        assert!(!store.record_transmission(&peer(), 11, 1, true));
    }

    #[test]
    fn test_autonomous_tx_reference() {
        let mut store = NegotiatedCellStore::new(4);
        let cell = Cell {
            timeslot: 3,
            channel_offset: 2,
            peer: peer(),
            options: crate::core::CellOptions::TX | crate::core::CellOptions::SHARED,
            kind: crate::core::CellKind::Autonomous,
        };
        store.set_autonomous_tx(&peer(), cell);
        assert_eq!(store.autonomous_tx(&peer()), Some(cell));
        assert_eq!(store.take_autonomous_tx(&peer()), Some(cell));
        assert_eq!(store.autonomous_tx(&peer()), None);
    }

    #[test]
    fn test_take_chain_and_clear() {
        let mut store = NegotiatedCellStore::new(4);
        store.insert_tx(&peer(), 10, 0).unwrap();
        store.insert_tx(&peer(), 20, 0).unwrap();
        store.insert_tx(&LinkAddr::from_node_id(2), 30, 0).unwrap();

        let taken = store.take_tx_chain(&peer());
        assert_eq!(taken.len(), 2);
        assert!(store.take_tx_chain(&peer()).is_empty());
        assert_eq!(store.total_tx_cells(), 1);

        store.clear_tx();
        assert_eq!(store.total_tx_cells(), 0);
    }

    proptest! {
        #[test]
        fn prop_chain_strictly_descending_and_capped(
            slots in proptest::collection::hash_set(1u16..101, 0..30)
        ) {
            let mut store = NegotiatedCellStore::new(10);
            for ts in slots {
                let _ = store.insert_tx(&peer(), ts, 0);
            }
            let chain = timeslots(&store);
            prop_assert!(chain.len() <= 10);
            prop_assert!(chain.windows(2).all(|w| w[0] > w[1]));
        }
    }
}
