//! In-memory schedule.

use std::collections::BTreeMap;

use tracing::trace;

use crate::core::{Cell, CellKind, CellOptions, LinkAddr, Schedule};

/// One slotframe and its links, in insertion order.
#[derive(Debug, Clone)]
struct Slotframe {
    length: u16,
    links: Vec<Cell>,
}

/// A [`Schedule`] kept entirely in memory.
///
/// Enforces one link per timeslot and timeslots below the slotframe length.
#[derive(Debug, Clone, Default)]
pub struct MemorySchedule {
    slotframes: BTreeMap<u16, Slotframe>,
}

impl MemorySchedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of links in a slotframe (0 if it does not exist).
    pub fn link_count(&self, handle: u16) -> usize {
        self.slotframes
            .get(&handle)
            .map_or(0, |sf| sf.links.len())
    }

    /// Links of a slotframe matching `peer` and `kind`.
    pub fn links_for(&self, handle: u16, peer: &LinkAddr, kind: CellKind) -> Vec<Cell> {
        self.slotframes
            .get(&handle)
            .map(|sf| {
                sf.links
                    .iter()
                    .filter(|c| c.peer == *peer && c.kind == kind)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handles of all slotframes.
    pub fn slotframe_handles(&self) -> Vec<u16> {
        self.slotframes.keys().copied().collect()
    }
}

impl Schedule for MemorySchedule {
    fn add_slotframe(&mut self, handle: u16, length: u16) -> bool {
        if length == 0 || self.slotframes.contains_key(&handle) {
            return false;
        }
        self.slotframes.insert(
            handle,
            Slotframe {
                length,
                links: Vec::new(),
            },
        );
        trace!(handle, length, "added slotframe");
        true
    }

    fn slotframe_length(&self, handle: u16) -> Option<u16> {
        self.slotframes.get(&handle).map(|sf| sf.length)
    }

    fn remove_slotframe(&mut self, handle: u16) -> bool {
        let removed = self.slotframes.remove(&handle).is_some();
        if removed {
            trace!(handle, "removed slotframe");
        }
        removed
    }

    fn add_link(
        &mut self,
        handle: u16,
        options: CellOptions,
        kind: CellKind,
        peer: LinkAddr,
        timeslot: u16,
        channel_offset: u16,
    ) -> Option<Cell> {
        let sf = self.slotframes.get_mut(&handle)?;
        if timeslot >= sf.length || sf.links.iter().any(|c| c.timeslot == timeslot) {
            return None;
        }
        let cell = Cell {
            timeslot,
            channel_offset,
            peer,
            options,
            kind,
        };
        sf.links.push(cell);
        trace!(handle, timeslot, channel_offset, %peer, ?options, "added link");
        Some(cell)
    }

    fn remove_link(&mut self, handle: u16, cell: &Cell) -> bool {
        let Some(sf) = self.slotframes.get_mut(&handle) else {
            return false;
        };
        match sf
            .links
            .iter()
            .position(|c| c.is_at(cell.timeslot, cell.channel_offset))
        {
            Some(idx) => {
                sf.links.remove(idx);
                true
            }
            None => false,
        }
    }

    fn get_link_by_timeslot(&self, handle: u16, timeslot: u16) -> Option<Cell> {
        self.slotframes
            .get(&handle)?
            .links
            .iter()
            .find(|c| c.timeslot == timeslot)
            .copied()
    }

    fn links(&self, handle: u16) -> Vec<Cell> {
        self.slotframes
            .get(&handle)
            .map(|sf| sf.links.clone())
            .unwrap_or_default()
    }
}
