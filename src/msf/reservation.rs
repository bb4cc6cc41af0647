//! Reserved cells held by one in-flight 6P transaction.
//!
//! A reservation occupies a timeslot in the negotiated slotframe with no
//! link options, so the slot engine never uses it and nobody else can take
//! the slot. Reservations never outlive their transaction: they are
//! released on failure, or released and replaced by a negotiated cell on
//! success.

use tracing::{error, info};

use crate::core::{Cell, CellKind, CellOptions, LinkAddr, MsfError, MsfResult, Schedule};
use crate::sixp::SixpCell;

/// The reserved cells of one transaction, in reservation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationSet {
    cells: Vec<Cell>,
}

impl ReservationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `(timeslot, channel_offset)` toward `peer`.
    pub fn reserve<S: Schedule>(
        &mut self,
        schedule: &mut S,
        handle: u16,
        peer: &LinkAddr,
        timeslot: u16,
        channel_offset: u16,
    ) -> MsfResult<Cell> {
        match schedule.add_link(
            handle,
            CellOptions::NONE,
            CellKind::Reserved,
            *peer,
            timeslot,
            channel_offset,
        ) {
            Some(cell) => {
                info!(timeslot, channel_offset, "reserved a cell");
                self.cells.push(cell);
                Ok(cell)
            }
            None => {
                error!(timeslot, channel_offset, "failed to reserve a cell");
                Err(MsfError::LinkRejected {
                    timeslot,
                    channel_offset,
                })
            }
        }
    }

    /// Check if the set holds a reservation at these coordinates.
    pub fn contains(&self, cell: &SixpCell) -> bool {
        self.cells
            .iter()
            .any(|c| c.is_at(cell.timeslot, cell.channel_offset))
    }

    /// The first reservation.
    pub fn first(&self) -> Option<&Cell> {
        self.cells.first()
    }

    /// Reserved cells as 6P cell descriptors.
    pub fn to_cell_list(&self) -> Vec<SixpCell> {
        self.cells.iter().map(SixpCell::from).collect()
    }

    /// Number of reservations.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if nothing is reserved.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Remove every reservation from the schedule.
    ///
    /// Returns how many were removed.
    pub fn release<S: Schedule>(&mut self, schedule: &mut S, handle: u16) -> usize {
        let mut released = 0;
        for cell in self.cells.drain(..) {
            if schedule.remove_link(handle, &cell) {
                info!(
                    timeslot = cell.timeslot,
                    channel_offset = cell.channel_offset,
                    "released a reserved cell"
                );
                released += 1;
            } else {
                error!(
                    timeslot = cell.timeslot,
                    channel_offset = cell.channel_offset,
                    "failed to release a reserved cell"
                );
            }
        }
        released
    }

    /// Forget the reservations without touching the schedule.
    ///
    /// Used when the slotframe holding them is torn down.
    pub fn forget(&mut self) {
        self.cells.clear();
    }
}
