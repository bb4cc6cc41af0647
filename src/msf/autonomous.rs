//! Autonomous cells.
//!
//! An autonomous cell is placed by hashing an EUI-64:
//!
//! - slot offset    = 1 + SAX(address, slotframe length - 1)
//! - channel offset = SAX(address, number of channel offsets)
//!
//! The RX cell uses the local address and owns the autonomous slotframe:
//! adding it creates the slotframe, deleting it removes the slotframe. TX
//! cells use the destination's address and live in that same slotframe.

use tracing::{debug, error};

use crate::core::{Cell, CellKind, CellOptions, LinkAddr, MsfError, MsfResult, Schedule};

use super::config::MsfConfig;

/// Direction of an autonomous cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonomousCellType {
    /// Shared TX cell toward a neighbor.
    Tx,
    /// The node's own RX cell.
    Rx,
}

/// Slot and channel offsets of the autonomous cell for `addr`.
pub fn autonomous_coordinates(config: &MsfConfig, slotframe_length: u16, addr: &LinkAddr) -> (u16, u16) {
    let timeslot = 1 + config
        .sax
        .hash(slotframe_length.saturating_sub(1), addr.as_bytes());
    let channel_offset = config.sax.hash(config.num_channels, addr.as_bytes());
    (timeslot, channel_offset)
}

/// Install an autonomous cell for `addr`.
///
/// TX requires the autonomous slotframe to exist; RX requires it not to and
/// creates it.
pub fn add_autonomous_cell<S: Schedule>(
    schedule: &mut S,
    config: &MsfConfig,
    cell_type: AutonomousCellType,
    addr: &LinkAddr,
) -> MsfResult<Cell> {
    let handle = config.autonomous_handle;
    let (type_str, options) = match cell_type {
        AutonomousCellType::Tx => {
            if !schedule.has_slotframe(handle) {
                error!(%addr, "cannot add an autonomous TX cell because slotframe is not available");
                return Err(MsfError::SlotframeUnavailable { handle });
            }
            ("TX", CellOptions::TX | CellOptions::SHARED)
        }
        AutonomousCellType::Rx => {
            if !schedule.add_slotframe(handle, config.slotframe_length) {
                error!(%addr, "cannot add an autonomous RX cell because slotframe is not available");
                return Err(MsfError::SlotframeExists { handle });
            }
            ("RX", CellOptions::RX)
        }
    };

    let length = schedule
        .slotframe_length(handle)
        .ok_or(MsfError::SlotframeUnavailable { handle })?;
    let (timeslot, channel_offset) = autonomous_coordinates(config, length, addr);

    match schedule.add_link(
        handle,
        options,
        CellKind::Autonomous,
        *addr,
        timeslot,
        channel_offset,
    ) {
        Some(cell) => {
            debug!(%addr, timeslot, channel_offset, "added an autonomous {type_str} cell");
            Ok(cell)
        }
        None => {
            error!(%addr, timeslot, channel_offset, "failed to add the autonomous {type_str} cell");
            if cell_type == AutonomousCellType::Rx {
                schedule.remove_slotframe(handle);
            }
            Err(MsfError::LinkRejected {
                timeslot,
                channel_offset,
            })
        }
    }
}

/// Remove an autonomous cell.
///
/// Removing the RX cell removes the whole autonomous slotframe, TX cells
/// included.
pub fn delete_autonomous_cell<S: Schedule>(schedule: &mut S, config: &MsfConfig, cell: &Cell) -> bool {
    let handle = config.autonomous_handle;
    if cell.options.is_tx() {
        let removed = schedule.remove_link(handle, cell);
        if removed {
            debug!(addr = %cell.peer, "removed an autonomous TX cell");
        } else {
            error!(addr = %cell.peer, "failed to remove the autonomous TX cell");
        }
        removed
    } else {
        let removed = schedule.remove_slotframe(handle);
        if removed {
            debug!("removed the slotframe for the autonomous cell instead of removing the autonomous RX cell alone");
        } else {
            error!("failed to remove the autonomous RX cell and the slotframe");
        }
        removed
    }
}
