//! Collaborator traits.
//!
//! The engine does not own the TSCH schedule nor the 6P transaction layer.
//! It drives both through these traits, so that the slot engine, the 6P
//! codec, and the radio can live elsewhere (or be mocked in tests).

use super::error::SixpError;
use super::types::{Cell, CellKind, CellOptions, LinkAddr};
use crate::sixp::{SixpPacket, SixpTransaction};

/// The TSCH schedule: slotframes and the links installed in them.
///
/// # Requirements
///
/// - A slotframe holds at most one link per timeslot; `add_link` MUST refuse
///   a timeslot that is already taken.
/// - `add_link` MUST refuse timeslots outside the slotframe.
/// - `links` returns links in insertion order.
pub trait Schedule {
    /// Create a slotframe. Returns `false` if the handle is already in use.
    fn add_slotframe(&mut self, handle: u16, length: u16) -> bool;

    /// Length of a slotframe, or `None` if it does not exist.
    fn slotframe_length(&self, handle: u16) -> Option<u16>;

    /// Remove a slotframe and all its links.
    fn remove_slotframe(&mut self, handle: u16) -> bool;

    /// Install a link. Returns the installed cell, or `None` if refused.
    fn add_link(
        &mut self,
        handle: u16,
        options: CellOptions,
        kind: CellKind,
        peer: LinkAddr,
        timeslot: u16,
        channel_offset: u16,
    ) -> Option<Cell>;

    /// Remove a link matching `cell`'s timeslot and channel offset.
    fn remove_link(&mut self, handle: u16, cell: &Cell) -> bool;

    /// Link installed at `timeslot`, if any.
    fn get_link_by_timeslot(&self, handle: u16, timeslot: u16) -> Option<Cell>;

    /// All links of a slotframe.
    fn links(&self, handle: u16) -> Vec<Cell>;

    /// Check if a slotframe exists.
    fn has_slotframe(&self, handle: u16) -> bool {
        self.slotframe_length(handle).is_some()
    }
}

/// The 6P transaction layer.
///
/// Sending is asynchronous: `output` only enqueues. The layer later reports
/// the send status of every accepted packet through
/// [`MsfEngine::on_output_status`](crate::msf::MsfEngine::on_output_status),
/// delivers responses through `on_input`, and expiry through `on_timeout`.
pub trait SixpLayer {
    /// Enqueue a packet toward `dest`.
    fn output(&mut self, dest: LinkAddr, packet: SixpPacket) -> Result<(), SixpError>;

    /// The transaction in progress with `peer`, if any.
    fn find_transaction(&self, peer: &LinkAddr) -> Option<SixpTransaction>;

    /// Abort the transaction with `peer`.
    ///
    /// An aborted transaction reports no further send status.
    fn abort(&mut self, peer: &LinkAddr);
}
