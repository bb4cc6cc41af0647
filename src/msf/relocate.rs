//! RELOCATE transactions.
//!
//! The initiator names one TX cell to vacate and offers candidates built
//! the same way as for ADD. The responder checks that the named cell is an
//! RX cell of the requester, then proceeds as an ADD responder while
//! remembering the old cell; both the removal of the old cell and the
//! commit of the new one wait for the response to be confirmed sent.

use std::time::Instant;

use rand::Rng;
use tracing::{debug, error, info};

use crate::core::{CellOptions, LinkAddr, Schedule, SixpLayer};
use crate::sixp::{Command, RequestBody, ReturnCode, SixpCell};

use super::engine::{CellDirection, MsfEngine};
use super::transaction::PendingTransaction;

impl<S: Schedule, P: SixpLayer, R: Rng> MsfEngine<S, P, R> {
    pub(super) fn relocate_send_request(&mut self, peer: LinkAddr, target: SixpCell, now: Instant) {
        if self.ensure_negotiated_slotframe().is_err() {
            self.set_random_wait(now);
            return;
        }
        let mut reservation = self.prepare_candidate_cell_list(&peer);
        if reservation.len() < self.config.cell_list_min_len {
            error!(%peer, "failed to send a RELOCATE request; cannot make a CandidateCellList");
            self.release(&mut reservation);
            self.set_random_wait(now);
            return;
        }

        let body = RequestBody::Relocate {
            cell_options: CellOptions::TX,
            num_cells: 1,
            relocation_cell_list: vec![target],
            candidate_cell_list: reservation.to_cell_list(),
        };
        if self.request(peer, body) {
            self.transactions.insert(
                peer,
                PendingTransaction::initiator(Command::Relocate, reservation, Some(target)),
            );
        } else {
            self.release(&mut reservation);
            self.set_random_wait(now);
        }
    }

    pub(super) fn relocate_recv_request(
        &mut self,
        peer: LinkAddr,
        cell_options: CellOptions,
        num_cells: u8,
        relocation_cell_list: &[SixpCell],
        candidate_cell_list: &[SixpCell],
    ) {
        debug!(%peer, "received a RELOCATE request");
        let [target] = relocation_cell_list else {
            error!(%peer, len = relocation_cell_list.len(), "received an invalid RelocationCellList");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        };
        if candidate_cell_list.len() < self.config.cell_list_min_len {
            error!(%peer, len = candidate_cell_list.len(), "received a CandidateCellList whose length is too short");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        }
        if cell_options != CellOptions::TX || num_cells != 1 {
            error!(%peer, ?cell_options, num_cells, "unsupported RELOCATE request");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        }

        let target = *target;
        if self.find_negotiated_cell(&peer, &target, CellDirection::Rx).is_none() {
            error!(%peer, cell = %target, "received an invalid cell to relocate");
            self.respond(peer, ReturnCode::ErrCelllist, Vec::new());
            return;
        }

        let mut reservation = self.reserve_from_candidates(&peer, candidate_cell_list);
        if !self.respond(peer, ReturnCode::Success, reservation.to_cell_list()) {
            self.release(&mut reservation);
            return;
        }
        if !reservation.is_empty() {
            self.transactions.insert(
                peer,
                PendingTransaction::responder(Command::Relocate, reservation, Some(target)),
            );
        }
    }

    pub(super) fn relocate_response_sent(&mut self, peer: LinkAddr, mut pending: PendingTransaction, delivered: bool) {
        let new_cell = pending.reservation.first().map(SixpCell::from);
        self.release(&mut pending.reservation);
        if !delivered {
            // the old cell stays: the initiator still uses it
            error!(%peer, "RELOCATE transaction failed");
            return;
        }
        let (Some(new_cell), Some(target)) = (new_cell, pending.target) else {
            return;
        };
        match self.find_negotiated_cell(&peer, &target, CellDirection::Rx) {
            Some(old) => {
                self.remove_negotiated_cell(&old);
            }
            None => error!(%peer, cell = %target, "the cell to relocate is gone; SCHEDULE INCONSISTENCY may happen"),
        }
        match self.add_negotiated_cell(CellDirection::Rx, peer, new_cell) {
            Ok(_) => debug!(%peer, "RELOCATE transaction completes successfully"),
            Err(e) => error!(%peer, %e, "SCHEDULE INCONSISTENCY is likely to happen"),
        }
    }

    pub(super) fn relocate_recv_response(
        &mut self,
        peer: LinkAddr,
        code: ReturnCode,
        cell_list: &[SixpCell],
        pending: Option<PendingTransaction>,
        now: Instant,
    ) {
        let (mut reservation, target) = match pending {
            Some(p) => (p.reservation, p.target),
            None => (Default::default(), None),
        };
        if code != ReturnCode::Success {
            self.release(&mut reservation);
            match (code, target) {
                (ReturnCode::ErrBusy, _) => {}
                (ReturnCode::ErrCelllist, Some(target)) => self.relocation.abandon(target),
                _ => self.relocation.clear(),
            }
            self.handle_error_response(peer, Command::Relocate, code, now);
            return;
        }

        let cell = match cell_list {
            [] => {
                info!(%peer, "received an empty CandidateCellList; try another RELOCATE request later");
                self.release(&mut reservation);
                return;
            }
            [cell] => *cell,
            cells => {
                error!(%peer, len = cells.len(), "received an invalid CellList; RELOCATE moves one cell");
                self.release(&mut reservation);
                return;
            }
        };
        if !reservation.contains(&cell) {
            error!(%peer, %cell, "SCHEDULE INCONSISTENCY is likely to happen; received a cell which is not a reserved one");
            self.release(&mut reservation);
            return;
        }
        self.release(&mut reservation);

        match target.and_then(|t| self.find_negotiated_cell(&peer, &t, CellDirection::Tx)) {
            Some(old) => {
                self.remove_negotiated_cell(&old);
            }
            None => error!(%peer, "the cell to relocate is gone; SCHEDULE INCONSISTENCY may happen"),
        }
        self.relocation.clear();
        match self.add_negotiated_cell(CellDirection::Tx, peer, cell) {
            Ok(_) => debug!(%peer, "RELOCATE transaction completes successfully"),
            Err(e) => error!(%peer, %e, "SCHEDULE INCONSISTENCY is likely to happen"),
        }
    }
}
