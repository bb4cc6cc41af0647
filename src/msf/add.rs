//! ADD transactions.
//!
//! ```text
//!   child (initiator)                      parent (responder)
//!   reserve up to 5 candidates
//!   ADD(TX, 1, candidates)  ───────────►   reserve first free candidate
//!                           ◄───────────   RC_SUCCESS [cell] or []
//!   release reservations                   response sent: reserved → RX
//!   [cell] → negotiated TX                 send failed: release
//! ```

use std::time::Instant;

use rand::Rng;
use tracing::{debug, error, info};

use crate::core::{CellOptions, LinkAddr, Schedule, SixpLayer};
use crate::sixp::{Command, RequestBody, ReturnCode, SixpCell};

use super::engine::{CellDirection, MsfEngine};
use super::transaction::PendingTransaction;

impl<S: Schedule, P: SixpLayer, R: Rng> MsfEngine<S, P, R> {
    pub(super) fn add_send_request(&mut self, peer: LinkAddr, now: Instant) {
        if self.store.num_tx_cells(&peer) >= usize::from(self.config.max_negotiated_tx_cells) {
            info!(%peer, "already at the maximum number of negotiated TX cells");
            return;
        }
        if self.ensure_negotiated_slotframe().is_err() {
            self.set_random_wait(now);
            return;
        }

        let mut reservation = self.prepare_candidate_cell_list(&peer);
        if reservation.len() < self.config.cell_list_min_len {
            error!(%peer, "failed to send an ADD request; cannot make a CellList");
            self.release(&mut reservation);
            self.set_random_wait(now);
            return;
        }

        let body = RequestBody::Add {
            cell_options: CellOptions::TX,
            num_cells: 1,
            cell_list: reservation.to_cell_list(),
        };
        if self.request(peer, body) {
            self.transactions.insert(
                peer,
                PendingTransaction::initiator(Command::Add, reservation, None),
            );
        } else {
            self.release(&mut reservation);
            self.set_random_wait(now);
        }
    }

    pub(super) fn add_recv_request(
        &mut self,
        peer: LinkAddr,
        cell_options: CellOptions,
        num_cells: u8,
        cell_list: &[SixpCell],
    ) {
        debug!(%peer, candidates = cell_list.len(), "received an ADD request");
        if cell_list.len() < self.config.cell_list_min_len {
            error!(%peer, len = cell_list.len(), "received an invalid CellList whose length is too short");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        }
        if cell_options != CellOptions::TX || num_cells != 1 {
            error!(%peer, ?cell_options, num_cells, "unsupported ADD request");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        }

        let mut reservation = self.reserve_from_candidates(&peer, cell_list);
        if !self.respond(peer, ReturnCode::Success, reservation.to_cell_list()) {
            self.release(&mut reservation);
            return;
        }
        if !reservation.is_empty() {
            self.transactions.insert(
                peer,
                PendingTransaction::responder(Command::Add, reservation, None),
            );
        }
    }

    pub(super) fn add_response_sent(&mut self, peer: LinkAddr, mut pending: PendingTransaction, delivered: bool) {
        let cell = pending.reservation.first().map(SixpCell::from);
        self.release(&mut pending.reservation);
        if !delivered {
            error!(%peer, "ADD transaction failed");
            return;
        }
        let Some(cell) = cell else {
            return;
        };
        match self.add_negotiated_cell(CellDirection::Rx, peer, cell) {
            Ok(_) => debug!(%peer, "ADD transaction completes successfully"),
            Err(e) => error!(%peer, %e, "SCHEDULE INCONSISTENCY is likely to happen"),
        }
    }

    pub(super) fn add_recv_response(
        &mut self,
        peer: LinkAddr,
        code: ReturnCode,
        cell_list: &[SixpCell],
        pending: Option<PendingTransaction>,
        now: Instant,
    ) {
        let mut reservation = pending.map(|p| p.reservation).unwrap_or_default();
        if code != ReturnCode::Success {
            self.release(&mut reservation);
            self.handle_error_response(peer, Command::Add, code, now);
            return;
        }

        match cell_list {
            [] => {
                info!(%peer, "received an empty CellList; try another ADD request later");
                self.release(&mut reservation);
                self.set_random_wait(now);
            }
            [cell] => {
                let cell = *cell;
                if !reservation.contains(&cell) {
                    error!(%peer, %cell, "SCHEDULE INCONSISTENCY is likely to happen; received a cell which is not a reserved one");
                    self.release(&mut reservation);
                    return;
                }
                self.release(&mut reservation);
                match self.add_negotiated_cell(CellDirection::Tx, peer, cell) {
                    Ok(_) => debug!(%peer, "ADD transaction completes successfully"),
                    Err(e) => error!(%peer, %e, "SCHEDULE INCONSISTENCY is likely to happen"),
                }
            }
            cells => {
                error!(%peer, len = cells.len(), "received an invalid CellList; ADD asks for one cell");
                self.release(&mut reservation);
            }
        }
    }
}
