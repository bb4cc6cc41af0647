//! DELETE transactions.
//!
//! The initiator always names the head of its TX chain (the cell with the
//! highest timeslot). The responder removes its RX cell only once its
//! response is confirmed sent.

use std::time::Instant;

use rand::Rng;
use tracing::{debug, error, info};

use crate::core::{CellOptions, LinkAddr, Schedule, SixpLayer};
use crate::sixp::{Command, RequestBody, ReturnCode, SixpCell};

use super::engine::{CellDirection, MsfEngine};
use super::transaction::PendingTransaction;

impl<S: Schedule, P: SixpLayer, R: Rng> MsfEngine<S, P, R> {
    pub(super) fn delete_send_request(&mut self, peer: LinkAddr, now: Instant) {
        let Some(target) = self.store.head(&peer).map(|c| c.as_sixp_cell()) else {
            error!(%peer, "no negotiated TX cell to delete");
            return;
        };
        let body = RequestBody::Delete {
            cell_options: CellOptions::TX,
            num_cells: 1,
            cell_list: vec![target],
        };
        if self.request(peer, body) {
            self.transactions.insert(
                peer,
                PendingTransaction::initiator(Command::Delete, Default::default(), Some(target)),
            );
        } else {
            self.set_random_wait(now);
        }
    }

    pub(super) fn delete_recv_request(
        &mut self,
        peer: LinkAddr,
        cell_options: CellOptions,
        num_cells: u8,
        cell_list: &[SixpCell],
    ) {
        debug!(%peer, "received a DELETE request");
        let [cell] = cell_list else {
            error!(%peer, len = cell_list.len(), "received an invalid CellList; DELETE names one cell");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        };
        if cell_options != CellOptions::TX || num_cells != 1 {
            error!(%peer, ?cell_options, num_cells, "unsupported DELETE request");
            self.respond(peer, ReturnCode::Err, Vec::new());
            return;
        }

        let cell = *cell;
        if self.find_negotiated_cell(&peer, &cell, CellDirection::Rx).is_none() {
            error!(%peer, %cell, "received a DELETE request for a cell we don't have");
            self.respond(peer, ReturnCode::ErrCelllist, Vec::new());
            return;
        }
        if self.respond(peer, ReturnCode::Success, vec![cell]) {
            self.transactions.insert(
                peer,
                PendingTransaction::responder(Command::Delete, Default::default(), Some(cell)),
            );
        }
    }

    pub(super) fn delete_response_sent(&mut self, peer: LinkAddr, pending: PendingTransaction, delivered: bool) {
        if !delivered {
            error!(%peer, "DELETE transaction failed; SCHEDULE INCONSISTENCY may happen");
            return;
        }
        let Some(target) = pending.target else {
            return;
        };
        match self.find_negotiated_cell(&peer, &target, CellDirection::Rx) {
            Some(cell) => {
                self.remove_negotiated_cell(&cell);
                debug!(%peer, "DELETE transaction completes successfully");
            }
            None => error!(%peer, cell = %target, "the cell to delete is gone; SCHEDULE INCONSISTENCY may happen"),
        }
    }

    pub(super) fn delete_recv_response(
        &mut self,
        peer: LinkAddr,
        code: ReturnCode,
        cell_list: &[SixpCell],
        pending: Option<PendingTransaction>,
        now: Instant,
    ) {
        if code != ReturnCode::Success {
            self.handle_error_response(peer, Command::Delete, code, now);
            return;
        }
        let [cell] = cell_list else {
            info!(%peer, len = cell_list.len(), "received an unexpected CellList for DELETE");
            return;
        };
        if pending.and_then(|p| p.target) != Some(*cell) {
            error!(%peer, %cell, "SCHEDULE INCONSISTENCY is likely to happen; the peer deleted a cell we did not ask for");
        }
        match self.find_negotiated_cell(&peer, cell, CellDirection::Tx) {
            Some(link) => {
                self.remove_negotiated_cell(&link);
                debug!(%peer, "DELETE transaction completes successfully");
            }
            None => error!(%peer, %cell, "SCHEDULE INCONSISTENCY is likely to happen; no such TX cell"),
        }
    }
}
