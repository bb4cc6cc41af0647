//! CLEAR transactions.
//!
//! CLEAR drops every negotiated cell shared with the peer. Both sides
//! purge their cells whatever the outcome of the exchange: the responder
//! right after answering, the initiator once its request is reported sent
//! or failed.

use rand::Rng;
use tracing::{debug, error};

use crate::core::{LinkAddr, Schedule, SixpLayer};
use crate::sixp::{Command, RequestBody, ReturnCode};

use super::engine::MsfEngine;
use super::transaction::PendingTransaction;

impl<S: Schedule, P: SixpLayer, R: Rng> MsfEngine<S, P, R> {
    pub(super) fn clear_send_request(&mut self, peer: LinkAddr) {
        self.release_pending(&peer);
        if self.request(peer, RequestBody::Clear) {
            self.transactions.insert(
                peer,
                PendingTransaction::initiator(Command::Clear, Default::default(), None),
            );
        } else {
            self.remove_all(Some(peer));
        }
    }

    pub(super) fn clear_recv_request(&mut self, peer: LinkAddr) {
        debug!(%peer, "received a CLEAR request");
        self.respond(peer, ReturnCode::Success, Vec::new());
        self.remove_all(Some(peer));
    }

    pub(super) fn clear_recv_response(&mut self, peer: LinkAddr, code: ReturnCode, pending: Option<PendingTransaction>) {
        if code != ReturnCode::Success {
            error!(%peer, "received {code} for CLEAR");
        }
        if pending.is_some() {
            self.remove_all(Some(peer));
        }
        debug!(%peer, "CLEAR transaction completes");
    }
}
