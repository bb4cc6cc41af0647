//! Bookkeeping for the 6P transactions MSF has in flight.
//!
//! The 6P layer owns the transaction itself (sequence numbers, timers);
//! MSF only keeps what it needs to settle the outcome: which side it is on,
//! which cells it reserved, and which committed cell the transaction is
//! about.

use crate::sixp::{Command, SixpCell};

use super::reservation::ReservationSet;

/// Side of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We sent the request.
    Initiator,
    /// We answer the request.
    Responder,
}

/// Progress of a transaction.
///
/// Cells stay *proposed* (reserved) until the transaction settles. For the
/// initiator that is the peer's response; for the responder it is the send
/// confirmation of its own response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Request queued, delivery not yet confirmed.
    RequestQueued,
    /// Request delivered, waiting for the response.
    AwaitingResponse,
    /// Response queued, waiting for its send confirmation.
    ResponseQueued,
}

/// A transaction MSF is tracking.
#[derive(Debug, Clone)]
pub(crate) struct PendingTransaction {
    pub command: Command,
    pub role: Role,
    pub phase: TransactionPhase,
    pub reservation: ReservationSet,
    /// Committed cell the transaction deletes or relocates.
    pub target: Option<SixpCell>,
}

impl PendingTransaction {
    pub fn initiator(command: Command, reservation: ReservationSet, target: Option<SixpCell>) -> Self {
        Self {
            command,
            role: Role::Initiator,
            phase: TransactionPhase::RequestQueued,
            reservation,
            target,
        }
    }

    pub fn responder(command: Command, reservation: ReservationSet, target: Option<SixpCell>) -> Self {
        Self {
            command,
            role: Role::Responder,
            phase: TransactionPhase::ResponseQueued,
            reservation,
            target,
        }
    }

    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            command: self.command,
            role: self.role,
            phase: self.phase,
            reserved_cells: self.reservation.to_cell_list(),
            target: self.target,
        }
    }
}

/// Read-only view of a tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// 6P command.
    pub command: Command,
    /// Our side.
    pub role: Role,
    /// Progress.
    pub phase: TransactionPhase,
    /// Cells reserved for this transaction.
    pub reserved_cells: Vec<SixpCell>,
    /// Committed cell being deleted or relocated.
    pub target: Option<SixpCell>,
}
