//! MSF: the Minimal Scheduling Function (RFC 9033).
//!
//! MSF keeps enough TSCH cells between a node and its routing parent:
//!
//! - one autonomous RX cell per node, at a position hashed from its address
//! - autonomous TX cells toward neighbors with queued traffic
//! - negotiated TX cells toward the parent, added, deleted, and relocated
//!   over 6P as the measured bandwidth and per-cell PDR demand
//!
//! ```text
//!            tick() every slotframe
//!                     │
//!        ┌────────────▼────────────┐
//!        │   BandwidthEstimator    │ required vs committed
//!        │   RelocationSelector    │ worst PDR cell
//!        └────────────┬────────────┘
//!                     │ ADD / DELETE / RELOCATE / CLEAR
//!        ┌────────────▼────────────┐      ┌──────────────┐
//!        │        MsfEngine        │◄────►│  SixpLayer   │
//!        │  reservations, chains   │      └──────────────┘
//!        └────────────┬────────────┘
//!                     │ add_link / remove_link
//!              ┌──────▼──────┐
//!              │  Schedule   │
//!              └─────────────┘
//! ```

mod add;
mod autonomous;
mod bandwidth;
mod clear;
mod config;
mod delete;
mod engine;
mod negotiated;
mod relocate;
mod relocation;
mod reservation;
mod sax;
mod transaction;
mod wait;

#[cfg(test)]
pub(crate) mod test_support;

pub use autonomous::{add_autonomous_cell, autonomous_coordinates, delete_autonomous_cell, AutonomousCellType};
pub use bandwidth::{BandwidthDecision, BandwidthEstimator};
pub use config::MsfConfig;
pub use engine::MsfEngine;
pub use negotiated::{NegotiatedCellStore, NegotiatedTxCell, TxCellStats};
pub use relocation::{select_worst_cell, RelocationSelector};
pub use reservation::ReservationSet;
pub use sax::{sax, SaxParams};
pub use transaction::{Role, TransactionInfo, TransactionPhase};
pub use wait::RequestWaitTimer;
