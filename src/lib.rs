//! # tsch-msf
//!
//! The 6TiSCH **M**inimal **S**cheduling **F**unction (RFC 9033) for TSCH
//! networks, plus adaptive channel selection.
//!
//! MSF keeps a node's TSCH schedule in step with its traffic toward the
//! routing parent. It provides:
//!
//! - **Autonomous cells**: one RX cell per node and on-demand TX cells, at
//!   positions hashed from link-layer addresses
//! - **Negotiation**: ADD, DELETE, RELOCATE, and CLEAR over 6P, with
//!   reservations held until each transaction settles
//! - **Bandwidth adaptation**: negotiated TX cells follow measured usage
//! - **Housekeeping**: cells with a poor delivery ratio get relocated
//! - **Channel selection** (`channel-selection`): busy channels leave the
//!   hopping sequence
//!
//! ## Feature Flags
//!
//! - `channel-selection` (default): adaptive channel selection
//! - `runtime` (default): periodic management task on tokio
//!
//! ## Modules
//!
//! - [`core`]: traits, types, constants, and errors (always included)
//! - [`schedule`]: in-memory schedule and the schedule lock
//! - [`sixp`]: typed 6P messages
//! - [`msf`]: the scheduling function
//! - [`cs`]: channel selection (requires `channel-selection`)
//! - [`runtime`]: management task (requires `runtime`)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Instant;
//!
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use tsch_msf::prelude::*;
//!
//! // A 6P layer that drops everything
//! struct NullSixp;
//!
//! impl SixpLayer for NullSixp {
//!     fn output(&mut self, _dest: LinkAddr, _packet: SixpPacket) -> Result<(), SixpError> {
//!         Ok(())
//!     }
//!
//!     fn find_transaction(&self, _peer: &LinkAddr) -> Option<SixpTransaction> {
//!         None
//!     }
//!
//!     fn abort(&mut self, _peer: &LinkAddr) {}
//! }
//!
//! let mut engine = MsfEngine::new(
//!     MsfConfig::default(),
//!     LinkAddr::from_node_id(2),
//!     MemorySchedule::new(),
//!     NullSixp,
//!     StdRng::seed_from_u64(2),
//! )
//! .unwrap();
//!
//! engine.activate(Instant::now()).unwrap();
//! assert!(engine.autonomous_rx_cell().is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod msf;
pub mod schedule;
pub mod sixp;

// Channel selection (feature-gated)
#[cfg(feature = "channel-selection")]
#[cfg_attr(docsrs, doc(cfg(feature = "channel-selection")))]
pub mod cs;

// Management task (feature-gated)
#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub mod runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::msf::{MsfConfig, MsfEngine, Role, TransactionInfo, TransactionPhase};
    pub use crate::schedule::{MemorySchedule, ScheduleLock};
    pub use crate::sixp::{Command, OutputStatus, RequestBody, ReturnCode, SixpCell, SixpPacket, SixpTransaction};

    #[cfg(feature = "channel-selection")]
    pub use crate::cs::{ChannelBitmap, ChannelReplacement, ChannelSelector, ChannelSelectorConfig, ChannelStats};

    #[cfg(feature = "runtime")]
    pub use crate::runtime::{ManagementTask, SharedEngine};
}

// Re-export commonly used items at crate root
pub use crate::core::{ChannelSelectionError, LinkAddr, MsfError, MsfResult, Schedule, SixpError, SixpLayer};
pub use crate::msf::{MsfConfig, MsfEngine};
