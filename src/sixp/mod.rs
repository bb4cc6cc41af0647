//! 6P (6top Protocol) message vocabulary.
//!
//! MSF never touches 6P bytes. It exchanges already-parsed [`SixpPacket`]s
//! with the transaction layer behind [`SixpLayer`](crate::core::SixpLayer);
//! framing and sequence numbers stay on the other side of that trait.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             MSF engine                  │
//! ├─────────────────────────────────────────┤
//! │       typed 6P messages                 │  ← This module
//! ├─────────────────────────────────────────┤
//! │   6P transactions / codec (external)    │
//! ├─────────────────────────────────────────┤
//! │         TSCH MAC / radio                │
//! └─────────────────────────────────────────┘
//! ```

mod message;

pub use message::*;
