//! Error types for the MSF engine and channel selector.

use thiserror::Error;

use super::types::LinkAddr;

/// Local failures of the MSF engine.
///
/// None of these are sent to a peer; protocol disagreements are expressed as
/// 6P return codes instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MsfError {
    /// The slotframe needed for the operation does not exist.
    #[error("slotframe {handle} is not available")]
    SlotframeUnavailable {
        /// Slotframe handle.
        handle: u16,
    },

    /// The slotframe the operation would create already exists.
    #[error("slotframe {handle} already exists")]
    SlotframeExists {
        /// Slotframe handle.
        handle: u16,
    },

    /// The schedule refused to install a link.
    #[error("schedule rejected link at slot_offset:{timeslot}, channel_offset:{channel_offset}")]
    LinkRejected {
        /// Timeslot of the refused link.
        timeslot: u16,
        /// Channel offset of the refused link.
        channel_offset: u16,
    },

    /// All negotiated TX statistics blocks are in use.
    #[error("negotiated TX cell statistics exhausted (capacity {capacity})")]
    StatsExhausted {
        /// Number of statistics blocks.
        capacity: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors reported by the 6P transaction layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SixpError {
    /// A transaction with the peer is already in progress.
    #[error("6P transaction with {peer} already in progress")]
    Busy {
        /// Peer address.
        peer: LinkAddr,
    },

    /// No room left to queue the packet.
    #[error("6P output queue full")]
    QueueFull,
}

/// Errors in the adaptive channel selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelSelectionError {
    /// Channel outside the tracked range.
    #[error("channel {0} is not tracked")]
    UnknownChannel(u8),

    /// The hopping sequence is empty.
    #[error("hopping sequence is empty")]
    EmptySequence,

    /// The hopping sequence is longer than the tracked channel range.
    #[error("hopping sequence of length {len} exceeds {max} tracked channels")]
    SequenceTooLong {
        /// Sequence length.
        len: usize,
        /// Number of tracked channels.
        max: usize,
    },
}

/// Result type for MSF operations.
pub type MsfResult<T> = Result<T, MsfError>;
