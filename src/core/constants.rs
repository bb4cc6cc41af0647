//! Protocol constants for MSF and tsch-cs.
//!
//! Values marked as defaults seed [`MsfConfig`](crate::msf::MsfConfig) and
//! [`ChannelSelectorConfig`](crate::cs::ChannelSelectorConfig); the rest are
//! fixed by the 6P/MSF wire contract.

use std::time::Duration;

// =============================================================================
// SCHEDULING FUNCTION IDENTITY
// =============================================================================

/// Scheduling function identifier assigned to MSF.
pub const MSF_SFID: u8 = 0;

/// Slotframe handle used for autonomous cells.
pub const SLOTFRAME_HANDLE_AUTONOMOUS_CELLS: u16 = 1;

/// Slotframe handle used for negotiated cells.
pub const SLOTFRAME_HANDLE_NEGOTIATED_CELLS: u16 = 2;

// =============================================================================
// SLOTFRAME GEOMETRY
// =============================================================================

/// Default slotframe length, in timeslots.
pub const DEFAULT_SLOTFRAME_LENGTH: u16 = 101;

/// Default timeslot duration.
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_millis(10);

/// Default hopping sequence length (number of channel offsets).
pub const DEFAULT_NUM_CHANNELS: u16 = 16;

// =============================================================================
// 6P CELL LISTS
// =============================================================================

/// Number of cells MSF puts into a CandidateCellList.
pub const CELL_LIST_LEN: usize = 5;

/// Shortest CandidateCellList a responder accepts.
pub const CELL_LIST_MIN_LEN: usize = 1;

/// Number of cells MSF asks for in a single ADD/DELETE/RELOCATE.
pub const NUM_CELLS_PER_REQUEST: u8 = 1;

// =============================================================================
// BANDWIDTH ESTIMATION
// =============================================================================

/// Elapsed-cell window after which NumCellsUsed is evaluated.
pub const MAX_NUM_CELLS: u16 = 100;

/// Upper usage limit; above it another TX cell is requested.
pub const LIM_NUM_CELLS_USED_HIGH: u16 = 75;

/// Lower usage limit; below it a TX cell is released.
pub const LIM_NUM_CELLS_USED_LOW: u16 = 25;

/// Cap on negotiated TX cells (and on their statistics blocks).
pub const MAX_NUM_NEGOTIATED_TX_CELLS: u16 = 10;

// =============================================================================
// RELOCATION
// =============================================================================

/// Interval between worst-cell scans.
pub const HOUSEKEEPING_COLLISION_PERIOD: Duration = Duration::from_secs(60);

/// PDR spread (percentage points) above which the worst cell is relocated.
pub const RELOCATE_PDR_THRESHOLD: u16 = 50;

/// NumTx a cell needs before its PDR is trusted.
pub const MIN_NUM_TX_FOR_RELOCATION: u16 = 128;

/// NumTx value that triggers rescaling of the counters.
pub const NUM_TX_RESCALE_AT: u16 = 255;

/// NumTx value after rescaling.
pub const NUM_TX_RESCALED: u16 = 128;

// =============================================================================
// REQUEST BACKOFF
// =============================================================================

/// Shortest random wait before the next request.
pub const WAIT_DURATION_MIN: Duration = Duration::from_secs(30);

/// Longest random wait before the next request.
pub const WAIT_DURATION_MAX: Duration = Duration::from_secs(60);

/// Maximum CSMA backoff exponent used to derive the 6P timeout.
pub const MAC_MAX_BE: u32 = 5;

/// Maximum frame retries used to derive the 6P timeout.
pub const MAC_MAX_FRAME_RETRIES: u32 = 7;

// =============================================================================
// SAX HASH
// =============================================================================

/// SAX initial hash value.
pub const SAX_H0: u16 = 0;

/// SAX left shift.
pub const SAX_L_BIT: u32 = 0;

/// SAX right shift.
pub const SAX_R_BIT: u32 = 1;

// =============================================================================
// CHANNEL SELECTION (tsch-cs)
// =============================================================================

/// Fixed-point scaling of binary channel statistics (1.0 == 4096).
pub const BINARY_SCALING_FACTOR: u16 = 4096;

/// Initial "channel free" metric.
pub const DEFAULT_CHANNEL_FREE: u16 = BINARY_SCALING_FACTOR;

/// A channel whose free EWMA is below this is busy.
pub const CS_FREE_THRESHOLD: u16 = BINARY_SCALING_FACTOR / 4 * 3;

/// Minimum quality gain required to swap a channel.
pub const CS_HYSTERESIS: u16 = BINARY_SCALING_FACTOR / 10;

/// Minimum interval between two hopping sequence changes.
pub const CS_MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Time a removed channel stays ineligible.
pub const CS_BLACKLIST_DURATION: Duration = Duration::from_secs(5 * 60);

/// Statistics are ignored this long after start.
pub const CS_LEARNING_PERIOD: Duration = Duration::from_secs(5);

/// First IEEE 802.15.4 O-QPSK channel tracked.
pub const STATS_FIRST_CHANNEL: u8 = 11;

/// Number of channels tracked.
pub const STATS_NUM_CHANNELS: u8 = 16;
