//! Schedule vocabulary: link addresses, cell options, and cells.

use std::fmt;
use std::ops::BitOr;

/// IEEE 802.15.4 extended (EUI-64) link-layer address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LinkAddr([u8; 8]);

impl LinkAddr {
    /// The all-zero address (`linkaddr_null`).
    pub const NULL: Self = Self([0; 8]);

    /// Broadcast address used for EBs and shared cells.
    pub const BROADCAST: Self = Self([0xff; 8]);

    /// Create an address from its eight bytes.
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create an address whose last two bytes carry a node id.
    ///
    /// Handy for simulations and tests; the first six bytes are zero.
    pub const fn from_node_id(id: u16) -> Self {
        let [hi, lo] = id.to_be_bytes();
        Self([0, 0, 0, 0, 0, 0, hi, lo])
    }

    /// Raw address bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// True for the null address.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// True for unicast destinations.
    pub fn is_unicast(&self) -> bool {
        !self.is_null() && *self != Self::BROADCAST
    }
}

impl From<[u8; 8]> for LinkAddr {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddr({self})")
    }
}

/// Link options of a cell.
///
/// The bit layout matches the 6P CellOptions field. A cell with no option
/// set is a reservation placeholder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellOptions(u8);

impl CellOptions {
    /// No option: reserved cell.
    pub const NONE: Self = Self(0);
    /// Transmit cell.
    pub const TX: Self = Self(0x01);
    /// Receive cell.
    pub const RX: Self = Self(0x02);
    /// Shared (contention) cell.
    pub const SHARED: Self = Self(0x04);

    /// Create from raw bits, dropping unknown ones.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every option in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no option is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if TX is set.
    pub const fn is_tx(self) -> bool {
        self.contains(Self::TX)
    }

    /// Check if RX is set.
    pub const fn is_rx(self) -> bool {
        self.contains(Self::RX)
    }

    /// Check if SHARED is set.
    pub const fn is_shared(self) -> bool {
        self.contains(Self::SHARED)
    }
}

impl BitOr for CellOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for CellOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("RESERVED");
        }
        let mut names = Vec::with_capacity(3);
        if self.is_tx() {
            names.push("TX");
        }
        if self.is_rx() {
            names.push("RX");
        }
        if self.is_shared() {
            names.push("SHARED");
        }
        f.write_str(&names.join("|"))
    }
}

/// How a cell came into the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Derived from an address hash, no negotiation.
    Autonomous,
    /// Agreed with a peer through 6P.
    Negotiated,
    /// Placeholder held while a 6P transaction is in flight.
    Reserved,
}

/// A scheduled cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Slot offset within the slotframe.
    pub timeslot: u16,
    /// Channel offset.
    pub channel_offset: u16,
    /// Neighbor the cell is scheduled with.
    pub peer: LinkAddr,
    /// Link options.
    pub options: CellOptions,
    /// Origin of the cell.
    pub kind: CellKind,
}

impl Cell {
    /// True for reservation placeholders.
    pub fn is_reserved(&self) -> bool {
        self.kind == CellKind::Reserved
    }

    /// True for a negotiated cell with exactly the given options.
    pub fn is_negotiated(&self, options: CellOptions) -> bool {
        self.kind == CellKind::Negotiated && self.options == options
    }

    /// True if the cell sits at the given coordinates.
    pub fn is_at(&self, timeslot: u16, channel_offset: u16) -> bool {
        self.timeslot == timeslot && self.channel_offset == channel_offset
    }
}

/// Outcome of a MAC transmission, as reported by the slot engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacTxStatus {
    /// Frame acknowledged.
    Ok,
    /// No acknowledgement after all retries.
    NoAck,
    /// Collision detected.
    Collision,
    /// Any other error.
    Err,
}

impl MacTxStatus {
    /// True if the frame was acknowledged.
    pub fn is_ok(self) -> bool {
        self == MacTxStatus::Ok
    }
}
