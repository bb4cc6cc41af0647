//! Channel sets as 32-bit bitmaps (bit N = channel N).

use std::fmt;
use std::ops::BitAnd;

/// A set of IEEE 802.15.4 channels below 32.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelBitmap(u32);

impl ChannelBitmap {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Set of the channels in a hopping sequence.
    pub fn from_sequence(sequence: &[u8]) -> Self {
        sequence.iter().fold(Self::EMPTY, |acc, &ch| acc.with(ch))
    }

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check if `channel` is in the set.
    pub fn contains(self, channel: u8) -> bool {
        self.0 & Self::bit(channel) != 0
    }

    /// The set plus `channel`.
    #[must_use]
    pub fn with(self, channel: u8) -> Self {
        Self(self.0 | Self::bit(channel))
    }

    /// The set minus `channel`.
    #[must_use]
    pub fn without(self, channel: u8) -> Self {
        Self(self.0 & !Self::bit(channel))
    }

    /// Check if the two sets share a channel.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Check if the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn bit(channel: u8) -> u32 {
        1u32.checked_shl(u32::from(channel)).unwrap_or(0)
    }
}

impl BitAnd for ChannelBitmap {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for ChannelBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelBitmap({:#010x})", self.0)
    }
}

impl fmt::Display for ChannelBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
