//! Per-channel free-channel metrics.
//!
//! Every channel in the tracked range keeps an EWMA of "channel was free"
//! samples, scaled so that 4096 means always free and 0 always busy.

use crate::core::constants::{BINARY_SCALING_FACTOR, DEFAULT_CHANNEL_FREE, STATS_FIRST_CHANNEL, STATS_NUM_CHANNELS};
use crate::core::ChannelSelectionError;

/// Free-channel EWMAs for a contiguous channel range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    first_channel: u8,
    free_ewma: Vec<u16>,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::new(STATS_FIRST_CHANNEL, STATS_NUM_CHANNELS)
    }
}

impl ChannelStats {
    /// Track `num_channels` channels starting at `first_channel`, all free.
    pub fn new(first_channel: u8, num_channels: u8) -> Self {
        Self {
            first_channel,
            free_ewma: vec![DEFAULT_CHANNEL_FREE; usize::from(num_channels)],
        }
    }

    /// Lowest tracked channel.
    pub fn first_channel(&self) -> u8 {
        self.first_channel
    }

    /// Number of tracked channels.
    pub fn num_channels(&self) -> usize {
        self.free_ewma.len()
    }

    /// Tracked channels in ascending order.
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.free_ewma.len()).map(move |i| self.first_channel.wrapping_add(i as u8))
    }

    /// Check if `channel` is tracked.
    pub fn contains(&self, channel: u8) -> bool {
        self.index(channel).is_some()
    }

    /// Free-channel EWMA of `channel`.
    pub fn free_ewma(&self, channel: u8) -> Option<u16> {
        self.index(channel).map(|i| self.free_ewma[i])
    }

    /// Overwrite the EWMA of `channel`. Returns the previous value.
    pub fn set_free_ewma(&mut self, channel: u8, value: u16) -> Result<u16, ChannelSelectionError> {
        let i = self
            .index(channel)
            .ok_or(ChannelSelectionError::UnknownChannel(channel))?;
        Ok(std::mem::replace(&mut self.free_ewma[i], value))
    }

    /// Fold one sample into the EWMA of `channel` with a weight of 1/8.
    ///
    /// Returns the previous value, which is what the channel selector wants
    /// to compare against.
    pub fn record_free_sample(&mut self, channel: u8, is_free: bool) -> Result<u16, ChannelSelectionError> {
        let i = self
            .index(channel)
            .ok_or(ChannelSelectionError::UnknownChannel(channel))?;
        let old = self.free_ewma[i];
        let sample = if is_free { u32::from(BINARY_SCALING_FACTOR) } else { 0 };
        let updated = u32::from(old) * 7 / 8 + sample / 8;
        self.free_ewma[i] = u16::try_from(updated).unwrap_or(u16::MAX);
        Ok(old)
    }

    fn index(&self, channel: u8) -> Option<usize> {
        let offset = usize::from(channel.checked_sub(self.first_channel)?);
        (offset < self.free_ewma.len()).then_some(offset)
    }
}
