//! Adaptive channel selection for the coordinator.
//!
//! The selector swaps at most one busy channel of the hopping sequence for
//! a free, unused one per processing round. Three rules keep the network
//! together while the sequence drifts:
//!
//! - rounds are at least `min_update_interval` apart
//! - a replaced channel is blacklisted for `blacklist_duration`
//! - the sequence always shares a channel with the initial one, so joining
//!   nodes that only know the initial sequence can still hear beacons

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::core::constants::{
    CS_BLACKLIST_DURATION, CS_FREE_THRESHOLD, CS_HYSTERESIS, CS_LEARNING_PERIOD, CS_MIN_UPDATE_INTERVAL,
    STATS_FIRST_CHANNEL, STATS_NUM_CHANNELS,
};
use crate::core::ChannelSelectionError;

use super::bitmap::ChannelBitmap;
use super::stats::ChannelStats;

#[derive(Clone, Debug)]
/// Channel selector tunables. `Default` gives the standard values.
pub struct ChannelSelectorConfig {
    /// Lowest tracked channel.
    pub first_channel: u8,
    /// Number of tracked channels. Caps the hopping sequence length.
    pub num_channels: u8,
    /// EWMA below which a channel is busy.
    pub free_threshold: u16,
    /// How much better than the replaced channel a replacement must be.
    pub hysteresis: u16,
    /// Minimum time between two replacements.
    pub min_update_interval: Duration,
    /// How long a replaced channel stays out.
    pub blacklist_duration: Duration,
    /// Statistics updates are ignored for this long after start.
    pub learning_period: Duration,
    /// Only the coordinator selects channels.
    pub is_coordinator: bool,
}

impl Default for ChannelSelectorConfig {
    fn default() -> Self {
        Self {
            first_channel: STATS_FIRST_CHANNEL,
            num_channels: STATS_NUM_CHANNELS,
            free_threshold: CS_FREE_THRESHOLD,
            hysteresis: CS_HYSTERESIS,
            min_update_interval: CS_MIN_UPDATE_INTERVAL,
            blacklist_duration: CS_BLACKLIST_DURATION,
            learning_period: CS_LEARNING_PERIOD,
            is_coordinator: true,
        }
    }
}

impl ChannelSelectorConfig {
    /// Fresh statistics for the tracked channel range.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats::new(self.first_channel, self.num_channels)
    }

    fn tracks(&self, channel: u8) -> bool {
        // bitmaps hold channels below 32
        channel < 32
            && channel >= self.first_channel
            && u16::from(channel) < u16::from(self.first_channel) + u16::from(self.num_channels)
    }
}

/// One channel substitution in the hopping sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReplacement {
    /// Channel taken out.
    pub old: u8,
    /// Channel put in its place.
    pub new: u8,
    /// Position in the hopping sequence.
    pub position: usize,
}

/// Adaptive hopping-sequence manager.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    config: ChannelSelectorConfig,
    initial: ChannelBitmap,
    current: ChannelBitmap,
    started_at: Instant,
    last_changed: Option<Instant>,
    recalculation_requested: bool,
    busy_since: HashMap<u8, Instant>,
}

impl ChannelSelector {
    /// Create a selector for a network started at `started_at` with
    /// `initial_sequence`.
    pub fn new(
        config: ChannelSelectorConfig,
        initial_sequence: &[u8],
        started_at: Instant,
    ) -> Result<Self, ChannelSelectionError> {
        if initial_sequence.is_empty() {
            return Err(ChannelSelectionError::EmptySequence);
        }
        let max = usize::from(config.num_channels);
        if initial_sequence.len() > max {
            return Err(ChannelSelectionError::SequenceTooLong {
                len: initial_sequence.len(),
                max,
            });
        }
        if let Some(&bad) = initial_sequence.iter().find(|&&ch| !config.tracks(ch)) {
            return Err(ChannelSelectionError::UnknownChannel(bad));
        }
        let initial = ChannelBitmap::from_sequence(initial_sequence);
        Ok(Self {
            config,
            initial,
            current: initial,
            started_at,
            last_changed: None,
            recalculation_requested: false,
            busy_since: HashMap::new(),
        })
    }

    /// Tunables in use.
    pub fn config(&self) -> &ChannelSelectorConfig {
        &self.config
    }

    /// Channels of the initial hopping sequence.
    pub fn initial_bitmap(&self) -> ChannelBitmap {
        self.initial
    }

    /// Channels of the current hopping sequence.
    pub fn current_bitmap(&self) -> ChannelBitmap {
        self.current
    }

    /// Check if a processing round is pending.
    pub fn recalculation_requested(&self) -> bool {
        self.recalculation_requested
    }

    /// Check if `channel` was replaced less than `blacklist_duration` ago.
    pub fn is_blacklisted(&self, channel: u8, now: Instant) -> bool {
        self.busy_since
            .get(&channel)
            .is_some_and(|&since| since + self.config.blacklist_duration > now)
    }

    /// The EWMA of `channel` moved from `old_metric`.
    ///
    /// Requests a processing round when the channel crossed the free
    /// threshold, or when it stayed busy while in the hopping sequence.
    /// Returns whether a round is pending.
    pub fn channel_stats_updated(&mut self, channel: u8, old_metric: u16, stats: &ChannelStats, now: Instant) -> bool {
        if !self.config.is_coordinator {
            return false;
        }
        if now < self.started_at + self.config.learning_period {
            trace!(channel, "still learning channel statistics");
            return false;
        }
        let Some(new_metric) = stats.free_ewma(channel) else {
            return self.recalculation_requested;
        };
        let old_busy = old_metric < self.config.free_threshold;
        let new_busy = new_metric < self.config.free_threshold;

        if old_busy != new_busy {
            debug!(channel, old_metric, new_metric, busy = new_busy, "channel crossed the free threshold");
            self.recalculation_requested = true;
        } else if new_busy && self.current.contains(channel) {
            debug!(channel, new_metric, "busy channel still in the hopping sequence");
            self.recalculation_requested = true;
        }
        self.recalculation_requested
    }

    /// Run a processing round if one is pending and allowed.
    ///
    /// `sequence` is the current hopping sequence; on replacement it is
    /// updated in place.
    pub fn process(&mut self, now: Instant, stats: &ChannelStats, sequence: &mut [u8]) -> Option<ChannelReplacement> {
        if !self.recalculation_requested {
            return None;
        }
        if self
            .last_changed
            .is_some_and(|at| now < at + self.config.min_update_interval)
        {
            trace!("channel selection is rate limited");
            return None;
        }
        self.recalculation_requested = false;

        let mut qualities: Vec<(u8, u16)> = stats
            .channels()
            .filter_map(|ch| stats.free_ewma(ch).map(|q| (ch, q)))
            .collect();
        // stable: ties keep ascending channel order
        qualities.sort_by(|a, b| b.1.cmp(&a.1));

        let n = sequence.len().min(qualities.len());
        let good = qualities[..n]
            .iter()
            .fold(ChannelBitmap::EMPTY, |acc, &(ch, _)| acc.with(ch));
        // the top N are as good as it gets, whatever their metric
        let is_busy = |ch: u8| {
            !good.contains(ch)
                && stats
                    .free_ewma(ch)
                    .is_some_and(|q| q < self.config.free_threshold)
        };
        if !sequence.iter().any(|&ch| is_busy(ch)) {
            debug!("no busy channel in the hopping sequence");
            return None;
        }

        let &(old, old_metric) = qualities[n..]
            .iter()
            .rev()
            .find(|(ch, _)| sequence.contains(ch))?;
        let Some(new) = self.select_replacement(old, old_metric, &qualities, now) else {
            debug!(channel = old, "no replacement for a busy channel");
            return None;
        };
        let position = sequence.iter().position(|&ch| ch == old)?;

        sequence[position] = new;
        self.busy_since.insert(old, now);
        self.current = ChannelBitmap::from_sequence(sequence);
        self.last_changed = Some(now);
        info!(old, new, position, current = %self.current, "replaced a channel of the hopping sequence");
        Some(ChannelReplacement { old, new, position })
    }

    fn select_replacement(&self, old: u8, old_metric: u16, qualities: &[(u8, u16)], now: Instant) -> Option<u8> {
        let shared_without_old = (self.initial & self.current).without(old);
        for &(candidate, metric) in qualities {
            if metric < self.config.free_threshold {
                return None;
            }
            if u32::from(metric) < u32::from(old_metric) + u32::from(self.config.hysteresis) {
                return None;
            }
            if self.current.contains(candidate) {
                continue;
            }
            if self.is_blacklisted(candidate, now) {
                trace!(channel = candidate, "skipping a blacklisted channel");
                continue;
            }
            if shared_without_old.is_empty() && !self.initial.contains(candidate) {
                trace!(channel = candidate, "would lose every channel of the initial sequence");
                continue;
            }
            return Some(candidate);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats_with(values: &[(u8, u16)], default: u16) -> ChannelStats {
        let mut stats = ChannelStats::default();
        for ch in 11..=26 {
            stats.set_free_ewma(ch, default).unwrap();
        }
        for &(ch, value) in values {
            stats.set_free_ewma(ch, value).unwrap();
        }
        stats
    }

    fn after_learning(t0: Instant) -> Instant {
        t0 + Duration::from_secs(10)
    }

    #[test]
    fn test_busy_channel_replaced() {
        let t0 = Instant::now();
        let mut sequence: Vec<u8> = (11..=18).collect();
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();

        let mut values = vec![(15, 1000), (19, 2000)];
        values.extend((21..=26).map(|ch| (ch, 2000)));
        let stats = stats_with(&values, 4096);
        let now = after_learning(t0);

        assert!(selector.channel_stats_updated(15, 4096, &stats, now));
        let replacement = selector.process(now, &stats, &mut sequence);
        assert_eq!(
            replacement,
            Some(ChannelReplacement {
                old: 15,
                new: 20,
                position: 4
            })
        );
        assert_eq!(sequence, vec![11, 12, 13, 14, 20, 16, 17, 18]);
        assert!(selector.is_blacklisted(15, now));
        assert!(selector.current_bitmap().contains(20));
        assert!(!selector.current_bitmap().contains(15));

        // one substitution per round
        assert_eq!(selector.process(now, &stats, &mut sequence), None);
    }

    #[test]
    fn test_free_hopped_channel_kept() {
        let t0 = Instant::now();
        let mut sequence = vec![11, 12];
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();

        // 11 and 12 are free but outranked by 13 and 14
        let stats = stats_with(&[(11, 3500), (12, 3500), (13, 4096), (14, 4096)], 2000);
        let now = after_learning(t0);
        assert!(selector.channel_stats_updated(13, 2000, &stats, now));
        assert_eq!(selector.process(now, &stats, &mut sequence), None);
        assert_eq!(sequence, vec![11, 12]);
        assert!(!selector.is_blacklisted(12, now));
        assert!(!selector.recalculation_requested());
    }

    #[test]
    fn test_last_initial_channel_kept() {
        let t0 = Instant::now();
        let mut sequence = vec![11, 12];
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();

        let stats = stats_with(&[(11, 4096), (12, 1000), (13, 4096)], 2000);
        let now = after_learning(t0);
        selector.channel_stats_updated(12, 4096, &stats, now);
        let first = selector.process(now, &stats, &mut sequence).unwrap();
        assert_eq!((first.old, first.new), (12, 13));
        assert_eq!(sequence, vec![11, 13]);

        // 11 is now the only channel shared with the initial sequence
        let stats = stats_with(&[(11, 1000), (13, 4096), (14, 4096)], 2000);
        let later = now + Duration::from_secs(61);
        assert!(selector.channel_stats_updated(11, 4096, &stats, later));
        assert_eq!(selector.process(later, &stats, &mut sequence), None);
        assert_eq!(sequence, vec![11, 13]);
        assert!(selector.initial_bitmap().intersects(selector.current_bitmap()));
    }

    #[test]
    fn test_learning_period_and_coordinator() {
        let t0 = Instant::now();
        let stats = stats_with(&[(11, 1000)], 4096);

        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &[11, 12], t0).unwrap();
        assert!(!selector.channel_stats_updated(11, 4096, &stats, t0 + Duration::from_secs(4)));
        assert!(selector.channel_stats_updated(11, 4096, &stats, t0 + Duration::from_secs(5)));

        let config = ChannelSelectorConfig {
            is_coordinator: false,
            ..ChannelSelectorConfig::default()
        };
        let mut selector = ChannelSelector::new(config, &[11, 12], t0).unwrap();
        assert!(!selector.channel_stats_updated(11, 4096, &stats, after_learning(t0)));
    }

    #[test]
    fn test_free_channel_staying_free_ignored() {
        let t0 = Instant::now();
        let stats = stats_with(&[], 4096);
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &[11, 12], t0).unwrap();
        assert!(!selector.channel_stats_updated(11, 4000, &stats, after_learning(t0)));
        // busy, staying busy, outside the sequence
        let stats = stats_with(&[(20, 1000)], 4096);
        assert!(!selector.channel_stats_updated(20, 1500, &stats, after_learning(t0)));
        // busy, staying busy, inside the sequence
        let stats = stats_with(&[(12, 1000)], 4096);
        assert!(selector.channel_stats_updated(12, 1500, &stats, after_learning(t0)));
    }

    #[test]
    fn test_rate_limited() {
        let t0 = Instant::now();
        let mut sequence = vec![11, 12, 13, 14];
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();
        let now = after_learning(t0);

        let stats = stats_with(&[(12, 1000), (13, 1000)], 4096);
        selector.channel_stats_updated(12, 4096, &stats, now);
        assert!(selector.process(now, &stats, &mut sequence).is_some());

        selector.channel_stats_updated(13, 4096, &stats, now);
        let soon = now + Duration::from_secs(30);
        assert_eq!(selector.process(soon, &stats, &mut sequence), None);
        assert!(selector.recalculation_requested());

        let later = now + Duration::from_secs(60);
        assert!(selector.process(later, &stats, &mut sequence).is_some());
    }

    #[test]
    fn test_hysteresis_required() {
        let t0 = Instant::now();
        let mut sequence = vec![11, 12];
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();
        let now = after_learning(t0);

        // 13 is free but not 409 better than 12
        let stats = stats_with(&[(11, 4096), (12, 3000), (13, 3300)], 1000);
        selector.channel_stats_updated(12, 4096, &stats, now);
        assert_eq!(selector.process(now, &stats, &mut sequence), None);
    }

    #[test]
    fn test_blacklisted_channel_skipped() {
        let t0 = Instant::now();
        let mut sequence = vec![11, 12, 13];
        let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();
        let now = after_learning(t0);

        let stats = stats_with(&[(13, 1000), (20, 4096)], 2000);
        let stats = {
            let mut s = stats;
            s.set_free_ewma(11, 4096).unwrap();
            s.set_free_ewma(12, 4096).unwrap();
            s
        };
        selector.channel_stats_updated(13, 4096, &stats, now);
        let first = selector.process(now, &stats, &mut sequence).unwrap();
        assert_eq!((first.old, first.new), (13, 20));

        // 20 goes bad, 13 recovered but is blacklisted; 21 is the next best
        let stats = stats_with(&[(11, 4096), (12, 4096), (13, 4096), (20, 1000), (21, 3900)], 2000);
        let later = now + Duration::from_secs(61);
        selector.channel_stats_updated(20, 4096, &stats, later);
        let second = selector.process(later, &stats, &mut sequence).unwrap();
        assert_eq!((second.old, second.new), (20, 21));

        // once the blacklist expires 13 is eligible again
        assert!(!selector.is_blacklisted(13, now + Duration::from_secs(300)));
    }

    #[test]
    fn test_invalid_sequences() {
        let t0 = Instant::now();
        let config = ChannelSelectorConfig::default();
        assert_eq!(
            ChannelSelector::new(config.clone(), &[], t0).unwrap_err(),
            ChannelSelectionError::EmptySequence
        );
        let long: Vec<u8> = (0..17).collect();
        assert_eq!(
            ChannelSelector::new(config.clone(), &long, t0).unwrap_err(),
            ChannelSelectionError::SequenceTooLong { len: 17, max: 16 }
        );
        assert_eq!(
            ChannelSelector::new(config.clone(), &[11, 40], t0).unwrap_err(),
            ChannelSelectionError::UnknownChannel(40)
        );
        assert_eq!(
            ChannelSelector::new(config.clone(), &[5, 11], t0).unwrap_err(),
            ChannelSelectionError::UnknownChannel(5)
        );
        assert_eq!(config.stats(), ChannelStats::default());
    }

    proptest! {
        #[test]
        fn prop_initial_and_current_always_intersect(
            initial_len in 1usize..5,
            rounds in proptest::collection::vec(
                proptest::collection::vec((11u8..=26, 0u16..=4096), 1..6),
                1..12,
            ),
        ) {
            let t0 = Instant::now();
            let mut sequence: Vec<u8> = (11..11 + initial_len as u8).collect();
            let mut selector = ChannelSelector::new(ChannelSelectorConfig::default(), &sequence, t0).unwrap();
            let mut stats = ChannelStats::default();
            let mut now = after_learning(t0);

            for updates in rounds {
                for (channel, value) in updates {
                    let old = stats.set_free_ewma(channel, value).unwrap();
                    selector.channel_stats_updated(channel, old, &stats, now);
                }
                selector.process(now, &stats, &mut sequence);
                prop_assert!(selector.initial_bitmap().intersects(selector.current_bitmap()));
                prop_assert_eq!(selector.current_bitmap(), ChannelBitmap::from_sequence(&sequence));
                now += Duration::from_secs(61);
            }
        }
    }
}
