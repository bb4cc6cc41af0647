//! Adaptive TSCH channel selection.
//!
//! Every node keeps a free-channel EWMA per channel ([`ChannelStats`]). On
//! the coordinator, [`ChannelSelector`] watches those metrics and swaps busy
//! channels of the hopping sequence for free ones, one at a time.
//!
//! ```text
//!   CCA sample ──► ChannelStats::record_free_sample ──► old metric
//!                                                        │
//!                    ChannelSelector::channel_stats_updated
//!                                                        │ requested
//!                    ChannelSelector::process ◄──────────┘
//!                          │
//!                          ▼
//!              hopping sequence updated in place
//! ```

mod bitmap;
mod selector;
mod stats;

pub use bitmap::ChannelBitmap;
pub use selector::{ChannelReplacement, ChannelSelector, ChannelSelectorConfig};
pub use stats::ChannelStats;
