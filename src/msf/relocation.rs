//! Relocation of badly performing negotiated TX cells.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::sixp::SixpCell;

use super::config::MsfConfig;
use super::negotiated::NegotiatedTxCell;

/// Pick the cell to relocate from a TX chain.
///
/// Only cells with at least `min_num_tx` transmissions are scored. The cell
/// with the worst PDR is returned if it trails the best one by more than
/// `pdr_threshold` percentage points.
pub fn select_worst_cell(
    chain: &[NegotiatedTxCell],
    min_num_tx: u16,
    pdr_threshold: u16,
) -> Option<SixpCell> {
    let mut best_pdr: Option<u16> = None;
    let mut worst: Option<(u16, &NegotiatedTxCell)> = None;

    for cell in chain {
        let pdr = if cell.stats.num_tx() < min_num_tx {
            None
        } else {
            cell.stats.pdr()
        };
        debug!(
            slot_offset = cell.timeslot,
            channel_offset = cell.channel_offset,
            num_tx = cell.stats.num_tx(),
            num_tx_ack = cell.stats.num_tx_ack(),
            pdr = ?pdr,
            "tx cell"
        );
        let Some(pdr) = pdr else { continue };
        if best_pdr.is_none_or(|best| pdr > best) {
            best_pdr = Some(pdr);
        }
        if worst.is_none_or(|(w, _)| pdr < w) {
            worst = Some((pdr, cell));
        }
    }

    let (best, (worst_pdr, worst_cell)) = (best_pdr?, worst?);
    if best - worst_pdr <= pdr_threshold {
        debug!(best, worst = worst_pdr, "no cell to relocate");
        return None;
    }
    debug!(
        best,
        worst = worst_pdr,
        slot_offset = worst_cell.timeslot,
        channel_offset = worst_cell.channel_offset,
        "going to relocate a TX cell"
    );
    Some(worst_cell.as_sixp_cell())
}

/// Tracks the single pending relocation candidate and the scan period.
///
/// Cells whose relocation the parent refused stay out of later scans until
/// they leave the chain.
#[derive(Debug, Clone)]
pub struct RelocationSelector {
    candidate: Option<SixpCell>,
    abandoned: Vec<SixpCell>,
    next_scan: Option<Instant>,
    period: Duration,
    min_num_tx: u16,
    pdr_threshold: u16,
}

impl RelocationSelector {
    /// Create an idle selector.
    pub fn new(config: &MsfConfig) -> Self {
        Self {
            candidate: None,
            abandoned: Vec::new(),
            next_scan: None,
            period: config.housekeeping_period,
            min_num_tx: config.min_num_tx_for_relocation,
            pdr_threshold: config.relocate_pdr_threshold,
        }
    }

    /// Arm the housekeeping timer.
    pub fn start(&mut self, now: Instant) {
        self.next_scan = Some(now + self.period);
    }

    /// Disarm the timer and drop the candidate.
    pub fn stop(&mut self) {
        self.next_scan = None;
        self.candidate = None;
        self.abandoned.clear();
    }

    /// The pending candidate.
    pub fn candidate(&self) -> Option<SixpCell> {
        self.candidate
    }

    /// Drop the pending candidate.
    pub fn clear(&mut self) {
        self.candidate = None;
    }

    /// Drop the candidate and never pick `cell` again while it is scheduled.
    pub fn abandon(&mut self, cell: SixpCell) {
        self.candidate = None;
        if !self.abandoned.contains(&cell) {
            self.abandoned.push(cell);
        }
    }

    /// Check if relocating `cell` was given up.
    pub fn is_abandoned(&self, cell: &SixpCell) -> bool {
        self.abandoned.contains(cell)
    }

    /// `cell` left the chain: drop it as candidate and from the abandoned set.
    pub fn forget(&mut self, cell: &SixpCell) {
        if self.candidate.as_ref() == Some(cell) {
            self.candidate = None;
        }
        self.abandoned.retain(|c| c != cell);
    }

    /// Scan `chain` if the period elapsed and no candidate is pending.
    pub fn housekeeping(&mut self, now: Instant, chain: &[NegotiatedTxCell]) -> Option<SixpCell> {
        let due = self.next_scan.is_some_and(|at| now >= at);
        if due && self.candidate.is_none() {
            let eligible: Vec<NegotiatedTxCell> = chain
                .iter()
                .filter(|c| !self.abandoned.contains(&c.as_sixp_cell()))
                .copied()
                .collect();
            self.candidate = select_worst_cell(&eligible, self.min_num_tx, self.pdr_threshold);
            self.next_scan = Some(now + self.period);
        }
        self.candidate
    }
}
