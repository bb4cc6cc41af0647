//! Bandwidth estimation: how many negotiated TX cells the parent link needs.
//!
//! Every slotframe the number of committed TX cells is added to
//! NumCellsElapsed; the slot engine adds the cells it actually used to
//! NumCellsUsed. Once NumCellsElapsed reaches `max_num_cells` the usage is
//! compared against the high/low limits and the required count moves by at
//! most one cell, then both counters restart.

use tracing::debug;

use super::config::MsfConfig;

/// Outcome of one evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthDecision {
    /// Required cell count unchanged.
    Unchanged,
    /// Another TX cell is needed.
    Increase(u16),
    /// One TX cell can go.
    Decrease(u16),
}

/// Counter-based estimator of the required upward cells.
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    num_required_upward_cells: u16,
    num_cells_elapsed: u16,
    num_cells_used: u16,
    max_num_cells: u16,
    lim_high: u16,
    lim_low: u16,
    max_tx_cells: u16,
}

impl BandwidthEstimator {
    /// Create an estimator requiring one cell.
    pub fn new(config: &MsfConfig) -> Self {
        Self {
            num_required_upward_cells: 1,
            num_cells_elapsed: 0,
            num_cells_used: 0,
            max_num_cells: config.max_num_cells,
            lim_high: config.lim_num_cells_used_high,
            lim_low: config.lim_num_cells_used_low,
            max_tx_cells: config.max_negotiated_tx_cells,
        }
    }

    /// NumRequiredUpwardCells.
    pub fn required(&self) -> u16 {
        self.num_required_upward_cells
    }

    /// NumCellsElapsed.
    pub fn elapsed(&self) -> u16 {
        self.num_cells_elapsed
    }

    /// NumCellsUsed.
    pub fn used(&self) -> u16 {
        self.num_cells_used
    }

    /// Account one slotframe with `committed` negotiated TX cells.
    ///
    /// Returns the decision when the evaluation window closes.
    pub fn on_slotframe(&mut self, committed: usize) -> Option<BandwidthDecision> {
        let committed = u16::try_from(committed).unwrap_or(u16::MAX);
        self.num_cells_elapsed = self.num_cells_elapsed.saturating_add(committed);
        if self.num_cells_elapsed < self.max_num_cells {
            return None;
        }
        let decision = self.evaluate(committed);
        self.reset_counters();
        Some(decision)
    }

    /// Add cells used by the slot engine.
    pub fn add_cells_used(&mut self, count: u16) {
        self.num_cells_used = self.num_cells_used.saturating_add(count);
    }

    /// Restart the evaluation window.
    pub fn reset_counters(&mut self) {
        self.num_cells_elapsed = 0;
        self.num_cells_used = 0;
    }

    /// Back to a single required cell.
    pub fn reset_required(&mut self) {
        self.num_required_upward_cells = 1;
    }

    fn evaluate(&mut self, committed: u16) -> BandwidthDecision {
        debug!(
            elapsed = self.num_cells_elapsed,
            used = self.num_cells_used,
            required = self.num_required_upward_cells,
            "evaluating bandwidth"
        );
        // usage may overcount: autonomous TX cells are counted too
        if self.num_cells_used > self.lim_high
            && committed < self.max_tx_cells
            && self.num_required_upward_cells != committed + 1
        {
            self.num_required_upward_cells = committed + 1;
            debug!(required = self.num_required_upward_cells, "going to add another negotiated TX cell");
            BandwidthDecision::Increase(self.num_required_upward_cells)
        } else if self.num_cells_used < self.lim_low
            && committed > 1
            && self.num_required_upward_cells != committed - 1
        {
            self.num_required_upward_cells = committed - 1;
            debug!(required = self.num_required_upward_cells, "going to delete a negotiated TX cell");
            BandwidthDecision::Decrease(self.num_required_upward_cells)
        } else {
            BandwidthDecision::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> BandwidthEstimator {
        BandwidthEstimator::new(&MsfConfig::default())
    }

    /// Run full slotframes with `committed` cells, using `used` per slotframe.
    fn run_window(est: &mut BandwidthEstimator, committed: usize, used: u16) -> BandwidthDecision {
        loop {
            est.add_cells_used(used);
            if let Some(decision) = est.on_slotframe(committed) {
                return decision;
            }
        }
    }

    #[test]
    fn test_starts_with_one_cell() {
        let est = estimator();
        assert_eq!(est.required(), 1);
        assert_eq!(est.elapsed(), 0);
        assert_eq!(est.used(), 0);
    }

    #[test]
    fn test_high_usage_increases() {
        let mut est = estimator();
        assert_eq!(run_window(&mut est, 1, 1), BandwidthDecision::Increase(2));
        assert_eq!(est.required(), 2);
        assert_eq!(est.elapsed(), 0);
        assert_eq!(est.used(), 0);
    }

    #[test]
    fn test_low_usage_decreases() {
        let mut est = estimator();
        assert_eq!(run_window(&mut est, 3, 0), BandwidthDecision::Decrease(2));
        assert_eq!(est.required(), 2);
    }

    #[test]
    fn test_single_cell_never_decreases() {
        let mut est = estimator();
        assert_eq!(run_window(&mut est, 1, 0), BandwidthDecision::Unchanged);
        assert_eq!(est.required(), 1);
    }

    #[test]
    fn test_capped_at_max() {
        let mut est = estimator();
        assert_eq!(run_window(&mut est, 10, 10), BandwidthDecision::Unchanged);
        assert_eq!(est.required(), 1);
    }

    #[test]
    fn test_mid_usage_unchanged() {
        let mut est = estimator();
        // 2 cells * 50 slotframes, half of them used
        assert_eq!(run_window(&mut est, 2, 1), BandwidthDecision::Unchanged);
    }

    #[test]
    fn test_window_length() {
        let mut est = estimator();
        for _ in 0..49 {
            assert!(est.on_slotframe(2).is_none());
        }
        assert_eq!(est.elapsed(), 98);
        assert!(est.on_slotframe(2).is_some());
    }

    #[test]
    fn test_reset_required() {
        let mut est = estimator();
        run_window(&mut est, 1, 1);
        est.reset_required();
        assert_eq!(est.required(), 1);
    }
}
