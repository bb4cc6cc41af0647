//! MSF configuration.

use std::time::Duration;

use crate::core::constants::*;
use crate::core::{MsfError, MsfResult};

use super::sax::SaxParams;

#[derive(Clone, Debug)]
/// Tunables of the MSF engine. `Default` gives the standard MSF values.
pub struct MsfConfig {
    /// Scheduling function identifier carried in every 6P packet.
    pub sfid: u8,
    /// Length of both MSF slotframes, in timeslots.
    pub slotframe_length: u16,
    /// Duration of one timeslot.
    pub slot_duration: Duration,
    /// Number of channel offsets (hopping sequence length).
    pub num_channels: u16,
    /// Slotframe handle of the autonomous cells.
    pub autonomous_handle: u16,
    /// Slotframe handle of the negotiated cells.
    pub negotiated_handle: u16,
    /// Cells offered in a CandidateCellList.
    pub cell_list_len: usize,
    /// Shortest CandidateCellList accepted from a peer.
    pub cell_list_min_len: usize,
    /// Cap on negotiated TX cells; also the number of statistics blocks.
    pub max_negotiated_tx_cells: u16,
    /// Elapsed-cell window of the bandwidth estimator.
    pub max_num_cells: u16,
    /// NumCellsUsed above which a cell is added.
    pub lim_num_cells_used_high: u16,
    /// NumCellsUsed below which a cell is deleted.
    pub lim_num_cells_used_low: u16,
    /// Period of the relocation scan.
    pub housekeeping_period: Duration,
    /// PDR spread (percentage points) that triggers a relocation.
    pub relocate_pdr_threshold: u16,
    /// NumTx before a cell's PDR is considered.
    pub min_num_tx_for_relocation: u16,
    /// Shortest backoff after a failed or refused request.
    pub wait_duration_min: Duration,
    /// Longest backoff after a failed or refused request.
    pub wait_duration_max: Duration,
    /// Autonomous cell hash parameters.
    pub sax: SaxParams,
}

impl Default for MsfConfig {
    fn default() -> Self {
        Self {
            sfid: MSF_SFID,
            slotframe_length: DEFAULT_SLOTFRAME_LENGTH,
            slot_duration: DEFAULT_SLOT_DURATION,
            num_channels: DEFAULT_NUM_CHANNELS,
            autonomous_handle: SLOTFRAME_HANDLE_AUTONOMOUS_CELLS,
            negotiated_handle: SLOTFRAME_HANDLE_NEGOTIATED_CELLS,
            cell_list_len: CELL_LIST_LEN,
            cell_list_min_len: CELL_LIST_MIN_LEN,
            max_negotiated_tx_cells: MAX_NUM_NEGOTIATED_TX_CELLS,
            max_num_cells: MAX_NUM_CELLS,
            lim_num_cells_used_high: LIM_NUM_CELLS_USED_HIGH,
            lim_num_cells_used_low: LIM_NUM_CELLS_USED_LOW,
            housekeeping_period: HOUSEKEEPING_COLLISION_PERIOD,
            relocate_pdr_threshold: RELOCATE_PDR_THRESHOLD,
            min_num_tx_for_relocation: MIN_NUM_TX_FOR_RELOCATION,
            wait_duration_min: WAIT_DURATION_MIN,
            wait_duration_max: WAIT_DURATION_MAX,
            sax: SaxParams::default(),
        }
    }
}

impl MsfConfig {
    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> MsfResult<()> {
        if self.slotframe_length < 3 {
            return Err(MsfError::Config(format!(
                "slotframe_length must be at least 3, got {}",
                self.slotframe_length
            )));
        }
        if self.num_channels == 0 {
            return Err(MsfError::Config("num_channels must be non-zero".into()));
        }
        if self.autonomous_handle == self.negotiated_handle {
            return Err(MsfError::Config(
                "autonomous and negotiated slotframes need distinct handles".into(),
            ));
        }
        if self.cell_list_min_len == 0 || self.cell_list_len < self.cell_list_min_len {
            return Err(MsfError::Config(format!(
                "cell_list_len ({}) must be >= cell_list_min_len ({}) >= 1",
                self.cell_list_len, self.cell_list_min_len
            )));
        }
        if self.max_negotiated_tx_cells == 0 {
            return Err(MsfError::Config(
                "max_negotiated_tx_cells must be non-zero".into(),
            ));
        }
        if self.lim_num_cells_used_low >= self.lim_num_cells_used_high
            || self.lim_num_cells_used_high > self.max_num_cells
        {
            return Err(MsfError::Config(format!(
                "usage limits must satisfy low ({}) < high ({}) <= max_num_cells ({})",
                self.lim_num_cells_used_low, self.lim_num_cells_used_high, self.max_num_cells
            )));
        }
        if self.wait_duration_min >= self.wait_duration_max {
            return Err(MsfError::Config(
                "wait_duration_min must be shorter than wait_duration_max".into(),
            ));
        }
        Ok(())
    }

    /// Duration of one slotframe.
    pub fn slotframe_interval(&self) -> Duration {
        self.slot_duration * u32::from(self.slotframe_length)
    }

    /// Timeout a 6P layer should apply to MSF transactions.
    ///
    /// Worst case for one frame to get through: every CSMA backoff window at
    /// the maximum exponent, for every retry, one cell per slotframe.
    pub fn transaction_timeout(&self) -> Duration {
        let backoff_windows = (2u32 << (MAC_MAX_BE - 1)) - 1;
        self.slotframe_interval() * backoff_windows * MAC_MAX_FRAME_RETRIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MsfConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slotframe_length, 101);
        assert_eq!(config.cell_list_len, 5);
    }

    #[test]
    fn test_slotframe_interval() {
        let config = MsfConfig::default();
        assert_eq!(config.slotframe_interval(), Duration::from_millis(1010));
    }

    #[test]
    fn test_transaction_timeout() {
        // 31 windows * 7 retries * 1.01 s
        let config = MsfConfig::default();
        assert_eq!(config.transaction_timeout(), Duration::from_millis(219_170));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MsfConfig {
            cell_list_len: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MsfError::Config(_))));

        let config = MsfConfig {
            wait_duration_min: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MsfConfig {
            negotiated_handle: SLOTFRAME_HANDLE_AUTONOMOUS_CELLS,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MsfConfig {
            lim_num_cells_used_low: 80,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
