//! MSF engine
//!
//! Owns everything MSF keeps per node: the autonomous RX cell, the
//! negotiated TX chains, the bandwidth and relocation state, and the
//! transactions in flight. It is driven by events:
//!
//! - [`MsfEngine::tick`] once per slotframe (management side)
//! - [`MsfEngine::on_input`], [`MsfEngine::on_output_status`] and
//!   [`MsfEngine::on_timeout`] from the 6P layer
//! - [`MsfEngine::on_packet_ready`] and [`MsfEngine::on_packet_sent`] from
//!   the MAC
//! - [`MsfEngine::set_parent`] from the routing layer
//!
//! Command-specific handling lives in the `add`, `delete`, `relocate` and
//! `clear` modules as further `impl` blocks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, info, trace, warn};

use crate::core::{Cell, CellKind, CellOptions, LinkAddr, MacTxStatus, MsfError, MsfResult, Schedule, SixpLayer};
use crate::schedule::ScheduleLock;
use crate::sixp::{Command, OutputStatus, RequestBody, ReturnCode, SixpCell, SixpMessage, SixpPacket};

use super::autonomous::{add_autonomous_cell, delete_autonomous_cell, AutonomousCellType};
use super::bandwidth::BandwidthEstimator;
use super::config::MsfConfig;
use super::negotiated::{NegotiatedCellStore, NegotiatedTxCell};
use super::relocation::RelocationSelector;
use super::reservation::ReservationSet;
use super::transaction::{PendingTransaction, Role, TransactionInfo, TransactionPhase};
use super::wait::RequestWaitTimer;

/// Direction of a negotiated cell, from this node's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CellDirection {
    Tx,
    Rx,
}

impl CellDirection {
    fn options(self) -> CellOptions {
        match self {
            CellDirection::Tx => CellOptions::TX,
            CellDirection::Rx => CellOptions::RX,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CellDirection::Tx => "TX",
            CellDirection::Rx => "RX",
        }
    }
}

/// The Minimal Scheduling Function.
///
/// Generic over:
/// - `S`: the TSCH schedule
/// - `P`: the 6P transaction layer
/// - `R`: the random source for candidate cells and backoff
pub struct MsfEngine<S, P, R> {
    /// Tunables
    pub(super) config: MsfConfig,

    /// Our own link-layer address
    pub(super) node_addr: LinkAddr,

    pub(super) schedule: S,

    pub(super) sixp: P,

    pub(super) rng: R,

    /// Shared with the slot engine
    pub(super) lock: ScheduleLock,

    pub(super) activated: bool,

    pub(super) autonomous_rx: Option<Cell>,

    /// Negotiated TX chains and autonomous TX references
    pub(super) store: NegotiatedCellStore,

    pub(super) bandwidth: BandwidthEstimator,

    pub(super) relocation: RelocationSelector,

    /// Current routing parent
    pub(super) parent: Option<LinkAddr>,

    /// Gates the next request toward the parent
    pub(super) wait: RequestWaitTimer,

    /// At most one per peer
    pub(super) transactions: HashMap<LinkAddr, PendingTransaction>,
}

impl<S: Schedule, P: SixpLayer, R: Rng> MsfEngine<S, P, R> {
    /// Create an engine. Nothing is scheduled until [`activate`](Self::activate).
    pub fn new(config: MsfConfig, node_addr: LinkAddr, schedule: S, sixp: P, rng: R) -> MsfResult<Self> {
        config.validate()?;
        Ok(Self {
            store: NegotiatedCellStore::new(usize::from(config.max_negotiated_tx_cells)),
            bandwidth: BandwidthEstimator::new(&config),
            relocation: RelocationSelector::new(&config),
            config,
            node_addr,
            schedule,
            sixp,
            rng,
            lock: ScheduleLock::new(),
            activated: false,
            autonomous_rx: None,
            parent: None,
            wait: RequestWaitTimer::new(),
            transactions: HashMap::new(),
        })
    }

    /// Use `lock` instead of a private schedule lock.
    pub fn with_lock(mut self, lock: ScheduleLock) -> Self {
        self.lock = lock;
        self
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Configuration in use.
    pub fn config(&self) -> &MsfConfig {
        &self.config
    }

    /// Our link-layer address.
    pub fn node_addr(&self) -> LinkAddr {
        self.node_addr
    }

    /// The schedule.
    pub fn schedule(&self) -> &S {
        &self.schedule
    }

    /// The schedule, mutably.
    pub fn schedule_mut(&mut self) -> &mut S {
        &mut self.schedule
    }

    /// The 6P layer.
    pub fn sixp(&self) -> &P {
        &self.sixp
    }

    /// The 6P layer, mutably.
    pub fn sixp_mut(&mut self) -> &mut P {
        &mut self.sixp
    }

    /// A handle on the schedule lock, for the slot engine.
    pub fn schedule_lock(&self) -> ScheduleLock {
        self.lock.clone()
    }

    /// Check if MSF is running.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Current parent.
    pub fn parent(&self) -> Option<LinkAddr> {
        self.parent
    }

    /// NumRequiredUpwardCells.
    pub fn num_required_upward_cells(&self) -> u16 {
        self.bandwidth.required()
    }

    /// Bandwidth counters.
    pub fn bandwidth(&self) -> &BandwidthEstimator {
        &self.bandwidth
    }

    /// Negotiated TX cells toward `peer`, highest timeslot first.
    pub fn tx_cells(&self, peer: &LinkAddr) -> &[NegotiatedTxCell] {
        self.store.tx_chain(peer)
    }

    /// Number of negotiated TX cells toward `peer`.
    pub fn num_negotiated_tx_cells(&self, peer: &LinkAddr) -> usize {
        self.store.num_tx_cells(peer)
    }

    /// Negotiated RX cells from `peer`.
    pub fn rx_cells(&self, peer: &LinkAddr) -> Vec<Cell> {
        self.schedule
            .links(self.config.negotiated_handle)
            .into_iter()
            .filter(|c| c.peer == *peer && c.is_negotiated(CellOptions::RX))
            .collect()
    }

    /// The autonomous RX cell, while activated.
    pub fn autonomous_rx_cell(&self) -> Option<Cell> {
        self.autonomous_rx
    }

    /// The autonomous TX cell toward `peer`, if installed.
    pub fn autonomous_tx_cell(&self, peer: &LinkAddr) -> Option<Cell> {
        self.store.autonomous_tx(peer)
    }

    /// Cell picked for relocation, if any.
    pub fn relocation_candidate(&self) -> Option<SixpCell> {
        self.relocation.candidate()
    }

    /// The transaction MSF tracks with `peer`.
    pub fn transaction(&self, peer: &LinkAddr) -> Option<TransactionInfo> {
        self.transactions.get(peer).map(PendingTransaction::info)
    }

    /// Check if the wait timer still holds requests back.
    pub fn is_waiting(&self, now: Instant) -> bool {
        !self.wait.is_expired(now)
    }

    /// Check if the parent has at least one negotiated TX cell.
    pub fn is_negotiated_tx_scheduled(&self) -> bool {
        self.parent
            .is_some_and(|parent| self.store.num_tx_cells(&parent) > 0)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Install the autonomous RX cell and start housekeeping.
    pub fn activate(&mut self, now: Instant) -> MsfResult<()> {
        if self.activated {
            debug!("MSF is already activated");
            return Ok(());
        }
        let rx = add_autonomous_cell(
            &mut self.schedule,
            &self.config,
            AutonomousCellType::Rx,
            &self.node_addr,
        )
        .inspect_err(|e| error!(%e, "failed to activate MSF"))?;
        self.autonomous_rx = Some(rx);
        self.relocation.start(now);
        self.activated = true;
        info!(addr = %self.node_addr, "MSF is activated");
        Ok(())
    }

    /// Abort transactions and tear every MSF cell down.
    pub fn deactivate(&mut self) {
        if !self.activated {
            return;
        }
        let peers: Vec<LinkAddr> = self
            .transactions
            .keys()
            .copied()
            .chain(self.parent)
            .collect();
        for peer in peers {
            if self.sixp.find_transaction(&peer).is_some() {
                self.sixp.abort(&peer);
            }
        }
        self.release_all_pending();
        self.remove_all(None);

        if let Some(rx) = self.autonomous_rx.take() {
            delete_autonomous_cell(&mut self.schedule, &self.config, &rx);
        }
        self.store.clear_autonomous_tx();
        self.relocation.stop();
        self.bandwidth.reset_counters();
        self.wait.reset();
        self.activated = false;
        info!("MSF is deactivated");
    }

    /// Handle a parent switch.
    ///
    /// The transaction with the old parent is aborted and its negotiated
    /// cells are cleared. Toward the new parent, an ADD goes out right away
    /// unless a transaction is already running with it.
    pub fn set_parent(&mut self, parent: Option<LinkAddr>, now: Instant) -> MsfResult<()> {
        if self.parent == parent {
            return Ok(());
        }
        let old = std::mem::replace(&mut self.parent, parent);
        match parent {
            Some(new) => info!(parent = %new, "switching to a new parent"),
            None => info!("parent is lost"),
        }
        if !self.activated {
            debug!("MSF is not activated; nothing to negotiate yet");
            return Ok(());
        }

        if let Some(old) = old {
            if self.sixp.find_transaction(&old).is_some() {
                self.sixp.abort(&old);
            }
            if let Some(pending) = self.release_pending(&old) {
                debug!(command = %pending.command, peer = %old, "dropped the transaction with the old parent");
            }
            if self.store.num_tx_cells(&old) > 0 {
                self.clear_send_request(old);
            }
        }

        self.reset_for_new_parent();
        match parent {
            Some(new) => {
                self.ensure_negotiated_slotframe()?;
                if self.has_transaction_with(&new) {
                    self.set_random_wait(now);
                } else if self.store.num_tx_cells(&new) < usize::from(self.bandwidth.required()) {
                    self.add_send_request(new, now);
                }
            }
            None => self.bandwidth.reset_required(),
        }
        Ok(())
    }

    /// Restart the bandwidth window, drop the relocation candidate, and
    /// expire the wait timer.
    pub fn reset_for_new_parent(&mut self) {
        self.bandwidth.reset_counters();
        self.relocation.clear();
        self.wait.reset();
    }

    // ---------------------------------------------------------------------
    // Management
    // ---------------------------------------------------------------------

    /// Run one slotframe of management.
    ///
    /// Accounts the slotframe in the bandwidth window, runs housekeeping, and
    /// starts at most one request toward the parent: ADD if more cells are
    /// required, DELETE if fewer, RELOCATE if a candidate is pending.
    /// Returns the command a request was attempted for.
    pub fn tick(&mut self, now: Instant) -> Option<Command> {
        if !self.activated {
            return None;
        }
        let parent = self.parent?;
        let committed = self.store.num_tx_cells(&parent);
        if let Some(decision) = self.bandwidth.on_slotframe(committed) {
            trace!(?decision, "bandwidth window closed");
        }
        self.relocation.housekeeping(now, self.store.tx_chain(&parent));

        if self.has_transaction_with(&parent) || !self.wait.is_expired(now) {
            return None;
        }

        let required = usize::from(self.bandwidth.required());
        if committed < required {
            self.add_send_request(parent, now);
            Some(Command::Add)
        } else if committed > required {
            self.delete_send_request(parent, now);
            Some(Command::Delete)
        } else if let Some(cell) = self.relocation.candidate() {
            self.relocate_send_request(parent, cell, now);
            Some(Command::Relocate)
        } else {
            None
        }
    }

    /// Add `count` cells used toward the parent to the bandwidth window.
    pub fn update_num_cells_used(&mut self, count: u16) {
        if self.is_negotiated_tx_scheduled() {
            self.bandwidth.add_cells_used(count);
        }
    }

    /// Account `num_tx` transmissions to the parent that ended on
    /// `slot_offset`.
    ///
    /// Runs under a non-blocking try-lock on the schedule lock; the update
    /// is dropped if the lock is held. Returns whether it was applied.
    pub fn update_num_tx(&mut self, slot_offset: u16, num_tx: u16, status: MacTxStatus) -> bool {
        if num_tx == 0 {
            return false;
        }
        let Some(parent) = self.parent else {
            return false;
        };
        let Some(_guard) = self.lock.try_acquire() else {
            warn!("failed to update NumTx/NumTxAck because of tsch_lock");
            return false;
        };
        let applied = self
            .store
            .record_transmission(&parent, slot_offset, num_tx, status.is_ok());
        if !applied {
            trace!(slot_offset, "no negotiated TX cell at this slot offset");
        }
        applied
    }

    /// Remove negotiated cells.
    ///
    /// With a peer, every negotiated cell toward or from it goes. Without
    /// one, the negotiated slotframe is removed with everything in it.
    /// Calling this again is a no-op.
    pub fn remove_all(&mut self, peer: Option<LinkAddr>) {
        let handle = self.config.negotiated_handle;
        if !self.schedule.has_slotframe(handle) {
            debug!("no slotframe for negotiated cells");
            return;
        }
        match peer {
            Some(peer) => {
                let cells: Vec<Cell> = self
                    .schedule
                    .links(handle)
                    .into_iter()
                    .filter(|c| c.peer == peer && c.kind == CellKind::Negotiated)
                    .collect();
                if !cells.is_empty() {
                    info!(%peer, count = cells.len(), "removing negotiated cells");
                }
                for cell in &cells {
                    self.remove_negotiated_cell(cell);
                }
            }
            None => {
                info!("removing all the negotiated cells");
                let cells: Vec<Cell> = self
                    .schedule
                    .links(handle)
                    .into_iter()
                    .filter(|c| c.kind == CellKind::Negotiated)
                    .collect();
                for cell in &cells {
                    self.remove_negotiated_cell(cell);
                }
                self.store.clear_tx();
                for pending in self.transactions.values_mut() {
                    pending.reservation.forget();
                }
                self.relocation.clear();
                if self.schedule.remove_slotframe(handle) {
                    info!(handle, "removed the slotframe for negotiated cells");
                } else {
                    error!(handle, "failed to remove the slotframe for negotiated cells");
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // MAC hooks
    // ---------------------------------------------------------------------

    /// A packet toward `dest` entered the queue.
    ///
    /// Installs an autonomous TX cell if `dest` has no TX cell at all.
    pub fn on_packet_ready(&mut self, dest: &LinkAddr) -> Option<Cell> {
        if !self.activated || !dest.is_unicast() {
            return None;
        }
        if self.store.autonomous_tx(dest).is_some() || self.store.num_tx_cells(dest) > 0 {
            return None;
        }
        let cell = add_autonomous_cell(&mut self.schedule, &self.config, AutonomousCellType::Tx, dest).ok()?;
        self.store.set_autonomous_tx(dest, cell);
        Some(cell)
    }

    /// A packet toward `dest` left the queue.
    pub fn on_packet_sent(
        &mut self,
        dest: &LinkAddr,
        status: MacTxStatus,
        num_tx: u16,
        timeslot: u16,
        queue_empty: bool,
    ) {
        if !self.activated || !dest.is_unicast() {
            return;
        }
        if queue_empty {
            if let Some(cell) = self.store.take_autonomous_tx(dest) {
                delete_autonomous_cell(&mut self.schedule, &self.config, &cell);
            }
        }
        if self.store.num_tx_cells(dest) > 0 {
            self.update_num_cells_used(num_tx);
            self.update_num_tx(timeslot, num_tx, status);
        }
    }

    // ---------------------------------------------------------------------
    // 6P events
    // ---------------------------------------------------------------------

    /// A 6P packet arrived from `src`.
    pub fn on_input(&mut self, src: LinkAddr, packet: SixpPacket, now: Instant) {
        if packet.sfid != self.config.sfid {
            warn!(sfid = packet.sfid, "ignoring a 6P packet for another scheduling function");
            return;
        }
        if self.activated && self.ensure_negotiated_slotframe().is_err() {
            return;
        }
        let Some(transaction) = self.sixp.find_transaction(&src) else {
            error!(peer = %src, "cannot find a 6P transaction of a received 6P packet");
            return;
        };

        match packet.message {
            SixpMessage::Request(body) => {
                if body.command() != transaction.command {
                    error!(
                        peer = %src,
                        request = %body.command(),
                        transaction = %transaction.command,
                        "6P request does not match its transaction"
                    );
                    return;
                }
                if let Some(stale) = self.release_pending(&src) {
                    warn!(peer = %src, command = %stale.command, "released the state of a stale transaction");
                }
                match body {
                    RequestBody::Add {
                        cell_options,
                        num_cells,
                        cell_list,
                    } => self.add_recv_request(src, cell_options, num_cells, &cell_list),
                    RequestBody::Delete {
                        cell_options,
                        num_cells,
                        cell_list,
                    } => self.delete_recv_request(src, cell_options, num_cells, &cell_list),
                    RequestBody::Relocate {
                        cell_options,
                        num_cells,
                        relocation_cell_list,
                        candidate_cell_list,
                    } => self.relocate_recv_request(
                        src,
                        cell_options,
                        num_cells,
                        &relocation_cell_list,
                        &candidate_cell_list,
                    ),
                    RequestBody::Clear => self.clear_recv_request(src),
                    RequestBody::Unsupported(command) => {
                        error!(peer = %src, %command, "unsupported command");
                        self.respond(src, ReturnCode::Err, Vec::new());
                    }
                }
            }
            SixpMessage::Response { code, cell_list } => {
                let pending = self.take_initiated(&src, transaction.command);
                match transaction.command {
                    Command::Add => self.add_recv_response(src, code, &cell_list, pending, now),
                    Command::Delete => self.delete_recv_response(src, code, &cell_list, pending, now),
                    Command::Relocate => self.relocate_recv_response(src, code, &cell_list, pending, now),
                    Command::Clear => self.clear_recv_response(src, code, pending),
                    command => {
                        error!(peer = %src, %command, "received a response to an unsupported command");
                        if let Some(mut pending) = pending {
                            self.release(&mut pending.reservation);
                        }
                    }
                }
            }
            SixpMessage::Confirmation { .. } => {
                error!(peer = %src, "received a 6P Confirmation, which is not supported by MSF");
            }
        }
    }

    /// The 6P layer reports the send status of our last packet to `dest`.
    pub fn on_output_status(&mut self, dest: LinkAddr, status: OutputStatus, now: Instant) {
        let Some(mut pending) = self.transactions.remove(&dest) else {
            trace!(peer = %dest, ?status, "no transaction to settle");
            return;
        };
        match (pending.role, status) {
            (Role::Initiator, OutputStatus::Success) => {
                pending.phase = TransactionPhase::AwaitingResponse;
                self.transactions.insert(dest, pending);
            }
            (Role::Initiator, _) => {
                error!(peer = %dest, "{} transaction failed", pending.command);
                self.release(&mut pending.reservation);
                if pending.command == Command::Clear {
                    self.remove_all(Some(dest));
                }
                if self.parent == Some(dest) {
                    self.set_random_wait(now);
                }
            }
            (Role::Responder, status) => {
                let delivered = status == OutputStatus::Success;
                match pending.command {
                    Command::Add => self.add_response_sent(dest, pending, delivered),
                    Command::Delete => self.delete_response_sent(dest, pending, delivered),
                    Command::Relocate => self.relocate_response_sent(dest, pending, delivered),
                    command => {
                        debug!(peer = %dest, %command, "nothing to settle");
                        self.release(&mut pending.reservation);
                    }
                }
            }
        }
    }

    /// The transaction with `peer` expired without an outcome.
    pub fn on_timeout(&mut self, peer: LinkAddr, command: Command, now: Instant) {
        error!(%peer, "{command} transaction ends because of timeout");
        let Some(mut pending) = self.transactions.remove(&peer) else {
            return;
        };
        self.release(&mut pending.reservation);
        if pending.role == Role::Initiator {
            if pending.command == Command::Clear {
                self.remove_all(Some(peer));
            }
            if self.parent == Some(peer) {
                self.set_random_wait(now);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Shared helpers for the command handlers
    // ---------------------------------------------------------------------

    pub(super) fn has_transaction_with(&self, peer: &LinkAddr) -> bool {
        self.sixp.find_transaction(peer).is_some() || self.transactions.contains_key(peer)
    }

    /// Create the negotiated slotframe if missing.
    pub(super) fn ensure_negotiated_slotframe(&mut self) -> MsfResult<()> {
        let handle = self.config.negotiated_handle;
        if self.schedule.has_slotframe(handle) {
            return Ok(());
        }
        if self.schedule.add_slotframe(handle, self.config.slotframe_length) {
            info!(handle, "added a slotframe for negotiated cells");
            Ok(())
        } else {
            error!(handle, "failed to add a slotframe for negotiated cells");
            Err(MsfError::SlotframeUnavailable { handle })
        }
    }

    pub(super) fn release(&mut self, reservation: &mut ReservationSet) -> usize {
        reservation.release(&mut self.schedule, self.config.negotiated_handle)
    }

    /// Drop the transaction tracked with `peer`, releasing its reservations.
    pub(super) fn release_pending(&mut self, peer: &LinkAddr) -> Option<PendingTransaction> {
        let mut pending = self.transactions.remove(peer)?;
        self.release(&mut pending.reservation);
        Some(pending)
    }

    fn release_all_pending(&mut self) {
        let handle = self.config.negotiated_handle;
        for (_, mut pending) in self.transactions.drain() {
            pending.reservation.release(&mut self.schedule, handle);
        }
    }

    /// Take the transaction we initiated with `peer` for `command`.
    ///
    /// Anything else tracked for `peer` is released and dropped.
    fn take_initiated(&mut self, peer: &LinkAddr, command: Command) -> Option<PendingTransaction> {
        let mut pending = self.transactions.remove(peer)?;
        if pending.role == Role::Initiator && pending.command == command {
            return Some(pending);
        }
        warn!(%peer, tracked = %pending.command, %command, "response does not match the tracked transaction");
        self.release(&mut pending.reservation);
        None
    }

    /// Arm the wait timer for a random duration.
    pub(super) fn set_random_wait(&mut self, now: Instant) {
        let min = self.config.wait_duration_min;
        let span = self
            .config
            .wait_duration_max
            .saturating_sub(min)
            .as_millis();
        let span = u64::try_from(span).unwrap_or(u64::MAX);
        let wait = min + Duration::from_millis(self.rng.gen_range(0..=span));
        self.wait.arm(now, wait);
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        debug!(wait_ms, "delay the next request");
    }

    /// Send a response; failures are logged.
    pub(super) fn respond(&mut self, peer: LinkAddr, code: ReturnCode, cell_list: Vec<SixpCell>) -> bool {
        let packet = SixpPacket::response(self.config.sfid, code, cell_list);
        match self.sixp.output(peer, packet) {
            Ok(()) => {
                debug!(%peer, "sent a {code} response");
                true
            }
            Err(e) => {
                error!(%peer, %e, "failed to send a {code} response");
                false
            }
        }
    }

    /// Send a request; failures are logged.
    pub(super) fn request(&mut self, peer: LinkAddr, body: RequestBody) -> bool {
        let command = body.command();
        match self.sixp.output(peer, SixpPacket::request(self.config.sfid, body)) {
            Ok(()) => {
                debug!(%peer, "sent a {command} request");
                true
            }
            Err(e) => {
                error!(%peer, %e, "failed to send a {command} request");
                false
            }
        }
    }

    /// Install a negotiated cell.
    ///
    /// A TX cell also enters the peer's chain and replaces the autonomous
    /// TX cell toward that peer.
    pub(super) fn add_negotiated_cell(
        &mut self,
        direction: CellDirection,
        peer: LinkAddr,
        cell: SixpCell,
    ) -> MsfResult<Cell> {
        let handle = self.config.negotiated_handle;
        if !self.schedule.has_slotframe(handle) {
            error!("no slotframe for negotiated cells");
            return Err(MsfError::SlotframeUnavailable { handle });
        }
        if direction == CellDirection::Tx && !self.store.has_free_stats() {
            error!(capacity = self.store.capacity(), "no memory for a negotiated TX cell");
            return Err(MsfError::StatsExhausted {
                capacity: self.store.capacity(),
            });
        }

        let dir = direction.as_str();
        let Some(added) = self.schedule.add_link(
            handle,
            direction.options(),
            CellKind::Negotiated,
            peer,
            cell.timeslot,
            cell.channel_offset,
        ) else {
            error!(%peer, %cell, "failed to add a negotiated {dir} cell");
            return Err(MsfError::LinkRejected {
                timeslot: cell.timeslot,
                channel_offset: cell.channel_offset,
            });
        };
        info!(%peer, %cell, "added a negotiated {dir} cell");

        if direction == CellDirection::Tx {
            self.store.insert_tx(&peer, cell.timeslot, cell.channel_offset)?;
            if let Some(autonomous) = self.store.take_autonomous_tx(&peer) {
                delete_autonomous_cell(&mut self.schedule, &self.config, &autonomous);
            }
        }
        Ok(added)
    }

    /// Remove a negotiated cell from the schedule and the TX chain.
    pub(super) fn remove_negotiated_cell(&mut self, cell: &Cell) -> bool {
        let sixp_cell = SixpCell::from(cell);
        let dir = if cell.options.is_tx() { "TX" } else { "RX" };
        if cell.options.is_tx() {
            self.store.remove_tx(&cell.peer, &sixp_cell);
            self.relocation.forget(&sixp_cell);
        }
        if self.schedule.remove_link(self.config.negotiated_handle, cell) {
            info!(peer = %cell.peer, cell = %sixp_cell, "removed a negotiated {dir} cell");
            true
        } else {
            error!(peer = %cell.peer, cell = %sixp_cell, "failed to remove a negotiated {dir} cell");
            false
        }
    }

    /// The committed negotiated cell at `cell` shared with `peer`.
    pub(super) fn find_negotiated_cell(
        &self,
        peer: &LinkAddr,
        cell: &SixpCell,
        direction: CellDirection,
    ) -> Option<Cell> {
        self.schedule
            .get_link_by_timeslot(self.config.negotiated_handle, cell.timeslot)
            .filter(|link| {
                link.peer == *peer
                    && link.channel_offset == cell.channel_offset
                    && link.is_negotiated(direction.options())
            })
    }

    /// Reserve up to `cell_list_len` random free cells toward `peer`.
    ///
    /// Slot 0 and the autonomous RX slot are never offered.
    pub(super) fn prepare_candidate_cell_list(&mut self, peer: &LinkAddr) -> ReservationSet {
        let handle = self.config.negotiated_handle;
        let mut reservation = ReservationSet::new();
        let length = match self.schedule.slotframe_length(handle) {
            Some(length) if length > 0 => length,
            _ => return reservation,
        };
        let autonomous_rx_slot = self.autonomous_rx.map(|c| c.timeslot);

        for _ in 0..self.config.cell_list_len {
            let base = self.rng.gen_range(0..length);
            let free = (0..length).map(|i| (base + i) % length).find(|&slot| {
                slot != 0
                    && Some(slot) != autonomous_rx_slot
                    && self.schedule.get_link_by_timeslot(handle, slot).is_none()
            });
            let Some(slot) = free else {
                break;
            };
            let channel_offset = self.rng.gen_range(0..self.config.num_channels);
            if reservation
                .reserve(&mut self.schedule, handle, peer, slot, channel_offset)
                .is_err()
            {
                break;
            }
        }
        reservation
    }

    /// First cell of `cell_list` whose timeslot is free.
    pub(super) fn pick_available_cell(&self, cell_list: &[SixpCell]) -> Option<SixpCell> {
        let handle = self.config.negotiated_handle;
        let length = self.schedule.slotframe_length(handle)?;
        cell_list
            .iter()
            .find(|cell| {
                cell.timeslot < length
                    && cell.channel_offset < self.config.num_channels
                    && self
                        .schedule
                        .get_link_by_timeslot(handle, cell.timeslot)
                        .is_none()
            })
            .copied()
    }

    /// Reserve the first available cell of a peer's candidate list.
    pub(super) fn reserve_from_candidates(&mut self, peer: &LinkAddr, cell_list: &[SixpCell]) -> ReservationSet {
        let mut reservation = ReservationSet::new();
        match self.pick_available_cell(cell_list) {
            Some(cell) => {
                let _ = reservation.reserve(
                    &mut self.schedule,
                    self.config.negotiated_handle,
                    peer,
                    cell.timeslot,
                    cell.channel_offset,
                );
            }
            None => info!(%peer, "none of the cells in the received CellList is available"),
        }
        reservation
    }

    /// React to a non-success response code.
    pub(super) fn handle_error_response(&mut self, peer: LinkAddr, command: Command, code: ReturnCode, now: Instant) {
        match code {
            ReturnCode::ErrSeqnum => {
                error!(%peer, "received {code} for {command}; schedule may be inconsistent; going to send a CLEAR request");
                self.sixp.abort(&peer);
                self.clear_send_request(peer);
            }
            ReturnCode::ErrBusy => {
                info!(%peer, "received {code} for {command}; retry later");
                self.set_random_wait(now);
            }
            ReturnCode::Err => {
                error!(%peer, "received {code} for {command}; the peer may run a different scheduling function");
                self.set_random_wait(now);
            }
            ReturnCode::ErrCelllist if command == Command::Relocate => {
                error!(%peer, "received {code} for {command}; giving up this relocation");
            }
            ReturnCode::ErrCelllist => {
                error!(%peer, "received {code} for {command}; SCHEDULE INCONSISTENCY is likely to happen");
            }
            _ => {
                error!(%peer, "received {code} for {command}; no action defined");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::msf::test_support::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = MsfConfig {
            num_channels: 0,
            ..MsfConfig::default()
        };
        let result = MsfEngine::new(
            config,
            LinkAddr::from_node_id(1),
            crate::schedule::MemorySchedule::new(),
            RecordingSixp::default(),
            rand::rngs::mock::StepRng::new(0, 1),
        );
        assert!(matches!(result, Err(MsfError::Config(_))));
    }

    #[test]
    fn test_activate_installs_autonomous_rx() {
        let t0 = now();
        let mut node = engine(1);
        assert!(!node.is_activated());
        assert_eq!(node.tick(t0), None);

        node.activate(t0).unwrap();
        let rx = node.autonomous_rx_cell().unwrap();
        assert_eq!((rx.timeslot, rx.channel_offset), (2, 1));
        assert!(node.is_activated());

        // activating twice is harmless
        node.activate(t0).unwrap();
        assert_eq!(node.autonomous_rx_cell(), Some(rx));
    }

    #[test]
    fn test_activate_fails_on_existing_slotframe() {
        let t0 = now();
        let mut node = engine(1);
        node.schedule_mut().add_slotframe(1, 101);
        assert!(matches!(
            node.activate(t0),
            Err(MsfError::SlotframeExists { handle: 1 })
        ));
        assert!(!node.is_activated());
    }

    #[test]
    fn test_set_parent_sends_add() {
        let t0 = now();
        let (child, parent) = pair(t0);
        let parent_addr = parent.node_addr();
        assert_eq!(child.parent(), Some(parent_addr));
        assert!(child.schedule().has_slotframe(NEGOTIATED));

        let info = child.transaction(&parent_addr).unwrap();
        assert_eq!(info.command, Command::Add);
        assert_eq!(info.role, Role::Initiator);
        assert_eq!(info.phase, TransactionPhase::RequestQueued);
        assert_eq!(info.reserved_cells.len(), 5);
        let autonomous_rx_slot = child.autonomous_rx_cell().unwrap().timeslot;
        for cell in &info.reserved_cells {
            assert_ne!(cell.timeslot, 0);
            assert_ne!(cell.timeslot, autonomous_rx_slot);
            assert!(cell.channel_offset < 16);
        }
    }

    #[test]
    fn test_exactly_one_add_when_short_of_cells() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        exchange(&mut child, &mut parent, t0);
        let parent_addr = parent.node_addr();

        // one slotframe short of the window, every cell used
        let mut t = t0;
        for _ in 0..99 {
            t += Duration::from_secs(1);
            child.update_num_cells_used(1);
            assert_eq!(child.tick(t), None);
        }
        t += Duration::from_secs(1);
        child.update_num_cells_used(1);
        assert_eq!(child.tick(t), Some(Command::Add));
        assert_eq!(child.num_required_upward_cells(), 2);
        assert_eq!(child.num_negotiated_tx_cells(&parent_addr), 1);

        // the transaction in flight holds further requests back
        for _ in 0..10 {
            t += Duration::from_secs(1);
            assert_eq!(child.tick(t), None);
        }
        let sent = child.sixp_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.command(), Some(Command::Add));
    }

    #[test]
    fn test_update_num_tx_dropped_while_locked() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        exchange(&mut child, &mut parent, t0);
        let parent_addr = parent.node_addr();
        let slot = child.tx_cells(&parent_addr)[0].timeslot;

        let lock = child.schedule_lock();
        {
            let _held = lock.acquire();
            assert!(!child.update_num_tx(slot, 1, MacTxStatus::Ok));
        }
        assert_eq!(child.tx_cells(&parent_addr)[0].stats.num_tx(), 0);

        assert!(child.update_num_tx(slot, 1, MacTxStatus::Ok));
        assert_eq!(child.tx_cells(&parent_addr)[0].stats.num_tx(), 1);
        assert_eq!(child.tx_cells(&parent_addr)[0].stats.num_tx_ack(), 1);

        assert!(!child.update_num_tx(slot, 0, MacTxStatus::Ok));
        assert!(!child.update_num_tx(slot + 1, 1, MacTxStatus::Ok));
    }

    #[test]
    fn test_packet_hooks_manage_autonomous_tx() {
        let t0 = now();
        let mut node = engine(1);
        node.activate(t0).unwrap();
        let dest = LinkAddr::from_node_id(2);

        assert_eq!(node.on_packet_ready(&LinkAddr::BROADCAST), None);
        let cell = node.on_packet_ready(&dest).unwrap();
        assert_eq!((cell.timeslot, cell.channel_offset), (3, 2));
        assert_eq!(node.autonomous_tx_cell(&dest), Some(cell));
        // already there
        assert_eq!(node.on_packet_ready(&dest), None);

        node.on_packet_sent(&dest, MacTxStatus::Ok, 1, 3, false);
        assert_eq!(node.autonomous_tx_cell(&dest), Some(cell));
        node.on_packet_sent(&dest, MacTxStatus::Ok, 1, 3, true);
        assert_eq!(node.autonomous_tx_cell(&dest), None);
        assert!(node.schedule().get_link_by_timeslot(1, 3).is_none());
    }

    #[test]
    fn test_negotiated_cell_replaces_autonomous_tx() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        let parent_addr = parent.node_addr();
        assert!(child.on_packet_ready(&parent_addr).is_some());

        exchange(&mut child, &mut parent, t0);
        assert_eq!(child.autonomous_tx_cell(&parent_addr), None);
        assert!(child.is_negotiated_tx_scheduled());
        assert_eq!(child.on_packet_ready(&parent_addr), None);
    }

    #[test]
    fn test_packet_sent_feeds_bandwidth() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        exchange(&mut child, &mut parent, t0);
        let parent_addr = parent.node_addr();
        let slot = child.tx_cells(&parent_addr)[0].timeslot;

        child.on_packet_sent(&parent_addr, MacTxStatus::NoAck, 3, slot, true);
        assert_eq!(child.bandwidth().used(), 3);
        assert_eq!(child.tx_cells(&parent_addr)[0].stats.num_tx(), 3);
        assert_eq!(child.tx_cells(&parent_addr)[0].stats.num_tx_ack(), 0);
    }

    #[test]
    fn test_deactivate_removes_everything() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        exchange(&mut child, &mut parent, t0);
        let parent_addr = parent.node_addr();
        child.add_send_request(parent_addr, t0);

        child.deactivate();
        assert!(!child.is_activated());
        assert!(child.schedule().slotframe_handles().is_empty());
        assert_eq!(child.num_negotiated_tx_cells(&parent_addr), 0);
        assert!(child.transaction(&parent_addr).is_none());
        assert_eq!(child.sixp().aborted, vec![parent_addr]);
        assert_eq!(child.tick(t0), None);
        assert_eq!(child.on_packet_ready(&parent_addr), None);
    }

    #[test]
    fn test_foreign_sfid_ignored() {
        let t0 = now();
        let mut parent = engine(1);
        parent.activate(t0).unwrap();
        let child = LinkAddr::from_node_id(2);
        parent.sixp_mut().begin(child, Command::Clear);
        parent.on_input(child, SixpPacket::request(9, RequestBody::Clear), t0);
        assert!(parent.sixp_mut().take_sent().is_empty());
    }

    #[test]
    fn test_input_without_transaction_ignored() {
        let t0 = now();
        let mut parent = engine(1);
        parent.activate(t0).unwrap();
        let child = LinkAddr::from_node_id(2);
        parent.on_input(child, SixpPacket::request(0, RequestBody::Clear), t0);
        assert!(parent.sixp_mut().take_sent().is_empty());
        // the negotiated slotframe is there for the next packet
        assert!(parent.schedule().has_slotframe(NEGOTIATED));
    }

    #[test]
    fn test_unsupported_command_answered_error() {
        let t0 = now();
        let mut parent = engine(1);
        parent.activate(t0).unwrap();
        let child = LinkAddr::from_node_id(2);
        parent.sixp_mut().begin(child, Command::Count);
        parent.on_input(
            child,
            SixpPacket::request(0, RequestBody::Unsupported(Command::Count)),
            t0,
        );
        let (_, response) = parent.sixp_mut().pop_sent().unwrap();
        assert_eq!(response.return_code(), Some(ReturnCode::Err));
    }

    #[test]
    fn test_confirmation_ignored() {
        let t0 = now();
        let mut parent = engine(1);
        parent.activate(t0).unwrap();
        let child = LinkAddr::from_node_id(2);
        parent.sixp_mut().begin(child, Command::Add);
        let packet = SixpPacket {
            sfid: 0,
            message: SixpMessage::Confirmation {
                code: ReturnCode::Success,
                cell_list: Vec::new(),
            },
        };
        parent.on_input(child, packet, t0);
        assert!(parent.sixp_mut().take_sent().is_empty());
    }

    #[test]
    fn test_new_request_releases_stale_reservation() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        let child_addr = child.node_addr();

        // the response is never confirmed sent
        deliver_request(&mut child, &mut parent, t0);
        assert_eq!(parent.transaction(&child_addr).unwrap().role, Role::Responder);
        parent.sixp_mut().take_sent();
        parent.sixp_mut().complete(&child_addr);

        parent.sixp_mut().begin(child_addr, Command::Clear);
        parent.on_input(child_addr, SixpPacket::request(0, RequestBody::Clear), t0);
        assert!(parent.transaction(&child_addr).is_none());
        assert!(parent.schedule().links(NEGOTIATED).is_empty());
    }

    #[test]
    fn test_output_failure_on_request() {
        let t0 = now();
        let mut parent = engine(1);
        parent.activate(t0).unwrap();
        let mut child = engine(2);
        child.activate(t0).unwrap();
        child.sixp_mut().refuse_output = true;

        child.set_parent(Some(parent.node_addr()), t0).unwrap();
        assert!(child.transaction(&parent.node_addr()).is_none());
        assert!(child.schedule().links(NEGOTIATED).is_empty());
        assert!(child.is_waiting(t0));
    }

    #[test]
    fn test_lost_parent_resets_required() {
        let t0 = now();
        let (mut child, mut parent) = pair(t0);
        exchange(&mut child, &mut parent, t0);

        child.set_parent(None, t0).unwrap();
        assert_eq!(child.parent(), None);
        assert_eq!(child.num_required_upward_cells(), 1);
        assert!(!child.is_negotiated_tx_scheduled());
        assert_eq!(child.tick(t0), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_tx_cells_capped_and_sorted(rounds in 1usize..8) {
            let t0 = now();
            let config = MsfConfig {
                max_negotiated_tx_cells: 3,
                ..MsfConfig::default()
            };
            let mut parent = engine(1);
            parent.activate(t0).unwrap();
            let mut child = engine_with(2, config);
            child.activate(t0).unwrap();
            child.set_parent(Some(parent.node_addr()), t0).unwrap();
            let parent_addr = parent.node_addr();

            for _ in 0..rounds {
                if child.transaction(&parent_addr).is_some() {
                    exchange(&mut child, &mut parent, t0);
                }
                child.add_send_request(parent_addr, t0);
            }

            let chain = child.tx_cells(&parent_addr);
            prop_assert!(chain.len() <= 3);
            prop_assert!(chain.windows(2).all(|w| w[0].timeslot > w[1].timeslot));
        }
    }
}
