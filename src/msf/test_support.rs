//! Test doubles for driving engines against each other.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::constants::SLOTFRAME_HANDLE_NEGOTIATED_CELLS;
use crate::core::{LinkAddr, SixpError, SixpLayer};
use crate::schedule::MemorySchedule;
use crate::sixp::{Command, OutputStatus, SixpPacket, SixpTransaction};

use super::{MsfConfig, MsfEngine};

pub const NEGOTIATED: u16 = SLOTFRAME_HANDLE_NEGOTIATED_CELLS;

pub type TestEngine = MsfEngine<MemorySchedule, RecordingSixp, StdRng>;

/// 6P layer that queues outgoing packets for the test to deliver.
#[derive(Debug, Default)]
pub struct RecordingSixp {
    sent: VecDeque<(LinkAddr, SixpPacket)>,
    transactions: HashMap<LinkAddr, Command>,
    pub aborted: Vec<LinkAddr>,
    pub refuse_output: bool,
}

impl RecordingSixp {
    /// Open a transaction as if `peer` had sent a request.
    pub fn begin(&mut self, peer: LinkAddr, command: Command) {
        self.transactions.insert(peer, command);
    }

    /// Close the transaction with `peer`.
    pub fn complete(&mut self, peer: &LinkAddr) {
        self.transactions.remove(peer);
    }

    pub fn pop_sent(&mut self) -> Option<(LinkAddr, SixpPacket)> {
        self.sent.pop_front()
    }

    pub fn take_sent(&mut self) -> Vec<(LinkAddr, SixpPacket)> {
        self.sent.drain(..).collect()
    }
}

impl SixpLayer for RecordingSixp {
    fn output(&mut self, dest: LinkAddr, packet: SixpPacket) -> Result<(), SixpError> {
        if self.refuse_output {
            return Err(SixpError::QueueFull);
        }
        if let Some(command) = packet.command() {
            if self.transactions.contains_key(&dest) {
                return Err(SixpError::Busy { peer: dest });
            }
            self.transactions.insert(dest, command);
        }
        self.sent.push_back((dest, packet));
        Ok(())
    }

    fn find_transaction(&self, peer: &LinkAddr) -> Option<SixpTransaction> {
        self.transactions.get(peer).map(|&command| SixpTransaction {
            peer: *peer,
            command,
        })
    }

    fn abort(&mut self, peer: &LinkAddr) {
        self.transactions.remove(peer);
        self.aborted.push(*peer);
    }
}

pub fn now() -> Instant {
    Instant::now()
}

pub fn engine(node: u16) -> TestEngine {
    engine_with(node, MsfConfig::default())
}

pub fn engine_with(node: u16, config: MsfConfig) -> TestEngine {
    MsfEngine::new(
        config,
        LinkAddr::from_node_id(node),
        MemorySchedule::new(),
        RecordingSixp::default(),
        StdRng::seed_from_u64(u64::from(node)),
    )
    .unwrap()
}

/// Activated child (node 2) that just sent its first ADD to an activated
/// parent (node 1).
pub fn pair(now: Instant) -> (TestEngine, TestEngine) {
    let mut parent = engine(1);
    parent.activate(now).unwrap();
    let mut child = engine(2);
    child.activate(now).unwrap();
    child.set_parent(Some(parent.node_addr()), now).unwrap();
    (child, parent)
}

/// Deliver `from`'s oldest queued request to `to`.
pub fn deliver_request(from: &mut TestEngine, to: &mut TestEngine, now: Instant) {
    let (dest, packet) = from.sixp_mut().pop_sent().expect("a queued request");
    assert_eq!(dest, to.node_addr());
    let command = packet.command().expect("a request");
    from.on_output_status(dest, OutputStatus::Success, now);
    to.sixp_mut().begin(from.node_addr(), command);
    to.on_input(from.node_addr(), packet, now);
}

/// Deliver `from`'s oldest queued response to `to` and close the
/// transaction on both sides.
pub fn deliver_response(from: &mut TestEngine, to: &mut TestEngine, now: Instant) {
    let (dest, packet) = from.sixp_mut().pop_sent().expect("a queued response");
    assert_eq!(dest, to.node_addr());
    from.on_output_status(dest, OutputStatus::Success, now);
    from.sixp_mut().complete(&dest);
    to.on_input(from.node_addr(), packet, now);
    to.sixp_mut().complete(&from.node_addr());
}

/// Run a full request/response between `initiator` and `responder`.
pub fn exchange(initiator: &mut TestEngine, responder: &mut TestEngine, now: Instant) {
    deliver_request(initiator, responder, now);
    deliver_response(responder, initiator, now);
}
