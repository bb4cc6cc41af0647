//! MSF simulation.
//!
//! A child and its parent negotiate cells over an in-memory 6P loopback
//! while the child's traffic rises and falls. The parent, as coordinator,
//! also runs channel selection against a jammed channel.
//!
//! Environment variables:
//! - MSF_SIM_SLOTFRAMES: number of slotframes to simulate (default 1200)
//! - RUST_LOG: log filter (default info)

use std::collections::HashMap;
use std::error::Error;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tsch_msf::prelude::*;

/// 6P layer that holds outgoing packets until the simulation delivers them.
#[derive(Debug, Default)]
struct Loopback {
    outbox: Vec<(LinkAddr, SixpPacket)>,
    transactions: HashMap<LinkAddr, Command>,
}

impl SixpLayer for Loopback {
    fn output(&mut self, dest: LinkAddr, packet: SixpPacket) -> Result<(), SixpError> {
        if let Some(command) = packet.command() {
            if self.transactions.contains_key(&dest) {
                return Err(SixpError::Busy { peer: dest });
            }
            self.transactions.insert(dest, command);
        }
        self.outbox.push((dest, packet));
        Ok(())
    }

    fn find_transaction(&self, peer: &LinkAddr) -> Option<SixpTransaction> {
        self.transactions.get(peer).map(|&command| SixpTransaction { peer: *peer, command })
    }

    fn abort(&mut self, peer: &LinkAddr) {
        self.transactions.remove(peer);
    }
}

type Node = MsfEngine<MemorySchedule, Loopback, StdRng>;

fn node(id: u16) -> Result<Node, MsfError> {
    MsfEngine::new(
        MsfConfig::default(),
        LinkAddr::from_node_id(id),
        MemorySchedule::new(),
        Loopback::default(),
        StdRng::seed_from_u64(u64::from(id)),
    )
}

/// Deliver everything `from` queued toward `to`.
fn deliver(from: &mut Node, to: &mut Node, now: Instant) {
    let from_addr = from.node_addr();
    let to_addr = to.node_addr();
    for (dest, packet) in std::mem::take(&mut from.sixp_mut().outbox) {
        if dest != to_addr {
            from.on_output_status(dest, OutputStatus::Failure, now);
            continue;
        }
        from.on_output_status(dest, OutputStatus::Success, now);
        match packet.command() {
            Some(command) => {
                to.sixp_mut().transactions.insert(from_addr, command);
                to.on_input(from_addr, packet, now);
            }
            None => {
                from.sixp_mut().transactions.remove(&dest);
                to.on_input(from_addr, packet, now);
                to.sixp_mut().transactions.remove(&from_addr);
            }
        }
    }
}

/// Packets per slotframe the child wants to send at `slotframe`.
fn offered_load(slotframe: u32, total: u32) -> usize {
    match slotframe * 4 / total.max(1) {
        0 => 1,
        1 => 3,
        2 => 2,
        _ => 0,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let slotframes: u32 = std::env::var("MSF_SIM_SLOTFRAMES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1200);

    let start = Instant::now();
    let mut parent = node(1)?;
    let mut child = node(2)?;
    parent.activate(start)?;
    child.activate(start)?;
    child.set_parent(Some(parent.node_addr()), start)?;
    let parent_addr = parent.node_addr();

    let selector_config = ChannelSelectorConfig::default();
    let mut stats = selector_config.stats();
    let mut sequence: Vec<u8> = (11..=18).collect();
    let mut selector = ChannelSelector::new(selector_config, &sequence, start)?;
    let mut noise = StdRng::seed_from_u64(0x15);

    let interval = child.config().slotframe_interval();
    let mut now = start;
    for slotframe in 0..slotframes {
        now += interval;

        let load = offered_load(slotframe, slotframes);
        let cells: Vec<u16> = child.tx_cells(&parent_addr).iter().map(|c| c.timeslot).collect();
        for &timeslot in cells.iter().take(load) {
            let status = if noise.gen_range(0..100) < 95 { MacTxStatus::Ok } else { MacTxStatus::NoAck };
            child.on_packet_sent(&parent_addr, status, 1, timeslot, false);
        }

        child.tick(now);
        parent.tick(now);
        deliver(&mut child, &mut parent, now);
        deliver(&mut parent, &mut child, now);

        // channel 15 is jammed most of the time
        for channel in stats.channels().collect::<Vec<_>>() {
            let busy_odds = if channel == 15 { 90 } else { 5 };
            let is_free = noise.gen_range(0..100) >= busy_odds;
            let old = stats.record_free_sample(channel, is_free)?;
            selector.channel_stats_updated(channel, old, &stats, now);
        }
        if let Some(replacement) = selector.process(now, &stats, &mut sequence) {
            info!(
                old = replacement.old,
                new = replacement.new,
                ?sequence,
                "hopping sequence updated"
            );
        }

        if slotframe % 100 == 99 {
            info!(
                slotframe = slotframe + 1,
                load,
                required = child.num_required_upward_cells(),
                committed = child.num_negotiated_tx_cells(&parent_addr),
                parent_rx = parent.rx_cells(&child.node_addr()).len(),
                "bandwidth"
            );
        }
    }

    if child.num_negotiated_tx_cells(&parent_addr) != parent.rx_cells(&child.node_addr()).len() {
        warn!("child and parent schedules disagree");
    }
    info!(
        committed = child.num_negotiated_tx_cells(&parent_addr),
        current = %selector.current_bitmap(),
        initial = %selector.initial_bitmap(),
        "simulation finished"
    );
    Ok(())
}
