//! Medium-access protocols.
//!
//! Two interchangeable flavours behind one contract:
//! - [`ScheduleMac`]: deterministic TDMA from an interference-graph colouring
//! - [`ListenMac`]: stochastic listen-before-transmit with windowed back-off
//!
//! The contract: `initial_schedule` seeds the processing queue, `step`
//! consumes a due batch and yields the transmitting nodes plus the follow-up
//! batches, and `reset` returns the protocol to its post-construction state.
//! Only the listen flavour participates in hearing (`witness_interval` /
//! `apply_hearing`); the schedule flavour needs no channel feedback.

pub mod listen;
pub mod schedule;

pub use listen::ListenMac;
pub use schedule::ScheduleMac;

use rand::Rng;

use crate::timeline::Batch;

/// A configured medium-access protocol instance.
pub enum MacProtocol {
    Schedule(ScheduleMac),
    Listen(ListenMac),
}

impl MacProtocol {
    /// Batches seeding the processing queue at simulation start.
    pub fn initial_schedule<R: Rng>(&self, t0: f64, rng: &mut R) -> Vec<Batch> {
        match self {
            MacProtocol::Schedule(mac) => mac.initial_schedule(t0),
            MacProtocol::Listen(mac) => mac.initial_schedule(t0, rng),
        }
    }

    /// Process one due batch: which nodes transmit now, and when the batch
    /// nodes are due again.
    pub fn step<R: Rng>(&mut self, batch_nodes: &[usize], has_message: &[bool], now: f64, rng: &mut R) -> (Vec<usize>, Vec<Batch>) {
        match self {
            MacProtocol::Schedule(mac) => mac.step(batch_nodes, has_message, now),
            MacProtocol::Listen(mac) => mac.step(batch_nodes, has_message, now, rng),
        }
    }

    /// The hearing window and listening nodes for this batch, if the flavour
    /// listens at all.
    pub fn witness_interval(&self, batch_nodes: &[usize], has_message: &[bool], now: f64) -> Option<((f64, f64), Vec<usize>)> {
        match self {
            MacProtocol::Schedule(_) => None,
            MacProtocol::Listen(mac) => Some(mac.witness_interval(batch_nodes, has_message, now)),
        }
    }

    /// Report hearing outcomes back to the protocol. No-op for the schedule
    /// flavour.
    pub fn apply_hearing(&mut self, candidates: &[usize], heard: &[usize]) {
        if let MacProtocol::Listen(mac) = self {
            mac.apply_hearing(candidates, heard);
        }
    }

    pub fn reset(&mut self) {
        match self {
            MacProtocol::Schedule(mac) => mac.reset(),
            MacProtocol::Listen(mac) => mac.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn schedule_flavour_does_not_listen() {
        let mac = MacProtocol::Schedule(ScheduleMac::new(&vec![Vec::new(); 3]));
        assert!(mac.witness_interval(&[0, 1], &[true, true, true], 1.0).is_none());
    }

    #[test]
    fn listen_flavour_reports_its_window() {
        let mac = MacProtocol::Listen(ListenMac::new(3));
        let (interval, listeners) = mac.witness_interval(&[0, 2], &[true, false, true], 4.0).unwrap();
        assert_eq!(interval.1, 4.0);
        assert_eq!(listeners, vec![0, 2]);
    }

    #[test]
    fn both_flavours_seed_every_node_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for mac in [
            MacProtocol::Schedule(ScheduleMac::new(&vec![Vec::new(); 5])),
            MacProtocol::Listen(ListenMac::new(5)),
        ] {
            let batches = mac.initial_schedule(0.0, &mut rng);
            let mut nodes: Vec<usize> = batches.iter().flat_map(|b| b.nodes.clone()).collect();
            nodes.sort_unstable();
            assert_eq!(nodes, vec![0, 1, 2, 3, 4]);
        }
    }
}
