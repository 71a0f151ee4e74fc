//! Listen-before-transmit protocol with a windowed random back-off.
//!
//! Each node keeps a counter of silent listens still required before it may
//! transmit. A scheduled node first learns whether it heard anything in the
//! slot ending now: hearing resets the counter to the full listen depth,
//! silence decrements it. A node whose counter reaches zero transmits, then
//! backs off by a uniform draw from the window; a blocked holder retries one
//! slot later, and a node without the message re-enters after a full back-off
//! draw.

use rand::Rng;

use crate::signal_calculations::from_sec_to_unit;
use crate::timeline::Batch;

/// Consecutive silent listens required before a transmission.
pub const DURATION_OF_HEARING: u8 = 2;

/// Back-off window exponent: offsets are drawn from 2^12 slots.
const WINDOW_EXPONENT: u32 = 12;

/// Wall-clock slot length in seconds.
const SLOT_LENGTH_SECS: f64 = 0.0125;

pub struct ListenMac {
    /// Remaining silent listens per node, in 0..=DURATION_OF_HEARING.
    hearing_state: Vec<u8>,
    /// Slot length in time units.
    slot_length: f64,
}

impl ListenMac {
    pub fn new(node_count: usize) -> Self {
        Self {
            hearing_state: vec![DURATION_OF_HEARING; node_count],
            slot_length: from_sec_to_unit(SLOT_LENGTH_SECS),
        }
    }

    /// Slot length in time units.
    pub fn slot_length(&self) -> f64 {
        self.slot_length
    }

    pub fn hearing_state(&self, node: usize) -> u8 {
        self.hearing_state[node]
    }

    /// Uniform back-off: 1 to 2^12 whole slots.
    fn rand_offset<R: Rng>(&self, rng: &mut R) -> f64 {
        let window = 1u64 << WINDOW_EXPONENT;
        (rng.gen_range(0..window) + 1) as f64 * self.slot_length
    }

    /// Every node enters the queue individually at a random back-off from
    /// `t0`; nodes drawing the same offset share a batch.
    pub fn initial_schedule<R: Rng>(&self, t0: f64, rng: &mut R) -> Vec<Batch> {
        let mut batches: Vec<Batch> = Vec::new();
        for node in 0..self.hearing_state.len() {
            let time = t0 + self.rand_offset(rng);
            push_bucketed(&mut batches, time, node);
        }
        batches
    }

    /// The slot the batch's message holders listen on: `(now - slot, now)`.
    ///
    /// Returns the interval and the nodes whose hearing outcome the driver
    /// must report back through [`Self::apply_hearing`].
    pub fn witness_interval(&self, batch_nodes: &[usize], has_message: &[bool], now: f64) -> ((f64, f64), Vec<usize>) {
        let listeners = batch_nodes.iter().copied().filter(|&node| has_message[node]).collect();
        ((now - self.slot_length, now), listeners)
    }

    /// Apply hearing outcomes: a node that heard a transmission restarts its
    /// listen count, a silent one gets one listen closer to transmitting.
    pub fn apply_hearing(&mut self, candidates: &[usize], heard: &[usize]) {
        for &node in candidates {
            if heard.contains(&node) {
                self.hearing_state[node] = DURATION_OF_HEARING;
            } else {
                self.hearing_state[node] = self.hearing_state[node].saturating_sub(1);
            }
        }
    }

    /// Process a batch: cleared holders transmit and back off, blocked
    /// holders retry next slot, nodes without the message re-enter after a
    /// full back-off draw.
    pub fn step<R: Rng>(&mut self, batch_nodes: &[usize], has_message: &[bool], now: f64, rng: &mut R) -> (Vec<usize>, Vec<Batch>) {
        let mut send_nodes = Vec::new();
        let mut batches: Vec<Batch> = Vec::new();

        for &node in batch_nodes.iter().filter(|&&node| has_message[node]) {
            let time = if self.hearing_state[node] == 0 {
                send_nodes.push(node);
                self.hearing_state[node] = DURATION_OF_HEARING;
                now + self.rand_offset(rng)
            } else {
                now + self.slot_length
            };
            push_bucketed(&mut batches, time, node);
        }

        for &node in batch_nodes.iter().filter(|&&node| !has_message[node]) {
            let time = now + self.rand_offset(rng);
            push_bucketed(&mut batches, time, node);
        }

        (send_nodes, batches)
    }

    pub fn reset(&mut self) {
        self.hearing_state.fill(DURATION_OF_HEARING);
    }
}

/// Append `node` to the batch with exactly this time, creating it if absent.
/// Identical arithmetic produces identical floats, so whole-slot offsets
/// bucket reliably.
fn push_bucketed(batches: &mut Vec<Batch>, time: f64, node: usize) {
    match batches.iter_mut().find(|batch| batch.time == time) {
        Some(batch) => batch.nodes.push(node),
        None => batches.push(Batch { time, nodes: vec![node] }),
    }
}
