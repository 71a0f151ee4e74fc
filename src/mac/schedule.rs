//! Deterministic TDMA schedule from a greedy interference-graph colouring.
//!
//! Nodes are coloured so that no two interference neighbours share a colour;
//! each colour owns one slot of the cycle, and the whole cycle repeats
//! forever. Within a colour no collisions are possible by construction: every
//! same-colour pair is at least one interference radius apart.

use log::info;

use crate::timeline::Batch;

/// Colour a node is still missing.
const UNCOLOURED: usize = usize::MAX;

pub struct ScheduleMac {
    colour_of: Vec<usize>,
    /// Node lists per colour, in ascending node order.
    colour_buckets: Vec<Vec<usize>>,
    max_colour: usize,
    /// Slot geometry, dimensionless. The effective slot step is
    /// `slot_length - slot_overlap`.
    slot_length: f64,
    slot_overlap: f64,
}

impl ScheduleMac {
    /// Greedily colour the interference graph in node-index order.
    ///
    /// Each node takes the smallest colour not used by an already-coloured
    /// interference neighbour.
    pub fn new(interference_adjacency: &[Vec<usize>]) -> Self {
        let node_count = interference_adjacency.len();
        let mut colour_of = vec![UNCOLOURED; node_count];
        let mut available = vec![false; node_count + 1];

        for u in 0..node_count {
            for &v in &interference_adjacency[u] {
                if colour_of[v] != UNCOLOURED {
                    available[colour_of[v]] = true;
                }
            }
            let mut colour = 0;
            while available[colour] {
                colour += 1;
            }
            colour_of[u] = colour;
            for &v in &interference_adjacency[u] {
                if colour_of[v] != UNCOLOURED {
                    available[colour_of[v]] = false;
                }
            }
        }

        let max_colour = colour_of.iter().copied().max().unwrap_or(0);
        let max_valence = interference_adjacency.iter().map(Vec::len).max().unwrap_or(0);
        let mut colour_buckets = vec![Vec::new(); max_colour + 1];
        for (node, &colour) in colour_of.iter().enumerate() {
            colour_buckets[colour].push(node);
        }

        info!("schedule colouring: max valence {}, max colour {}", max_valence, max_colour);

        Self {
            colour_of,
            colour_buckets,
            max_colour,
            slot_length: 1.0,
            slot_overlap: 0.0,
        }
    }

    fn slot_step(&self) -> f64 {
        self.slot_length - self.slot_overlap
    }

    /// Length of one full cycle: one slot per colour.
    pub fn cycle_length(&self) -> f64 {
        (self.max_colour + 1) as f64 * self.slot_step()
    }

    pub fn colour_of(&self, node: usize) -> usize {
        self.colour_of[node]
    }

    pub fn max_colour(&self) -> usize {
        self.max_colour
    }

    /// One batch per colour, spaced a slot step apart from `t0`. An empty
    /// deployment seeds nothing.
    pub fn initial_schedule(&self, t0: f64) -> Vec<Batch> {
        self.colour_buckets
            .iter()
            .enumerate()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(colour, nodes)| Batch {
                time: t0 + colour as f64 * self.slot_step(),
                nodes: nodes.clone(),
            })
            .collect()
    }

    /// Every batch node holding the message transmits; the batch re-enters
    /// the queue one cycle later.
    pub fn step(&self, batch_nodes: &[usize], has_message: &[bool], now: f64) -> (Vec<usize>, Vec<Batch>) {
        let send_nodes = batch_nodes.iter().copied().filter(|&node| has_message[node]).collect();
        let next = vec![Batch {
            time: now + self.cycle_length(),
            nodes: batch_nodes.to_vec(),
        }];
        (send_nodes, next)
    }

    /// The colouring is static; nothing to reset.
    pub fn reset(&mut self) {}
}
