//! Connectivity graphs built from node positions.
//!
//! Two graphs are derived from the same deployment:
//! - The communication graph `G_c`: pairs whose reception probability at
//!   their distance exceeds the reliability threshold. Each edge stores that
//!   probability for the reception draws of the event loop.
//! - The interference adjacency `G_i`: pairs closer than the interference
//!   radius, a strictly geometric bound used by the TDMA colouring.
//!
//! Both are symmetric, self-loop free, and immutable after construction.

use log::info;
use std::collections::HashMap;

use crate::geometry::{self, Point};
use crate::signal_calculations::ReceptionModel;

/// Canonical undirected edge key: endpoints sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(pub usize, pub usize);

impl EdgeKey {
    /// Canonicalize an endpoint pair. Callers keep the direction separately.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// Communication graph over the deployed nodes.
pub struct CommunicationGraph {
    /// Neighbour lists, index-aligned with the node list.
    adjacency: Vec<Vec<usize>>,
    /// Reception probability per canonical edge.
    edge_probability: HashMap<EdgeKey, f64>,
    /// Canonical edges in construction order.
    keys: Vec<EdgeKey>,
}

impl CommunicationGraph {
    /// Build the graph by thresholding pairwise reception probability.
    ///
    /// An unordered pair (i, j) becomes an edge when
    /// `model.probability(dist(i, j), f_val) > reliability`.
    pub fn build(points: &[Point], model: ReceptionModel, f_val: f64, reliability: f64) -> Self {
        let mut adjacency = vec![Vec::new(); points.len()];
        let mut edge_probability = HashMap::new();
        let mut keys = Vec::new();

        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let d = geometry::dist(points[i], points[j]);
                let p = model.probability(d, f_val);
                if p > reliability {
                    let key = EdgeKey(i, j);
                    edge_probability.insert(key, p);
                    keys.push(key);
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }

        info!("communication graph: {} nodes, {} edges", points.len(), keys.len());

        Self {
            adjacency,
            edge_probability,
            keys,
        }
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.adjacency
    }

    pub fn edges(&self) -> &[EdgeKey] {
        &self.keys
    }

    pub fn contains_edge(&self, a: usize, b: usize) -> bool {
        self.edge_probability.contains_key(&EdgeKey::new(a, b))
    }

    /// Stored reception probability of the edge, if it exists.
    pub fn edge_probability(&self, a: usize, b: usize) -> Option<f64> {
        self.edge_probability.get(&EdgeKey::new(a, b)).copied()
    }
}

/// Interference neighbour lists: pairs strictly closer than `radius`.
pub fn interference_adjacency(points: &[Point], radius: f64) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); points.len()];
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if geometry::dist(points[i], points[j]) < radius {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }
    adjacency
}
