//! Traffic counters and channel-occupancy statistics.
//!
//! Contains:
//! - [`TrafficLog`]: per-node transmission attempts and per-directed-edge
//!   (sent, collisions) counters filled in by the event loop
//! - Free-slot estimation: per-node heard-transmission times, slot-tick
//!   occupancy counts, and the empty-slot probability from zero-run counting
//! - Interior filters excluding nodes (and edges) within one interference
//!   radius of the region boundary, where edge effects distort the averages

use std::collections::HashMap;

use crate::geometry::{self, Point};
use crate::network::CommunicationGraph;
use crate::signal_calculations::from_sec_to_unit;
use crate::timeline::Timeline;

/// Tick length of the occupancy grid, in time units (one back-off slot).
const TICK_LENGTH_SECS: f64 = 0.0125;

/// Counters of one directed communication edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeCounter {
    /// Transmissions whose window reached the receiver.
    pub sent: u64,
    /// Of those, transmissions destroyed by an interferer.
    pub collisions: u64,
}

/// Run counters, reset between runs.
pub struct TrafficLog {
    attempts: Vec<u64>,
    edge_counters: HashMap<(usize, usize), EdgeCounter>,
}

impl TrafficLog {
    /// Pre-populate a counter for every directed edge of the graph.
    pub fn new(adjacency: &[Vec<usize>]) -> Self {
        let mut edge_counters = HashMap::new();
        for (i, neighbours) in adjacency.iter().enumerate() {
            for &j in neighbours {
                edge_counters.insert((i, j), EdgeCounter::default());
            }
        }
        Self {
            attempts: vec![0; adjacency.len()],
            edge_counters,
        }
    }

    /// Count one transmission attempt for each listed node.
    pub fn add_attempts(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.attempts[node] += 1;
        }
    }

    pub fn add_sent(&mut self, edge: (usize, usize), count: u64) {
        self.edge_counters.entry(edge).or_default().sent += count;
    }

    pub fn add_collisions(&mut self, edge: (usize, usize), count: u64) {
        self.edge_counters.entry(edge).or_default().collisions += count;
    }

    pub fn attempts(&self, node: usize) -> u64 {
        self.attempts[node]
    }

    pub fn edge_counter(&self, edge: (usize, usize)) -> Option<EdgeCounter> {
        self.edge_counters.get(&edge).copied()
    }

    pub fn edge_counters(&self) -> impl Iterator<Item = (&(usize, usize), &EdgeCounter)> {
        self.edge_counters.iter()
    }

    pub fn totals(&self) -> EdgeCounter {
        let mut total = EdgeCounter::default();
        for counter in self.edge_counters.values() {
            total.sent += counter.sent;
            total.collisions += counter.collisions;
        }
        total
    }

    pub fn reset(&mut self) {
        self.attempts.fill(0);
        for counter in self.edge_counters.values_mut() {
            *counter = EdgeCounter::default();
        }
    }
}

/// Neighbour transmissions as heard at each node: every communication
/// neighbour's send times shifted by the propagation delay d/R, merged and
/// sorted per receiver.
pub fn heard_times_by_node(points: &[Point], graph: &CommunicationGraph, timeline: &Timeline, radius: f64) -> Vec<Vec<f64>> {
    let mut heard = vec![Vec::new(); points.len()];
    for (node, times) in heard.iter_mut().enumerate() {
        for &neighbour in graph.neighbors(node) {
            let delay = geometry::dist(points[node], points[neighbour]) / radius;
            times.extend(timeline.send_history(neighbour).iter().map(|&t| t + delay));
        }
        times.sort_by(f64::total_cmp);
    }
    heard
}

/// Tick length of the occupancy grid, in time units.
pub fn tick_length() -> f64 {
    from_sec_to_unit(TICK_LENGTH_SECS)
}

/// Partition [0, last_time) into ticks and count the heard transmissions per
/// tick (`heard` must be sorted ascending).
pub fn count_ticks(heard: &[f64], last_time: f64) -> Vec<usize> {
    let tick = tick_length();
    let mut counts = Vec::new();
    let mut begin = 0.0;
    let mut end = tick;
    while begin < last_time {
        let i = heard.partition_point(|&t| t < begin);
        let j = heard.partition_point(|&t| t <= end);
        counts.push(j - i);
        begin = end;
        end += tick;
    }
    counts
}

/// Fraction of tick positions starting a silent stretch of at least
/// `zero_size` ticks.
///
/// Scans maximal runs of zero-count ticks; a closed run of length ℓ credits
/// ℓ − zero_size + 1 start positions. A trailing run still open at the end of
/// the grid is not credited.
pub fn free_slot_probability(ticks: &[usize], zero_size: usize) -> f64 {
    if ticks.is_empty() {
        return 0.0;
    }
    let mut credit: i64 = 0;
    let mut in_zero = false;
    let mut run_begin = 0;
    for (i, &count) in ticks.iter().enumerate() {
        if count == 0 && !in_zero {
            run_begin = i;
            in_zero = true;
        }
        if count != 0 && in_zero {
            in_zero = false;
            credit += (i - run_begin) as i64 - zero_size as i64 + 1;
        }
    }
    credit as f64 / ticks.len() as f64
}

/// Nodes at least `radius` inside the deployment rectangle on both axes.
pub fn interior_nodes(points: &[Point], radius: f64, center: Point, width: f64, height: f64) -> Vec<usize> {
    let mut interior = Vec::new();
    for (index, p) in points.iter().enumerate() {
        let horizontal = center.x - width / 2.0 + radius <= p.x && p.x <= center.x + width / 2.0 - radius;
        let vertical = center.y - height / 2.0 + radius <= p.y && p.y <= center.y + height / 2.0 - radius;
        if horizontal && vertical {
            interior.push(index);
        }
    }
    interior
}

/// Collision statistics over directed edges with both endpoints interior:
/// per-edge collision ratios and the aggregate collisions/sent ratio.
/// Edges that never carried a transmission contribute no ratio.
pub fn interior_edge_summary(log: &TrafficLog, interior: &[usize]) -> (Vec<f64>, f64) {
    let interior: std::collections::HashSet<usize> = interior.iter().copied().collect();
    let mut ratios = Vec::new();
    let mut total = EdgeCounter::default();
    for (&(i, j), counter) in log.edge_counters() {
        if interior.contains(&i) && interior.contains(&j) {
            if counter.sent > 0 {
                ratios.push(counter.collisions as f64 / counter.sent as f64);
            }
            total.sent += counter.sent;
            total.collisions += counter.collisions;
        }
    }
    let aggregate = if total.sent > 0 { total.collisions as f64 / total.sent as f64 } else { 0.0 };
    (ratios, aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_calculations::ReceptionModel;

    #[test]
    fn traffic_log_accumulates_and_resets() {
        let adjacency = vec![vec![1], vec![0]];
        let mut log = TrafficLog::new(&adjacency);
        log.add_attempts(&[0, 0, 1]);
        log.add_sent((0, 1), 3);
        log.add_collisions((0, 1), 1);

        assert_eq!(log.attempts(0), 2);
        assert_eq!(log.attempts(1), 1);
        assert_eq!(log.edge_counter((0, 1)), Some(EdgeCounter { sent: 3, collisions: 1 }));
        assert_eq!(log.edge_counter((1, 0)), Some(EdgeCounter::default()));
        assert_eq!(log.totals(), EdgeCounter { sent: 3, collisions: 1 });

        log.reset();
        assert_eq!(log.attempts(0), 0);
        assert_eq!(log.edge_counter((0, 1)), Some(EdgeCounter::default()));
    }

    #[test]
    fn count_ticks_buckets_heard_times() {
        let tick = tick_length();
        let heard = vec![0.5 * tick, 0.6 * tick, 2.5 * tick];
        let counts = count_ticks(&heard, 4.0 * tick);
        assert_eq!(counts, vec![2, 0, 1, 0]);
    }

    #[test]
    fn free_slot_probability_counts_closed_zero_runs() {
        // One closed run of 3 zeros and one trailing (uncounted) zero.
        let ticks = vec![1, 0, 0, 0, 2, 0];
        assert!((free_slot_probability(&ticks, 1) - 3.0 / 6.0).abs() < 1e-12);
        // Threshold 2: run of 3 credits 2 start positions.
        assert!((free_slot_probability(&ticks, 2) - 2.0 / 6.0).abs() < 1e-12);
        // All busy: no free slots.
        assert_eq!(free_slot_probability(&[3, 1, 2], 1), 0.0);
        assert_eq!(free_slot_probability(&[], 1), 0.0);
    }

    #[test]
    fn interior_nodes_exclude_the_boundary_band() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(4.4, 0.0),
            Point::new(0.0, -4.4),
            Point::new(3.9, 3.9),
        ];
        let interior = interior_nodes(&points, 1.0, Point::new(0.0, 0.0), 10.0, 10.0);
        assert_eq!(interior, vec![0, 1, 2, 3]);
        let interior = interior_nodes(&points, 1.5, Point::new(0.0, 0.0), 10.0, 10.0);
        assert_eq!(interior, vec![0]);
    }

    #[test]
    fn heard_times_include_propagation_delay() {
        let points = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let graph = CommunicationGraph::build(&points, ReceptionModel::SymbolError, 40.0, 0.05);
        assert!(graph.contains_edge(0, 1));

        let mut timeline = Timeline::new(2);
        timeline.record_sends(5.0, &[1]);
        let radius = 2.0;
        let heard = heard_times_by_node(&points, &graph, &timeline, radius);
        assert_eq!(heard[0].len(), 1);
        assert!((heard[0][0] - 5.5).abs() < 1e-12);
        // Node 1 hears node 0's (empty) history only.
        assert!(heard[1].is_empty());
    }

    #[test]
    fn interior_edge_summary_aggregates_inner_traffic() {
        let adjacency = vec![vec![1, 2], vec![0], vec![0]];
        let mut log = TrafficLog::new(&adjacency);
        log.add_sent((0, 1), 10);
        log.add_collisions((0, 1), 4);
        log.add_sent((2, 0), 8);

        // Node 2 is outside: only the 0-1 edge counts.
        let (ratios, aggregate) = interior_edge_summary(&log, &[0, 1]);
        assert_eq!(ratios, vec![0.4]);
        assert!((aggregate - 0.4).abs() < 1e-12);

        let (ratios, aggregate) = interior_edge_summary(&log, &[]);
        assert!(ratios.is_empty());
        assert_eq!(aggregate, 0.0);
    }
}
