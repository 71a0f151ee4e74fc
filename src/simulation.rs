//! Event-driven simulation kernel and run driver.
//!
//! One step of the loop:
//! 1. Dequeue the earliest batch (equal times merged) and advance the clock.
//! 2. Update message possession: for every batch node without the message,
//!    gather each neighbour's transmissions whose propagation window covers
//!    this node since its last processing, ask the conflict oracle which of
//!    them survived interference, and draw reception per survivor with the
//!    edge probability. New holders join the possession set together, after
//!    the whole batch was evaluated against the pre-batch set.
//! 3. Listen protocol only: answer the batch's hearing queries from the send
//!    histories and feed the outcomes to the protocol.
//! 4. Let the protocol process the batch, record the transmissions, update
//!    last-process times, and enqueue the follow-up batches.
//! 5. Stop on target reach (unless load-testing), on the time ceiling, or on
//!    queue exhaustion.
//!
//! Everything is single-threaded and deterministic for a fixed seed.

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{Protocol, SimConfig};
use crate::geometry::{self, Point};
use crate::interference::{ConflictMap, find_interference_radius};
use crate::mac::{ListenMac, MacProtocol, ScheduleMac};
use crate::network::{CommunicationGraph, interference_adjacency};
use crate::stats::{self, TrafficLog};
use crate::timeline::{Batch, Timeline};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// A target node received the message (non-load-test mode).
    TargetReached,
    /// The clock passed the configured ceiling.
    TimeLimit,
    /// The processing queue ran dry; treated as natural termination.
    QueueExhausted,
}

/// Serializable summary of one finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub rho: f64,
    pub node_count: usize,
    pub edge_count: usize,
    pub interference_radius: f64,
    pub final_time: f64,
    pub final_time_secs: f64,
    pub nodes_with_message: usize,
    pub reached_targets: Vec<usize>,
    pub total_sent: u64,
    pub total_collisions: u64,
    pub interior_node_count: usize,
    pub mean_empty_slot_probability: f64,
    pub interior_collision_ratio: f64,
    pub degenerate_skips: usize,
}

/// A fully wired simulation instance: deployment, graphs, conflict oracle,
/// one MAC protocol flavour, the timeline, and the run counters.
pub struct Simulation {
    config: SimConfig,
    points: Vec<Point>,
    graph: CommunicationGraph,
    conflicts: ConflictMap,
    mac: MacProtocol,
    timeline: Timeline,
    log: TrafficLog,
    has_message: Vec<bool>,
    is_target: Vec<bool>,
    rng: ChaCha8Rng,
    /// Next whole time unit at which to emit a progress line.
    next_progress_time: f64,
}

impl Simulation {
    /// Build every derived structure from the configuration and the supplied
    /// node positions.
    pub fn new(config: SimConfig, points: Vec<Point>) -> Self {
        let radius = find_interference_radius(config.probability_func_type, config.f_val);
        let graph = CommunicationGraph::build(&points, config.probability_func_type, config.f_val, config.reliability);
        let conflicts = ConflictMap::build(&points, &graph, radius);

        let mac = match config.protocol {
            Protocol::Schedule => MacProtocol::Schedule(ScheduleMac::new(&interference_adjacency(&points, radius))),
            Protocol::Listen => MacProtocol::Listen(ListenMac::new(points.len())),
        };

        let log = TrafficLog::new(graph.adjacency());
        let (has_message, is_target) = initial_bands(&config, &points);
        info!(
            "simulation ready: {} nodes, {} sources, {} targets",
            points.len(),
            has_message.iter().filter(|&&m| m).count(),
            is_target.iter().filter(|&&t| t).count()
        );

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let timeline = Timeline::new(points.len());

        Self {
            config,
            points,
            graph,
            conflicts,
            mac,
            timeline,
            log,
            has_message,
            is_target,
            rng,
            next_progress_time: 1.0,
        }
    }

    /// Push the protocol's initial batches into the queue.
    pub fn seed_initial_schedule(&mut self) {
        let t0 = self.timeline.current_time();
        for batch in self.mac.initial_schedule(t0, &mut self.rng) {
            self.timeline.push_batch(batch);
        }
    }

    /// Process one batch. `None` means the run continues.
    pub fn step(&mut self) -> Option<RunOutcome> {
        let Some(Batch { time: now, nodes }) = self.timeline.pop_batch() else {
            return Some(RunOutcome::QueueExhausted);
        };

        self.update_message_possession(&nodes);

        if let Some(((beg, end), listeners)) = self.mac.witness_interval(&nodes, &self.has_message, now) {
            let heard: Vec<usize> = listeners
                .iter()
                .copied()
                .filter(|&node| self.did_node_hear_something(node, beg, end))
                .collect();
            self.mac.apply_hearing(&listeners, &heard);
        }

        let (send_nodes, next_batches) = self.mac.step(&nodes, &self.has_message, now, &mut self.rng);
        self.timeline.update_last_process_times(&nodes, now);
        if !send_nodes.is_empty() {
            self.timeline.record_sends(now, &send_nodes);
            self.log.add_attempts(&send_nodes);
        }

        if !self.config.load_test {
            let reached = self.reached_targets();
            if !reached.is_empty() {
                info!("targets reached: {:?}", reached);
                return Some(RunOutcome::TargetReached);
            }
        }

        for batch in next_batches {
            self.timeline.push_batch(batch);
        }

        if self.timeline.current_time() > self.config.max_time {
            return Some(RunOutcome::TimeLimit);
        }
        None
    }

    /// Seed the queue and run until a terminal condition.
    pub fn run(&mut self) -> RunOutcome {
        self.seed_initial_schedule();
        let outcome = loop {
            if let Some(outcome) = self.step() {
                break outcome;
            }
            if self.timeline.current_time() > self.next_progress_time {
                debug!("t = {:.2}", self.timeline.current_time());
                self.next_progress_time += 1.0;
            }
        };
        info!(
            "run finished: {:?} at t = {:.3} ({:.2} s), {} of {} nodes hold the message",
            outcome,
            self.timeline.current_time(),
            self.timeline.current_time_in_sec(),
            self.nodes_with_message().len(),
            self.points.len()
        );
        outcome
    }

    /// Evaluate incoming transmissions for the batch against the pre-batch
    /// possession set; new holders are admitted together afterwards.
    fn update_message_possession(&mut self, batch_nodes: &[usize]) {
        if self.config.load_test {
            // Possession cannot change, but the per-edge counters still track
            // the offered traffic and its collisions.
            for &node in batch_nodes {
                self.incoming_message(node);
            }
            return;
        }

        let without: Vec<usize> = batch_nodes.iter().copied().filter(|&node| !self.has_message[node]).collect();
        let mut newly = Vec::new();
        for node in without {
            if self.incoming_message(node) {
                newly.push(node);
            }
        }
        if !newly.is_empty() {
            debug!("message received by {:?}", newly);
            for node in newly {
                self.has_message[node] = true;
            }
        }
    }

    /// Did any neighbour transmission reach `node` since its last processing?
    ///
    /// For each neighbour the propagation window is the node's processing
    /// interval shifted back by the propagation delay d/R. Transmissions in
    /// the window are screened by the conflict oracle; the survivors each get
    /// one Bernoulli reception draw at the edge probability.
    fn incoming_message(&mut self, node: usize) -> bool {
        let t_prev = self.timeline.last_process_time(node);
        let t_curr = self.timeline.current_time();
        let radius = self.conflicts.interference_radius();

        let mut received = false;
        for neighbour_index in 0..self.graph.neighbors(node).len() {
            let neighbour = self.graph.neighbors(node)[neighbour_index];
            let delay = geometry::dist(self.points[node], self.points[neighbour]) / radius;
            let t_beg = t_prev - delay;
            let t_end = t_curr - delay;

            let sender_times = self.timeline.send_times_between(neighbour, t_beg, t_end).to_vec();
            if sender_times.is_empty() {
                continue;
            }

            // Interferer histories reach one extra unit into the past so a
            // transmission started before the window can still collide.
            let mut interferer_times = HashMap::new();
            for interferer in self.conflicts.conflict_indexes(neighbour, node) {
                let times = self.timeline.send_times_between(interferer, t_beg - 1.0, t_end).to_vec();
                interferer_times.insert(interferer, times);
            }

            let schedulable = self.conflicts.filter_schedulable_sends(neighbour, node, &sender_times, &interferer_times);
            self.log.add_sent((neighbour, node), sender_times.len() as u64);
            self.log.add_collisions((neighbour, node), (sender_times.len() - schedulable.len()) as u64);

            if self.try_receive(neighbour, node, &schedulable) {
                received = true;
            }
        }
        received
    }

    /// One Bernoulli draw per surviving transmission, at the stored edge
    /// probability. A missing edge is a programming error: the event loop
    /// never attempts reception across a non-edge.
    fn try_receive(&mut self, sender: usize, receiver: usize, times: &[f64]) -> bool {
        if times.is_empty() {
            return false;
        }
        let probability = self
            .graph
            .edge_probability(sender, receiver)
            .expect("reception attempted across a pair that is not a communication edge");
        for _ in times {
            if self.rng.gen_range(0.0..1.0) <= probability {
                return true;
            }
        }
        false
    }

    /// True iff any neighbour transmission reaches `node` within the window
    /// [t_beg, t_end] of the node's own clock (propagation delay subtracted
    /// from the neighbour's send times).
    pub fn did_node_hear_something(&self, node: usize, t_beg: f64, t_end: f64) -> bool {
        let radius = self.conflicts.interference_radius();
        self.graph.neighbors(node).iter().any(|&neighbour| {
            let delay = geometry::dist(self.points[node], self.points[neighbour]) / radius;
            !self.timeline.send_times_between(neighbour, t_beg - delay, t_end - delay).is_empty()
        })
    }

    fn reached_targets(&self) -> Vec<usize> {
        (0..self.points.len()).filter(|&node| self.has_message[node] && self.is_target[node]).collect()
    }

    /// Restore the post-construction state for a fresh, replayable run.
    pub fn reset(&mut self) {
        self.timeline.reset();
        self.mac.reset();
        self.log.reset();
        let (has_message, is_target) = initial_bands(&self.config, &self.points);
        self.has_message = has_message;
        self.is_target = is_target;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.next_progress_time = 1.0;
    }

    // Queries for collaborators.

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn graph(&self) -> &CommunicationGraph {
        &self.graph
    }

    pub fn conflict_map(&self) -> &ConflictMap {
        &self.conflicts
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn traffic_log(&self) -> &TrafficLog {
        &self.log
    }

    pub fn nodes_with_message(&self) -> Vec<usize> {
        (0..self.points.len()).filter(|&node| self.has_message[node]).collect()
    }

    pub fn holds_message(&self, node: usize) -> bool {
        self.has_message[node]
    }

    /// Per-node empty-slot probability over the elapsed run.
    pub fn empty_slot_probabilities(&self) -> Vec<f64> {
        let radius = self.conflicts.interference_radius();
        let heard = stats::heard_times_by_node(&self.points, &self.graph, &self.timeline, radius);
        heard
            .iter()
            .map(|times| stats::free_slot_probability(&stats::count_ticks(times, self.timeline.current_time()), 1))
            .collect()
    }

    /// Summary of the finished run for reporting.
    pub fn report(&self, outcome: RunOutcome) -> RunSummary {
        let radius = self.conflicts.interference_radius();
        let interior = stats::interior_nodes(&self.points, radius, self.config.center_point(), self.config.width(), self.config.height());
        let probabilities = self.empty_slot_probabilities();
        let mean_empty = if interior.is_empty() {
            0.0
        } else {
            interior.iter().map(|&node| probabilities[node]).sum::<f64>() / interior.len() as f64
        };
        let (_, interior_collision_ratio) = stats::interior_edge_summary(&self.log, &interior);
        let totals = self.log.totals();

        RunSummary {
            outcome,
            rho: self.config.rho,
            node_count: self.points.len(),
            edge_count: self.graph.edges().len(),
            interference_radius: radius,
            final_time: self.timeline.current_time(),
            final_time_secs: self.timeline.current_time_in_sec(),
            nodes_with_message: self.nodes_with_message().len(),
            reached_targets: self.reached_targets(),
            total_sent: totals.sent,
            total_collisions: totals.collisions,
            interior_node_count: interior.len(),
            mean_empty_slot_probability: mean_empty,
            interior_collision_ratio,
            degenerate_skips: self.conflicts.degenerate_skips(),
        }
    }
}

/// Initial possession and target bands.
///
/// Load test: every node starts with the message and there are no targets.
/// Otherwise nodes in the left fractional band are sources and nodes in the
/// right fractional band are targets.
fn initial_bands(config: &SimConfig, points: &[Point]) -> (Vec<bool>, Vec<bool>) {
    if config.load_test {
        return (vec![true; points.len()], vec![false; points.len()]);
    }

    let source_boundary = config.center_point().x - config.width() / 2.0 + config.width() * config.margin;
    let target_boundary = config.center_point().x + config.width() / 2.0 - config.width() * config.margin;
    let has_message = points.iter().map(|p| p.x < source_boundary).collect();
    let is_target = points.iter().map(|p| p.x > target_boundary).collect();
    (has_message, is_target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{self, PlacementKind};

    fn two_node_schedule_config() -> SimConfig {
        SimConfig {
            protocol: Protocol::Schedule,
            load_test: false,
            size: [2.0, 2.0],
            margin: 0.2,
            max_time: 400.0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn band_initialization_splits_sources_and_targets() {
        let config = two_node_schedule_config();
        let points = vec![Point::new(-0.7, 0.0), Point::new(0.7, 0.0)];
        let (has_message, is_target) = initial_bands(&config, &points);
        assert_eq!(has_message, vec![true, false]);
        assert_eq!(is_target, vec![false, true]);
    }

    #[test]
    fn single_edge_delivery_reaches_the_target() {
        let config = two_node_schedule_config();
        let points = vec![Point::new(-0.7, 0.0), Point::new(0.7, 0.0)];
        let mut sim = Simulation::new(config, points);
        assert!(sim.graph().contains_edge(0, 1));

        let outcome = sim.run();
        assert_eq!(outcome, RunOutcome::TargetReached);
        assert!(sim.holds_message(1));

        // The source transmitted at least once and its history is ordered.
        let history = sim.timeline().send_history(0);
        assert!(!history.is_empty());
        assert!(history.windows(2).all(|w| w[0] <= w[1]));
        assert!(sim.traffic_log().attempts(0) as usize >= history.len());
    }

    #[test]
    fn empty_deployment_terminates_without_side_effects() {
        let mut sim = Simulation::new(SimConfig::default(), Vec::new());
        let outcome = sim.run();
        assert_eq!(outcome, RunOutcome::QueueExhausted);
        assert_eq!(sim.timeline().current_time(), 0.0);
        assert_eq!(sim.traffic_log().totals(), crate::stats::EdgeCounter::default());
    }

    #[test]
    fn hearing_oracle_subtracts_propagation_delay() {
        let mut config = SimConfig::default();
        config.load_test = true;
        let points = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let mut sim = Simulation::new(config, points);
        let radius = sim.conflict_map().interference_radius();
        let delay = 1.0 / radius;

        sim.timeline.record_sends(10.0, &[1]);
        // In node 0's clock the transmission lands at 10 + delay.
        assert!(sim.did_node_hear_something(0, 10.0 + delay - 0.01, 10.0 + delay + 0.01));
        assert!(!sim.did_node_hear_something(0, 10.0 - 0.01, 10.0 + 0.01));
        // Node 1 has no transmitting neighbour.
        assert!(!sim.did_node_hear_something(1, 0.0, 20.0));
    }

    fn run_capture(config: &SimConfig) -> (Vec<Vec<f64>>, Vec<usize>, u64, u64) {
        let points = placement::generate(
            config.point_gen_type,
            config.seed,
            config.width(),
            config.height(),
            config.center_point(),
            config.rho,
        );
        let mut sim = Simulation::new(config.clone(), points);
        sim.run();
        let histories = (0..sim.points().len()).map(|node| sim.timeline().send_history(node).to_vec()).collect();
        let totals = sim.traffic_log().totals();
        (histories, sim.nodes_with_message(), totals.sent, totals.collisions)
    }

    #[test]
    fn same_seed_replays_identically() {
        let config = SimConfig {
            load_test: true,
            protocol: Protocol::Listen,
            point_gen_type: PlacementKind::Random,
            size: [6.0, 6.0],
            rho: 0.4,
            max_time: 15.0,
            ..SimConfig::default()
        };
        let first = run_capture(&config);
        let second = run_capture(&config);
        assert_eq!(first, second);

        let other_seed = SimConfig { seed: 21, ..config };
        let third = run_capture(&other_seed);
        assert_ne!(first.0, third.0);
    }

    #[test]
    fn possession_is_monotonic_across_steps() {
        let config = SimConfig {
            protocol: Protocol::Listen,
            load_test: false,
            point_gen_type: PlacementKind::Grid,
            size: [5.0, 5.0],
            rho: 1.0,
            margin: 0.2,
            max_time: 60.0,
            ..SimConfig::default()
        };
        let points = placement::generate(
            config.point_gen_type,
            config.seed,
            config.width(),
            config.height(),
            config.center_point(),
            config.rho,
        );
        let mut sim = Simulation::new(config, points);
        sim.seed_initial_schedule();

        let mut seen: Vec<usize> = sim.nodes_with_message();
        loop {
            if sim.step().is_some() {
                break;
            }
            let current = sim.nodes_with_message();
            assert!(seen.iter().all(|node| current.contains(node)), "a node forgot the message");
            seen = current;
        }
    }

    #[test]
    fn reset_allows_an_identical_rerun() {
        let config = SimConfig {
            load_test: true,
            protocol: Protocol::Listen,
            point_gen_type: PlacementKind::Random,
            size: [5.0, 5.0],
            rho: 0.4,
            max_time: 10.0,
            ..SimConfig::default()
        };
        let points = placement::generate(
            config.point_gen_type,
            config.seed,
            config.width(),
            config.height(),
            config.center_point(),
            config.rho,
        );
        let mut sim = Simulation::new(config, points);
        sim.run();
        let first: Vec<Vec<f64>> = (0..sim.points().len()).map(|node| sim.timeline().send_history(node).to_vec()).collect();
        let first_totals = sim.traffic_log().totals();

        sim.reset();
        assert!(sim.timeline().send_history(0).is_empty());
        sim.run();
        let second: Vec<Vec<f64>> = (0..sim.points().len()).map(|node| sim.timeline().send_history(node).to_vec()).collect();
        assert_eq!(first, second);
        assert_eq!(first_totals, sim.traffic_log().totals());
    }
}
