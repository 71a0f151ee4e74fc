//! Simulation timeline: the processing queue and per-node histories.
//!
//! Contains:
//! - A min-time priority queue of node batches. Batches scheduled for the
//!   same instant are merged on dequeue, so every node due at a time t is
//!   processed in one step against the same simulation state.
//! - Per-node send histories (sorted, append-only within a run) with
//!   inclusive time-window queries.
//! - Per-node last-process times and the current simulation time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::signal_calculations::from_unit_to_sec;

/// A batch of nodes due for processing at one simulation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub time: f64,
    pub nodes: Vec<usize>,
}

/// Heap adapter: orders batches by ascending time in a max-heap.
struct QueueEntry(Batch);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.time.total_cmp(&other.0.time) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the earliest batch surfaces at the heap top.
        other.0.time.total_cmp(&self.0.time)
    }
}

/// Queue, histories, and clock of one simulation run.
pub struct Timeline {
    queue: BinaryHeap<QueueEntry>,
    send_history: Vec<Vec<f64>>,
    last_process_time: Vec<f64>,
    current_time: f64,
}

impl Timeline {
    pub fn new(node_count: usize) -> Self {
        Self {
            queue: BinaryHeap::new(),
            send_history: vec![Vec::new(); node_count],
            last_process_time: vec![0.0; node_count],
            current_time: 0.0,
        }
    }

    /// Schedule a batch for processing.
    pub fn push_batch(&mut self, batch: Batch) {
        self.queue.push(QueueEntry(batch));
    }

    /// Dequeue the earliest batch, merging every batch scheduled for exactly
    /// the same time, and advance the clock to it.
    ///
    /// Returns `None` on an empty queue, which the driver treats as natural
    /// termination.
    pub fn pop_batch(&mut self) -> Option<Batch> {
        let head = self.queue.pop()?;
        self.current_time = head.0.time;
        let mut nodes = head.0.nodes;
        while self.queue.peek().is_some_and(|entry| entry.0.time == self.current_time) {
            if let Some(entry) = self.queue.pop() {
                nodes.extend(entry.0.nodes);
            }
        }
        Some(Batch {
            time: self.current_time,
            nodes,
        })
    }

    /// Append a transmission timestamp to each sending node's history.
    pub fn record_sends(&mut self, time: f64, nodes: &[usize]) {
        for &node in nodes {
            self.send_history[node].push(time);
        }
    }

    /// The node's send timestamps inside the closed window [t_beg, t_end].
    pub fn send_times_between(&self, node: usize, t_beg: f64, t_end: f64) -> &[f64] {
        let history = &self.send_history[node];
        let i = history.partition_point(|&t| t < t_beg);
        let j = history.partition_point(|&t| t <= t_end);
        &history[i..j]
    }

    pub fn send_history(&self, node: usize) -> &[f64] {
        &self.send_history[node]
    }

    pub fn last_process_time(&self, node: usize) -> f64 {
        self.last_process_time[node]
    }

    pub fn update_last_process_times(&mut self, nodes: &[usize], time: f64) {
        for &node in nodes {
            self.last_process_time[node] = time;
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn current_time_in_sec(&self) -> f64 {
        from_unit_to_sec(self.current_time)
    }

    /// Drop all queued batches, histories, and times for a fresh run.
    pub fn reset(&mut self) {
        self.queue.clear();
        for history in &mut self.send_history {
            history.clear();
        }
        self.last_process_time.fill(0.0);
        self.current_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(time: f64, nodes: &[usize]) -> Batch {
        Batch {
            time,
            nodes: nodes.to_vec(),
        }
    }

    #[test]
    fn pop_returns_batches_in_time_order() {
        let mut timeline = Timeline::new(4);
        timeline.push_batch(batch(3.0, &[3]));
        timeline.push_batch(batch(1.0, &[1]));
        timeline.push_batch(batch(2.0, &[2]));

        let mut previous = f64::NEG_INFINITY;
        while let Some(b) = timeline.pop_batch() {
            assert!(b.time >= previous);
            previous = b.time;
        }
        assert!(timeline.pop_batch().is_none());
    }

    #[test]
    fn equal_time_batches_are_merged_on_dequeue() {
        let mut timeline = Timeline::new(6);
        timeline.push_batch(batch(5.0, &[0, 1]));
        timeline.push_batch(batch(5.0, &[2]));
        timeline.push_batch(batch(5.0, &[3]));
        timeline.push_batch(batch(7.0, &[4]));

        let merged = timeline.pop_batch().unwrap();
        assert_eq!(merged.time, 5.0);
        let mut nodes = merged.nodes;
        nodes.sort_unstable();
        assert_eq!(nodes, vec![0, 1, 2, 3]);
        assert_eq!(timeline.current_time(), 5.0);

        let rest = timeline.pop_batch().unwrap();
        assert_eq!(rest.nodes, vec![4]);
    }

    #[test]
    fn send_window_query_is_inclusive_on_both_ends() {
        let mut timeline = Timeline::new(1);
        timeline.record_sends(1.0, &[0]);
        timeline.record_sends(2.0, &[0]);
        timeline.record_sends(3.0, &[0]);

        assert_eq!(timeline.send_times_between(0, 1.0, 3.0), &[1.0, 2.0, 3.0]);
        assert_eq!(timeline.send_times_between(0, 1.5, 2.5), &[2.0]);
        assert_eq!(timeline.send_times_between(0, 2.0, 2.0), &[2.0]);
        assert!(timeline.send_times_between(0, 3.5, 9.0).is_empty());
    }

    #[test]
    fn histories_stay_sorted_under_batch_recording() {
        let mut timeline = Timeline::new(3);
        timeline.record_sends(1.0, &[0, 2]);
        timeline.record_sends(1.5, &[2]);
        timeline.record_sends(4.0, &[0, 1, 2]);

        for node in 0..3 {
            let history = timeline.send_history(node);
            assert!(history.windows(2).all(|w| w[0] <= w[1]), "history of {} not sorted", node);
        }
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let mut timeline = Timeline::new(2);
        timeline.push_batch(batch(1.0, &[0]));
        timeline.pop_batch();
        timeline.record_sends(1.0, &[0]);
        timeline.update_last_process_times(&[0, 1], 1.0);

        timeline.reset();
        assert!(timeline.pop_batch().is_none());
        assert!(timeline.send_history(0).is_empty());
        assert_eq!(timeline.last_process_time(0), 0.0);
        assert_eq!(timeline.current_time(), 0.0);
    }
}
