//! Interference radius and the conflict oracle.
//!
//! A transmitter silences receivers out to the interference radius R, the
//! distance at which its reception probability falls below 1%. For every
//! communication edge (s, g) the oracle precomputes, per nearby node i, the
//! closed window of send-time offsets Δt = t_i − t_s at which a transmission
//! by i collides with a transmission s → g at the receiver. Offsets are in
//! dimensionless time units: signals travel one radius per unit, so segment
//! distances convert to times by dividing by R.
//!
//! The table is built once and is read-only during a run.

use log::{info, warn};
use std::collections::HashMap;

use crate::geometry::{self, Interval, Point};
use crate::network::{CommunicationGraph, EdgeKey};
use crate::signal_calculations::{ReceptionModel, from_sec_to_unit};

/// Wall-clock length of one message in seconds.
pub const MESSAGE_LENGTH_SECS: f64 = 0.02;

/// Reception probability below which a transmitter no longer interferes.
const INTERFERENCE_FLOOR: f64 = 0.01;

/// Search bracket for the interference radius.
const RADIUS_SEARCH_LO: f64 = 1.0;
const RADIUS_SEARCH_HI: f64 = 10.0;
/// Bisection stops once the bracket is narrower than this.
const RADIUS_TOLERANCE: f64 = 1e-3;

/// Find the interference radius: the smallest r in the search bracket with
/// `p(r, f) < 0.01`.
///
/// Bisection on the monotone decreasing reception probability; the returned
/// radius satisfies `p(R, f) < 0.01` while `p(R - tol, f) >= 0.01`. If even
/// the far end of the bracket still receives above the floor, the bound is
/// reported and used as-is rather than failing the run.
pub fn find_interference_radius(model: ReceptionModel, f_val: f64) -> f64 {
    if model.probability(RADIUS_SEARCH_HI, f_val) >= INTERFERENCE_FLOOR {
        warn!(
            "reception probability {:.4} at r = {} still above {}, using the search bound as interference radius",
            model.probability(RADIUS_SEARCH_HI, f_val),
            RADIUS_SEARCH_HI,
            INTERFERENCE_FLOOR
        );
        return RADIUS_SEARCH_HI;
    }
    if model.probability(RADIUS_SEARCH_LO, f_val) < INTERFERENCE_FLOOR {
        warn!(
            "reception probability already below {} at r = {}, using the near search bound as interference radius",
            INTERFERENCE_FLOOR, RADIUS_SEARCH_LO
        );
        return RADIUS_SEARCH_LO;
    }

    let (mut lo, mut hi) = (RADIUS_SEARCH_LO, RADIUS_SEARCH_HI);
    while hi - lo > RADIUS_TOLERANCE {
        let mid = 0.5 * (lo + hi);
        if model.probability(mid, f_val) < INTERFERENCE_FLOOR {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    info!("interference radius {:.4}, p = {:.5}", hi, model.probability(hi, f_val));
    hi
}

/// Conflict windows of one interferer on one canonical edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEntry {
    /// Node index of the interferer.
    pub node: usize,
    /// Offsets colliding with a transmission edge.0 → edge.1.
    pub forward: Option<Interval>,
    /// Offsets colliding with a transmission edge.1 → edge.0.
    pub reverse: Option<Interval>,
}

impl ConflictEntry {
    /// The window for the given direction of the canonical edge.
    fn window(&self, forward: bool) -> Option<Interval> {
        if forward { self.forward } else { self.reverse }
    }
}

/// Interval list of one canonical edge.
///
/// The receiving endpoint's own window is kept apart from the interferer
/// list: it is built with the interferer placed at the edge's second
/// endpoint, applies identically to both directions, and is reported under
/// the node index of whichever endpoint is currently receiving.
struct EdgeConflicts {
    self_entry: ConflictEntry,
    others: Vec<ConflictEntry>,
}

/// Precomputed conflict-interval table for every communication edge.
pub struct ConflictMap {
    radius: f64,
    table: HashMap<EdgeKey, EdgeConflicts>,
    /// Nodes within range of an edge whose window collapsed to nothing
    /// (degenerate geometry clamped to "no conflict").
    degenerate_skips: usize,
}

impl ConflictMap {
    /// Build the table for every edge of the communication graph.
    ///
    /// A third node i is tabulated for edge (s, g) when its distance to the
    /// segment s–g is within the interference radius; nodes farther out can
    /// never overlap a reception at g and are left out entirely.
    pub fn build(points: &[Point], graph: &CommunicationGraph, radius: f64) -> Self {
        let message_duration = from_sec_to_unit(MESSAGE_LENGTH_SECS);
        let mut table = HashMap::new();
        let mut degenerate_skips = 0;

        for &edge in graph.edges() {
            let (s, g) = (points[edge.0], points[edge.1]);

            let (self_forward, _) = conflict_intervals(s, g, g, radius, message_duration);
            let self_entry = ConflictEntry {
                node: edge.1,
                forward: self_forward,
                reverse: self_forward,
            };

            let mut others = Vec::new();
            for (node, &p) in points.iter().enumerate() {
                if node == edge.0 || node == edge.1 {
                    continue;
                }
                if geometry::dist_line_segment(p, s, g) <= radius {
                    let (forward, reverse) = conflict_intervals(s, g, p, radius, message_duration);
                    if forward.is_none() && reverse.is_none() {
                        degenerate_skips += 1;
                    }
                    others.push(ConflictEntry { node, forward, reverse });
                }
            }

            table.insert(edge, EdgeConflicts { self_entry, others });
        }

        info!("conflict table built for {} edges", table.len());
        if degenerate_skips > 0 {
            warn!("{} in-range interferers produced no conflict window", degenerate_skips);
        }

        Self {
            radius,
            table,
            degenerate_skips,
        }
    }

    pub fn interference_radius(&self) -> f64 {
        self.radius
    }

    pub fn degenerate_skips(&self) -> usize {
        self.degenerate_skips
    }

    /// Interferer indices tabulated for a transmission `sender` → `receiver`.
    ///
    /// The first element is always the receiver itself (a receiver that is
    /// busy transmitting cannot accept the message); the rest are the
    /// in-range third nodes in construction order.
    ///
    /// Panics if the pair is not a communication edge: the event loop never
    /// consults the oracle for non-edges.
    pub fn conflict_indexes(&self, sender: usize, receiver: usize) -> Vec<usize> {
        let conflicts = self.edge_conflicts(sender, receiver);
        let mut indexes = Vec::with_capacity(conflicts.others.len() + 1);
        indexes.push(receiver);
        indexes.extend(conflicts.others.iter().map(|entry| entry.node));
        indexes
    }

    /// True iff the offset `t_i - t_s` falls inside the conflict window.
    /// An absent window never conflicts.
    pub fn check_conflict(window: Option<Interval>, t_s: f64, t_i: f64) -> bool {
        window.is_some_and(|iv| iv.contains(t_i - t_s))
    }

    /// Filter `sender_times` down to those transmissions `sender` → `receiver`
    /// that no interferer collides with.
    ///
    /// `interferer_times` maps each index from [`Self::conflict_indexes`] to
    /// the send timestamps it contributed inside the relevant window; indexes
    /// without history simply cannot conflict.
    pub fn filter_schedulable_sends(
        &self,
        sender: usize,
        receiver: usize,
        sender_times: &[f64],
        interferer_times: &HashMap<usize, Vec<f64>>,
    ) -> Vec<f64> {
        let edge = EdgeKey::new(sender, receiver);
        let forward = edge.0 == sender;
        let conflicts = self.edge_conflicts(sender, receiver);

        let conflicts_with = |node: usize, window: Option<Interval>, t_s: f64| {
            interferer_times
                .get(&node)
                .is_some_and(|times| times.iter().any(|&t_i| Self::check_conflict(window, t_s, t_i)))
        };

        let mut schedulable = Vec::with_capacity(sender_times.len());
        for &t_s in sender_times {
            // The self entry is checked under the current receiver's index.
            let blocked = conflicts_with(receiver, conflicts.self_entry.window(forward), t_s)
                || conflicts.others.iter().any(|entry| conflicts_with(entry.node, entry.window(forward), t_s));
            if !blocked {
                schedulable.push(t_s);
            }
        }
        schedulable
    }

    fn edge_conflicts(&self, a: usize, b: usize) -> &EdgeConflicts {
        self.table
            .get(&EdgeKey::new(a, b))
            .expect("conflict table queried for a pair that is not a communication edge")
    }
}

/// Conflict windows of interferer `p_i` against the edge `p_s` → `p_g`, as
/// offsets Δt = t_i − t_s (forward) and for the swapped direction (reverse).
///
/// The interferer disturbs the receiver wherever its circle of radius R cuts
/// the segment; the window bounds follow from the earliest and latest points
/// of that cut (and the interferer's projection between them), shifted by the
/// propagation times and widened by the message duration on both sides.
fn conflict_intervals(p_s: Point, p_g: Point, p_i: Point, radius: f64, t_d: f64) -> (Option<Interval>, Option<Interval>) {
    let pr_0 = geometry::line_segment_param(p_i, p_s, p_g);
    let Some((pr_1, pr_2)) = geometry::segment_circle_params(p_i, radius, p_s, p_g) else {
        return (None, None);
    };

    let pr_a = pr_1.max(0.0);
    let pr_b = pr_2.min(1.0);
    let pr_c = geometry::clamp_param(pr_0, 0.0, 1.0);

    let t_s_g = geometry::dist(p_s, p_g) / radius;
    let t_s_a = pr_a * t_s_g;
    let t_s_b = pr_b * t_s_g;
    let t_s_c = pr_c * t_s_g;

    let t_i_a = geometry::dist(p_i, geometry::interpolate(p_s, p_g, pr_a)) / radius;
    let t_i_b = geometry::dist(p_i, geometry::interpolate(p_s, p_g, pr_b)) / radius;
    let t_i_c = geometry::dist(p_i, geometry::interpolate(p_s, p_g, pr_c)) / radius;

    let forward = Interval::bounded(
        (t_s_c - t_i_c - t_d).min(t_s_a - t_i_a - t_d),
        (t_s_b - t_i_b + t_d).max(t_s_c - t_i_c + t_d),
    );
    let reverse = Interval::bounded(
        t_s_g - (t_s_c + t_i_c + t_d).max(t_s_b + t_i_b + t_d),
        t_s_g - (t_s_c + t_i_c - t_d).min(t_s_a + t_i_a - t_d),
    );
    (forward, reverse)
}
