//! Node placement over the deployment rectangle.
//!
//! Four generation modes selected by the configuration:
//! - Pseudo-random: seeded uniform draws over the rectangle
//! - Grid: regular lattice with spacing 1/√rho (seed-independent)
//! - Sobol: unscrambled 2D Sobol low-discrepancy sequence
//! - Halton: unscrambled Halton sequence in bases 2 and 3
//!
//! The target point count is ⌊area·rho⌋; the Sobol mode rounds it up to the
//! next power of two to keep the sequence balanced. All modes center the
//! placement on the configured region center.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

use crate::geometry::Point;

/// Placement mode, deserialized from the configuration's integer code
/// (0 = pseudo-random, 1 = grid, 2 = Sobol, 3 = Halton).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum PlacementKind {
    Random,
    Grid,
    Sobol,
    Halton,
}

impl TryFrom<u8> for PlacementKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PlacementKind::Random),
            1 => Ok(PlacementKind::Grid),
            2 => Ok(PlacementKind::Sobol),
            3 => Ok(PlacementKind::Halton),
            other => Err(format!("unknown point generator type: {}", other)),
        }
    }
}

/// Generate node positions for a `width` × `height` rectangle centered on
/// `center` with target density `rho` (nodes per unit area).
///
/// The seed drives the pseudo-random mode; grid, Sobol, and Halton placements
/// are deterministic by construction and ignore it.
pub fn generate(kind: PlacementKind, seed: u64, width: f64, height: f64, center: Point, rho: f64) -> Vec<Point> {
    let n_sample = (width * height * rho) as usize;

    match kind {
        PlacementKind::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..n_sample)
                .map(|_| {
                    let x = width * rng.gen_range(0.0..1.0) - width / 2.0;
                    let y = height * rng.gen_range(0.0..1.0) - height / 2.0;
                    Point::new(center.x + x, center.y + y)
                })
                .collect()
        }
        PlacementKind::Grid => grid_points(width, height, center, rho),
        PlacementKind::Sobol => {
            let n_corrected = n_sample.next_power_of_two();
            sobol_points(if n_sample == 0 { 0 } else { n_corrected })
                .into_iter()
                .map(|(u, v)| Point::new(center.x + u * width - width / 2.0, center.y + v * height - height / 2.0))
                .collect()
        }
        PlacementKind::Halton => (0..n_sample)
            .map(|i| {
                let u = radical_inverse(i as u64, 2);
                let v = radical_inverse(i as u64, 3);
                Point::new(center.x + u * width - width / 2.0, center.y + v * height - height / 2.0)
            })
            .collect(),
    }
}

/// Regular lattice with spacing 1/√rho, anchored on the grid line closest to
/// the region's left/top edge and walked row by row.
fn grid_points(width: f64, height: f64, center: Point, rho: f64) -> Vec<Point> {
    let d = 1.0 / rho.sqrt();
    let x0 = -((width / 2.0 / d) as i64 as f64) * d;
    let y0 = ((height / 2.0 / d) as i64 as f64) * d;
    let cols = (width / d).ceil() as usize;
    let rows = (height / d).ceil() as usize;

    let mut points = Vec::with_capacity(rows * cols);
    for j in 0..rows {
        for i in 0..cols {
            points.push(Point::new(center.x + x0 + i as f64 * d, center.y + y0 - j as f64 * d));
        }
    }
    points
}

/// Radical inverse of `index` in the given base, the Halton coordinate.
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f64;
    while index > 0 {
        result += (index % base) as f64 * fraction;
        index /= base;
        fraction /= base as f64;
    }
    result
}

/// First `count` points of the unscrambled 2D Sobol sequence in [0, 1)².
///
/// Dimension one is the van der Corput sequence in base 2; dimension two uses
/// the primitive polynomial x + 1 with initial direction number 1. Points are
/// produced with the Gray-code recurrence, starting from the origin.
fn sobol_points(count: usize) -> Vec<(f64, f64)> {
    const BITS: u32 = 32;

    // Direction numbers, left-aligned in 32 bits.
    let mut v0 = [0u32; BITS as usize];
    let mut v1 = [0u32; BITS as usize];
    let mut m: u32 = 1;
    for j in 0..BITS as usize {
        v0[j] = 1 << (BITS - 1 - j as u32);
        v1[j] = m << (BITS - 1 - j as u32);
        // m_k < 2^k holds inductively, so the shifted value never overflows.
        m = (m << 1) ^ m;
    }

    let scale = 1.0 / (1u64 << BITS) as f64;
    let mut points = Vec::with_capacity(count);
    let (mut x, mut y) = (0u32, 0u32);
    for i in 0..count {
        points.push((x as f64 * scale, y as f64 * scale));
        let bit = (i + 1).trailing_zeros() as usize;
        x ^= v0[bit];
        y ^= v1[bit];
    }
    points
}
