//! Simulation configuration loading and validation.
//!
//! The configuration is a TOML file deserialized into [`SimConfig`]. Integer
//! wire codes from the legacy tooling (placement 0-3, probability model 1-2,
//! protocol 0-1) are converted into enums at parse time, so an unknown code
//! fails the load instead of surfacing mid-run.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::geometry::Point;
use crate::placement::PlacementKind;
use crate::signal_calculations::ReceptionModel;

/// Medium-access protocol selector, deserialized from the configuration's
/// integer code (0 = TDMA schedule, 1 = listen-before-transmit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Protocol {
    Schedule,
    Listen,
}

impl TryFrom<u8> for Protocol {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Protocol::Schedule),
            1 => Ok(Protocol::Listen),
            other => Err(format!("unknown protocol code: {}", other)),
        }
    }
}

/// Optional density sweep: repeat the run with `rho` increased by `step`
/// until it exceeds `end_rho`, collecting one summary per density.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SweepConfig {
    pub end_rho: f64,
    pub step: f64,
}

/// Full simulation configuration.
///
/// Defaults mirror the reference parameter set: a 20 x 20 region at density 1,
/// Halton placement, symbol-error reception at f = 40 with reliability 0.05,
/// and the listen-before-transmit protocol in load-test mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the point generator and the run's random draws.
    pub seed: u64,
    /// Width and height of the deployment rectangle.
    pub size: [f64; 2],
    /// Center of the deployment rectangle.
    pub center: [f64; 2],
    /// Target node density (nodes per unit area).
    pub rho: f64,
    /// Placement mode code (0 random, 1 grid, 2 Sobol, 3 Halton).
    pub point_gen_type: PlacementKind,
    /// Frequency parameter passed to the reception probability functions.
    pub f_val: f64,
    /// Reception probability threshold for communication edges.
    pub reliability: f64,
    /// Reception probability model code (1 erf, 2 symbol-error).
    pub probability_func_type: ReceptionModel,
    /// Medium-access protocol code (0 schedule, 1 listen).
    pub protocol: Protocol,
    /// Load-test mode: every node starts with the message and the run only
    /// ends on `max_time`. Otherwise sources and targets come from `margin`.
    pub load_test: bool,
    /// Fractional x-range of the source band (left) and target band (right).
    pub margin: f64,
    /// Simulation time ceiling in dimensionless units.
    pub max_time: f64,
    /// Optional density sweep section.
    pub sweep: Option<SweepConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 20,
            size: [20.0, 20.0],
            center: [0.0, 0.0],
            rho: 1.0,
            point_gen_type: PlacementKind::Halton,
            f_val: 40.0,
            reliability: 0.05,
            probability_func_type: ReceptionModel::SymbolError,
            protocol: Protocol::Listen,
            load_test: true,
            margin: 0.1,
            max_time: 200.0,
            sweep: None,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(config_path).with_context(|| format!("failed to read config file {}", config_path.display()))?;
        let config: SimConfig = toml::from_str(&content).with_context(|| format!("failed to parse config file {}", config_path.display()))?;
        config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
        Ok(config)
    }

    /// Check value ranges that would cause nonsensical runs.
    pub fn validate(&self) -> Result<(), String> {
        if self.size[0] <= 0.0 || self.size[1] <= 0.0 {
            return Err(format!("region size must be positive, got {:?}", self.size));
        }
        if self.rho <= 0.0 {
            return Err(format!("density rho must be positive, got {}", self.rho));
        }
        if self.f_val <= 0.0 {
            return Err(format!("frequency parameter must be positive, got {}", self.f_val));
        }
        if !(0.0..1.0).contains(&self.reliability) {
            return Err(format!("reliability must be in [0, 1), got {}", self.reliability));
        }
        if !(0.0..=0.5).contains(&self.margin) {
            return Err(format!("margin must be in [0, 0.5], got {}", self.margin));
        }
        if self.max_time <= 0.0 {
            return Err(format!("max_time must be positive, got {}", self.max_time));
        }
        if let Some(sweep) = &self.sweep {
            if sweep.step <= 0.0 {
                return Err(format!("sweep step must be positive, got {}", sweep.step));
            }
            if sweep.end_rho < self.rho {
                return Err(format!("sweep end_rho {} is below the starting rho {}", sweep.end_rho, self.rho));
            }
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.size[0]
    }

    pub fn height(&self) -> f64 {
        self.size[1]
    }

    pub fn center_point(&self) -> Point {
        Point::new(self.center[0], self.center[1])
    }
}
