//! # Hydrocast Simulator - Main Entry Point
//!
//! Discrete-event simulator for cascade mailing: hop-by-hop message
//! dissemination in a two-dimensional multi-hop acoustic network. Nodes are
//! placed over a rectangular region, connected wherever their reception
//! probability clears a reliability threshold, and contend for the medium
//! under one of two MAC protocols (a TDMA colouring schedule or stochastic
//! listen-before-transmit) while an analytic conflict oracle decides which
//! transmissions survive mutual interference.
//!
//! ## Run modes
//!
//! A single run uses the configuration as-is. With a `[sweep]` section the
//! run repeats over increasing node density, rebuilding the deployment and
//! all derived structures per step, and collects one summary per density.
//!
//! ## Usage
//!
//! ```text
//! hydrocast-simulator [config.toml]
//! ```
//!
//! Without an argument the built-in default parameter set is used. Each
//! invocation writes the collected run summaries as a timestamped JSON
//! report into the working directory.

use anyhow::Context;
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::{Path, PathBuf};

mod config;
mod geometry;
mod interference;
mod mac;
mod network;
mod placement;
mod signal_calculations;
mod simulation;
mod stats;
mod timeline;

use config::SimConfig;
use simulation::{RunSummary, Simulation};

fn main() -> anyhow::Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("hydrocast_simulator"), LevelFilter::Debug)
        .init();

    info!("starting up");

    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::load(Path::new(&path))?,
        None => {
            info!("no configuration file given, using the default parameter set");
            SimConfig::default()
        }
    };

    let summaries = run_all(&config);

    let report_path = PathBuf::from(format!("run_report_{}.json", chrono::Local::now().format("%Y%m%d_%H%M%S")));
    let report = serde_json::to_string_pretty(&summaries).context("failed to serialize the run report")?;
    std::fs::write(&report_path, report).with_context(|| format!("failed to write report {}", report_path.display()))?;
    info!("report written to {}", report_path.display());

    Ok(())
}

/// Execute the configured runs: one, or a whole density sweep.
fn run_all(config: &SimConfig) -> Vec<RunSummary> {
    let mut summaries = Vec::new();
    let mut rho = config.rho;
    loop {
        let run_config = SimConfig {
            rho,
            sweep: None,
            ..config.clone()
        };
        summaries.push(run_once(run_config));
        match &config.sweep {
            Some(sweep) if rho + sweep.step <= sweep.end_rho + 1e-9 => rho += sweep.step,
            _ => break,
        }
    }
    summaries
}

/// Deploy, simulate, and summarize one run.
fn run_once(config: SimConfig) -> RunSummary {
    let points = placement::generate(
        config.point_gen_type,
        config.seed,
        config.width(),
        config.height(),
        config.center_point(),
        config.rho,
    );
    let mut sim = Simulation::new(config, points);
    let outcome = sim.run();
    let summary = sim.report(outcome);
    info!(
        "rho {:.2}: mean empty-slot probability {:.4}, interior collision ratio {:.4}",
        summary.rho, summary.mean_empty_slot_probability, summary.interior_collision_ratio
    );
    summary
}
