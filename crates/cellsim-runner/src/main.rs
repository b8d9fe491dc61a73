//! Command line runner: seeds a chamber, grows it and prints the result.
//!
//! Usage: `cellsim-runner [config.json]`

mod telemetry;

use anyhow::{Context, Result};
use cellsim_core::{h_to_s, Rrf, SimulationConfig};
use cellsim_world::{Cell, CellInitializer, CellTemplate, RunSummary, Simulator};
use glam::DVec2;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct Output<'a> {
    summary: RunSummary,
    cells: &'a [Cell],
}

fn load_config() -> Result<SimulationConfig> {
    match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None => Ok(SimulationConfig::standard()),
    }
}

fn main() -> Result<()> {
    telemetry::init_telemetry()?;

    let config = load_config()?;
    info!(
        seed = config.random.seed,
        cells = config.new_cells.count,
        duration_hours = config.duration_hours,
        timestep_seconds = config.timestep_seconds,
        "Starting cellsim runner"
    );

    let mut rrf = Rrf::from_config(&config.random);
    let mut simulator = Simulator::new(&config, &mut rrf)?;
    for boundary in &config.chamber.boundaries {
        simulator.add_boundary(boundary.iter().copied().map(DVec2::from_array));
    }

    let mut initializer = CellInitializer::new(&config, &mut rrf)?;
    initializer.populate(
        &mut simulator,
        config.new_cells.count,
        &CellTemplate::default(),
    )?;

    let summary = simulator
        .run(h_to_s(config.duration_hours), config.timestep_seconds)
        .context("simulation failed")?;

    let output = Output {
        summary,
        cells: &simulator.world().cells,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
