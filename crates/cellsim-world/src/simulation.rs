//! Simulation engine stepping the chamber through time.

use crate::cell::{Cell, CellContext, CellState};
use crate::growth::GrowthSource;
use crate::lineage::LineageRegistry;
use crate::placement::{build_placement, SubSimulator};
use crate::world::World;
use cellsim_core::{s_to_h, CellId, Error, Result, Rrf, SimulationConfig};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, event, info, instrument, Level};

/// A world together with the elapsed simulated time in seconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Simulation {
    pub world: World,
    pub time: f64,
}

/// The step a cell is currently being advanced by
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timestep {
    /// Length of the step in seconds
    pub timestep: f64,
    /// Simulated time at the end of the step in seconds
    pub time: f64,
}

impl Timestep {
    pub fn new(timestep: f64, time: f64) -> Self {
        Self { timestep, time }
    }

    /// Step length in hours, the unit growth rates are given in
    pub fn hours(&self) -> f64 {
        s_to_h(self.timestep)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_hours(&self) -> f64 {
        s_to_h(self.time)
    }
}

/// Totals reported at the end of [`Simulator::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    pub time: f64,
    pub cells: usize,
    pub divisions: u64,
    pub max_generation: usize,
    pub mean_length: f64,
}

/// Owns a simulation and drives its cells and sub-simulators.
///
/// The simulator is the only thing that changes which cells exist. Placement
/// engines see the live cells each step and hand back poses, which are
/// written onto the cells.
pub struct Simulator {
    simulation: Simulation,
    sub_simulators: Vec<Box<dyn SubSimulator>>,
    lineage: LineageRegistry,
    growth: GrowthSource,
    steps: u64,
    divisions: u64,
}

impl Simulator {
    /// Simulator with the configured placement engine installed.
    ///
    /// Growth streams are spawned from `rrf` here, so spawn order matters
    /// for reproducibility.
    pub fn new(config: &SimulationConfig, rrf: &mut Rrf) -> Result<Self> {
        let mut simulator = Self::without_placement(config, rrf)?;
        simulator.add_sub_simulator(build_placement(&config.placement)?);
        Ok(simulator)
    }

    /// Simulator without any sub-simulator; cells grow and divide in place
    pub fn without_placement(config: &SimulationConfig, rrf: &mut Rrf) -> Result<Self> {
        config.validate()?;
        let growth = GrowthSource::new(&config.growth, rrf)?;

        info!(
            seed = rrf.seed_value(),
            engine = ?config.placement.engine,
            simplification = config.placement.simplification.level(),
            "Simulator created"
        );

        Ok(Self {
            simulation: Simulation::default(),
            sub_simulators: Vec::new(),
            lineage: LineageRegistry::new(),
            growth,
            steps: 0,
            divisions: 0,
        })
    }

    pub fn add_sub_simulator(&mut self, sub_simulator: Box<dyn SubSimulator>) {
        debug!(name = sub_simulator.name(), "sub-simulator added");
        self.sub_simulators.push(sub_simulator);
    }

    pub fn sub_simulator_names(&self) -> Vec<&'static str> {
        self.sub_simulators.iter().map(|s| s.name()).collect()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn world(&self) -> &World {
        &self.simulation.world
    }

    pub fn time(&self) -> f64 {
        self.simulation.time
    }

    pub fn lineage(&self) -> &LineageRegistry {
        &self.lineage
    }

    pub fn growth_source(&mut self) -> &mut GrowthSource {
        &mut self.growth
    }

    pub fn divisions(&self) -> u64 {
        self.divisions
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn new_cell_id(&self) -> CellId {
        self.lineage.next_id()
    }

    /// Birth `cell` if needed, stamp its birth time and queue it
    pub fn introduce(&mut self, mut cell: Cell) -> CellId {
        if cell.state == CellState::Unborn {
            cell.lineage.birth_time = self.simulation.time;
            cell.birth(&mut self.growth);
        }
        let id = cell.id;
        self.add(cell);
        id
    }

    /// Queue a cell for the next commit
    pub fn add(&mut self, cell: Cell) {
        self.simulation.world.add(cell);
    }

    pub fn remove(&mut self, cell: CellId) {
        self.simulation.world.remove(cell);
    }

    pub fn add_boundary(&mut self, coordinates: impl IntoIterator<Item = DVec2>) {
        self.simulation.world.add_boundary(coordinates);
    }

    /// Empty the world and every sub-simulator; time keeps running
    pub fn clear(&mut self) {
        self.simulation.world.clear();
        for sub_simulator in self.sub_simulators.iter_mut() {
            sub_simulator.clear();
        }
    }

    /// Advance everything by `timestep` seconds
    #[instrument(skip(self), fields(time = self.simulation.time))]
    pub fn step(&mut self, timestep: f64) -> Result<Timestep> {
        if !(timestep >= 0.0) || !timestep.is_finite() {
            return Err(Error::Validation(format!(
                "timestep must be finite and non-negative, got {}",
                timestep
            )));
        }

        // Changes queued since the last step (initialization, manual edits);
        // a bad removal fails the step before the clock moves
        self.simulation.world.commit()?;

        self.simulation.time += timestep;
        let step = Timestep::new(timestep, self.simulation.time);

        let mut divided = 0u64;
        {
            let (cells, changes) = self.simulation.world.split_mut();
            let mut ctx = CellContext {
                timestep: &step,
                changes,
                lineage: &self.lineage,
                growth: &mut self.growth,
            };
            for cell in cells.iter_mut() {
                cell.step(&mut ctx)?;
                if cell.state == CellState::Divided {
                    divided += 1;
                }
            }
        }

        // Division results become live
        self.simulation.world.commit()?;
        self.divisions += divided;

        self.run_sub_simulators(timestep)?;
        self.steps += 1;

        debug!(
            time = step.time,
            cells = self.simulation.world.len(),
            divisions = divided,
            "step complete"
        );

        Ok(step)
    }

    /// Rebuild every sub-simulator from the live world, step it and write
    /// the resulting poses back
    fn run_sub_simulators(&mut self, timestep: f64) -> Result<()> {
        if self.sub_simulators.is_empty() {
            return Ok(());
        }

        let world = &mut self.simulation.world;
        let slots: BTreeMap<CellId, usize> = world
            .cells
            .iter()
            .enumerate()
            .map(|(slot, cell)| (cell.id, slot))
            .collect();

        for sub_simulator in self.sub_simulators.iter_mut() {
            sub_simulator.clear();
            for boundary in &world.boundaries {
                sub_simulator.add_boundary(boundary)?;
            }
            for cell in &world.cells {
                sub_simulator.add(cell)?;
            }

            for update in sub_simulator.step(timestep)? {
                let slot = slots
                    .get(&update.cell)
                    .copied()
                    .ok_or(Error::UnknownCell(update.cell))?;
                world.cells[slot].set_pose(update.pose);
            }
        }
        Ok(())
    }

    /// Step until `duration` seconds have passed in steps of `timestep`
    #[instrument(skip(self))]
    pub fn run(&mut self, duration: f64, timestep: f64) -> Result<RunSummary> {
        if !(timestep > 0.0) || !(duration >= 0.0) {
            return Err(Error::Validation(format!(
                "cannot run {} s in steps of {} s",
                duration, timestep
            )));
        }

        let total = (duration / timestep).round() as u64;
        info!("Starting simulation for {} steps of {} s", total, timestep);

        for step in 1..=total {
            self.step(timestep)?;

            if step % 60 == 0 {
                self.emit_population_metrics();
            }
        }

        let summary = self.summary();
        self.emit_run_summary(&summary);
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let cells = &self.simulation.world.cells;
        let mean_length = if cells.is_empty() {
            0.0
        } else {
            cells.iter().map(Cell::length).sum::<f64>() / cells.len() as f64
        };

        RunSummary {
            steps: self.steps,
            time: self.simulation.time,
            cells: cells.len(),
            divisions: self.divisions,
            max_generation: cells
                .iter()
                .map(|cell| cell.lineage.generation())
                .max()
                .unwrap_or(0),
            mean_length,
        }
    }

    fn emit_population_metrics(&self) {
        let cells = &self.simulation.world.cells;
        let lengths: Vec<f64> = cells.iter().map(Cell::length).collect();
        let max_length = lengths.iter().copied().fold(0.0, f64::max);

        info!(
            event = "population_metrics",
            time_hours = s_to_h(self.simulation.time),
            total_population = cells.len(),
            total_divisions = self.divisions,
            max_length = max_length,
            "Population metrics snapshot"
        );

        event!(
            Level::INFO,
            gauge_name = "population_total",
            gauge_value = cells.len(),
            time = self.simulation.time,
            "Population gauge"
        );
    }

    fn emit_run_summary(&self, summary: &RunSummary) {
        info!(
            event = "run_summary",
            steps = summary.steps,
            time_hours = s_to_h(summary.time),
            total_population = summary.cells,
            total_divisions = summary.divisions,
            max_generation = summary.max_generation,
            mean_length = format!("{:.3}", summary.mean_length),
            "RUN COMPLETE - Summary Statistics"
        );
    }
}
